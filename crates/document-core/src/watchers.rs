//! Modification events and watcher subscriptions.
//!
//! Views and other observers subscribe to a document as watchers. Every
//! mutation produces an ordered stream of [`ModificationEvent`]s; watchers
//! are notified in subscription order. A watcher subscribes together with an
//! opaque user-data word, and the (watcher, user data) pair must be unique.

use std::ops::{BitOr, BitOrAssign};
use std::rc::Rc;

use crate::document::Document;
use crate::perline::FoldLevel;
use crate::{Line, Position};

/// Bit-set describing a modification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModificationFlags(pub u32);

impl ModificationFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Text was inserted.
    pub const INSERT_TEXT: Self = Self(0x1);
    /// Text was deleted.
    pub const DELETE_TEXT: Self = Self(0x2);
    /// Style bytes changed.
    pub const CHANGE_STYLE: Self = Self(0x4);
    /// A fold level changed.
    pub const CHANGE_FOLD: Self = Self(0x8);
    /// The change was performed by the user (not undo/redo).
    pub const USER: Self = Self(0x10);
    /// The change was performed by undo.
    pub const UNDO: Self = Self(0x20);
    /// The change was performed by redo.
    pub const REDO: Self = Self(0x40);
    /// One step of a multi-step undo/redo group.
    pub const MULTI_STEP_UNDO_REDO: Self = Self(0x80);
    /// The final step of an undo/redo group.
    pub const LAST_STEP_IN_UNDO_REDO: Self = Self(0x100);
    /// A marker was added or removed.
    pub const CHANGE_MARKER: Self = Self(0x200);
    /// Sent before text is inserted.
    pub const BEFORE_INSERT: Self = Self(0x400);
    /// Sent before text is deleted.
    pub const BEFORE_DELETE: Self = Self(0x800);
    /// The undo/redo group spanned more than one line.
    pub const MULTILINE_UNDO_REDO: Self = Self(0x1000);
    /// First action of a new undo group.
    pub const START_ACTION: Self = Self(0x2000);
    /// An indicator decoration changed.
    pub const CHANGE_INDICATOR: Self = Self(0x4000);
    /// A line's lexer state changed.
    pub const CHANGE_LINE_STATE: Self = Self(0x8000);
    /// A margin text changed.
    pub const CHANGE_MARGIN: Self = Self(0x10000);
    /// An annotation changed.
    pub const CHANGE_ANNOTATION: Self = Self(0x20000);
    /// A container (host-defined) undo action.
    pub const CONTAINER: Self = Self(0x40000);
    /// The lexer reports a state change over a range.
    pub const LEXER_STATE: Self = Self(0x80000);
    /// Sent before an insertion, allowing the payload to be replaced.
    pub const INSERT_CHECK: Self = Self(0x100000);
    /// An end-of-line annotation changed.
    pub const CHANGE_EOL_ANNOTATION: Self = Self(0x200000);

    /// Whether every bit of `other` is set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set in `self`.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ModificationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ModificationFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Status codes reported through [`DocumentWatcher::notify_error`] and from
/// the data-append boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    /// No failure.
    Ok,
    /// An allocation failed.
    BadAlloc,
    /// Any other failure.
    Failure,
}

/// One modification event.
#[derive(Debug, Clone, Default)]
pub struct ModificationEvent {
    /// What happened.
    pub flags: ModificationFlags,
    /// Byte position of the change (or container token).
    pub position: Position,
    /// Byte length of the change.
    pub length: Position,
    /// Net lines added (negative when removed).
    pub lines_added: Line,
    /// The inserted or deleted bytes, when applicable.
    pub text: Option<Vec<u8>>,
    /// The affected line for per-line events.
    pub line: Line,
    /// New fold level for fold events.
    pub fold_level_now: FoldLevel,
    /// Previous fold level for fold events.
    pub fold_level_prev: FoldLevel,
    /// Display lines added by an annotation change.
    pub annotation_lines_added: i32,
    /// Token of a container action.
    pub token: Position,
}

impl ModificationEvent {
    /// An event with flags, position, and length only.
    pub fn new(flags: ModificationFlags, position: Position, length: Position) -> Self {
        Self {
            flags,
            position,
            length,
            ..Default::default()
        }
    }

    /// An event carrying text and a line delta.
    pub fn with_text(
        flags: ModificationFlags,
        position: Position,
        length: Position,
        lines_added: Line,
        text: Option<Vec<u8>>,
    ) -> Self {
        Self {
            flags,
            position,
            length,
            lines_added,
            text,
            ..Default::default()
        }
    }

    /// An event about a single line.
    pub fn on_line(flags: ModificationFlags, position: Position, line: Line) -> Self {
        Self {
            flags,
            position,
            line,
            ..Default::default()
        }
    }
}

/// An observer of document modifications.
///
/// All methods have empty defaults so a watcher implements only what it
/// needs. Watchers must not mutate the document from `Before*` events; the
/// gateway rejects reentrant modification.
pub trait DocumentWatcher {
    /// A modification to a read-only document was attempted.
    fn notify_modify_attempt(&self, _doc: &mut Document, _user_data: usize) {}

    /// The document crossed its save point (`at_save_point` true) or left it.
    fn notify_save_point(&self, _doc: &mut Document, _user_data: usize, _at_save_point: bool) {}

    /// A modification event, before or after the fact per its flags.
    fn notify_modified(&self, _doc: &mut Document, _event: &ModificationEvent, _user_data: usize) {}

    /// The document is being destroyed. The reference is immutable: the
    /// document is already half torn down.
    fn notify_deleted(&self, _doc: &Document, _user_data: usize) {}

    /// Styling is required up to `end_style_needed`.
    fn notify_style_needed(
        &self,
        _doc: &mut Document,
        _user_data: usize,
        _end_style_needed: Position,
    ) {
    }

    /// An internal error occurred.
    fn notify_error(&self, _doc: &mut Document, _user_data: usize, _status: DocumentStatus) {}

    /// An undo group completed (nesting depth returned to zero).
    fn notify_group_completed(&self, _doc: &mut Document, _user_data: usize) {}
}

/// A subscription: watcher plus its user data.
#[derive(Clone)]
pub(crate) struct WatcherEntry {
    pub(crate) watcher: Rc<dyn DocumentWatcher>,
    pub(crate) user_data: usize,
}

impl WatcherEntry {
    pub(crate) fn matches(&self, watcher: &Rc<dyn DocumentWatcher>, user_data: usize) -> bool {
        Rc::ptr_eq(&self.watcher, watcher) && self.user_data == user_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_operations() {
        let flags = ModificationFlags::INSERT_TEXT | ModificationFlags::USER;
        assert!(flags.contains(ModificationFlags::INSERT_TEXT));
        assert!(flags.contains(ModificationFlags::USER));
        assert!(!flags.contains(ModificationFlags::DELETE_TEXT));
        assert!(flags.intersects(ModificationFlags::USER | ModificationFlags::UNDO));
        let mut flags = flags;
        flags |= ModificationFlags::START_ACTION;
        assert!(flags.contains(ModificationFlags::START_ACTION));
    }
}
