//! Text storage layer.
//!
//! [`TextBuffer`] owns the document bytes in a gap buffer together with an
//! optional per-position style plane, the line-start partition, and the undo
//! history. Reads never fail; byte access out of range yields 0 so scanning
//! loops always make progress. Growth is fallible: allocation failure is
//! reported as [`StorageError::OutOfMemory`] rather than aborting.

use std::cell::RefCell;
use std::collections::TryReserveError;

use crate::undo::{Action, ActionKind, UndoHistory};
use crate::{Line, Position};

/// Storage errors.
#[derive(Debug)]
pub enum StorageError {
    /// The buffer could not grow to hold the request.
    OutOfMemory,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "buffer allocation failed"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<TryReserveError> for StorageError {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Per-line character index planes.
///
/// Flags combine: `LINE_INDEX_UTF16 | LINE_INDEX_UTF32`.
pub const LINE_INDEX_NONE: u32 = 0;
/// Per-line cumulative UTF-16 code unit counts.
pub const LINE_INDEX_UTF16: u32 = 1;
/// Per-line cumulative Unicode scalar counts.
pub const LINE_INDEX_UTF32: u32 = 2;

/// A zero-copy view of the buffer as its two physical segments around the
/// gap. Either segment may be empty.
#[derive(Debug, Clone, Copy)]
pub struct SplitView<'a> {
    /// Bytes before the gap.
    pub first: &'a [u8],
    /// Bytes after the gap.
    pub second: &'a [u8],
}

impl SplitView<'_> {
    /// Total length in bytes.
    pub fn len(&self) -> Position {
        (self.first.len() + self.second.len()) as Position
    }

    /// True when the view covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.second.is_empty()
    }

    /// Byte at `pos`, or 0 when out of range.
    #[inline]
    pub fn byte_at(&self, pos: Position) -> u8 {
        if pos < 0 {
            return 0;
        }
        let pos = pos as usize;
        if pos < self.first.len() {
            self.first[pos]
        } else {
            self.second
                .get(pos - self.first.len())
                .copied()
                .unwrap_or(0)
        }
    }
}

/// A byte gap buffer. Insertion moves the gap to the edit point so repeated
/// local edits are cheap.
struct GapBuffer {
    body: Vec<u8>,
    gap_start: usize,
    gap_len: usize,
}

impl GapBuffer {
    fn new() -> Self {
        Self {
            body: Vec::new(),
            gap_start: 0,
            gap_len: 0,
        }
    }

    fn len(&self) -> usize {
        self.body.len() - self.gap_len
    }

    #[inline]
    fn byte_at(&self, index: usize) -> u8 {
        let physical = if index < self.gap_start {
            index
        } else {
            index + self.gap_len
        };
        self.body.get(physical).copied().unwrap_or(0)
    }

    fn split(&self) -> (&[u8], &[u8]) {
        (
            &self.body[..self.gap_start],
            &self.body[self.gap_start + self.gap_len..],
        )
    }

    fn move_gap(&mut self, index: usize) {
        debug_assert!(index <= self.len());
        if index < self.gap_start {
            self.body
                .copy_within(index..self.gap_start, index + self.gap_len);
        } else if index > self.gap_start {
            self.body
                .copy_within(self.gap_start + self.gap_len..index + self.gap_len, self.gap_start);
        }
        self.gap_start = index;
    }

    fn insert(&mut self, index: usize, bytes: &[u8]) -> Result<(), StorageError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.gap_len < bytes.len() {
            // Grow the gap; reserve a little beyond the request so a run of
            // single-byte insertions does not reallocate every time.
            let grow = bytes.len().max(self.len() / 8).max(256);
            self.body.try_reserve(grow)?;
            self.move_gap(self.len());
            self.body.resize(self.body.len() + grow, 0);
            self.gap_len += grow;
        }
        self.move_gap(index);
        self.body[self.gap_start..self.gap_start + bytes.len()].copy_from_slice(bytes);
        self.gap_start += bytes.len();
        self.gap_len -= bytes.len();
        Ok(())
    }

    fn delete(&mut self, index: usize, len: usize) {
        if len == 0 {
            return;
        }
        self.move_gap(index);
        self.gap_len += len;
    }

    fn copy_range(&self, start: usize, len: usize, out: &mut Vec<u8>) {
        let (first, second) = self.split();
        let end = start + len;
        if start < first.len() {
            let first_end = end.min(first.len());
            out.extend_from_slice(&first[start..first_end]);
        }
        if end > first.len() {
            let second_start = start.saturating_sub(first.len());
            out.extend_from_slice(&second[second_start..end - first.len()]);
        }
    }

    fn clear(&mut self) {
        self.body.clear();
        self.gap_start = 0;
        self.gap_len = 0;
    }
}

/// Line-change summary returned by the mutating operations so the owner can
/// fan out per-line bookkeeping in event order.
#[derive(Debug, Clone)]
pub struct AppliedEdit {
    /// The bytes inserted or deleted by the operation.
    pub text: Vec<u8>,
    /// True when the operation started a new undo group.
    pub start_sequence: bool,
    /// Line holding the edit position before the change.
    pub line: Line,
    /// Net change in total line count.
    pub lines_added: Line,
}

#[derive(Default)]
struct LineCharacterIndex {
    dirty: bool,
    utf16: Vec<Position>,
    utf32: Vec<Position>,
}

/// The character buffer: bytes, styles, line starts, and undo history.
pub struct TextBuffer {
    substance: GapBuffer,
    style: GapBuffer,
    has_styles: bool,
    large_document: bool,
    read_only: bool,
    utf8_substance: bool,
    /// `starts[0] == 0`; one entry per line.
    starts: Vec<Position>,
    uh: UndoHistory,
    index_flags: u32,
    index: RefCell<LineCharacterIndex>,
}

impl TextBuffer {
    /// Create an empty buffer.
    ///
    /// `has_styles` allocates the style plane; `large_document` is a sizing
    /// hint recorded for the owner.
    pub fn new(has_styles: bool, large_document: bool) -> Self {
        Self {
            substance: GapBuffer::new(),
            style: GapBuffer::new(),
            has_styles,
            large_document,
            read_only: false,
            utf8_substance: false,
            starts: vec![0],
            uh: UndoHistory::new(),
            index_flags: LINE_INDEX_NONE,
            index: RefCell::new(LineCharacterIndex::default()),
        }
    }

    /// Total length in bytes.
    pub fn length(&self) -> Position {
        self.substance.len() as Position
    }

    /// Byte at `pos`, or 0 out of range.
    #[inline]
    pub fn char_at(&self, pos: Position) -> u8 {
        if pos < 0 {
            return 0;
        }
        self.substance.byte_at(pos as usize)
    }

    /// Copy `len` bytes starting at `start` into `out`.
    pub fn copy_range(&self, start: Position, len: Position, out: &mut Vec<u8>) {
        if start < 0 || len <= 0 {
            return;
        }
        let start = start as usize;
        let len = (len as usize).min(self.substance.len().saturating_sub(start));
        self.substance.copy_range(start, len, out);
    }

    /// The buffer as its two physical segments.
    pub fn all_view(&self) -> SplitView<'_> {
        let (first, second) = self.substance.split();
        SplitView { first, second }
    }

    /// Whether the sizing hint was set at creation.
    pub fn is_large(&self) -> bool {
        self.large_document
    }

    /// Whether a style plane is allocated.
    pub fn has_styles(&self) -> bool {
        self.has_styles
    }

    /// Allocate or discard the style plane; true when the state changed.
    pub fn ensure_style_buffer(&mut self, has_styles: bool) -> bool {
        if has_styles == self.has_styles {
            return false;
        }
        self.has_styles = has_styles;
        self.style.clear();
        if has_styles {
            let len = self.substance.len();
            let _ = self.style.insert(0, &vec![0u8; len]);
        }
        true
    }

    /// Style byte at `pos`, or 0.
    pub fn style_at(&self, pos: Position) -> u8 {
        if !self.has_styles || pos < 0 {
            return 0;
        }
        self.style.byte_at(pos as usize)
    }

    /// Set one style byte; true when it changed.
    pub fn set_style_at(&mut self, pos: Position, style: u8) -> bool {
        if !self.has_styles || pos < 0 || pos >= self.length() {
            return false;
        }
        let pos = pos as usize;
        if self.style.byte_at(pos) == style {
            return false;
        }
        self.style.delete(pos, 1);
        let _ = self.style.insert(pos, &[style]);
        true
    }

    /// Set a run of style bytes; true when any changed.
    pub fn set_style_for(&mut self, pos: Position, len: Position, style: u8) -> bool {
        let mut changed = false;
        for i in 0..len {
            changed |= self.set_style_at(pos + i, style);
        }
        changed
    }

    /// Whether the buffer rejects modification.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Set the read-only flag.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Whether the bytes are declared to be UTF-8.
    pub fn utf8_substance(&self) -> bool {
        self.utf8_substance
    }

    /// Declare whether the bytes are UTF-8.
    pub fn set_utf8_substance(&mut self, utf8: bool) {
        self.utf8_substance = utf8;
    }

    // ---- line structure ----

    /// Number of lines; an empty buffer has one.
    pub fn line_count(&self) -> Line {
        self.starts.len() as Line
    }

    /// Byte position where `line` starts. The virtual line at `line_count`
    /// starts at the buffer length.
    pub fn line_start(&self, line: Line) -> Position {
        if line <= 0 {
            return 0;
        }
        let line = line as usize;
        if line >= self.starts.len() {
            return self.length();
        }
        self.starts[line]
    }

    /// Byte position of the end of `line`, before its end-of-line bytes.
    pub fn line_end(&self, line: Line) -> Position {
        if line < 0 {
            return 0;
        }
        if line as usize >= self.starts.len().saturating_sub(1) {
            return self.length();
        }
        let next = self.starts[line as usize + 1];
        if next >= 2 && self.char_at(next - 2) == b'\r' && self.char_at(next - 1) == b'\n' {
            next - 2
        } else {
            next - 1
        }
    }

    /// Line containing byte position `pos`.
    pub fn line_from_position(&self, pos: Position) -> Line {
        if pos <= 0 {
            return 0;
        }
        let at = self.starts.partition_point(|&s| s <= pos);
        (at - 1) as Line
    }

    // ---- modification ----

    /// Insert bytes, recording undo when collecting.
    pub fn insert_string(
        &mut self,
        pos: Position,
        bytes: &[u8],
    ) -> Result<AppliedEdit, StorageError> {
        debug_assert!(!self.read_only);
        let line = self.line_from_position(pos);
        let start_sequence = if self.uh.is_collecting() {
            let mut copy = Vec::new();
            copy.try_reserve(bytes.len())?;
            copy.extend_from_slice(bytes);
            self.uh.append(ActionKind::Insert, pos, copy, true)
        } else {
            false
        };
        let lines_added = self.basic_insert(pos, bytes)?;
        Ok(AppliedEdit {
            text: bytes.to_vec(),
            start_sequence,
            line,
            lines_added,
        })
    }

    /// Delete a byte range, recording undo when collecting.
    pub fn delete_chars(&mut self, pos: Position, len: Position) -> Result<AppliedEdit, StorageError> {
        debug_assert!(!self.read_only);
        let line = self.line_from_position(pos);
        let mut deleted = Vec::new();
        deleted.try_reserve(len as usize)?;
        self.copy_range(pos, len, &mut deleted);
        let start_sequence = if self.uh.is_collecting() {
            self.uh
                .append(ActionKind::Remove, pos, deleted.clone(), true)
        } else {
            false
        };
        let lines_added = self.basic_delete(pos, len);
        Ok(AppliedEdit {
            text: deleted,
            start_sequence,
            line,
            lines_added,
        })
    }

    fn basic_insert(&mut self, pos: Position, bytes: &[u8]) -> Result<Line, StorageError> {
        let before = self.starts.len();
        self.substance.insert(pos as usize, bytes)?;
        if self.has_styles {
            self.style.insert(pos as usize, &vec![0u8; bytes.len()])?;
        }
        let len = bytes.len() as Position;
        for start in &mut self.starts {
            if *start > pos {
                *start += len;
            }
        }
        self.rescan_lines(pos - 1, pos + len + 1);
        self.index.borrow_mut().dirty = true;
        Ok((self.starts.len() - before) as Line)
    }

    fn basic_delete(&mut self, pos: Position, len: Position) -> Line {
        let before = self.starts.len();
        self.substance.delete(pos as usize, len as usize);
        if self.has_styles {
            self.style.delete(pos as usize, len as usize);
        }
        self.starts.retain(|&s| s <= pos || s > pos + len);
        for start in &mut self.starts {
            if *start > pos {
                *start -= len;
            }
        }
        self.rescan_lines(pos - 1, pos);
        self.index.borrow_mut().dirty = true;
        self.starts.len() as Line - before as Line
    }

    /// Re-derive the line starts produced by bytes in `[from, to)`.
    ///
    /// A line starts after a LF, and after a CR not followed by LF.
    fn rescan_lines(&mut self, from: Position, to: Position) {
        let from = from.max(0);
        let to = to.min(self.length());
        self.starts.retain(|&s| s <= from || s > to);
        let mut fresh = Vec::new();
        for i in from..to {
            let b = self.char_at(i);
            if b == b'\n' || (b == b'\r' && self.char_at(i + 1) != b'\n') {
                fresh.push(i + 1);
            }
        }
        if !fresh.is_empty() {
            let at = self.starts.partition_point(|&s| s <= from);
            self.starts.splice(at..at, fresh);
        }
        debug_assert!(self.starts.windows(2).all(|w| w[0] < w[1]));
    }

    // ---- save point ----

    /// Remember the current undo position as matching persistent storage.
    pub fn set_save_point(&mut self) {
        self.uh.set_save_point();
    }

    /// True at the save point.
    pub fn is_save_point(&self) -> bool {
        self.uh.is_save_point()
    }

    // ---- undo surface ----

    /// Whether undo is being recorded.
    pub fn is_collecting_undo(&self) -> bool {
        self.uh.is_collecting()
    }

    /// Turn undo recording on or off.
    pub fn set_undo_collection(&mut self, collect: bool) {
        self.uh.set_collecting(collect);
    }

    /// Discard the undo history.
    pub fn delete_undo_history(&mut self) {
        self.uh.delete_history();
    }

    /// True when a group can be undone.
    pub fn can_undo(&self) -> bool {
        self.uh.can_undo()
    }

    /// True when a group can be redone.
    pub fn can_redo(&self) -> bool {
        self.uh.can_redo()
    }

    /// Open an undo group.
    pub fn begin_undo_action(&mut self) {
        self.uh.begin_undo_action();
    }

    /// Close an undo group, returning the remaining depth.
    pub fn end_undo_action(&mut self) -> i32 {
        self.uh.end_undo_action()
    }

    /// Current undo group nesting depth.
    pub fn undo_sequence_depth(&self) -> i32 {
        self.uh.sequence_depth()
    }

    /// Number of steps in the group an undo would revert.
    pub fn start_undo(&self) -> usize {
        self.uh.start_undo()
    }

    /// The action the next undo step reverts.
    pub fn undo_step(&self) -> Action {
        self.uh.undo_step().clone()
    }

    /// Apply the inverse of the next undo step to the buffer.
    pub fn perform_undo_step(&mut self) -> Result<AppliedEdit, StorageError> {
        let action = self.uh.undo_step().clone();
        let edit = self.apply_inverse(&action)?;
        self.uh.completed_undo_step();
        Ok(edit)
    }

    /// Number of steps in the group a redo would reapply.
    pub fn start_redo(&self) -> usize {
        self.uh.start_redo()
    }

    /// The action the next redo step reapplies.
    pub fn redo_step(&self) -> Action {
        self.uh.redo_step().clone()
    }

    /// Reapply the next redo step to the buffer.
    pub fn perform_redo_step(&mut self) -> Result<AppliedEdit, StorageError> {
        let action = self.uh.redo_step().clone();
        let edit = self.apply_step(&action, true)?;
        self.uh.completed_redo_step();
        Ok(edit)
    }

    fn apply_inverse(&mut self, action: &Action) -> Result<AppliedEdit, StorageError> {
        self.apply_step(action, false)
    }

    /// Apply an action to the substance: `forward` replays it, otherwise its
    /// inverse is applied. Container actions touch nothing.
    fn apply_step(&mut self, action: &Action, forward: bool) -> Result<AppliedEdit, StorageError> {
        let insert = match action.kind {
            ActionKind::Insert => forward,
            ActionKind::Remove => !forward,
            ActionKind::Container => {
                return Ok(AppliedEdit {
                    text: Vec::new(),
                    start_sequence: false,
                    line: 0,
                    lines_added: 0,
                });
            }
        };
        let line = self.line_from_position(action.position);
        let lines_added = if insert {
            self.basic_insert(action.position, &action.text)?
        } else {
            self.basic_delete(action.position, action.len_data())
        };
        Ok(AppliedEdit {
            text: action.text.clone(),
            start_sequence: false,
            line,
            lines_added,
        })
    }

    /// Direct access to the history for markers, tentative spans, and the
    /// serialisation-style inspection API.
    pub fn history(&self) -> &UndoHistory {
        &self.uh
    }

    /// Mutable access to the history.
    pub fn history_mut(&mut self) -> &mut UndoHistory {
        &mut self.uh
    }

    // ---- per-line character index ----

    /// The allocated index planes.
    pub fn line_character_index(&self) -> u32 {
        self.index_flags
    }

    /// Allocate index planes (UTF-16 and/or UTF-32 cumulative counts).
    pub fn allocate_line_character_index(&mut self, flags: u32) {
        if self.index_flags | flags != self.index_flags {
            self.index_flags |= flags;
            self.index.borrow_mut().dirty = true;
        }
    }

    /// Release index planes.
    pub fn release_line_character_index(&mut self, flags: u32) {
        self.index_flags &= !flags;
    }

    /// The count of UTF-16 units or scalars before `line`, depending on
    /// `flags`. Returns the byte start when the plane is not allocated.
    pub fn index_line_start(&self, line: Line, flags: u32) -> Position {
        if self.index_flags & flags == 0 {
            return self.line_start(line);
        }
        self.rebuild_index_if_dirty();
        let index = self.index.borrow();
        let starts = if flags & LINE_INDEX_UTF16 != 0 {
            &index.utf16
        } else {
            &index.utf32
        };
        let line = (line.max(0) as usize).min(starts.len().saturating_sub(1));
        starts.get(line).copied().unwrap_or(0)
    }

    /// Line containing the UTF-16 unit or scalar offset `pos`.
    pub fn line_from_position_index(&self, pos: Position, flags: u32) -> Line {
        if self.index_flags & flags == 0 {
            return self.line_from_position(pos);
        }
        self.rebuild_index_if_dirty();
        let index = self.index.borrow();
        let starts = if flags & LINE_INDEX_UTF16 != 0 {
            &index.utf16
        } else {
            &index.utf32
        };
        if pos <= 0 || starts.is_empty() {
            return 0;
        }
        (starts.partition_point(|&s| s <= pos) - 1) as Line
    }

    fn rebuild_index_if_dirty(&self) {
        let mut index = self.index.borrow_mut();
        if !index.dirty && !index.utf16.is_empty() {
            return;
        }
        index.utf16.clear();
        index.utf32.clear();
        let mut units16: Position = 0;
        let mut units32: Position = 0;
        let mut line = 0 as Line;
        index.utf16.push(0);
        index.utf32.push(0);
        let mut pos = 0;
        let length = self.length();
        while pos < length {
            let next_line_start = self.line_start(line + 1);
            while pos < next_line_start {
                let width = if self.utf8_substance {
                    let mut bytes = [0u8; crate::encoding::UTF8_MAX_BYTES];
                    for (i, b) in bytes.iter_mut().enumerate() {
                        *b = self.char_at(pos + i as Position);
                    }
                    crate::encoding::utf8_classify(&bytes).unwrap_or(1)
                } else {
                    1
                };
                units16 += if width == 4 { 2 } else { 1 };
                units32 += 1;
                pos += width as Position;
            }
            line += 1;
            if line < self.line_count() {
                index.utf16.push(units16);
                index.utf32.push(units32);
            }
        }
        index.dirty = false;
    }
}
