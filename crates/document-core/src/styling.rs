//! Styling coordination.
//!
//! Style bytes are derived state: they are never part of the undoable text.
//! The document tracks `end_styled`, the boundary up to which style bytes are
//! valid, and pulls it back whenever text before it changes. Styling is
//! produced either by an installed [`Lexer`] or by watchers answering
//! `notify_style_needed`. A wall-clock throughput smoother paces how much
//! text a caller should style per time slice.

use std::time::Instant;

use tracing::trace;

use crate::document::Document;
use crate::watchers::{ModificationEvent, ModificationFlags};
use crate::Position;

/// A lexer that colourises and folds document text.
pub trait Lexer {
    /// Assign style bytes for `[start, start+len)`. `init_style` is the
    /// style in effect just before `start`.
    fn lex(&mut self, start: Position, len: Position, init_style: i32, doc: &mut Document);

    /// Assign fold levels for the lines covering `[start, start+len)`.
    fn fold(&mut self, start: Position, len: Position, init_style: i32, doc: &mut Document);
}

/// Holds the installed lexer and guards it against reentry: folding during a
/// lex pass can ask for more styling, which must not recurse into the lexer.
pub struct LexerHandle {
    instance: Option<Box<dyn Lexer>>,
    performing_style: bool,
}

impl LexerHandle {
    /// Wrap a lexer instance.
    pub fn new(instance: Box<dyn Lexer>) -> Self {
        Self {
            instance: Some(instance),
            performing_style: false,
        }
    }

    /// A handle with no lexer: styling is delegated to watchers.
    pub fn container() -> Self {
        Self {
            instance: None,
            performing_style: false,
        }
    }

    /// Whether styling must come from the container (no lexer installed).
    pub fn use_container_lexing(&self) -> bool {
        self.instance.is_none()
    }

    pub(crate) fn colourise(&mut self, doc: &mut Document, start: Position, end: Position) {
        if self.performing_style {
            return;
        }
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        self.performing_style = true;
        let length_doc = doc.length();
        let end = if end < 0 { length_doc } else { end.min(length_doc) };
        let len = end - start;
        if len > 0 {
            let style_start = if start > 0 {
                doc.style_index_at(start - 1)
            } else {
                0
            };
            instance.lex(start, len, style_start, doc);
            instance.fold(start, len, style_start, doc);
        }
        self.performing_style = false;
    }
}

/// Exponentially smoothed duration of styling one unit of text, used to
/// budget incremental styling passes.
#[derive(Debug, Clone)]
pub struct ActionDuration {
    duration: f64,
    min_duration: f64,
    unit_bytes: i32,
}

impl ActionDuration {
    const ALPHA: f64 = 0.25;

    /// Defaults tuned for styling throughput on source text.
    pub fn new() -> Self {
        Self {
            duration: 1e-6,
            min_duration: 1e-7,
            unit_bytes: 64,
        }
    }

    /// Fold one measurement of `number_actions` bytes taking
    /// `duration_of_actions` seconds into the smoothed estimate.
    ///
    /// Samples smaller than one unit are ignored to avoid instability.
    pub fn add_sample(&mut self, number_actions: Position, duration_of_actions: f64) {
        if number_actions < self.unit_bytes as Position {
            return;
        }
        let duration_one =
            (self.unit_bytes as f64 * duration_of_actions) / number_actions as f64;
        let smoothed = Self::ALPHA * duration_one + (1.0 - Self::ALPHA) * self.duration;
        self.duration = smoothed.max(self.min_duration);
    }

    /// How many bytes can be styled within `seconds_allowed`.
    pub fn actions_in_allowed_time(&self, seconds_allowed: f64) -> Position {
        let actions = (seconds_allowed / self.duration) as i64;
        actions.clamp(8, 0x10000) * self.unit_bytes as Position
    }
}

impl Default for ActionDuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Install (or remove, with `None`) the lexer handle.
    pub fn set_lexer(&mut self, lexer: Option<LexerHandle>) {
        self.lexer = lexer;
    }

    /// Whether a lexer handle is installed.
    pub fn has_lexer(&self) -> bool {
        self.lexer.is_some()
    }

    /// The boundary up to which style bytes are valid.
    pub fn get_end_styled(&self) -> Position {
        self.end_styled
    }

    /// A counter incremented for every styling run, so views can tell stale
    /// styling positions from fresh ones.
    pub fn style_clock(&self) -> i32 {
        self.style_clock
    }

    fn increment_style_clock(&mut self) {
        self.style_clock = (self.style_clock + 1) % 0x10_0000;
    }

    /// Begin a styling run: subsequent [`Document::set_style_for`] and
    /// [`Document::set_styles`] calls write from `position` on.
    pub fn start_styling(&mut self, position: Position) {
        self.end_styled = position;
    }

    /// Style the next `length` bytes with `style`.
    ///
    /// Rejected (false) while styling is reentered or when the document has
    /// no style plane.
    pub fn set_style_for(&mut self, length: Position, style: u8) -> bool {
        if self.entered_styling != 0 || !self.buffer.has_styles() {
            return false;
        }
        self.entered_styling += 1;
        let prev_end_styled = self.end_styled;
        if self.buffer.set_style_for(self.end_styled, length, style) {
            let event = ModificationEvent::new(
                ModificationFlags::CHANGE_STYLE | ModificationFlags::USER,
                prev_end_styled,
                length,
            );
            self.notify_modified(event);
        }
        self.end_styled += length;
        self.entered_styling -= 1;
        true
    }

    /// Style the next `styles.len()` bytes individually, notifying a single
    /// event covering the minimum contiguous changed window.
    pub fn set_styles(&mut self, styles: &[u8]) -> bool {
        if self.entered_styling != 0 || !self.buffer.has_styles() {
            return false;
        }
        self.entered_styling += 1;
        let mut did_change = false;
        let mut start_mod = 0;
        let mut end_mod = 0;
        for &style in styles {
            if self.buffer.set_style_at(self.end_styled, style) {
                if !did_change {
                    start_mod = self.end_styled;
                }
                did_change = true;
                end_mod = self.end_styled;
            }
            self.end_styled += 1;
        }
        if did_change {
            let event = ModificationEvent::new(
                ModificationFlags::CHANGE_STYLE | ModificationFlags::USER,
                start_mod,
                end_mod - start_mod + 1,
            );
            self.notify_modified(event);
        }
        self.entered_styling -= 1;
        true
    }

    /// Ensure style bytes are valid up to `pos`.
    ///
    /// With a lexer installed the range from the last styled line start is
    /// lexed and folded; otherwise watchers are asked to style until one
    /// advances the boundary.
    pub fn ensure_styled_to(&mut self, pos: Position) {
        if self.entered_styling != 0 || pos <= self.get_end_styled() {
            return;
        }
        self.increment_style_clock();
        let container_lexing = self
            .lexer
            .as_ref()
            .is_none_or(LexerHandle::use_container_lexing);
        if !container_lexing {
            let end_styled_to = self.line_start_position(self.get_end_styled());
            // Take the handle out so the lexer can call back into the
            // document; reinstall unless it replaced itself meanwhile.
            if let Some(mut handle) = self.lexer.take() {
                handle.colourise(self, end_styled_to, pos);
                if self.lexer.is_none() {
                    self.lexer = Some(handle);
                }
            }
        } else {
            // Ask the watchers to style, stopping as soon as one responds.
            self.notify_style_needed(pos);
        }
    }

    /// [`Document::ensure_styled_to`] with wall-clock measurement feeding
    /// the styling throughput smoother.
    pub fn style_to_adjusting_line_duration(&mut self, pos: Position) {
        let styling_start = self.get_end_styled();
        let timer = Instant::now();
        self.ensure_styled_to(pos);
        let bytes_being_styled = self.get_end_styled() - styling_start;
        let elapsed = timer.elapsed().as_secs_f64();
        trace!(bytes = bytes_being_styled, seconds = elapsed, "styling sample");
        self.duration_style_one_unit
            .add_sample(bytes_being_styled, elapsed);
    }

    /// How many bytes the styling smoother budgets for `seconds_allowed`.
    pub fn actions_in_allowed_time(&self, seconds_allowed: f64) -> Position {
        self.duration_style_one_unit
            .actions_in_allowed_time(seconds_allowed)
    }

    /// Toggle the style plane when the lexer configuration changes; styling
    /// restarts from the beginning when the plane appears.
    pub fn lexer_changed(&mut self, has_styles: bool) {
        if self.buffer.ensure_style_buffer(has_styles) {
            self.end_styled = 0;
        }
    }

    pub(crate) fn notify_style_needed(&mut self, pos: Position) {
        let watchers = self.watcher_entries();
        for entry in watchers {
            if pos <= self.get_end_styled() {
                break;
            }
            entry.watcher.notify_style_needed(self, entry.user_data, pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentOptions;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn smoother_converges_and_clamps() {
        let mut duration = ActionDuration::new();
        // Large fast samples drive the estimate down to the floor.
        for _ in 0..100 {
            duration.add_sample(1_000_000, 1e-9);
        }
        assert_eq!(duration.actions_in_allowed_time(10.0), 0x10000 * 64);
        // Slow samples drive it up; the budget clamps at the minimum.
        for _ in 0..100 {
            duration.add_sample(1_000_000, 1e6);
        }
        assert_eq!(duration.actions_in_allowed_time(1e-9), 8 * 64);
    }

    #[test]
    fn small_samples_are_ignored() {
        let mut duration = ActionDuration::new();
        let before = duration.actions_in_allowed_time(1.0);
        duration.add_sample(3, 100.0);
        assert_eq!(duration.actions_in_allowed_time(1.0), before);
    }

    #[test]
    fn styling_advances_end_styled() {
        let mut doc = Document::default();
        doc.insert_string(0, b"fn main() {}").unwrap();
        doc.start_styling(0);
        assert!(doc.set_style_for(2, 5));
        assert_eq!(doc.get_end_styled(), 2);
        assert_eq!(doc.style_at(0), 5);
        assert_eq!(doc.style_at(2), 0);
        assert!(doc.set_styles(&[1, 2, 3]));
        assert_eq!(doc.get_end_styled(), 5);
        assert_eq!(doc.style_at(3), 2);
    }

    #[test]
    fn styles_rejected_without_style_plane() {
        let mut doc = Document::new(DocumentOptions {
            styles_none: true,
            text_large: false,
        });
        doc.insert_string(0, b"text").unwrap();
        doc.start_styling(0);
        assert!(!doc.set_style_for(4, 1));
        assert_eq!(doc.style_at(0), 0);
        // Allocating the plane makes styling work and resets the boundary.
        doc.lexer_changed(true);
        assert_eq!(doc.get_end_styled(), 0);
        assert!(doc.set_style_for(4, 1));
        assert_eq!(doc.style_at(3), 1);
    }

    #[test]
    fn modification_pulls_back_end_styled() {
        let mut doc = Document::default();
        doc.insert_string(0, b"hello world").unwrap();
        doc.start_styling(0);
        doc.set_style_for(11, 1);
        assert_eq!(doc.get_end_styled(), 11);
        doc.insert_string(5, b"!").unwrap();
        assert_eq!(doc.get_end_styled(), 5);
    }

    struct CountingLexer {
        calls: Rc<RefCell<Vec<(Position, Position)>>>,
    }

    impl Lexer for CountingLexer {
        fn lex(&mut self, start: Position, len: Position, _init: i32, doc: &mut Document) {
            self.calls.borrow_mut().push((start, len));
            doc.start_styling(start);
            doc.set_style_for(len, 1);
        }

        fn fold(&mut self, start: Position, len: Position, _init: i32, doc: &mut Document) {
            let line = doc.line_from_position(start);
            let _ = doc.line_from_position(start + len);
            doc.set_level(line, crate::perline::FoldLevel::BASE);
        }
    }

    #[test]
    fn ensure_styled_invokes_lexer_from_line_start() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut doc = Document::default();
        doc.insert_string(0, b"line one\nline two\n").unwrap();
        doc.set_lexer(Some(LexerHandle::new(Box::new(CountingLexer {
            calls: calls.clone(),
        }))));
        doc.ensure_styled_to(12);
        assert_eq!(calls.borrow().as_slice(), &[(0, 12)]);
        assert_eq!(doc.get_end_styled(), 12);
        // Asking for an already-styled position does nothing.
        doc.ensure_styled_to(10);
        assert_eq!(calls.borrow().len(), 1);
        // The next request restarts from the styled line's start.
        doc.ensure_styled_to(15);
        assert_eq!(calls.borrow().last(), Some(&(9, 6)));
    }

    struct WatcherStyler;

    impl crate::watchers::DocumentWatcher for WatcherStyler {
        fn notify_style_needed(&self, doc: &mut Document, _ud: usize, end: Position) {
            doc.start_styling(doc.get_end_styled());
            let len = end - doc.get_end_styled();
            doc.set_style_for(len, 3);
        }
    }

    #[test]
    fn container_styling_through_watchers() {
        let mut doc = Document::default();
        doc.insert_string(0, b"watch me").unwrap();
        doc.add_watcher(Rc::new(WatcherStyler), 0);
        doc.ensure_styled_to(5);
        assert_eq!(doc.get_end_styled(), 5);
        assert_eq!(doc.style_at(4), 3);
    }
}
