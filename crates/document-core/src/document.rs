//! The document object and its modification gateway.
//!
//! [`Document`] owns the text buffer, per-line stores, decorations, character
//! classification, case folding, the lexer handle, and the watcher list.
//! Every text change flows through the two gateway methods
//! [`Document::insert_string`] and [`Document::delete_chars`] (undo and redo
//! replay recorded actions through the same event discipline), so watchers
//! observe a single, strictly ordered stream of modification events:
//!
//! ```text
//! ModifyAttempt? -> InsertCheck? -> BeforeInsert|BeforeDelete
//!   -> buffer apply -> per-line fan-out -> SavePoint?
//!   -> InsertText|DeleteText -> GroupCompleted?
//! ```
//!
//! The document is single-threaded by contract; integer guards reject
//! reentrant modification and styling rather than locking.

use std::rc::Rc;

use tracing::debug;

use crate::casefold::{CaseFolder, CaseFolderUnicode};
use crate::charclass::{CharClassify, CharacterClass, classify_unicode, is_space_or_tab};
use crate::decorations::DecorationList;
use crate::encoding::{CP_UTF8, DbcsClassifier, EncodingFamily, SafeChars, family_of};
use crate::line_ending::EndOfLine;
use crate::perline::{
    FoldLevel, LineAnnotations, LineLevels, LineMarkers, LineStates, MarkerMask, PerLineStore,
};
use crate::regex_search::RegexBackend;
use crate::storage::{AppliedEdit, StorageError, TextBuffer};
use crate::styling::{ActionDuration, LexerHandle};
use crate::undo::ActionKind;
use crate::watchers::{
    DocumentStatus, DocumentWatcher, ModificationEvent, ModificationFlags, WatcherEntry,
};
use crate::{Line, Position};

/// Capabilities chosen at document creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Do not allocate the style plane.
    pub styles_none: bool,
    /// Size internal structures for very large texts.
    pub text_large: bool,
}

/// Which additional Unicode line ends are recognised.
///
/// The core line parser always handles CR, LF, and CRLF; `Unicode` is a
/// declaration for lexers that also emit NEL/LS/PS line ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEndTypes {
    /// CR, LF, and CRLF only.
    #[default]
    Default,
    /// Unicode line ends are allowed as well.
    Unicode,
}

/// A text document: byte buffer, line structure, undo, styling, and events.
pub struct Document {
    pub(crate) buffer: TextBuffer,
    pub(crate) dbcs_codepage: i32,
    pub(crate) dbcs: Option<DbcsClassifier>,
    pub(crate) safe_chars: SafeChars,
    line_end_types: LineEndTypes,
    eol_mode: EndOfLine,
    pub(crate) tab_in_chars: Position,
    use_tabs: bool,
    indent_in_chars: Position,
    pub(crate) char_class: CharClassify,
    pub(crate) case_folder: Box<dyn CaseFolder>,
    pub(crate) regex: Option<RegexBackend>,
    pub(crate) lexer: Option<LexerHandle>,
    watchers: Vec<WatcherEntry>,
    markers: LineMarkers,
    levels: LineLevels,
    states: LineStates,
    margins: LineAnnotations,
    annotations: LineAnnotations,
    eol_annotations: LineAnnotations,
    decorations: DecorationList,
    pub(crate) end_styled: Position,
    pub(crate) style_clock: i32,
    pub(crate) entered_modification: i32,
    entered_read_only: i32,
    pub(crate) entered_styling: i32,
    insertion: Vec<u8>,
    insertion_set: bool,
    delay_save_point: Option<bool>,
    pub(crate) duration_style_one_unit: ActionDuration,
}

impl Document {
    /// Create an empty document with the given capabilities.
    pub fn new(options: DocumentOptions) -> Self {
        Self {
            buffer: TextBuffer::new(!options.styles_none, options.text_large),
            dbcs_codepage: 0,
            dbcs: None,
            safe_chars: SafeChars::for_codepage(0),
            line_end_types: LineEndTypes::Default,
            eol_mode: EndOfLine::Lf,
            tab_in_chars: 8,
            use_tabs: true,
            indent_in_chars: 0,
            char_class: CharClassify::new(),
            case_folder: Box::new(CaseFolderUnicode::new()),
            regex: None,
            lexer: None,
            watchers: Vec::new(),
            markers: LineMarkers::default(),
            levels: LineLevels::default(),
            states: LineStates::default(),
            margins: LineAnnotations::default(),
            annotations: LineAnnotations::default(),
            eol_annotations: LineAnnotations::default(),
            decorations: DecorationList::new(),
            end_styled: 0,
            style_clock: 0,
            entered_modification: 0,
            entered_read_only: 0,
            entered_styling: 0,
            insertion: Vec::new(),
            insertion_set: false,
            delay_save_point: None,
            duration_style_one_unit: ActionDuration::new(),
        }
    }

    /// The capabilities the document was created with.
    pub fn options(&self) -> DocumentOptions {
        DocumentOptions {
            styles_none: !self.buffer.has_styles(),
            text_large: self.buffer.is_large(),
        }
    }

    /// Whether internal structures are sized for very large texts.
    pub fn is_large(&self) -> bool {
        self.buffer.is_large()
    }

    /// Reinitialise every per-line store.
    pub fn init(&mut self) {
        for store in self.per_line_stores() {
            store.init();
        }
    }

    /// Whether any per-line store holds data.
    pub fn is_active(&self) -> bool {
        self.markers.is_active()
            || self.levels.is_active()
            || self.states.is_active()
            || self.margins.is_active()
            || self.annotations.is_active()
            || self.eol_annotations.is_active()
    }

    fn per_line_stores(&mut self) -> [&mut dyn PerLineStore; 6] {
        [
            &mut self.markers,
            &mut self.levels,
            &mut self.states,
            &mut self.margins,
            &mut self.annotations,
            &mut self.eol_annotations,
        ]
    }

    fn insert_lines_fanout(&mut self, line: Line, count: Line) {
        for store in self.per_line_stores() {
            store.insert_lines(line, count);
        }
    }

    fn remove_lines_fanout(&mut self, line: Line, count: Line) {
        for store in self.per_line_stores() {
            for _ in 0..count {
                store.remove_line(line);
            }
        }
    }

    fn fan_out_line_changes(&mut self, edit: &AppliedEdit) {
        if edit.lines_added > 0 {
            self.insert_lines_fanout(edit.line + 1, edit.lines_added);
        } else if edit.lines_added < 0 {
            self.remove_lines_fanout(edit.line + 1, -edit.lines_added);
        }
    }

    // ---- basic queries ----

    /// Length of the document in bytes.
    pub fn length(&self) -> Position {
        self.buffer.length()
    }

    /// Number of lines; an empty document has one.
    pub fn lines_total(&self) -> Line {
        self.buffer.line_count()
    }

    /// Byte at `pos`, or 0 out of range.
    #[inline]
    pub fn char_at(&self, pos: Position) -> u8 {
        self.buffer.char_at(pos)
    }

    /// Style byte at `pos`, or 0.
    pub fn style_at(&self, pos: Position) -> u8 {
        self.buffer.style_at(pos)
    }

    /// Style byte at `pos` as an index.
    pub fn style_index_at(&self, pos: Position) -> i32 {
        self.buffer.style_at(pos) as i32
    }

    /// Copy the bytes in `[start, start+len)` into a vector.
    pub fn text_range(&self, start: Position, len: Position) -> Vec<u8> {
        let mut out = Vec::new();
        self.buffer.copy_range(start, len, &mut out);
        out
    }

    /// Byte position where `line` starts.
    pub fn line_start(&self, line: Line) -> Position {
        self.buffer.line_start(line)
    }

    /// Byte position of the end of `line`, before its end-of-line bytes.
    pub fn line_end(&self, line: Line) -> Position {
        self.buffer.line_end(line)
    }

    /// Line containing `pos`.
    pub fn line_from_position(&self, pos: Position) -> Line {
        self.buffer.line_from_position(pos)
    }

    /// Start of the line containing `pos`.
    pub fn line_start_position(&self, pos: Position) -> Position {
        self.buffer.line_start(self.buffer.line_from_position(pos))
    }

    /// End of the line containing `pos`.
    pub fn line_end_position(&self, pos: Position) -> Position {
        self.buffer.line_end(self.buffer.line_from_position(pos))
    }

    /// Whether `pos` is the first position of its line.
    pub fn is_line_start_position(&self, pos: Position) -> bool {
        self.line_start_position(pos) == pos
    }

    /// Whether `pos` is the end-of-content position of its line.
    pub fn is_line_end_position(&self, pos: Position) -> bool {
        self.line_end_position(pos) == pos
    }

    /// Whether `pos` sits at or inside the end-of-line bytes of its line.
    pub fn is_position_in_line_end(&self, pos: Position) -> bool {
        pos >= self.line_end_position(pos)
    }

    /// Clamp a position into `[0, length]`.
    pub fn clamp_position_into_document(&self, pos: Position) -> Position {
        pos.clamp(0, self.length())
    }

    // ---- encoding configuration ----

    /// The configured codepage (0 for plain 8-bit, `CP_UTF8`, or a DBCS
    /// codepage).
    pub fn code_page(&self) -> i32 {
        self.dbcs_codepage
    }

    /// The encoding family of the configured codepage.
    pub fn code_page_family(&self) -> EncodingFamily {
        if self.dbcs_codepage == 0 {
            EncodingFamily::EightBit
        } else {
            family_of(self.dbcs_codepage)
        }
    }

    /// Configure the codepage. Returns true when it changed; the whole
    /// document then needs restyling.
    pub fn set_dbcs_code_page(&mut self, codepage: i32) -> bool {
        if self.dbcs_codepage == codepage {
            return false;
        }
        self.dbcs_codepage = codepage;
        self.dbcs = DbcsClassifier::new(codepage);
        self.safe_chars = SafeChars::for_codepage(codepage);
        self.regex = None;
        self.buffer.set_utf8_substance(codepage == CP_UTF8);
        self.modified_at(0);
        true
    }

    /// Whether `byte` starts a two-byte character under the configured DBCS
    /// codepage.
    pub fn is_dbcs_lead_byte(&self, byte: u8) -> bool {
        self.dbcs.is_some_and(|d| d.is_lead_byte(byte))
    }

    pub(crate) fn is_dbcs_trail_byte(&self, byte: u8) -> bool {
        self.dbcs.is_some_and(|d| d.is_trail_byte(byte))
    }

    pub(crate) fn is_dbcs_dual_byte_at(&self, pos: Position) -> bool {
        self.is_dbcs_lead_byte(self.char_at(pos)) && self.is_dbcs_trail_byte(self.char_at(pos + 1))
    }

    /// The Unicode line-end declaration.
    pub fn line_end_types_allowed(&self) -> LineEndTypes {
        self.line_end_types
    }

    /// Declare which line-end repertoire lexers may use. Returns true when
    /// changed; the document then needs restyling.
    pub fn set_line_end_types_allowed(&mut self, types: LineEndTypes) -> bool {
        if self.line_end_types == types {
            return false;
        }
        self.line_end_types = types;
        self.modified_at(0);
        true
    }

    /// Preferred end-of-line mode for new line ends.
    pub fn eol_mode(&self) -> EndOfLine {
        self.eol_mode
    }

    /// Set the preferred end-of-line mode.
    pub fn set_eol_mode(&mut self, mode: EndOfLine) {
        self.eol_mode = mode;
    }

    /// The byte sequence of the preferred end-of-line mode.
    pub fn eol_string(&self) -> &'static [u8] {
        self.eol_mode.as_bytes()
    }

    // ---- tabs and indentation settings ----

    /// Width of a tab stop in characters.
    pub fn tab_in_chars(&self) -> Position {
        self.tab_in_chars
    }

    /// Set the tab stop width (minimum 1).
    pub fn set_tab_in_chars(&mut self, tab: Position) {
        self.tab_in_chars = tab.max(1);
    }

    /// Whether indentation edits write tabs.
    pub fn use_tabs(&self) -> bool {
        self.use_tabs
    }

    /// Set whether indentation edits write tabs.
    pub fn set_use_tabs(&mut self, use_tabs: bool) {
        self.use_tabs = use_tabs;
    }

    /// Indent unit in characters; 0 means "one tab".
    pub fn indent_in_chars(&self) -> Position {
        self.indent_in_chars
    }

    /// Set the indent unit.
    pub fn set_indent_in_chars(&mut self, indent: Position) {
        self.indent_in_chars = indent.max(0);
    }

    /// The effective indent width.
    pub fn indent_size(&self) -> Position {
        if self.indent_in_chars != 0 {
            self.indent_in_chars
        } else {
            self.tab_in_chars
        }
    }

    // ---- character classes and case folding ----

    /// Reset the byte class table to defaults.
    pub fn set_default_char_classes(&mut self, include_word_class: bool) {
        self.char_class.set_default_char_classes(include_word_class);
    }

    /// Assign a class to a set of byte values.
    pub fn set_char_classes(&mut self, bytes: &[u8], class: CharacterClass) {
        self.char_class.set_char_classes(bytes, class);
    }

    /// Collect the bytes of one class; returns the count.
    pub fn get_chars_of_class(&self, class: CharacterClass, out: &mut Vec<u8>) -> usize {
        self.char_class.get_chars_of_class(class, out)
    }

    /// Classify a character scalar for word-boundary purposes.
    pub fn word_character_class(&self, character: u32) -> CharacterClass {
        if self.dbcs_codepage != 0 && character >= 0x80 {
            if self.dbcs_codepage == CP_UTF8 {
                return classify_unicode(character);
            }
            // Dual-byte DBCS characters pack as (lead << 8) | trail and form
            // words without separators.
            if character > 0xFF {
                return CharacterClass::CjkWord;
            }
        }
        self.char_class.get_class(character as u8)
    }

    /// Install a case folder for case-insensitive search.
    pub fn set_case_folder(&mut self, folder: Box<dyn CaseFolder>) {
        self.case_folder = folder;
    }

    // ---- read-only and save point ----

    /// Whether modification is rejected.
    pub fn is_read_only(&self) -> bool {
        self.buffer.is_read_only()
    }

    /// Set the read-only flag.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.buffer.set_read_only(read_only);
    }

    pub(crate) fn check_read_only(&mut self) {
        if self.buffer.is_read_only() && self.entered_read_only == 0 {
            self.entered_read_only += 1;
            self.notify_modify_attempt();
            self.entered_read_only -= 1;
        }
    }

    /// Declare the current state as saved and notify watchers.
    pub fn set_save_point(&mut self) {
        self.buffer.set_save_point();
        self.notify_save_point(true);
    }

    /// Whether the current state matches the save point.
    pub fn is_save_point(&self) -> bool {
        self.buffer.is_save_point()
    }

    /// Arm the save-point delay window: transitions are accumulated and
    /// silenced until [`Document::end_delay_save_point`].
    pub fn begin_delay_save_point(&mut self) {
        self.delay_save_point = Some(self.buffer.is_save_point());
    }

    /// Disarm the delay window, emitting one net transition if the state
    /// differs from when the window was armed.
    pub fn end_delay_save_point(&mut self) {
        let Some(start) = self.delay_save_point.take() else {
            return;
        };
        let end = self.buffer.is_save_point();
        if start != end {
            self.notify_save_point(end);
        }
    }

    // ---- the modification gateway ----

    /// Pull the styled boundary back to a modified position.
    pub(crate) fn modified_at(&mut self, pos: Position) {
        if self.end_styled > pos {
            self.end_styled = pos;
        }
    }

    /// Delete `len` bytes at `pos`.
    ///
    /// Returns false (without error) when the range is invalid, the document
    /// is read-only, or a modification is already in progress.
    pub fn delete_chars(&mut self, pos: Position, len: Position) -> Result<bool, StorageError> {
        if pos < 0 || len <= 0 || pos + len > self.length() {
            return Ok(false);
        }
        self.check_read_only();
        if self.entered_modification != 0 {
            debug!(pos, len, "delete rejected: modification in progress");
            return Ok(false);
        }
        self.entered_modification += 1;
        let result = self.delete_chars_locked(pos, len);
        self.entered_modification -= 1;
        result.map(|()| !self.buffer.is_read_only())
    }

    fn delete_chars_locked(&mut self, pos: Position, len: Position) -> Result<(), StorageError> {
        if self.buffer.is_read_only() {
            return Ok(());
        }
        self.notify_modified(ModificationEvent::new(
            ModificationFlags::BEFORE_DELETE | ModificationFlags::USER,
            pos,
            len,
        ));
        let prev_lines = self.lines_total();
        let start_save_point = self.buffer.is_save_point();
        let edit = self.buffer.delete_chars(pos, len)?;
        self.fan_out_line_changes(&edit);
        if start_save_point && self.buffer.is_collecting_undo() {
            self.notify_save_point(false);
        }
        if pos < self.length() || pos == 0 {
            self.modified_at(pos);
        } else {
            self.modified_at(pos - 1);
        }
        let mut flags = ModificationFlags::DELETE_TEXT | ModificationFlags::USER;
        if edit.start_sequence {
            flags |= ModificationFlags::START_ACTION;
        }
        self.notify_modified(ModificationEvent::with_text(
            flags,
            pos,
            len,
            self.lines_total() - prev_lines,
            Some(edit.text),
        ));
        Ok(())
    }

    /// Insert `bytes` at `position`, returning the number of bytes inserted.
    ///
    /// Watchers receive an `INSERT_CHECK` event first and may substitute the
    /// payload through [`Document::change_insertion`]. Returns 0 (without
    /// error) when read-only or reentered.
    pub fn insert_string(
        &mut self,
        position: Position,
        bytes: &[u8],
    ) -> Result<Position, StorageError> {
        if bytes.is_empty() {
            return Ok(0);
        }
        if position < 0 || position > self.length() {
            return Ok(0);
        }
        self.check_read_only(); // the host may change the read-only state here
        if self.buffer.is_read_only() {
            return Ok(0);
        }
        if self.entered_modification != 0 {
            debug!(position, "insert rejected: modification in progress");
            return Ok(0);
        }
        self.entered_modification += 1;
        let result = self.insert_string_locked(position, bytes);
        self.entered_modification -= 1;
        result
    }

    fn insert_string_locked(
        &mut self,
        position: Position,
        bytes: &[u8],
    ) -> Result<Position, StorageError> {
        self.insertion_set = false;
        self.insertion.clear();
        self.notify_modified(ModificationEvent::with_text(
            ModificationFlags::INSERT_CHECK,
            position,
            bytes.len() as Position,
            0,
            Some(bytes.to_vec()),
        ));
        let payload = if self.insertion_set {
            std::mem::take(&mut self.insertion)
        } else {
            bytes.to_vec()
        };
        let length = payload.len() as Position;
        self.notify_modified(ModificationEvent::with_text(
            ModificationFlags::BEFORE_INSERT | ModificationFlags::USER,
            position,
            length,
            0,
            Some(payload.clone()),
        ));
        let prev_lines = self.lines_total();
        let start_save_point = self.buffer.is_save_point();
        let edit = self.buffer.insert_string(position, &payload)?;
        self.fan_out_line_changes(&edit);
        if start_save_point && self.buffer.is_collecting_undo() {
            self.notify_save_point(false);
        }
        self.modified_at(position);
        let mut flags = ModificationFlags::INSERT_TEXT | ModificationFlags::USER;
        if edit.start_sequence {
            flags |= ModificationFlags::START_ACTION;
        }
        self.notify_modified(ModificationEvent::with_text(
            flags,
            position,
            length,
            self.lines_total() - prev_lines,
            Some(edit.text),
        ));
        self.insertion_set = false;
        self.insertion = Vec::new();
        Ok(length)
    }

    /// Replace the pending insertion payload. Only honoured while an
    /// `INSERT_CHECK` event is being delivered.
    pub fn change_insertion(&mut self, bytes: &[u8]) {
        self.insertion_set = true;
        self.insertion.clear();
        self.insertion.extend_from_slice(bytes);
    }

    /// Append `data` at the end of the document, translating failures into a
    /// status code and reporting them to watchers.
    pub fn add_data(&mut self, data: &[u8]) -> DocumentStatus {
        let position = self.length();
        match self.insert_string(position, data) {
            Ok(_) => DocumentStatus::Ok,
            Err(StorageError::OutOfMemory) => {
                self.set_error_status(DocumentStatus::BadAlloc);
                DocumentStatus::BadAlloc
            }
        }
    }

    // ---- undo coordination ----

    /// Whether undo is being recorded.
    pub fn is_collecting_undo(&self) -> bool {
        self.buffer.is_collecting_undo()
    }

    /// Turn undo recording on or off.
    pub fn set_undo_collection(&mut self, collect: bool) {
        self.buffer.set_undo_collection(collect);
    }

    /// Discard the undo history.
    pub fn delete_undo_history(&mut self) {
        self.buffer.delete_undo_history();
    }

    /// True when a group can be undone.
    pub fn can_undo(&self) -> bool {
        self.buffer.can_undo()
    }

    /// True when a group can be redone.
    pub fn can_redo(&self) -> bool {
        self.buffer.can_redo()
    }

    /// Open an undo group; groups nest.
    pub fn begin_undo_action(&mut self) {
        self.buffer.begin_undo_action();
    }

    /// Close an undo group. When the nesting depth returns to zero, watchers
    /// are told the group completed.
    pub fn end_undo_action(&mut self) {
        self.buffer.end_undo_action();
        if self.buffer.undo_sequence_depth() == 0 {
            self.notify_group_completed();
        }
    }

    /// Current undo group nesting depth.
    pub fn undo_sequence_depth(&self) -> i32 {
        self.buffer.undo_sequence_depth()
    }

    /// Undo the current group, returning a position for the caret, or -1.
    pub fn undo(&mut self) -> Result<Position, StorageError> {
        self.perform_undo_redo(UndoRedo::Undo)
    }

    /// Redo the next group, returning a position for the caret, or -1.
    pub fn redo(&mut self) -> Result<Position, StorageError> {
        self.perform_undo_redo(UndoRedo::Redo)
    }

    fn perform_undo_redo(&mut self, direction: UndoRedo) -> Result<Position, StorageError> {
        let mut new_pos: Position = -1;
        self.check_read_only();
        if self.entered_modification != 0 || !self.buffer.is_collecting_undo() {
            return Ok(new_pos);
        }
        self.entered_modification += 1;
        let result = if self.buffer.is_read_only() {
            Ok(-1)
        } else {
            let steps = match direction {
                UndoRedo::Undo => self.buffer.start_undo(),
                UndoRedo::Redo => self.buffer.start_redo(),
            };
            self.run_undo_redo_steps(direction, steps, &mut new_pos)
                .map(|()| new_pos)
        };
        self.entered_modification -= 1;
        result
    }

    fn run_undo_redo_steps(
        &mut self,
        direction: UndoRedo,
        steps: usize,
        new_pos: &mut Position,
    ) -> Result<(), StorageError> {
        let start_save_point = self.buffer.is_save_point();
        let mut multi_line = false;
        // Contiguous deletions undone in sequence coalesce so the caret can
        // be placed at the end of the restored range.
        let mut coalesced_remove: Option<(Position, Position)> = None;
        for step in 0..steps {
            let prev_lines = self.lines_total();
            let action = match direction {
                UndoRedo::Undo => self.buffer.undo_step(),
                UndoRedo::Redo => self.buffer.redo_step(),
            };
            let direction_flag = match direction {
                UndoRedo::Undo => ModificationFlags::UNDO,
                UndoRedo::Redo => ModificationFlags::REDO,
            };
            // The "before" notification names the change about to happen:
            // undoing an insert deletes, undoing a remove inserts.
            let before_flags = match (direction, action.kind) {
                (_, ActionKind::Container) => ModificationFlags::CONTAINER,
                (UndoRedo::Undo, ActionKind::Remove)
                | (UndoRedo::Redo, ActionKind::Insert) => ModificationFlags::BEFORE_INSERT,
                _ => ModificationFlags::BEFORE_DELETE,
            };
            if action.kind == ActionKind::Container {
                let mut event = ModificationEvent::new(
                    ModificationFlags::CONTAINER | direction_flag,
                    action.position,
                    0,
                );
                event.token = action.position;
                self.notify_modified(event);
            } else {
                self.notify_modified(ModificationEvent::with_text(
                    before_flags | direction_flag,
                    action.position,
                    action.len_data(),
                    0,
                    Some(action.text.clone()),
                ));
            }
            let edit = match direction {
                UndoRedo::Undo => self.buffer.perform_undo_step()?,
                UndoRedo::Redo => self.buffer.perform_redo_step()?,
            };
            if action.kind != ActionKind::Container {
                self.fan_out_line_changes(&edit);
                self.modified_at(action.position);
                *new_pos = action.position;
            }

            let mut flags = direction_flag;
            match (direction, action.kind) {
                (UndoRedo::Undo, ActionKind::Remove) => {
                    *new_pos += action.len_data();
                    flags |= ModificationFlags::INSERT_TEXT;
                    match coalesced_remove {
                        Some((start, end)) if start <= action.position && action.position <= end => {
                            coalesced_remove = Some((start, end + action.len_data()));
                            *new_pos = end + action.len_data();
                        }
                        _ => {
                            coalesced_remove =
                                Some((action.position, action.position + action.len_data()));
                        }
                    }
                }
                (UndoRedo::Undo, ActionKind::Insert) => {
                    flags |= ModificationFlags::DELETE_TEXT;
                    coalesced_remove = None;
                }
                (UndoRedo::Redo, ActionKind::Insert) => {
                    *new_pos += action.len_data();
                    flags |= ModificationFlags::INSERT_TEXT;
                }
                (UndoRedo::Redo, ActionKind::Remove) => {
                    flags |= ModificationFlags::DELETE_TEXT;
                }
                (_, ActionKind::Container) => {}
            }
            if steps > 1 {
                flags |= ModificationFlags::MULTI_STEP_UNDO_REDO;
            }
            let lines_added = self.lines_total() - prev_lines;
            if lines_added != 0 {
                multi_line = true;
            }
            if step == steps - 1 {
                flags |= ModificationFlags::LAST_STEP_IN_UNDO_REDO;
                if multi_line {
                    flags |= ModificationFlags::MULTILINE_UNDO_REDO;
                }
            }
            self.notify_modified(ModificationEvent::with_text(
                flags,
                action.position,
                action.len_data(),
                lines_added,
                Some(action.text),
            ));
        }
        let end_save_point = self.buffer.is_save_point();
        if start_save_point != end_save_point {
            self.notify_save_point(end_save_point);
        }
        Ok(())
    }

    /// Open a tentative span: subsequent actions can be rolled back as one
    /// unit with [`Document::tentative_undo`].
    pub fn tentative_start(&mut self) {
        self.buffer.history_mut().tentative_start();
    }

    /// Commit the tentative span, making its actions ordinary history.
    pub fn tentative_commit(&mut self) {
        self.buffer.history_mut().tentative_commit();
    }

    /// Whether a tentative span is open.
    pub fn tentative_active(&self) -> bool {
        self.buffer.history().tentative_active()
    }

    /// Roll back every action of the tentative span and close it.
    pub fn tentative_undo(&mut self) -> Result<(), StorageError> {
        if !self.tentative_active() {
            return Ok(());
        }
        self.check_read_only();
        if self.entered_modification != 0 {
            return Ok(());
        }
        self.entered_modification += 1;
        let result = if self.buffer.is_read_only() {
            Ok(())
        } else {
            let steps = self.buffer.history().tentative_steps();
            let mut new_pos = -1;
            let outcome = self.run_undo_redo_steps(UndoRedo::Undo, steps, &mut new_pos);
            if outcome.is_ok() {
                self.buffer.history_mut().tentative_commit();
            }
            outcome
        };
        self.entered_modification -= 1;
        result
    }

    /// Record a container action carrying `token` for the host.
    pub fn add_undo_action(&mut self, token: Position) {
        if self.buffer.is_collecting_undo() {
            self.buffer.history_mut().push_container_action(token);
        }
    }

    /// Replace the text of the most recent recorded action.
    pub fn change_last_undo_action_text(&mut self, text: &[u8]) {
        self.buffer.history_mut().change_last_action_text(text);
    }

    // Inspection of the raw action log.

    /// Number of recorded undo actions.
    pub fn undo_actions(&self) -> usize {
        self.buffer.history().actions_len()
    }

    /// The current index into the action log.
    pub fn undo_current(&self) -> usize {
        self.buffer.history().current()
    }

    /// Kind of the action at `index`.
    pub fn undo_action_kind(&self, index: usize) -> Option<ActionKind> {
        self.buffer.history().action_kind(index)
    }

    /// Position (or container token) of the action at `index`.
    pub fn undo_action_position(&self, index: usize) -> Option<Position> {
        self.buffer.history().action_position(index)
    }

    /// Text of the action at `index`.
    pub fn undo_action_text(&self, index: usize) -> Option<&[u8]> {
        self.buffer.history().action_text(index)
    }

    /// Index of the save-point marker, or -1.
    pub fn undo_save_point(&self) -> i64 {
        self.buffer.history().save_point_index()
    }

    /// Move the save-point marker.
    pub fn set_undo_save_point(&mut self, index: i64) {
        self.buffer.history_mut().set_save_point_index(index);
    }

    /// Index of the detach marker, or -1.
    pub fn undo_detach(&self) -> i64 {
        self.buffer.history().detach_index()
    }

    /// Move the detach marker.
    pub fn set_undo_detach(&mut self, index: i64) {
        self.buffer.history_mut().set_detach_index(index);
    }

    /// Index of the tentative marker, or -1.
    pub fn undo_tentative(&self) -> i64 {
        self.buffer.history().tentative_index()
    }

    /// Move the tentative marker.
    pub fn set_undo_tentative(&mut self, index: i64) {
        self.buffer.history_mut().set_tentative_index(index);
    }

    /// Seek the current index to `target` by replaying actions one at a time
    /// through the ordinary event stream.
    pub fn set_undo_current(&mut self, target: usize) -> Result<(), StorageError> {
        let target = target.min(self.undo_actions());
        loop {
            let current = self.undo_current();
            if current == target {
                return Ok(());
            }
            let direction = if current > target {
                UndoRedo::Undo
            } else {
                UndoRedo::Redo
            };
            self.replay_single_step(direction)?;
            if self.undo_current() == current {
                // Read-only or reentered: no progress is possible.
                return Ok(());
            }
        }
    }

    fn replay_single_step(&mut self, direction: UndoRedo) -> Result<(), StorageError> {
        self.check_read_only();
        if self.entered_modification != 0 || self.buffer.is_read_only() {
            return Ok(());
        }
        self.entered_modification += 1;
        let mut new_pos = -1;
        let result = self.run_undo_redo_steps(direction, 1, &mut new_pos);
        self.entered_modification -= 1;
        result
    }

    // ---- per-line API ----

    /// Markers on `line` as a bit mask.
    pub fn get_mark(&self, line: Line) -> MarkerMask {
        self.markers.mark_value(line)
    }

    /// First line at or after `line_start` carrying a marker in `mask`.
    pub fn marker_next(&self, line_start: Line, mask: MarkerMask) -> Line {
        self.markers.marker_next(line_start, mask)
    }

    /// Add marker `marker_num` to `line`, returning its handle or -1.
    pub fn add_mark(&mut self, line: Line, marker_num: i32) -> i32 {
        let lines = self.lines_total();
        if line < 0 || line >= lines {
            return -1;
        }
        let handle = self.markers.add_mark(line, marker_num, lines);
        let event = ModificationEvent::on_line(
            ModificationFlags::CHANGE_MARKER,
            self.line_start(line),
            line,
        );
        self.notify_modified(event);
        handle
    }

    /// Add every marker in `value_set` to `line`.
    pub fn add_mark_set(&mut self, line: Line, value_set: MarkerMask) {
        let lines = self.lines_total();
        if line < 0 || line >= lines {
            return;
        }
        let mut mask = value_set;
        let mut number = 0;
        while mask != 0 {
            if mask & 1 != 0 {
                self.markers.add_mark(line, number, lines);
            }
            number += 1;
            mask >>= 1;
        }
        let event = ModificationEvent::on_line(
            ModificationFlags::CHANGE_MARKER,
            self.line_start(line),
            line,
        );
        self.notify_modified(event);
    }

    /// Delete the first marker numbered `marker_num` from `line`.
    pub fn delete_mark(&mut self, line: Line, marker_num: i32) {
        self.markers.delete_mark(line, marker_num, false);
        let event = ModificationEvent::on_line(
            ModificationFlags::CHANGE_MARKER,
            self.line_start(line),
            line,
        );
        self.notify_modified(event);
    }

    /// Delete marker `marker_num` from every line (-1 for all markers).
    pub fn delete_all_marks(&mut self, marker_num: i32) {
        let mut some_changes = false;
        for line in 0..self.lines_total() {
            if self.markers.delete_mark(line, marker_num, true) {
                some_changes = true;
            }
        }
        if some_changes {
            let mut event = ModificationEvent::new(ModificationFlags::CHANGE_MARKER, 0, 0);
            event.line = -1;
            self.notify_modified(event);
        }
    }

    /// Delete the marker with `handle` wherever it is.
    pub fn delete_mark_from_handle(&mut self, handle: i32) {
        self.markers.delete_mark_from_handle(handle);
        let mut event = ModificationEvent::new(ModificationFlags::CHANGE_MARKER, 0, 0);
        event.line = -1;
        self.notify_modified(event);
    }

    /// Line currently holding the marker with `handle`, or -1.
    pub fn line_from_handle(&self, handle: i32) -> Line {
        self.markers.line_from_handle(handle)
    }

    /// Set the fold level of `line`, returning the previous level.
    pub fn set_level(&mut self, line: Line, level: i32) -> i32 {
        let prev = self.levels.set_level(line, level, self.lines_total());
        if prev != level {
            let mut event = ModificationEvent::on_line(
                ModificationFlags::CHANGE_FOLD | ModificationFlags::CHANGE_MARKER,
                self.line_start(line),
                line,
            );
            event.fold_level_now = FoldLevel(level);
            event.fold_level_prev = FoldLevel(prev);
            self.notify_modified(event);
        }
        prev
    }

    /// Fold level of `line` as raw bits.
    pub fn get_level(&self, line: Line) -> i32 {
        self.levels.get_level(line)
    }

    /// Fold level of `line`.
    pub fn get_fold_level(&self, line: Line) -> FoldLevel {
        FoldLevel(self.levels.get_level(line))
    }

    /// Drop all fold levels.
    pub fn clear_levels(&mut self) {
        self.levels.clear_levels();
    }

    /// The closest fold parent of `line`, or -1.
    pub fn get_fold_parent(&self, line: Line) -> Line {
        self.levels.get_fold_parent(line)
    }

    /// Last line subordinate to the header at `line_parent`.
    ///
    /// `level` overrides the parent's level; `last_line` bounds the search.
    /// Styling is advanced as needed so fold levels are meaningful.
    pub fn get_last_child(
        &mut self,
        line_parent: Line,
        level: Option<FoldLevel>,
        last_line: Option<Line>,
    ) -> Line {
        let level_start = level.unwrap_or_else(|| self.get_fold_level(line_parent)).number();
        let max_line = self.lines_total() - 1;
        let last_line = match last_line {
            Some(l) if l >= 0 && l <= max_line => l,
            _ => max_line,
        };
        let mut line_end_styled = self.line_from_position(self.end_styled) - 1;
        let mut line_max_subord = line_parent;
        while line_max_subord < max_line {
            if line_max_subord >= line_end_styled {
                // Two or more lines are required to make a stable fold for
                // most lexers.
                let styled_to = self.line_start(line_max_subord + 3);
                self.ensure_styled_to(styled_to);
                line_end_styled = self.line_from_position(self.end_styled) - 1;
            }
            let level_try = self.get_fold_level(line_max_subord + 1);
            if !is_subordinate(level_start, level_try) {
                break;
            }
            if line_max_subord >= last_line && !self.get_fold_level(line_max_subord).is_white() {
                break;
            }
            line_max_subord += 1;
        }
        if line_max_subord > line_parent
            && level_start > self.get_fold_level(line_max_subord + 1).number()
            && self.get_fold_level(line_max_subord).is_white()
        {
            // Chewed up whitespace that belongs to a parent, so back off.
            line_max_subord -= 1;
        }
        line_max_subord
    }

    /// Set the lexer state of `line`, returning the previous state.
    pub fn set_line_state(&mut self, line: Line, state: i32) -> i32 {
        let prev = self.states.set_line_state(line, state, self.lines_total());
        if state != prev {
            let event = ModificationEvent::on_line(
                ModificationFlags::CHANGE_LINE_STATE,
                self.line_start(line),
                line,
            );
            self.notify_modified(event);
        }
        prev
    }

    /// Lexer state of `line`.
    pub fn get_line_state(&self, line: Line) -> i32 {
        self.states.get_line_state(line)
    }

    /// Report a lexer state change over `[start, end)` to watchers.
    pub fn change_lexer_state(&mut self, start: Position, end: Position) {
        let event = ModificationEvent::new(ModificationFlags::LEXER_STATE, start, end - start);
        self.notify_modified(event);
    }

    /// Set or clear the margin text of `line`.
    pub fn margin_set_text(&mut self, line: Line, text: Option<&str>) {
        let lines = self.lines_total();
        self.margins.set_text(line, text, lines);
        let event = ModificationEvent::on_line(
            ModificationFlags::CHANGE_MARGIN,
            self.line_start(line),
            line,
        );
        self.notify_modified(event);
    }

    /// Margin text of `line`.
    pub fn margin_text(&self, line: Line) -> Option<&str> {
        self.margins.text(line)
    }

    /// Set the margin text style of `line`.
    pub fn margin_set_style(&mut self, line: Line, style: i32) {
        self.margins.set_style(line, style);
        let event = ModificationEvent::on_line(
            ModificationFlags::CHANGE_MARGIN,
            self.line_start(line),
            line,
        );
        self.notify_modified(event);
    }

    /// Clear every margin text.
    pub fn margin_clear_all(&mut self) {
        for line in 0..self.lines_total() {
            self.margin_set_text(line, None);
        }
        self.margins.clear_all();
    }

    /// Set or clear the annotation of `line`.
    pub fn annotation_set_text(&mut self, line: Line, text: Option<&str>) {
        let lines = self.lines_total();
        if line < 0 || line >= lines {
            return;
        }
        let lines_before = self.annotations.lines(line);
        self.annotations.set_text(line, text, lines);
        let lines_after = self.annotations.lines(line);
        let mut event = ModificationEvent::on_line(
            ModificationFlags::CHANGE_ANNOTATION,
            self.line_start(line),
            line,
        );
        event.annotation_lines_added = lines_after - lines_before;
        self.notify_modified(event);
    }

    /// Annotation text of `line`.
    pub fn annotation_text(&self, line: Line) -> Option<&str> {
        self.annotations.text(line)
    }

    /// Set the annotation style of `line`.
    pub fn annotation_set_style(&mut self, line: Line, style: i32) {
        if line < 0 || line >= self.lines_total() {
            return;
        }
        self.annotations.set_style(line, style);
        let event = ModificationEvent::on_line(
            ModificationFlags::CHANGE_ANNOTATION,
            self.line_start(line),
            line,
        );
        self.notify_modified(event);
    }

    /// Display lines occupied by the annotation on `line`.
    pub fn annotation_lines(&self, line: Line) -> i32 {
        self.annotations.lines(line)
    }

    /// Clear every annotation.
    pub fn annotation_clear_all(&mut self) {
        if self.annotations.empty() {
            return;
        }
        for line in 0..self.lines_total() {
            self.annotation_set_text(line, None);
        }
        self.annotations.clear_all();
    }

    /// Set or clear the end-of-line annotation of `line`.
    pub fn eol_annotation_set_text(&mut self, line: Line, text: Option<&str>) {
        let lines = self.lines_total();
        if line < 0 || line >= lines {
            return;
        }
        self.eol_annotations.set_text(line, text, lines);
        let event = ModificationEvent::on_line(
            ModificationFlags::CHANGE_EOL_ANNOTATION,
            self.line_start(line),
            line,
        );
        self.notify_modified(event);
    }

    /// End-of-line annotation text of `line`.
    pub fn eol_annotation_text(&self, line: Line) -> Option<&str> {
        self.eol_annotations.text(line)
    }

    /// Clear every end-of-line annotation.
    pub fn eol_annotation_clear_all(&mut self) {
        if self.eol_annotations.empty() {
            return;
        }
        for line in 0..self.lines_total() {
            self.eol_annotation_set_text(line, None);
        }
        self.eol_annotations.clear_all();
    }

    // ---- decorations ----

    /// Select the indicator subsequent fills apply to.
    pub fn decoration_set_current_indicator(&mut self, indicator: i32) {
        self.decorations.set_current_indicator(indicator);
    }

    /// Fill a decoration range on the current indicator, notifying watchers
    /// when the visible state changed.
    pub fn decoration_fill_range(&mut self, position: Position, value: i32, fill_length: Position) {
        let fr = self.decorations.fill_range(position, value, fill_length);
        if fr.changed {
            let event = ModificationEvent::new(
                ModificationFlags::CHANGE_INDICATOR | ModificationFlags::USER,
                fr.position,
                fr.fill_length,
            );
            self.notify_modified(event);
        }
    }

    /// Value of `indicator` at `pos`.
    pub fn decoration_value_at(&self, indicator: i32, pos: Position) -> i32 {
        self.decorations.value_at(indicator, pos)
    }

    // ---- line-end conversion ----

    /// Convert every line end in the document to `mode`, as one undo group.
    pub fn convert_line_ends(&mut self, mode: EndOfLine) -> Result<(), StorageError> {
        self.begin_undo_action();
        let result = self.convert_line_ends_inner(mode);
        self.end_undo_action();
        result
    }

    fn convert_line_ends_inner(&mut self, mode: EndOfLine) -> Result<(), StorageError> {
        let mut pos = 0;
        while pos < self.length() {
            let ch = self.char_at(pos);
            if ch == b'\r' {
                if self.char_at(pos + 1) == b'\n' {
                    match mode {
                        EndOfLine::Cr => {
                            self.delete_chars(pos + 1, 1)?; // delete the LF
                        }
                        EndOfLine::Lf => {
                            self.delete_chars(pos, 1)?; // delete the CR
                        }
                        EndOfLine::CrLf => {
                            pos += 1;
                        }
                    }
                } else {
                    match mode {
                        EndOfLine::CrLf => {
                            pos += self.insert_string(pos + 1, b"\n")?;
                        }
                        EndOfLine::Lf => {
                            pos += self.insert_string(pos, b"\n")?;
                            self.delete_chars(pos, 1)?;
                            pos -= 1;
                        }
                        EndOfLine::Cr => {}
                    }
                }
            } else if ch == b'\n' {
                match mode {
                    EndOfLine::CrLf => {
                        pos += self.insert_string(pos, b"\r")?;
                    }
                    EndOfLine::Cr => {
                        pos += self.insert_string(pos, b"\r")?;
                        self.delete_chars(pos, 1)?;
                        pos -= 1;
                    }
                    EndOfLine::Lf => {}
                }
            }
            pos += 1;
        }
        Ok(())
    }

    // ---- watchers ----

    /// Subscribe a watcher with its user data. Returns false when the same
    /// (watcher, user data) pair is already subscribed.
    pub fn add_watcher(&mut self, watcher: Rc<dyn DocumentWatcher>, user_data: usize) -> bool {
        if self
            .watchers
            .iter()
            .any(|entry| entry.matches(&watcher, user_data))
        {
            return false;
        }
        self.watchers.push(WatcherEntry { watcher, user_data });
        true
    }

    /// Unsubscribe a watcher. Returns false when it was not subscribed.
    pub fn remove_watcher(&mut self, watcher: &Rc<dyn DocumentWatcher>, user_data: usize) -> bool {
        let before = self.watchers.len();
        self.watchers.retain(|entry| !entry.matches(watcher, user_data));
        self.watchers.len() != before
    }

    pub(crate) fn watcher_entries(&self) -> Vec<WatcherEntry> {
        self.watchers.clone()
    }

    pub(crate) fn notify_modify_attempt(&mut self) {
        for entry in self.watcher_entries() {
            entry.watcher.notify_modify_attempt(self, entry.user_data);
        }
    }

    pub(crate) fn notify_save_point(&mut self, at_save_point: bool) {
        if self.delay_save_point.is_some() {
            return;
        }
        for entry in self.watcher_entries() {
            entry
                .watcher
                .notify_save_point(self, entry.user_data, at_save_point);
        }
    }

    pub(crate) fn notify_group_completed(&mut self) {
        for entry in self.watcher_entries() {
            entry.watcher.notify_group_completed(self, entry.user_data);
        }
    }

    /// Report an error status to every watcher.
    pub fn set_error_status(&mut self, status: DocumentStatus) {
        for entry in self.watcher_entries() {
            entry.watcher.notify_error(self, entry.user_data, status);
        }
    }

    pub(crate) fn notify_modified(&mut self, event: ModificationEvent) {
        if event.flags.contains(ModificationFlags::INSERT_TEXT) {
            self.decorations.insert_space(event.position, event.length);
        } else if event.flags.contains(ModificationFlags::DELETE_TEXT) {
            self.decorations.delete_range(event.position, event.length);
        }
        for entry in self.watcher_entries() {
            entry.watcher.notify_modified(self, &event, entry.user_data);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum UndoRedo {
    Undo,
    Redo,
}

fn is_subordinate(level_start_number: i32, level_try: FoldLevel) -> bool {
    level_try.is_white() || level_start_number < level_try.number()
}

impl Drop for Document {
    fn drop(&mut self) {
        let watchers = std::mem::take(&mut self.watchers);
        for entry in watchers {
            entry.watcher.notify_deleted(self, entry.user_data);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DocumentOptions::default())
    }
}

// Indentation editing sits on top of the gateway.
impl Document {
    /// Indentation of `line` in columns, with tabs expanded.
    pub fn get_line_indentation(&self, line: Line) -> Position {
        let mut indent = 0;
        if line < 0 || line >= self.lines_total() {
            return 0;
        }
        let line_start = self.line_start(line);
        for i in line_start..self.length() {
            match self.char_at(i) {
                b' ' => indent += 1,
                b'\t' => indent = next_tab(indent, self.tab_in_chars),
                _ => return indent,
            }
        }
        indent
    }

    /// Position of the first non-indentation character of `line`.
    pub fn get_line_indent_position(&self, line: Line) -> Position {
        if line < 0 {
            return 0;
        }
        let mut pos = self.line_start(line);
        let length = self.length();
        while pos < length && is_space_or_tab(self.char_at(pos)) {
            pos += 1;
        }
        pos
    }

    /// Rewrite the indentation of `line` to `indent` columns, honouring the
    /// tab settings. Returns the position after the new indentation.
    pub fn set_line_indentation(
        &mut self,
        line: Line,
        indent: Position,
    ) -> Result<Position, StorageError> {
        let indent_of_line = self.get_line_indentation(line);
        let indent = indent.max(0);
        if indent == indent_of_line {
            return Ok(self.get_line_indent_position(line));
        }
        let mut linebuf = Vec::new();
        let mut remaining = indent;
        if self.use_tabs {
            let tabs = indent / self.tab_in_chars;
            remaining = indent % self.tab_in_chars;
            linebuf.extend(std::iter::repeat_n(b'\t', tabs as usize));
        }
        linebuf.extend(std::iter::repeat_n(b' ', remaining as usize));
        let this_line_start = self.line_start(line);
        let indent_pos = self.get_line_indent_position(line);
        self.begin_undo_action();
        let result = self
            .delete_chars(this_line_start, indent_pos - this_line_start)
            .and_then(|_| self.insert_string(this_line_start, &linebuf));
        self.end_undo_action();
        result.map(|inserted| this_line_start + inserted)
    }

    /// Indent (or dedent) every line in `line_top..=line_bottom` by one
    /// indent unit.
    pub fn indent(
        &mut self,
        forwards: bool,
        line_bottom: Line,
        line_top: Line,
    ) -> Result<(), StorageError> {
        let mut line = line_bottom;
        while line >= line_top {
            let indent_of_line = self.get_line_indentation(line);
            if forwards {
                if self.line_start(line) < self.line_end(line) {
                    self.set_line_indentation(line, indent_of_line + self.indent_size())?;
                }
            } else {
                self.set_line_indentation(line, indent_of_line - self.indent_size())?;
            }
            line -= 1;
        }
        Ok(())
    }
}

pub(crate) fn next_tab(column: Position, tab_size: Position) -> Position {
    ((column / tab_size) + 1) * tab_size
}

/// True when `index` addresses a valid element of a `length`-sized sequence.
#[inline]
pub(crate) fn is_valid_index(index: Position, length: Position) -> bool {
    index >= 0 && index < length
}
