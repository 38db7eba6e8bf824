//! Position navigation.
//!
//! Byte positions are only meaningful at character boundaries. This module
//! snaps positions outside multi-byte characters (UTF-8 sequences, DBCS
//! pairs, and CR/LF treated as one navigational unit), iterates characters in
//! both directions, decodes characters with their byte widths, counts
//! characters and UTF-16 units, converts between positions and columns, finds
//! word and word-part boundaries, matches braces, and picks safe break points
//! for text segmentation.

use unicode_segmentation::GraphemeCursor;

use crate::charclass::{CharacterClass, is_eol_character, is_space_or_tab};
use crate::document::{Document, is_valid_index, next_tab};
use crate::encoding::{
    CP_UTF8, EncodingFamily, LONGEST_UNICODE_CHARACTER_SEQUENCE_BYTES, UNICODE_REPLACEMENT_CHAR,
    UTF8_MAX_BYTES, unicode_from_utf8, utf8_bytes_of_lead, utf8_classify, utf8_is_ascii,
    utf8_is_trail_byte,
};
use crate::storage::StorageError;
use crate::{INVALID_POSITION, Line, Position};

/// A character decoded from the buffer together with its byte width.
///
/// DBCS dual-byte characters pack as `(lead << 8) | trail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedChar {
    /// The Unicode scalar, packed DBCS pair, or replacement character.
    pub character: u32,
    /// Bytes the character occupies; 0 only for the out-of-bounds sentinel.
    pub width_bytes: u32,
}

impl DecodedChar {
    /// Sentinel for positions outside the document.
    pub const fn empty() -> Self {
        Self {
            character: UNICODE_REPLACEMENT_CHAR,
            width_bytes: 0,
        }
    }

    /// An isolated invalid byte: the replacement character, one byte wide.
    pub const fn bad_byte() -> Self {
        Self {
            character: UNICODE_REPLACEMENT_CHAR,
            width_bytes: 1,
        }
    }

    const fn single(byte: u8) -> Self {
        Self {
            character: byte as u32,
            width_bytes: 1,
        }
    }

    const fn dbcs(lead: u8, trail: u8) -> Self {
        Self {
            character: ((lead as u32) << 8) | trail as u32,
            width_bytes: 2,
        }
    }

    fn from_utf8(bytes: &[u8]) -> Self {
        match utf8_classify(bytes) {
            Some(width) => Self {
                character: unicode_from_utf8(bytes),
                width_bytes: width as u32,
            },
            None => Self::bad_byte(),
        }
    }
}

impl Document {
    /// Whether the byte at `pos` is a CR immediately followed by LF.
    pub fn is_cr_lf(&self, pos: Position) -> bool {
        if !is_valid_index(pos, self.length()) {
            return false;
        }
        self.char_at(pos) == b'\r' && self.char_at(pos + 1) == b'\n'
    }

    /// Byte width of the character at `pos`; a CR/LF pair counts as 2.
    ///
    /// Out-of-range positions report 1 so scanning loops always advance.
    pub fn len_char(&self, pos: Position) -> Position {
        if !is_valid_index(pos, self.length()) {
            return 1;
        }
        let lead = self.char_at(pos);
        if lead == b'\r' && self.char_at(pos + 1) == b'\n' {
            return 2;
        }
        if utf8_is_ascii(lead) || self.dbcs_codepage == 0 {
            return 1;
        }
        if self.dbcs_codepage == CP_UTF8 {
            let bytes = self.peek_bytes(pos);
            utf8_classify(&bytes).unwrap_or(1) as Position
        } else if self.is_dbcs_dual_byte_at(pos) {
            2
        } else {
            1
        }
    }

    fn peek_bytes(&self, pos: Position) -> [u8; UTF8_MAX_BYTES] {
        let mut bytes = [0u8; UTF8_MAX_BYTES];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.char_at(pos + i as Position);
        }
        bytes
    }

    /// When `pos` sits inside a valid UTF-8 sequence, report the sequence's
    /// `(start, end)` byte range.
    fn in_good_utf8(&self, pos: Position) -> Option<(Position, Position)> {
        let mut trail = pos;
        while trail > 0
            && pos - trail < UTF8_MAX_BYTES as Position
            && utf8_is_trail_byte(self.char_at(trail - 1))
        {
            trail -= 1;
        }
        let start = if trail > 0 { trail - 1 } else { trail };
        let lead = self.char_at(start);
        let width = utf8_bytes_of_lead(lead);
        if width == 1 || pos - start > (width - 1) as Position {
            return None;
        }
        let bytes = self.peek_bytes(start);
        match utf8_classify(&bytes) {
            Some(w) if w == width => Some((start, start + w as Position)),
            _ => None,
        }
    }

    /// Normalise `pos` so it does not sit part way through a multi-byte
    /// character (or, when `check_line_end`, between CR and LF). When the
    /// position must move, it moves in the direction of `move_dir`.
    pub fn move_position_outside_char(
        &self,
        pos: Position,
        move_dir: i32,
        check_line_end: bool,
    ) -> Position {
        if pos <= 0 {
            return 0;
        }
        if pos >= self.length() {
            return self.length();
        }
        if check_line_end && self.is_cr_lf(pos - 1) {
            return if move_dir > 0 { pos + 1 } else { pos - 1 };
        }
        if self.dbcs_codepage == 0 {
            return pos;
        }
        if self.dbcs_codepage == CP_UTF8 {
            if utf8_is_trail_byte(self.char_at(pos)) {
                if let Some((start, end)) = self.in_good_utf8(pos) {
                    return if move_dir > 0 { end } else { start };
                }
                // Invalid UTF-8: the isolated trail byte is its own position.
            }
            return pos;
        }
        // DBCS: step back over lead bytes to a known character start, then
        // walk forward in character-sized units.
        let mut check = pos;
        while check > 0 && self.is_dbcs_lead_byte(self.char_at(check - 1)) {
            check -= 1;
        }
        while check < pos {
            let width = if self.is_dbcs_dual_byte_at(check) { 2 } else { 1 };
            if check + width == pos {
                return pos;
            }
            if check + width > pos {
                return if move_dir > 0 { check + width } else { check };
            }
            check += width;
        }
        pos
    }

    /// Move from one valid position to the next in `move_dir`. Unlike
    /// [`Document::move_position_outside_char`] the starting position must be
    /// a character boundary. A CR/LF pair is two positions.
    pub fn next_position(&self, pos: Position, move_dir: i32) -> Position {
        let increment = move_dir as Position;
        if pos + increment <= 0 {
            return 0;
        }
        if pos + increment >= self.length() {
            return self.length();
        }
        if self.dbcs_codepage == 0 {
            return pos + increment;
        }
        if self.dbcs_codepage == CP_UTF8 {
            if move_dir > 0 {
                let lead = self.char_at(pos);
                if utf8_is_ascii(lead) {
                    return pos + 1;
                }
                let bytes = self.peek_bytes(pos);
                return pos + utf8_classify(&bytes).unwrap_or(1) as Position;
            }
            let pos = pos - 1;
            if utf8_is_trail_byte(self.char_at(pos)) {
                if let Some((start, _)) = self.in_good_utf8(pos) {
                    return start;
                }
            }
            return pos;
        }
        if move_dir > 0 {
            let width = if self.is_dbcs_dual_byte_at(pos) { 2 } else { 1 };
            (pos + width).min(self.length())
        } else if self.is_dbcs_lead_byte(self.char_at(pos - 1)) {
            // The byte before should be a trail byte; accept the pair when it
            // decodes, else treat the lead as one byte wide.
            if self.is_dbcs_dual_byte_at(pos - 2) {
                pos - 2
            } else {
                pos - 1
            }
        } else {
            // Step back until a non-lead byte, then use the parity of the
            // span to decide whether the last character was one or two bytes.
            let mut probe = pos - 2;
            while probe >= 0 && self.is_dbcs_lead_byte(self.char_at(probe)) {
                probe -= 1;
            }
            let width_last = ((pos - probe) & 1) + 1;
            if width_last == 2 && self.is_dbcs_dual_byte_at(pos - width_last) {
                pos - width_last
            } else {
                pos - 1
            }
        }
    }

    /// Advance `pos` one character in `move_dir`; false when already at the
    /// document edge.
    pub fn next_character(&self, pos: &mut Position, move_dir: i32) -> bool {
        let next = self.next_position(*pos, move_dir);
        if next == *pos {
            return false;
        }
        *pos = next;
        true
    }

    /// Decode the character starting at `position`.
    ///
    /// Past the end the empty sentinel (width 0) is returned; invalid UTF-8
    /// yields the replacement character one byte wide.
    pub fn character_after(&self, position: Position) -> DecodedChar {
        if position >= self.length() {
            return DecodedChar::empty();
        }
        let lead = self.char_at(position);
        if utf8_is_ascii(lead) || self.dbcs_codepage == 0 {
            return DecodedChar::single(lead);
        }
        if self.dbcs_codepage == CP_UTF8 {
            let bytes = self.peek_bytes(position);
            return DecodedChar::from_utf8(&bytes);
        }
        if self.is_dbcs_lead_byte(lead) {
            let trail = self.char_at(position + 1);
            if self.is_dbcs_trail_byte(trail) {
                return DecodedChar::dbcs(lead, trail);
            }
        }
        DecodedChar::single(lead)
    }

    /// Decode the character ending at `position`.
    pub fn character_before(&self, position: Position) -> DecodedChar {
        if position <= 0 {
            return DecodedChar::empty();
        }
        let previous = self.char_at(position - 1);
        if self.dbcs_codepage == 0 {
            return DecodedChar::single(previous);
        }
        if self.dbcs_codepage == CP_UTF8 {
            if utf8_is_ascii(previous) {
                return DecodedChar::single(previous);
            }
            let position = position - 1;
            if utf8_is_trail_byte(previous) {
                if let Some((start, end)) = self.in_good_utf8(position) {
                    let width = (end - start) as usize;
                    let bytes = self.peek_bytes(start);
                    return DecodedChar::from_utf8(&bytes[..width.min(UTF8_MAX_BYTES)]);
                }
            }
            return DecodedChar::bad_byte();
        }
        // Moving backwards in DBCS is complex, so reuse NextPosition.
        let start = self.next_position(position, -1);
        self.character_after(start)
    }

    /// The character at `position` with its byte width. Invalid UTF-8 bytes
    /// report as `0xDC80 + byte` so the raw byte stays visible.
    pub fn character_and_width(&self, position: Position) -> DecodedChar {
        let lead = self.char_at(position);
        if utf8_is_ascii(lead) || self.dbcs_codepage == 0 {
            return DecodedChar::single(lead);
        }
        if self.dbcs_codepage == CP_UTF8 {
            let bytes = self.peek_bytes(position);
            return match utf8_classify(&bytes) {
                Some(width) => DecodedChar {
                    character: unicode_from_utf8(&bytes),
                    width_bytes: width as u32,
                },
                None => DecodedChar {
                    character: 0xDC80 + lead as u32,
                    width_bytes: 1,
                },
            };
        }
        if self.is_dbcs_lead_byte(lead) && self.is_dbcs_trail_byte(self.char_at(position + 1)) {
            return DecodedChar::dbcs(lead, self.char_at(position + 1));
        }
        DecodedChar::single(lead)
    }

    /// Move `character_offset` characters from `position_start`; the invalid
    /// position sentinel when the movement leaves the document.
    pub fn get_relative_position(
        &self,
        position_start: Position,
        character_offset: Position,
    ) -> Position {
        if self.dbcs_codepage == 0 {
            let pos = position_start + character_offset;
            return if pos < 0 || pos > self.length() {
                INVALID_POSITION
            } else {
                pos
            };
        }
        let mut pos = position_start;
        let mut remaining = character_offset;
        let increment = if character_offset > 0 { 1 } else { -1 };
        while remaining != 0 {
            let next = self.next_position(pos, increment);
            if next == pos {
                return INVALID_POSITION;
            }
            pos = next;
            remaining -= increment as Position;
        }
        pos
    }

    /// As [`Document::get_relative_position`] but counting UTF-16 code
    /// units: supplementary characters count twice.
    pub fn get_relative_position_utf16(
        &self,
        position_start: Position,
        character_offset: Position,
    ) -> Position {
        if self.dbcs_codepage == 0 {
            let pos = position_start + character_offset;
            return if pos < 0 || pos > self.length() {
                INVALID_POSITION
            } else {
                pos
            };
        }
        let mut pos = position_start;
        let mut remaining = character_offset;
        let increment = if character_offset > 0 { 1 } else { -1 };
        while remaining != 0 {
            let next = self.next_position(pos, increment);
            if next == pos {
                return INVALID_POSITION;
            }
            if (next - pos).abs() > 3 {
                // A 4-byte character is a surrogate pair in UTF-16.
                remaining -= increment as Position;
            }
            pos = next;
            remaining -= increment as Position;
        }
        pos
    }

    /// Count whole characters in `[start_pos, end_pos)`, snapping both ends
    /// outward first.
    pub fn count_characters(&self, start_pos: Position, end_pos: Position) -> Position {
        let start = self.move_position_outside_char(start_pos, 1, false);
        let end = self.move_position_outside_char(end_pos, -1, false);
        let mut count = 0;
        let mut i = start;
        while i < end {
            count += 1;
            i = self.next_position(i, 1);
        }
        count
    }

    /// Count UTF-16 code units in `[start_pos, end_pos)`.
    pub fn count_utf16(&self, start_pos: Position, end_pos: Position) -> Position {
        let start = self.move_position_outside_char(start_pos, 1, false);
        let end = self.move_position_outside_char(end_pos, -1, false);
        let mut count = 0;
        let mut i = start;
        while i < end {
            count += 1;
            let next = self.next_position(i, 1);
            if next - i > 3 {
                count += 1;
            }
            i = next;
        }
        count
    }

    /// Column of `pos` within its line, expanding tabs to the next stop.
    pub fn get_column(&self, pos: Position) -> Position {
        let line = self.line_from_position(pos);
        if line < 0 || line >= self.lines_total() {
            return 0;
        }
        let mut column = 0;
        let mut i = self.line_start(line);
        while i < pos {
            let ch = self.char_at(i);
            match ch {
                b'\t' => {
                    column = next_tab(column, self.tab_in_chars);
                    i += 1;
                }
                b'\r' | b'\n' => return column,
                _ if utf8_is_ascii(ch) => {
                    column += 1;
                    i += 1;
                }
                _ if i >= self.length() => return column,
                _ => {
                    column += 1;
                    i = self.next_position(i, 1);
                }
            }
        }
        column
    }

    /// First position on `line` whose column is at least `column`, without
    /// crossing the line end.
    pub fn find_column(&self, line: Line, column: Position) -> Position {
        let mut position = self.line_start(line);
        if line < 0 || line >= self.lines_total() {
            return position;
        }
        let mut current = 0;
        while current < column && position < self.length() {
            let ch = self.char_at(position);
            match ch {
                b'\t' => {
                    current = next_tab(current, self.tab_in_chars);
                    if current > column {
                        return position;
                    }
                    position += 1;
                }
                b'\r' | b'\n' => return position,
                _ if utf8_is_ascii(ch) => {
                    current += 1;
                    position += 1;
                }
                _ => {
                    current += 1;
                    position = self.next_position(position, 1);
                }
            }
        }
        position
    }

    /// Home position: the first non-blank character of the line, or the line
    /// start when already there.
    pub fn vc_home_position(&self, position: Position) -> Position {
        let line = self.line_from_position(position);
        let start_position = self.line_start(line);
        let end_line = self.line_end(line);
        let mut start_text = start_position;
        while start_text < end_line && is_space_or_tab(self.char_at(start_text)) {
            start_text += 1;
        }
        if position == start_text {
            start_position
        } else {
            start_text
        }
    }

    /// Delete the character at `pos` (CR/LF as a unit).
    pub fn del_char(&mut self, pos: Position) -> Result<bool, StorageError> {
        let len = self.len_char(pos);
        self.delete_chars(pos, len)
    }

    /// Delete the character before `pos` (CR/LF as a unit).
    pub fn del_char_back(&mut self, pos: Position) -> Result<bool, StorageError> {
        if pos <= 0 {
            Ok(false)
        } else if self.is_cr_lf(pos - 2) {
            self.delete_chars(pos - 2, 2)
        } else if self.dbcs_codepage != 0 {
            let start_char = self.next_position(pos, -1);
            self.delete_chars(start_char, pos - start_char)
        } else {
            self.delete_chars(pos - 1, 1)
        }
    }

    // ---- word boundaries ----

    /// Whether a word (or word-like) run starts at `pos`.
    pub fn is_word_start_at(&self, pos: Position) -> bool {
        if pos >= self.length() {
            return false;
        }
        if pos < 0 {
            return true;
        }
        let cc_pos = self.word_character_class(self.character_after(pos).character);
        // At the start of the document, treat the outside as space.
        let cc_prev = if pos > 0 {
            self.word_character_class(self.character_before(pos).character)
        } else {
            CharacterClass::Space
        };
        is_word_edge(cc_pos, cc_prev)
    }

    /// Whether a word (or word-like) run ends at `pos`.
    pub fn is_word_end_at(&self, pos: Position) -> bool {
        if pos <= 0 {
            return false;
        }
        if pos > self.length() {
            return true;
        }
        let cc_pos = if pos < self.length() {
            self.word_character_class(self.character_after(pos).character)
        } else {
            CharacterClass::Space
        };
        let cc_prev = self.word_character_class(self.character_before(pos).character);
        is_word_edge(cc_prev, cc_pos)
    }

    /// Whether `[start, end)` spans exactly a word-like run.
    pub fn is_word_at(&self, start: Position, end: Position) -> bool {
        start < end && self.is_word_start_at(start) && self.is_word_end_at(end)
    }

    pub(crate) fn matches_word_options(
        &self,
        word: bool,
        word_start: bool,
        pos: Position,
        length: Position,
    ) -> bool {
        (!word && !word_start)
            || (word && self.is_word_at(pos, pos + length))
            || (word_start && self.is_word_start_at(pos))
    }

    /// Find the start (`delta` < 0) or end (`delta` >= 0) of the word at
    /// `pos`. With `only_word_characters`, punctuation runs do not anchor.
    pub fn extend_word_select(
        &self,
        mut pos: Position,
        delta: i32,
        only_word_characters: bool,
    ) -> Position {
        let mut cc_start = CharacterClass::Word;
        if delta < 0 {
            if pos > 0 {
                let ce = self.character_before(pos);
                let ce_start = self.word_character_class(ce.character);
                if !only_word_characters
                    || ce_start == cc_start
                    || ce_start == CharacterClass::CjkWord
                {
                    cc_start = ce_start;
                    pos -= ce.width_bytes as Position;
                } else {
                    return self.move_position_outside_char(pos, delta, true);
                }
            }
            while pos > 0 {
                let ce = self.character_before(pos);
                if self.word_character_class(ce.character) != cc_start {
                    break;
                }
                pos -= ce.width_bytes as Position;
            }
        } else {
            if pos < self.length() {
                let ce = self.character_after(pos);
                let ce_start = self.word_character_class(ce.character);
                if !only_word_characters
                    || ce_start == cc_start
                    || ce_start == CharacterClass::CjkWord
                {
                    cc_start = ce_start;
                    pos += ce.width_bytes as Position;
                } else {
                    return self.move_position_outside_char(pos, delta, true);
                }
            }
            while pos < self.length() {
                let ce = self.character_after(pos);
                if self.word_character_class(ce.character) != cc_start {
                    break;
                }
                pos += ce.width_bytes as Position;
            }
        }
        self.move_position_outside_char(pos, delta, true)
    }

    /// Start of the next word in `delta` direction: skip the current class,
    /// then spaces (order depends on direction).
    pub fn next_word_start(&self, mut pos: Position, delta: i32) -> Position {
        if delta < 0 {
            while pos > 0 {
                let ce = self.character_before(pos);
                if self.word_character_class(ce.character) != CharacterClass::Space {
                    break;
                }
                pos -= ce.width_bytes as Position;
            }
            if pos > 0 {
                let cc_start = self.word_character_class(self.character_before(pos).character);
                while pos > 0 {
                    let ce = self.character_before(pos);
                    if self.word_character_class(ce.character) != cc_start {
                        break;
                    }
                    pos -= ce.width_bytes as Position;
                }
            }
        } else {
            let cc_start = self.word_character_class(self.character_after(pos).character);
            while pos < self.length() {
                let ce = self.character_after(pos);
                if self.word_character_class(ce.character) != cc_start {
                    break;
                }
                pos += ce.width_bytes as Position;
            }
            while pos < self.length() {
                let ce = self.character_after(pos);
                if self.word_character_class(ce.character) != CharacterClass::Space {
                    break;
                }
                pos += ce.width_bytes as Position;
            }
        }
        pos
    }

    /// End of the next word in `delta` direction.
    pub fn next_word_end(&self, mut pos: Position, delta: i32) -> Position {
        if delta < 0 {
            if pos > 0 {
                let cc_start = self.word_character_class(self.character_before(pos).character);
                if cc_start != CharacterClass::Space {
                    while pos > 0 {
                        let ce = self.character_before(pos);
                        if self.word_character_class(ce.character) != cc_start {
                            break;
                        }
                        pos -= ce.width_bytes as Position;
                    }
                }
                while pos > 0 {
                    let ce = self.character_before(pos);
                    if self.word_character_class(ce.character) != CharacterClass::Space {
                        break;
                    }
                    pos -= ce.width_bytes as Position;
                }
            }
        } else {
            while pos < self.length() {
                let ce = self.character_after(pos);
                if self.word_character_class(ce.character) != CharacterClass::Space {
                    break;
                }
                pos += ce.width_bytes as Position;
            }
            if pos < self.length() {
                let cc_start = self.word_character_class(self.character_after(pos).character);
                while pos < self.length() {
                    let ce = self.character_after(pos);
                    if self.word_character_class(ce.character) != cc_start {
                        break;
                    }
                    pos += ce.width_bytes as Position;
                }
            }
        }
        pos
    }

    fn is_word_part_separator(&self, character: u32) -> bool {
        character < 0x80
            && self.char_class.get_class(character as u8) == CharacterClass::Word
            && is_ascii_punctuation(character)
    }

    /// Previous word-part boundary: transitions between lower, upper, digit,
    /// punctuation, space, and non-ASCII runs, with underscore as separator.
    pub fn word_part_left(&self, mut pos: Position) -> Position {
        if pos <= 0 {
            return pos;
        }
        pos -= self.character_before(pos).width_bytes as Position;
        let mut ce_start = self.character_after(pos);
        if self.is_word_part_separator(ce_start.character) {
            while pos > 0 && self.is_word_part_separator(self.character_after(pos).character) {
                pos -= self.character_before(pos).width_bytes as Position;
            }
        }
        if pos > 0 {
            ce_start = self.character_after(pos);
            pos -= self.character_before(pos).width_bytes as Position;
            if !is_ascii(ce_start.character) {
                while pos > 0 && !is_ascii(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes as Position;
                }
                if is_ascii(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes as Position;
                }
            } else if is_lower(ce_start.character) {
                while pos > 0 && is_lower(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes as Position;
                }
                let ce = self.character_after(pos);
                if !is_upper(ce.character) && !is_lower(ce.character) {
                    pos += self.character_after(pos).width_bytes as Position;
                }
            } else if is_upper(ce_start.character) {
                while pos > 0 && is_upper(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes as Position;
                }
                if !is_upper(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes as Position;
                }
            } else if is_digit(ce_start.character) {
                while pos > 0 && is_digit(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes as Position;
                }
                if !is_digit(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes as Position;
                }
            } else if is_graphic(ce_start.character) {
                while pos > 0 && is_ascii_punctuation(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes as Position;
                }
                if !is_ascii_punctuation(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes as Position;
                }
            } else if is_space_char(ce_start.character) {
                while pos > 0 && is_space_char(self.character_after(pos).character) {
                    pos -= self.character_before(pos).width_bytes as Position;
                }
                if !is_space_char(self.character_after(pos).character) {
                    pos += self.character_after(pos).width_bytes as Position;
                }
            } else {
                pos += self.character_after(pos).width_bytes as Position;
            }
        }
        pos
    }

    /// Next word-part boundary.
    pub fn word_part_right(&self, mut pos: Position) -> Position {
        let length = self.length();
        let mut ce_start = self.character_after(pos);
        while pos < length && self.is_word_part_separator(ce_start.character) {
            pos += ce_start.width_bytes as Position;
            ce_start = self.character_after(pos);
        }
        if !is_ascii(ce_start.character) && pos < length {
            while pos < length && !is_ascii(ce_start.character) {
                pos += ce_start.width_bytes as Position;
                ce_start = self.character_after(pos);
            }
        } else if is_lower(ce_start.character) {
            while pos < length && is_lower(ce_start.character) {
                pos += ce_start.width_bytes as Position;
                ce_start = self.character_after(pos);
            }
        } else if is_upper(ce_start.character) {
            let ce_next = self.character_after(pos + ce_start.width_bytes as Position);
            if is_lower(ce_next.character) {
                pos += ce_start.width_bytes as Position;
                ce_start = ce_next;
                while pos < length && is_lower(ce_start.character) {
                    pos += ce_start.width_bytes as Position;
                    ce_start = self.character_after(pos);
                }
            } else {
                while pos < length && is_upper(ce_start.character) {
                    pos += ce_start.width_bytes as Position;
                    ce_start = self.character_after(pos);
                }
            }
            if is_lower(ce_start.character) {
                let ce_prev = self.character_before(pos);
                if is_upper(ce_prev.character) {
                    pos -= ce_prev.width_bytes as Position;
                }
            }
        } else if is_digit(ce_start.character) {
            while pos < length && is_digit(ce_start.character) {
                pos += ce_start.width_bytes as Position;
                ce_start = self.character_after(pos);
            }
        } else if is_graphic(ce_start.character) {
            while pos < length && is_ascii_punctuation(ce_start.character) {
                pos += ce_start.width_bytes as Position;
                ce_start = self.character_after(pos);
            }
        } else if is_space_char(ce_start.character) {
            while pos < length && is_space_char(ce_start.character) {
                pos += ce_start.width_bytes as Position;
                ce_start = self.character_after(pos);
            }
        } else {
            pos += ce_start.width_bytes as Position;
        }
        pos
    }

    // ---- paragraphs and style runs ----

    /// Whether `line` contains only blanks.
    pub fn is_white_line(&self, line: Line) -> bool {
        let mut current = self.line_start(line);
        let end = self.line_end(line);
        while current < end {
            if !is_space_or_tab(self.char_at(current)) {
                return false;
            }
            current += 1;
        }
        true
    }

    /// Start of the paragraph above `pos`.
    pub fn para_up(&self, pos: Position) -> Position {
        let mut line = self.line_from_position(pos);
        if pos == self.line_start(line) {
            line -= 1;
        }
        while line >= 0 && self.is_white_line(line) {
            line -= 1;
        }
        while line >= 0 && !self.is_white_line(line) {
            line -= 1;
        }
        line += 1;
        self.line_start(line)
    }

    /// Start of the paragraph below `pos`.
    pub fn para_down(&self, pos: Position) -> Position {
        let max_line = self.lines_total();
        let mut line = self.line_from_position(pos);
        while line < max_line && !self.is_white_line(line) {
            line += 1;
        }
        while line < max_line && self.is_white_line(line) {
            line += 1;
        }
        if line < max_line {
            self.line_start(line)
        } else {
            self.line_end(line - 1)
        }
    }

    /// Extend from `pos` over positions with the same style byte.
    pub fn extend_style_range(&self, mut pos: Position, delta: i32, single_line: bool) -> Position {
        let style_start = self.style_at(pos);
        if delta < 0 {
            while pos > 0
                && self.style_at(pos) == style_start
                && (!single_line || !is_eol_character(self.char_at(pos)))
            {
                pos -= 1;
            }
            pos += 1;
        } else {
            while pos < self.length()
                && self.style_at(pos) == style_start
                && (!single_line || !is_eol_character(self.char_at(pos)))
            {
                pos += 1;
            }
        }
        pos
    }

    // ---- brace matching ----

    /// Find the brace matching the one at `position`, or -1.
    ///
    /// With `use_start_pos` the scan begins at `start_pos` instead of next to
    /// the brace. Style bytes are honoured only inside the styled region, and
    /// candidate positions inside multi-byte characters are rejected.
    pub fn brace_match(
        &self,
        position: Position,
        start_pos: Position,
        use_start_pos: bool,
    ) -> Position {
        let ch_brace = self.char_at(position);
        let Some(ch_seek) = brace_opposite(ch_brace) else {
            return INVALID_POSITION;
        };
        let sty_brace = self.style_index_at(position);
        let direction: Position = if ch_brace < ch_seek { 1 } else { -1 };
        let safe_char = self.safe_chars.ascii_backward;
        let mut position = if use_start_pos {
            start_pos
        } else {
            position + direction
        };
        let end_style_pos = self.end_styled;
        let length = self.length();
        let view = self.buffer.all_view();
        let mut depth = 1;
        while is_valid_index(position, length) {
            let ch_at_pos = view.byte_at(position);
            if ch_at_pos == ch_brace || ch_at_pos == ch_seek {
                if (position > end_style_pos || self.style_index_at(position) == sty_brace)
                    && (ch_at_pos <= safe_char
                        || position
                            == self.move_position_outside_char(position, direction as i32, false))
                {
                    depth += if ch_at_pos == ch_brace { 1 } else { -1 };
                    if depth == 0 {
                        return position;
                    }
                }
            }
            position += direction;
        }
        INVALID_POSITION
    }

    // ---- safe segmentation ----

    /// Choose a break point within `text[..=length_segment]` that avoids
    /// splitting characters, combining sequences, or (preferably) words.
    ///
    /// Preference order: after a break space; at a word/punctuation class
    /// transition; before the last combining sequence; after the last whole
    /// character.
    pub fn safe_segment(&self, text: &[u8], length_segment: usize) -> usize {
        debug_assert!(length_segment < text.len());
        let length_segment = length_segment.min(text.len().saturating_sub(1));
        // Check space first as most written languages use spaces.
        let mut i = length_segment;
        while i > 0 {
            if is_space_or_tab(text[i]) {
                return i;
            }
            i -= 1;
        }

        let family = self.code_page_family();
        if family != EncodingFamily::Dbcs {
            // Backward iterate for UTF-8 and 8-bit text to find a word or
            // punctuation boundary.
            let mut it = length_segment;
            let mut last_punctuation_break = length_segment;
            let cc_prev = self.char_class.get_class(text[length_segment]);
            while it > 0 {
                it -= 1;
                let cc = self.char_class.get_class(text[it]);
                if cc != cc_prev {
                    last_punctuation_break = it + 1;
                    break;
                }
            }
            if cc_prev >= CharacterClass::Punctuation && family != EncodingFamily::EightBit {
                last_punctuation_break = discard_last_combined_character(
                    text,
                    last_punctuation_break,
                    last_punctuation_break + UTF8_MAX_BYTES,
                );
                if last_punctuation_break == length_segment {
                    // Discard trail bytes of the character truncated at the
                    // segment limit.
                    let mut it = length_segment;
                    while it > 0 && utf8_is_trail_byte(text[it]) {
                        it -= 1;
                    }
                    last_punctuation_break = it;
                }
            }
            return last_punctuation_break;
        }

        // Forward iterate for DBCS to find the boundary.
        let mut last_punctuation_break = 0;
        let mut last_encoding_allowed_break = 0;
        let mut cc_prev = CharacterClass::Space;
        let mut j = 0;
        while j < length_segment {
            let ch = text[j];
            last_encoding_allowed_break = j;
            j += 1;
            let cc = if utf8_is_ascii(ch) {
                self.char_class.get_class(ch)
            } else {
                j += usize::from(self.is_dbcs_lead_byte(ch));
                CharacterClass::Word
            };
            if cc != cc_prev {
                cc_prev = cc;
                last_punctuation_break = last_encoding_allowed_break;
            }
        }
        if last_punctuation_break != 0 {
            last_punctuation_break
        } else {
            last_encoding_allowed_break
        }
    }
}

/// A boundary needs differing classes with the inner class at least
/// punctuation.
fn is_word_edge(cc: CharacterClass, cc_next: CharacterClass) -> bool {
    cc != cc_next && cc >= CharacterClass::Punctuation
}

/// The opposite bracket of `ch`, if it is one of `()[]{}<>`.
pub(crate) fn brace_opposite(ch: u8) -> Option<u8> {
    match ch {
        b'(' => Some(b')'),
        b')' => Some(b'('),
        b'[' => Some(b']'),
        b']' => Some(b'['),
        b'{' => Some(b'}'),
        b'}' => Some(b'{'),
        b'<' => Some(b'>'),
        b'>' => Some(b'<'),
        _ => None,
    }
}

/// Walk back from `length_segment` to the last grapheme cluster boundary so
/// combining sequences are not split. Only the trailing
/// `LONGEST_UNICODE_CHARACTER_SEQUENCE_BYTES` are considered.
fn discard_last_combined_character(
    text: &[u8],
    length_segment: usize,
    len_bytes: usize,
) -> usize {
    // The window may cut a UTF-8 sequence at either edge; trim both to whole
    // characters before decoding.
    let mut end = len_bytes.min(text.len());
    let mut back = end;
    while back > 0 && end - back < UTF8_MAX_BYTES && utf8_is_trail_byte(text[back - 1]) {
        back -= 1;
    }
    if back > 0 {
        let width = utf8_bytes_of_lead(text[back - 1]);
        if back - 1 + width > end {
            end = back - 1;
        }
    }
    let mut window_start = length_segment
        .saturating_sub(LONGEST_UNICODE_CHARACTER_SEQUENCE_BYTES + UTF8_MAX_BYTES);
    while window_start < end && utf8_is_trail_byte(text[window_start]) {
        window_start += 1;
    }
    let Ok(window) = std::str::from_utf8(&text[window_start..end]) else {
        return length_segment;
    };
    // Snap to the start of the character the break lands in, then to the
    // previous grapheme boundary when that is not one.
    let mut target = length_segment.min(end) - window_start;
    while target > 0 && !window.is_char_boundary(target) {
        target -= 1;
    }
    let mut cursor = GraphemeCursor::new(target, window.len(), true);
    match cursor.is_boundary(window, 0) {
        Ok(true) => window_start + target,
        _ => match cursor.prev_boundary(window, 0) {
            Ok(Some(boundary)) => window_start + boundary,
            _ => length_segment,
        },
    }
}

const fn is_ascii(character: u32) -> bool {
    character < 0x80
}

const fn is_lower(character: u32) -> bool {
    matches!(character, 0x61..=0x7A)
}

const fn is_upper(character: u32) -> bool {
    matches!(character, 0x41..=0x5A)
}

const fn is_digit(character: u32) -> bool {
    matches!(character, 0x30..=0x39)
}

const fn is_ascii_punctuation(character: u32) -> bool {
    matches!(character, 0x21..=0x2F | 0x3A..=0x40 | 0x5B..=0x60 | 0x7B..=0x7E)
}

const fn is_graphic(character: u32) -> bool {
    character > 0x20 && character != 0x7F && character < 0x80
}

const fn is_space_char(character: u32) -> bool {
    matches!(character as u8 as char, ' ' | '\t' | '\n' | '\r' | '\x0B' | '\x0C')
        && character < 0x80
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentOptions;

    fn utf8_doc(text: &str) -> Document {
        let mut doc = Document::new(DocumentOptions::default());
        doc.set_dbcs_code_page(CP_UTF8);
        doc.insert_string(0, text.as_bytes()).unwrap();
        doc
    }

    fn bytes_doc(bytes: &[u8], codepage: i32) -> Document {
        let mut doc = Document::new(DocumentOptions::default());
        doc.set_dbcs_code_page(codepage);
        doc.insert_string(0, bytes).unwrap();
        doc
    }

    #[test]
    fn move_outside_char_is_fixed_point() {
        let doc = utf8_doc("aé€🦀b\r\nc");
        for pos in 0..=doc.length() {
            for dir in [-1, 1] {
                for check in [false, true] {
                    let moved = doc.move_position_outside_char(pos, dir, check);
                    assert_eq!(
                        doc.move_position_outside_char(moved, dir, check),
                        moved,
                        "pos={pos} dir={dir} check={check}"
                    );
                }
            }
        }
    }

    #[test]
    fn next_position_lands_on_boundaries() {
        let doc = utf8_doc("aé€🦀b");
        let mut pos = 0;
        let mut widths = Vec::new();
        loop {
            let next = doc.next_position(pos, 1);
            if next == pos {
                break;
            }
            widths.push(next - pos);
            pos = next;
        }
        assert_eq!(widths, vec![1, 2, 3, 4, 1]);
        let mut pos = doc.length();
        let mut back = Vec::new();
        loop {
            let next = doc.next_position(pos, -1);
            if next == pos {
                break;
            }
            back.push(pos - next);
            pos = next;
        }
        assert_eq!(back, vec![1, 4, 3, 2, 1]);
    }

    #[test]
    fn utf8_navigation_scenario() {
        // "a\xC3\xA9b": three characters in four bytes.
        let doc = utf8_doc("aéb");
        assert_eq!(doc.next_position(1, 1), 3);
        let ce = doc.character_after(1);
        assert_eq!(ce.character, 0xE9);
        assert_eq!(ce.width_bytes, 2);
        assert_eq!(doc.move_position_outside_char(2, 1, false), 3);
        assert_eq!(doc.move_position_outside_char(2, -1, false), 1);
    }

    #[test]
    fn crlf_is_one_navigational_unit() {
        let mut doc = utf8_doc("x\r\ny");
        assert!(doc.is_cr_lf(1));
        assert!(!doc.is_cr_lf(2));
        assert_eq!(doc.move_position_outside_char(2, 1, true), 3);
        assert_eq!(doc.move_position_outside_char(2, -1, true), 1);
        assert_eq!(doc.len_char(1), 2);
        doc.del_char_back(3).unwrap();
        assert_eq!(doc.text_range(0, doc.length()), b"xy");
    }

    #[test]
    fn character_before_decodes() {
        let doc = utf8_doc("aé🦀");
        assert_eq!(doc.character_before(0), DecodedChar::empty());
        assert_eq!(doc.character_before(1).character, 'a' as u32);
        let e_acute = doc.character_before(3);
        assert_eq!(e_acute.character, 0xE9);
        assert_eq!(e_acute.width_bytes, 2);
        let crab = doc.character_before(doc.length());
        assert_eq!(crab.character, '🦀' as u32);
        assert_eq!(crab.width_bytes, 4);
    }

    #[test]
    fn invalid_utf8_is_replacement_one_byte() {
        let doc = bytes_doc(&[b'a', 0xC3, b'b'], CP_UTF8);
        let bad = doc.character_after(1);
        assert_eq!(bad.character, UNICODE_REPLACEMENT_CHAR);
        assert_eq!(bad.width_bytes, 1);
        assert_eq!(doc.next_position(1, 1), 2);
        // The raw-byte view exposes the byte as a low surrogate offset.
        assert_eq!(doc.character_and_width(1).character, 0xDC80 + 0xC3);
    }

    #[test]
    fn relative_positions_and_counts() {
        let doc = utf8_doc("aé€🦀b");
        assert_eq!(doc.get_relative_position(0, 4), 10);
        assert_eq!(doc.get_relative_position(10, -4), 0);
        assert_eq!(doc.get_relative_position(0, 6), INVALID_POSITION);
        assert_eq!(doc.count_characters(0, doc.length()), 5);
        // The crab needs two UTF-16 units.
        assert_eq!(doc.count_utf16(0, doc.length()), 6);
        assert_eq!(doc.get_relative_position_utf16(0, 5), 10);
        assert_eq!(doc.get_relative_position_utf16(0, 6), doc.length());
    }

    #[test]
    fn dbcs_navigation() {
        // Shift-JIS "あいu": 0x82A0 0x82A2 'u'.
        let doc = bytes_doc(&[0x82, 0xA0, 0x82, 0xA2, b'u'], 932);
        assert_eq!(doc.next_position(0, 1), 2);
        assert_eq!(doc.next_position(2, 1), 4);
        assert_eq!(doc.next_position(4, -1), 2);
        assert_eq!(doc.next_position(2, -1), 0);
        assert_eq!(doc.move_position_outside_char(1, 1, false), 2);
        assert_eq!(doc.move_position_outside_char(3, -1, false), 2);
        let ce = doc.character_after(0);
        assert_eq!(ce.character, 0x82A0);
        assert_eq!(ce.width_bytes, 2);
        assert_eq!(doc.count_characters(0, 5), 3);
    }

    #[test]
    fn columns_with_tabs() {
        let mut doc = utf8_doc("\tab\tc");
        doc.set_tab_in_chars(8);
        assert_eq!(doc.get_column(0), 0);
        assert_eq!(doc.get_column(1), 8);
        assert_eq!(doc.get_column(3), 10);
        assert_eq!(doc.get_column(4), 16);
        assert_eq!(doc.find_column(0, 8), 1);
        assert_eq!(doc.find_column(0, 10), 3);
        // Inside a tab expansion the tab's own position is returned.
        assert_eq!(doc.find_column(0, 12), 3);
        // Round trip: get_column(find_column(c)) <= c.
        for c in 0..=18 {
            let pos = doc.find_column(0, c);
            assert!(doc.get_column(pos) <= c);
        }
    }

    #[test]
    fn column_stops_at_line_end() {
        let doc = utf8_doc("ab\r\ncd");
        assert_eq!(doc.find_column(0, 99), 2);
        assert_eq!(doc.get_column(doc.line_start(1)), 0);
    }

    #[test]
    fn vc_home_flips() {
        let doc = utf8_doc("    text");
        assert_eq!(doc.vc_home_position(8), 4);
        assert_eq!(doc.vc_home_position(4), 0);
        assert_eq!(doc.vc_home_position(0), 4);
    }

    #[test]
    fn word_boundaries() {
        let doc = utf8_doc("one two;three");
        assert!(doc.is_word_start_at(0));
        assert!(doc.is_word_end_at(3));
        assert!(doc.is_word_start_at(4));
        assert!(doc.is_word_start_at(7)); // punctuation run starts
        assert!(doc.is_word_start_at(8));
        assert!(!doc.is_word_start_at(2));
        assert!(doc.is_word_at(0, 3));
        assert!(doc.is_word_at(4, 7));
        assert!(!doc.is_word_at(0, 2));
    }

    #[test]
    fn word_motion() {
        let doc = utf8_doc("one two;three");
        assert_eq!(doc.next_word_start(0, 1), 4);
        assert_eq!(doc.next_word_start(4, 1), 7);
        assert_eq!(doc.next_word_start(13, -1), 8);
        assert_eq!(doc.next_word_end(0, 1), 3);
        assert_eq!(doc.next_word_end(3, 1), 7);
        assert_eq!(doc.extend_word_select(1, 1, false), 3);
        assert_eq!(doc.extend_word_select(1, -1, false), 0);
        assert_eq!(doc.extend_word_select(9, -1, true), 8);
    }

    #[test]
    fn word_parts_camel_and_snake() {
        let doc = utf8_doc("camelCaseHTTPWord_snake42");
        assert_eq!(doc.word_part_right(0), 5); // camel|Case
        assert_eq!(doc.word_part_right(5), 9); // Case|HTTP
        assert_eq!(doc.word_part_right(9), 13); // HTTP|Word
        assert_eq!(doc.word_part_right(13), 17); // Word|_snake
        assert_eq!(doc.word_part_right(17), 23); // _snake|42
        assert_eq!(doc.word_part_right(18), 23); // snake|42
        assert_eq!(doc.word_part_left(23), 18);
        assert_eq!(doc.word_part_left(18), 13);
        assert_eq!(doc.word_part_left(13), 9);
        assert_eq!(doc.word_part_left(9), 5);
        assert_eq!(doc.word_part_left(5), 0);
    }

    #[test]
    fn paragraphs() {
        let doc = utf8_doc("a1\na2\n\nb1\nb2\n\nc1");
        let b1 = doc.line_start(3);
        assert_eq!(doc.para_up(b1), doc.line_start(0));
        assert_eq!(doc.para_down(b1), doc.line_start(6));
        assert_eq!(doc.para_down(doc.line_start(6)), doc.line_end(6));
    }

    #[test]
    fn brace_match_simple() {
        let doc = utf8_doc("(a[b]{c}d)");
        assert_eq!(doc.brace_match(0, 0, false), 9);
        assert_eq!(doc.brace_match(9, 0, false), 0);
        assert_eq!(doc.brace_match(2, 0, false), 4);
        assert_eq!(doc.brace_match(5, 0, false), 7);
        assert_eq!(doc.brace_match(1, 0, false), INVALID_POSITION);
    }

    #[test]
    fn brace_match_nested() {
        let doc = utf8_doc("((()))");
        assert_eq!(doc.brace_match(0, 0, false), 5);
        assert_eq!(doc.brace_match(1, 0, false), 4);
        assert_eq!(doc.brace_match(2, 0, false), 3);
        assert_eq!(doc.brace_match(5, 0, false), 0);
    }

    #[test]
    fn brace_match_across_gap() {
        // Edit so the buffer gap sits between the braces.
        let mut doc = utf8_doc("(...)");
        doc.insert_string(2, b"zz").unwrap();
        doc.delete_chars(2, 2).unwrap();
        assert_eq!(doc.brace_match(0, 0, false), 4);
        assert_eq!(doc.brace_match(4, 0, false), 0);
    }

    #[test]
    fn brace_match_skips_multibyte_content() {
        let doc = utf8_doc("(é🦀)");
        assert_eq!(doc.brace_match(0, 0, false), doc.length() - 1);
        assert_eq!(doc.brace_match(doc.length() - 1, 0, false), 0);
    }

    #[test]
    fn extend_style_range_walks_runs() {
        let mut doc = utf8_doc("aaabbb");
        doc.start_styling(0);
        doc.set_style_for(3, 1);
        doc.set_style_for(3, 2);
        assert_eq!(doc.extend_style_range(1, 1, false), 3);
        assert_eq!(doc.extend_style_range(4, -1, false), 3);
    }

    #[test]
    fn safe_segment_prefers_spaces() {
        let doc = utf8_doc("");
        let text = b"hello world again";
        assert_eq!(doc.safe_segment(text, 13), 11);
    }

    #[test]
    fn safe_segment_class_transition() {
        let doc = utf8_doc("");
        let text = b"alpha;beta;gamma";
        // No spaces: break at the last class transition before the limit.
        assert_eq!(doc.safe_segment(text, 14), 11);
    }

    #[test]
    fn safe_segment_avoids_splitting_combining() {
        let doc = utf8_doc("");
        // "ae" + combining ring (2 bytes) repeated; cut proposed mid-cluster.
        let text = "aaaa\u{030A}bbbb".as_bytes();
        let segment = doc.safe_segment(text, 5);
        // Must not land between 'a' and its combining mark.
        assert!(segment <= 3 || segment >= 6, "split at {segment}");
    }

    #[test]
    fn safe_segment_dbcs_forward_walk() {
        let mut doc = Document::new(DocumentOptions::default());
        doc.set_dbcs_code_page(932);
        let text = &[b'a', b'b', 0x82, 0xA0, 0x82, 0xA2, b'c'][..];
        let segment = doc.safe_segment(text, 5);
        // The break must be at a character start.
        assert!(matches!(segment, 2 | 4 | 6), "split at {segment}");
    }
}
