//! Text search over the document.
//!
//! Case-sensitive literal search uses the Boyer-Moore-Horspool-Sunday shift
//! table over the buffer's two-segment view, snapping positions outside
//! multi-byte characters when a shift may have landed inside one.
//! Case-insensitive search folds both the pattern and the document text
//! through the installed case folder, with dedicated walks for UTF-8, DBCS,
//! and 8-bit text. Regular expressions are delegated to the regex driver.

use std::ops::{BitOr, BitOrAssign};

use crate::casefold::MAX_FOLDING_EXPANSION;
use crate::charclass::make_lower_ascii;
use crate::document::Document;
use crate::encoding::{CP_UTF8, UTF8_MAX_BYTES, utf8_classify, utf8_is_ascii};
use crate::Position;

/// Options controlling a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchFlags(pub u32);

impl SearchFlags {
    /// No options.
    pub const NONE: Self = Self(0);
    /// Match case exactly.
    pub const MATCH_CASE: Self = Self(0x1);
    /// Only match whole words.
    pub const WHOLE_WORD: Self = Self(0x2);
    /// Only match at word starts.
    pub const WORD_START: Self = Self(0x4);
    /// Interpret the pattern as a regular expression.
    pub const REGEXP: Self = Self(0x8);
    /// Use the ecosystem regex engine instead of the built-in matcher.
    pub const LIBRARY_REGEX: Self = Self(0x10);
    /// In regular expressions, let `.` match line ends too.
    pub const DOT_MATCHES_ALL: Self = Self(0x20);

    /// Whether every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SearchFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SearchFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A successful search: byte position and byte length of the match.
///
/// The length can differ from the pattern length under case folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindMatch {
    /// Byte position of the match start.
    pub position: Position,
    /// Byte length of the matched text.
    pub length: Position,
}

/// Search failures. Only regular-expression patterns can fail; literal
/// searches always complete.
#[derive(Debug)]
pub enum SearchError {
    /// The ecosystem regex engine rejected the pattern.
    InvalidRegex(regex::Error),
    /// The built-in matcher rejected the pattern.
    BadPattern(String),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRegex(err) => write!(f, "invalid regex: {err}"),
            Self::BadPattern(message) => write!(f, "bad pattern: {message}"),
        }
    }
}

impl std::error::Error for SearchError {}

impl Document {
    /// Find `pattern` in `[min_pos, max_pos)`, or backwards when
    /// `min_pos > max_pos`. Returns the match position and length.
    ///
    /// An empty pattern matches at `min_pos`.
    pub fn find_text(
        &mut self,
        min_pos: Position,
        max_pos: Position,
        pattern: &[u8],
        flags: SearchFlags,
    ) -> Result<Option<FindMatch>, SearchError> {
        if pattern.is_empty() {
            return Ok(Some(FindMatch {
                position: min_pos,
                length: 0,
            }));
        }
        if flags.contains(SearchFlags::REGEXP) {
            let mut backend = self.regex.take().unwrap_or_default();
            let result = backend.find_text(self, min_pos, max_pos, pattern, flags);
            self.regex = Some(backend);
            return result;
        }
        Ok(self.find_literal(min_pos, max_pos, pattern, flags))
    }

    /// Expand a replacement template against the captures of the most recent
    /// regex search. `None` when no regex search has run.
    pub fn substitute_by_position(&mut self, text: &[u8]) -> Option<Vec<u8>> {
        let backend = self.regex.take()?;
        let substituted = backend.substitute_by_position(self, text);
        self.regex = Some(backend);
        Some(substituted)
    }

    fn find_literal(
        &self,
        min_pos: Position,
        max_pos: Position,
        pattern: &[u8],
        flags: SearchFlags,
    ) -> Option<FindMatch> {
        let case_sensitive = flags.contains(SearchFlags::MATCH_CASE);
        let word = flags.contains(SearchFlags::WHOLE_WORD);
        let word_start = flags.contains(SearchFlags::WORD_START);
        let forward = min_pos <= max_pos;
        let increment: i32 = if forward { 1 } else { -1 };

        // Range endpoints should not be inside multi-byte characters, but
        // just in case, move them.
        let start_pos = self.move_position_outside_char(min_pos, increment, false);
        let end_pos = self.move_position_outside_char(max_pos, increment, false);
        let length_find = pattern.len() as Position;
        let limit_pos = start_pos.max(end_pos);
        let mut pos = start_pos;
        if !forward && !case_sensitive {
            // Back all of a character.
            pos = self.next_position(pos, -1);
        }
        if case_sensitive {
            self.find_case_sensitive(
                pos, start_pos, end_pos, limit_pos, pattern, forward, word, word_start,
            )
            .map(|position| FindMatch {
                position,
                length: length_find,
            })
        } else if self.dbcs_codepage == CP_UTF8 {
            self.find_folded_utf8(pos, end_pos, limit_pos, pattern, forward, word, word_start)
        } else if self.dbcs_codepage != 0 {
            self.find_folded_dbcs(pos, end_pos, limit_pos, pattern, forward, word, word_start)
        } else {
            self.find_folded_eight_bit(
                pos, start_pos, end_pos, limit_pos, pattern, forward, word, word_start,
            )
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn find_case_sensitive(
        &self,
        mut pos: Position,
        start_pos: Position,
        end_pos: Position,
        limit_pos: Position,
        pattern: &[u8],
        forward: bool,
        word: bool,
        word_start: bool,
    ) -> Option<Position> {
        let view = self.buffer.all_view();
        let length_find = pattern.len() as Position;
        let increment: Position = if forward { 1 } else { -1 };

        // Boyer-Moore-Horspool-Sunday: the shift table is indexed by the
        // byte one past the window.
        let mut shift_table = [(length_find + 1) * increment; 256];
        if length_find != 1 {
            if forward {
                let mut shift = length_find;
                for &byte in pattern {
                    shift_table[byte as usize] = shift;
                    shift -= 1;
                }
            } else {
                let mut shift = -length_find;
                for &byte in pattern.iter().rev() {
                    shift_table[byte as usize] = shift;
                    shift += 1;
                }
            }
        }

        let end_search = if start_pos <= end_pos {
            end_pos - length_find + 1
        } else {
            end_pos
        };
        let skip = if forward { length_find } else { -1 };
        let safe_char = if skip == 1 {
            self.safe_chars.forward
        } else {
            self.safe_chars.backward
        };
        let char_start_search = pattern[0];
        if !forward {
            pos = self.move_position_outside_char(pos - length_find, -1, false);
        }
        while if forward { pos < end_search } else { pos >= end_search } {
            let lead = view.byte_at(pos);
            if lead == char_start_search {
                let mut found = pos + length_find <= limit_pos;
                let mut index = 1;
                while found && index < length_find {
                    found = view.byte_at(pos + index) == pattern[index as usize];
                    index += 1;
                }
                if found && self.matches_word_options(word, word_start, pos, length_find) {
                    return Some(pos);
                }
            }
            if length_find == 1 {
                if lead <= safe_char {
                    pos += increment;
                } else if !self.next_character(&mut pos, increment as i32) {
                    break;
                }
            } else {
                let next_byte = view.byte_at(pos + skip);
                pos += shift_table[next_byte as usize];
                if next_byte > safe_char {
                    pos = self.move_position_outside_char(pos, increment as i32, false);
                }
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn find_folded_utf8(
        &self,
        mut pos: Position,
        end_pos: Position,
        limit_pos: Position,
        pattern: &[u8],
        forward: bool,
        word: bool,
        word_start: bool,
    ) -> Option<FindMatch> {
        let view = self.buffer.all_view();
        let mut folded_pattern =
            vec![0u8; (pattern.len() + 1) * UTF8_MAX_BYTES * MAX_FOLDING_EXPANSION + 1];
        let len_search = self.case_folder.fold(&mut folded_pattern, pattern);
        while if forward { pos < end_pos } else { pos >= end_pos } {
            let mut width_first_character = 1;
            let mut pos_index_document = pos;
            let mut index_search = 0usize;
            let mut character_matches = true;
            loop {
                let lead = view.byte_at(pos_index_document);
                let mut width_char: Position = 1;
                let mut len_flat = 1usize;
                if utf8_is_ascii(lead) {
                    if pos_index_document + 1 > limit_pos {
                        break;
                    }
                    character_matches = folded_pattern[index_search] == make_lower_ascii(lead);
                } else {
                    let mut bytes = [0u8; UTF8_MAX_BYTES];
                    for (i, b) in bytes.iter_mut().enumerate() {
                        *b = view.byte_at(pos_index_document + i as Position);
                    }
                    width_char = utf8_classify(&bytes).unwrap_or(1) as Position;
                    if index_search == 0 {
                        width_first_character = width_char;
                    }
                    if pos_index_document + width_char > limit_pos {
                        break;
                    }
                    let mut folded = [0u8; UTF8_MAX_BYTES * MAX_FOLDING_EXPANSION + 1];
                    len_flat = self
                        .case_folder
                        .fold(&mut folded, &bytes[..width_char as usize]);
                    character_matches =
                        folded[..len_flat] == folded_pattern[index_search..index_search + len_flat];
                }
                if !character_matches {
                    break;
                }
                pos_index_document += width_char;
                index_search += len_flat;
                if index_search >= len_search {
                    break;
                }
            }
            if character_matches
                && index_search == len_search
                && self.matches_word_options(word, word_start, pos, pos_index_document - pos)
            {
                // The match length is the document length covered, which can
                // differ from the pattern length under folding.
                return Some(FindMatch {
                    position: pos,
                    length: pos_index_document - pos,
                });
            }
            if forward {
                pos += width_first_character;
            } else if !self.next_character(&mut pos, -1) {
                break;
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn find_folded_dbcs(
        &self,
        mut pos: Position,
        end_pos: Position,
        limit_pos: Position,
        pattern: &[u8],
        forward: bool,
        word: bool,
        word_start: bool,
    ) -> Option<FindMatch> {
        const MAX_BYTES_CHARACTER: usize = 2;
        let view = self.buffer.all_view();
        let mut folded_pattern =
            vec![0u8; (pattern.len() + 1) * MAX_BYTES_CHARACTER * MAX_FOLDING_EXPANSION + 1];
        let len_search = self.case_folder.fold(&mut folded_pattern, pattern);
        while if forward { pos < end_pos } else { pos >= end_pos } {
            let mut width_first_character: Position = 0;
            let mut index_document: Position = 0;
            let mut index_search = 0usize;
            let mut character_matches = true;
            loop {
                let lead = view.byte_at(pos + index_document);
                let width_char: Position = 1 + Position::from(self.is_dbcs_lead_byte(lead));
                if width_first_character == 0 {
                    width_first_character = width_char;
                }
                if pos + index_document + width_char > limit_pos {
                    break;
                }
                let mut len_flat = 1usize;
                if width_char == 1 {
                    character_matches = folded_pattern[index_search] == make_lower_ascii(lead);
                } else {
                    let bytes = [lead, view.byte_at(pos + index_document + 1)];
                    let mut folded = [0u8; MAX_BYTES_CHARACTER * MAX_FOLDING_EXPANSION + 1];
                    len_flat = self.case_folder.fold(&mut folded, &bytes);
                    character_matches =
                        folded[..len_flat] == folded_pattern[index_search..index_search + len_flat];
                }
                if !character_matches {
                    break;
                }
                index_document += width_char;
                index_search += len_flat;
                if index_search >= len_search {
                    break;
                }
            }
            if character_matches
                && index_search == len_search
                && self.matches_word_options(word, word_start, pos, index_document)
            {
                return Some(FindMatch {
                    position: pos,
                    length: index_document,
                });
            }
            if forward {
                pos += width_first_character.max(1);
            } else if !self.next_character(&mut pos, -1) {
                break;
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn find_folded_eight_bit(
        &self,
        mut pos: Position,
        start_pos: Position,
        end_pos: Position,
        limit_pos: Position,
        pattern: &[u8],
        forward: bool,
        word: bool,
        word_start: bool,
    ) -> Option<FindMatch> {
        let view = self.buffer.all_view();
        let length_find = pattern.len() as Position;
        let mut folded_pattern = vec![0u8; pattern.len() + 1];
        self.case_folder.fold(&mut folded_pattern, pattern);
        let end_search = if start_pos <= end_pos {
            end_pos - length_find + 1
        } else {
            end_pos
        };
        let increment: Position = if forward { 1 } else { -1 };
        while if forward { pos < end_search } else { pos >= end_search } {
            let mut found = pos + length_find <= limit_pos;
            let mut index: Position = 0;
            while found && index < length_find {
                let ch = view.byte_at(pos + index);
                let ch_test = folded_pattern[index as usize];
                if utf8_is_ascii(ch) {
                    found = ch_test == make_lower_ascii(ch);
                } else {
                    let mut folded = [0u8; MAX_FOLDING_EXPANSION];
                    let len = self.case_folder.fold(&mut folded, &[ch]);
                    found = len == 1 && folded[0] == ch_test;
                }
                index += 1;
            }
            if found && self.matches_word_options(word, word_start, pos, length_find) {
                return Some(FindMatch {
                    position: pos,
                    length: length_find,
                });
            }
            pos += increment;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentOptions;

    fn doc_with(text: &str) -> Document {
        let mut doc = Document::new(DocumentOptions::default());
        doc.set_dbcs_code_page(CP_UTF8);
        doc.insert_string(0, text.as_bytes()).unwrap();
        doc
    }

    fn find(
        doc: &mut Document,
        min: Position,
        max: Position,
        pattern: &str,
        flags: SearchFlags,
    ) -> Option<FindMatch> {
        doc.find_text(min, max, pattern.as_bytes(), flags).unwrap()
    }

    #[test]
    fn forward_finds_first_match() {
        let mut doc = doc_with("one two one two");
        let end = doc.length();
        let m = find(&mut doc, 0, end, "two", SearchFlags::MATCH_CASE).unwrap();
        assert_eq!((m.position, m.length), (4, 3));
    }

    #[test]
    fn backward_finds_last_match() {
        let mut doc = doc_with("one two one two");
        let end = doc.length();
        let m = find(&mut doc, end, 0, "two", SearchFlags::MATCH_CASE).unwrap();
        assert_eq!((m.position, m.length), (12, 3));
        let end = doc.length();
        let m = find(&mut doc, end, 0, "one", SearchFlags::MATCH_CASE).unwrap();
        assert_eq!(m.position, 8);
    }

    #[test]
    fn single_byte_pattern_both_directions() {
        let mut doc = doc_with("abcabc");
        let m = find(&mut doc, 0, 6, "c", SearchFlags::MATCH_CASE).unwrap();
        assert_eq!(m.position, 2);
        let m = find(&mut doc, 6, 0, "c", SearchFlags::MATCH_CASE).unwrap();
        assert_eq!(m.position, 5);
    }

    #[test]
    fn range_bounds_are_respected() {
        let mut doc = doc_with("xxabcxx");
        assert!(find(&mut doc, 0, 4, "abc", SearchFlags::MATCH_CASE).is_none());
        assert!(find(&mut doc, 3, 7, "abc", SearchFlags::MATCH_CASE).is_none());
        assert!(find(&mut doc, 2, 5, "abc", SearchFlags::MATCH_CASE).is_some());
    }

    #[test]
    fn empty_pattern_matches_at_start() {
        let mut doc = doc_with("abc");
        let m = find(&mut doc, 1, 3, "", SearchFlags::NONE).unwrap();
        assert_eq!((m.position, m.length), (1, 0));
    }

    #[test]
    fn case_insensitive_ascii() {
        let mut doc = doc_with("Hello World");
        let end = doc.length();
        let m = find(&mut doc, 0, end, "world", SearchFlags::NONE).unwrap();
        assert_eq!(m.position, 6);
        let end = doc.length();
        let m = find(&mut doc, 0, end, "HELLO", SearchFlags::NONE).unwrap();
        assert_eq!(m.position, 0);
    }

    #[test]
    fn case_insensitive_utf8_accents() {
        let mut doc = doc_with("un été chaud");
        let end = doc.length();
        let m = find(&mut doc, 0, end, "ÉTÉ", SearchFlags::NONE).unwrap();
        assert_eq!(m.position, 3);
        assert_eq!(m.length, 5); // "été" is five bytes
    }

    #[test]
    fn case_insensitive_utf8_backward() {
        let mut doc = doc_with("été ou ÉTÉ");
        let end = doc.length();
        let m = find(&mut doc, end, 0, "été", SearchFlags::NONE).unwrap();
        assert_eq!(m.position, 9);
    }

    #[test]
    fn whole_word_filter() {
        let mut doc = doc_with("cat catalog cat");
        let end = doc.length();
        let flags = SearchFlags::MATCH_CASE | SearchFlags::WHOLE_WORD;
        let m = find(&mut doc, 0, end, "cat", flags).unwrap();
        assert_eq!(m.position, 0);
        let m = find(&mut doc, 1, end, "cat", flags).unwrap();
        assert_eq!(m.position, 12);
    }

    #[test]
    fn word_start_filter() {
        let mut doc = doc_with("catalog cat");
        let end = doc.length();
        let flags = SearchFlags::MATCH_CASE | SearchFlags::WORD_START;
        let m = find(&mut doc, 0, end, "cat", flags).unwrap();
        assert_eq!(m.position, 0);
        let m = find(&mut doc, 1, end, "cat", flags).unwrap();
        assert_eq!(m.position, 8);
    }

    #[test]
    fn multibyte_needle_positions_stay_aligned() {
        let mut doc = doc_with("αβγαβγ");
        let end = doc.length();
        let m = find(&mut doc, 0, end, "γ", SearchFlags::MATCH_CASE).unwrap();
        assert_eq!(m.position, 4);
        let end = doc.length();
        let m = find(&mut doc, end, 0, "γ", SearchFlags::MATCH_CASE).unwrap();
        assert_eq!(m.position, 10);
    }

    #[test]
    fn dbcs_case_insensitive_search() {
        let mut doc = Document::new(DocumentOptions::default());
        doc.set_dbcs_code_page(932);
        // "Aあb" in Shift-JIS, searched case-insensitively.
        doc.insert_string(0, &[b'A', 0x82, 0xA0, b'b']).unwrap();
        let m = doc
            .find_text(0, 4, &[b'a', 0x82, 0xA0, b'B'], SearchFlags::NONE)
            .unwrap()
            .unwrap();
        assert_eq!((m.position, m.length), (0, 4));
    }

    #[test]
    fn eight_bit_case_insensitive() {
        let mut doc = Document::new(DocumentOptions::default());
        doc.insert_string(0, b"Latin Text").unwrap();
        let m = doc
            .find_text(0, 10, b"tEXT", SearchFlags::NONE)
            .unwrap()
            .unwrap();
        assert_eq!(m.position, 6);
    }
}
