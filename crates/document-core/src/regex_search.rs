//! Regular-expression search driver.
//!
//! Two interchangeable backends share one contract: find a match in a
//! position range (forward or backward) and expose capture positions for
//! substitution. The built-in backend runs the byte-indexed matcher from
//! [`crate::re_nfa`] line by line; the library backend compiles the pattern
//! with the `regex` crate (`regex::bytes`, so captures stay byte positions)
//! and is selected with [`SearchFlags::LIBRARY_REGEX`]. Compiled library
//! patterns are cached keyed by (flags, pattern bytes).

use regex::bytes::{Regex, RegexBuilder};
use tracing::debug;

use crate::document::{Document, is_valid_index};
use crate::re_nfa::{CharacterIndexer, MAXTAG, NfaRegex};
use crate::search::{FindMatch, SearchError, SearchFlags};
use crate::{Line, Position};

const NOTFOUND: Position = -1;

/// A search range with the bookkeeping the line-by-line drivers need.
///
/// Endpoints are snapped outside multi-byte characters and CR/LF pairs;
/// `increment` is -1 for backward searches (`min_pos > max_pos`).
#[derive(Debug, Clone, Copy)]
pub struct RESearchRange {
    /// +1 forward, -1 backward.
    pub increment: i32,
    /// Snapped search start.
    pub start_pos: Position,
    /// Snapped search end.
    pub end_pos: Position,
    /// Line holding `start_pos`.
    pub line_range_start: Line,
    /// Line holding `end_pos`.
    pub line_range_end: Line,
    /// One line past `line_range_end` in the iteration direction.
    pub line_range_break: Line,
}

impl RESearchRange {
    /// Build the range for a search from `min_pos` to `max_pos`.
    pub fn new(doc: &Document, min_pos: Position, max_pos: Position) -> Self {
        let increment = if min_pos <= max_pos { 1 } else { -1 };
        // Range endpoints should not be inside DBCS characters or between a
        // CR and LF, but just in case, move them.
        let start_pos = doc.move_position_outside_char(min_pos, 1, true);
        let end_pos = doc.move_position_outside_char(max_pos, 1, true);
        let line_range_start = doc.line_from_position(start_pos);
        let line_range_end = doc.line_from_position(end_pos);
        Self {
            increment,
            start_pos,
            end_pos,
            line_range_start,
            line_range_end,
            line_range_break: line_range_end + increment as Line,
        }
    }

    /// Clip the physical bounds of `line` to the search range.
    pub fn line_range(
        &self,
        line: Line,
        line_start_pos: Position,
        line_end_pos: Position,
    ) -> (Position, Position) {
        let mut range = (line_start_pos, line_end_pos);
        if self.increment > 0 {
            if line == self.line_range_start {
                range.0 = self.start_pos;
            }
            if line == self.line_range_end {
                range.1 = self.end_pos;
            }
        } else {
            if line == self.line_range_end {
                range.0 = self.end_pos;
            }
            if line == self.line_range_start {
                range.1 = self.start_pos;
            }
        }
        range
    }
}

/// Byte access for the matcher, bounded at the end of the searched range.
struct DocumentIndexer<'a> {
    doc: &'a Document,
    end: Position,
}

impl CharacterIndexer for DocumentIndexer<'_> {
    fn char_at(&self, pos: Position) -> u8 {
        if is_valid_index(pos, self.end) {
            self.doc.char_at(pos)
        } else {
            0
        }
    }

    fn move_position_outside_char(&self, pos: Position, move_dir: i32) -> Position {
        self.doc.move_position_outside_char(pos, move_dir, false)
    }
}

struct CachedRegex {
    flags: SearchFlags,
    pattern: Vec<u8>,
    regex: Regex,
}

/// The regex engine state owned by a document: capture positions of the last
/// match plus the cached library pattern.
pub(crate) struct RegexBackend {
    bopat: [Position; MAXTAG],
    eopat: [Position; MAXTAG],
    cached: Option<CachedRegex>,
}

impl Default for RegexBackend {
    fn default() -> Self {
        Self {
            bopat: [NOTFOUND; MAXTAG],
            eopat: [NOTFOUND; MAXTAG],
            cached: None,
        }
    }
}

impl RegexBackend {
    pub(crate) fn find_text(
        &mut self,
        doc: &Document,
        min_pos: Position,
        max_pos: Position,
        pattern: &[u8],
        flags: SearchFlags,
    ) -> Result<Option<FindMatch>, SearchError> {
        let resr = RESearchRange::new(doc, min_pos, max_pos);
        if flags.contains(SearchFlags::LIBRARY_REGEX) {
            self.library_find_text(doc, &resr, pattern, flags)
        } else {
            self.builtin_find_text(doc, &resr, pattern, flags)
        }
    }

    fn builtin_find_text(
        &mut self,
        doc: &Document,
        resr: &RESearchRange,
        pattern: &[u8],
        flags: SearchFlags,
    ) -> Result<Option<FindMatch>, SearchError> {
        let match_case = flags.contains(SearchFlags::MATCH_CASE);
        let mut search =
            NfaRegex::compile(pattern, match_case, &doc.char_class).map_err(|message| {
                debug!(message = %message, "builtin regex rejected pattern");
                SearchError::BadPattern(message)
            })?;

        let search_for_line_start = pattern[0] == b'^';
        let search_end = pattern[pattern.len() - 1];
        let search_end_prev = if pattern.len() > 1 {
            pattern[pattern.len() - 2]
        } else {
            0
        };
        let search_for_line_end = search_end == b'$' && search_end_prev != b'\\';

        let mut line = resr.line_range_start;
        while line != resr.line_range_break {
            let line_start_pos = doc.line_start(line);
            let line_end_pos = doc.line_end(line);
            let mut start_of_line = line_start_pos;
            let mut end_of_line = line_end_pos;
            if resr.increment > 0 {
                if line == resr.line_range_start {
                    if resr.start_pos != start_of_line && search_for_line_start {
                        // Can't match the start of the line when starting
                        // after it.
                        line += resr.increment as Line;
                        continue;
                    }
                    start_of_line = resr.start_pos;
                }
                if line == resr.line_range_end {
                    if resr.end_pos != end_of_line && search_for_line_end {
                        line += resr.increment as Line;
                        continue;
                    }
                    end_of_line = resr.end_pos;
                }
            } else {
                if line == resr.line_range_end {
                    if resr.end_pos != start_of_line && search_for_line_start {
                        line += resr.increment as Line;
                        continue;
                    }
                    start_of_line = resr.end_pos;
                }
                if line == resr.line_range_start {
                    if resr.start_pos != end_of_line && search_for_line_end {
                        line += resr.increment as Line;
                        continue;
                    }
                    end_of_line = resr.start_pos;
                }
            }

            let di = DocumentIndexer {
                doc,
                end: end_of_line,
            };
            search.set_line_range(line_start_pos, line_end_pos);
            let mut success = search.execute(&di, start_of_line, end_of_line);
            if success {
                let mut end_pos = search.eopat[0];
                // There can be only one start of a line, so no need to look
                // for the last match when anchored.
                if resr.increment < 0 && !search_for_line_start {
                    // Check for the last match on this line.
                    while success && end_pos < end_of_line {
                        let bopat = search.bopat;
                        let eopat = search.eopat;
                        let mut pos = end_pos;
                        if pos == bopat[0] {
                            // Empty match: advance to avoid a fixed point.
                            pos = doc.next_position(pos, 1);
                        }
                        success = search.execute(&di, pos, end_of_line);
                        if success {
                            end_pos = search.eopat[0];
                        } else {
                            search.bopat = bopat;
                            search.eopat = eopat;
                        }
                    }
                }
                self.bopat = search.bopat;
                self.eopat = search.eopat;
                let pos = search.bopat[0];
                return Ok(Some(FindMatch {
                    position: pos,
                    length: end_pos - pos,
                }));
            }
            line += resr.increment as Line;
        }
        Ok(None)
    }

    fn library_regex(
        &mut self,
        pattern: &[u8],
        flags: SearchFlags,
    ) -> Result<&Regex, SearchError> {
        let cached_matches = self
            .cached
            .as_ref()
            .is_some_and(|c| c.flags == flags && c.pattern == pattern);
        if !cached_matches {
            let pattern_str = std::str::from_utf8(pattern)
                .map_err(|e| SearchError::BadPattern(format!("pattern is not UTF-8: {e}")))?;
            let regex = RegexBuilder::new(pattern_str)
                .case_insensitive(!flags.contains(SearchFlags::MATCH_CASE))
                .multi_line(true)
                .dot_matches_new_line(flags.contains(SearchFlags::DOT_MATCHES_ALL))
                .build()
                .map_err(SearchError::InvalidRegex)?;
            self.cached = Some(CachedRegex {
                flags,
                pattern: pattern.to_vec(),
                regex,
            });
        }
        Ok(&self.cached.as_ref().expect("cached above").regex)
    }

    fn library_find_text(
        &mut self,
        doc: &Document,
        resr: &RESearchRange,
        pattern: &[u8],
        flags: SearchFlags,
    ) -> Result<Option<FindMatch>, SearchError> {
        self.library_regex(pattern, flags)?;
        let regex = &self.cached.as_ref().expect("compiled").regex;
        self.bopat = [NOTFOUND; MAXTAG];
        self.eopat = [NOTFOUND; MAXTAG];

        if resr.increment > 0 {
            // One multiline pass over the whole range.
            let base = doc.line_start(resr.line_range_start);
            let haystack = doc.text_range(base, resr.end_pos - base);
            let offset = (resr.start_pos - base) as usize;
            if let Some(captures) = regex.captures_at(&haystack, offset) {
                let whole = captures.get(0).expect("group 0 always present");
                for (slot, group) in captures.iter().take(MAXTAG).enumerate() {
                    if let Some(group) = group {
                        self.bopat[slot] = base + group.start() as Position;
                        self.eopat[slot] = base + group.end() as Position;
                    }
                }
                return Ok(Some(FindMatch {
                    position: base + whole.start() as Position,
                    length: (whole.end() - whole.start()) as Position,
                }));
            }
            return Ok(None);
        }

        // Backward: line by line, keeping the last match in the line.
        let mut line = resr.line_range_start;
        while line != resr.line_range_break {
            let line_start_pos = doc.line_start(line);
            let line_end_pos = doc.line_end(line);
            let (range_start, range_end) = resr.line_range(line, line_start_pos, line_end_pos);
            let haystack = doc.text_range(line_start_pos, line_end_pos - line_start_pos);
            let rel_start = (range_start - line_start_pos) as usize;
            let rel_end = (range_end - line_start_pos) as usize;
            let mut last: Option<(Position, Position)> = None;
            for captures in regex.captures_iter(&haystack) {
                let whole = captures.get(0).expect("group 0 always present");
                if whole.start() < rel_start || whole.end() > rel_end {
                    continue;
                }
                last = Some((
                    line_start_pos + whole.start() as Position,
                    line_start_pos + whole.end() as Position,
                ));
                self.bopat = [NOTFOUND; MAXTAG];
                self.eopat = [NOTFOUND; MAXTAG];
                for (slot, group) in captures.iter().take(MAXTAG).enumerate() {
                    if let Some(group) = group {
                        self.bopat[slot] = line_start_pos + group.start() as Position;
                        self.eopat[slot] = line_start_pos + group.end() as Position;
                    }
                }
            }
            if let Some((start, end)) = last {
                return Ok(Some(FindMatch {
                    position: start,
                    length: end - start,
                }));
            }
            line += resr.increment as Line;
        }
        Ok(None)
    }

    /// Expand a replacement template: `\0`..`\9` copy the capture from the
    /// live document, C escapes map to their bytes, and any other escape
    /// keeps the backslash.
    pub(crate) fn substitute_by_position(&self, doc: &Document, text: &[u8]) -> Vec<u8> {
        let mut substituted = Vec::new();
        let mut j = 0;
        while j < text.len() {
            let byte = text[j];
            if byte == b'\\' {
                let Some(&next) = text.get(j + 1) else {
                    substituted.push(b'\\');
                    break;
                };
                j += 1;
                match next {
                    b'0'..=b'9' => {
                        let pat = (next - b'0') as usize;
                        let start = self.bopat[pat];
                        let len = self.eopat[pat] - start;
                        // Null when referencing a group that did not match.
                        if start >= 0 && len > 0 {
                            substituted.extend_from_slice(&doc.text_range(start, len));
                        }
                    }
                    b'a' => substituted.push(0x07),
                    b'b' => substituted.push(0x08),
                    b'f' => substituted.push(0x0C),
                    b'n' => substituted.push(b'\n'),
                    b'r' => substituted.push(b'\r'),
                    b't' => substituted.push(b'\t'),
                    b'v' => substituted.push(0x0B),
                    b'\\' => substituted.push(b'\\'),
                    _ => {
                        substituted.push(b'\\');
                        j -= 1;
                    }
                }
            } else {
                substituted.push(byte);
            }
            j += 1;
        }
        substituted
    }
}
