//! `document-core-lexer-simple` - Simple (regex-based) lexing for `document-core`.
//!
//! This crate is intended for lightweight formats (JSON/INI/config files)
//! where a full lexer is unnecessary: a list of regex rules assigns style
//! bytes line by line, and fold levels follow `{`/`}` nesting. Install it on
//! a document through [`document_core::LexerHandle`].

use document_core::{Document, FoldLevel, Lexer, Position};
use regex::Regex;

/// A single regex styling rule. Rules are applied in order; later rules
/// overwrite earlier ones where they overlap.
#[derive(Debug, Clone)]
pub struct StyleRule {
    regex: Regex,
    style: u8,
}

impl StyleRule {
    /// Build a rule assigning `style` to every match of `pattern`.
    pub fn new(pattern: &str, style: u8) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            style,
        })
    }

    /// The style byte this rule assigns.
    pub fn style(&self) -> u8 {
        self.style
    }
}

/// Style bytes used by the default grammars.
pub const STYLE_DEFAULT: u8 = 0;
/// Style byte for string literals.
pub const STYLE_STRING: u8 = 1;
/// Style byte for numbers.
pub const STYLE_NUMBER: u8 = 2;
/// Style byte for keywords.
pub const STYLE_KEYWORD: u8 = 3;
/// Style byte for comments.
pub const STYLE_COMMENT: u8 = 4;

/// A regex-rule lexer with `{`/`}` fold levels.
///
/// Not a full parser: rules see one line at a time, so multi-line constructs
/// keep the default style.
pub struct SimpleLexer {
    rules: Vec<StyleRule>,
}

impl SimpleLexer {
    /// Build a lexer from styling rules.
    pub fn new(rules: Vec<StyleRule>) -> Self {
        Self { rules }
    }

    /// The installed rules.
    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    /// A small default JSON grammar (strings, numbers, keywords).
    pub fn json_default() -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            StyleRule::new(r#""(?:\\.|[^"\\])*""#, STYLE_STRING)?,
            StyleRule::new(r"-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?", STYLE_NUMBER)?,
            StyleRule::new(r"\b(?:true|false|null)\b", STYLE_KEYWORD)?,
        ]))
    }

    /// A small default INI grammar (sections, keys, comments).
    pub fn ini_default() -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            StyleRule::new(r"^\s*\[[^\]]+\]\s*$", STYLE_KEYWORD)?,
            StyleRule::new(r"^\s*[^=\s]+", STYLE_STRING)?,
            StyleRule::new(r"^\s*[;#].*$", STYLE_COMMENT)?,
        ]))
    }

    fn styles_for_line(&self, text: &str) -> Vec<u8> {
        let mut styles = vec![STYLE_DEFAULT; text.len()];
        for rule in &self.rules {
            for m in rule.regex.find_iter(text) {
                for slot in &mut styles[m.start()..m.end()] {
                    *slot = rule.style;
                }
            }
        }
        styles
    }
}

impl Lexer for SimpleLexer {
    fn lex(&mut self, start: Position, len: Position, _init_style: i32, doc: &mut Document) {
        let first_line = doc.line_from_position(start);
        let last_line = doc.line_from_position(start + len - 1);
        doc.start_styling(start);
        for line in first_line..=last_line {
            let line_start = doc.line_start(line);
            let next_start = doc.line_start(line + 1);
            let line_end = doc.line_end(line);
            let bytes = doc.text_range(line_start, line_end - line_start);
            let text = String::from_utf8_lossy(&bytes);
            // Lossy decoding changes byte offsets on invalid UTF-8; style
            // such lines with the default only.
            let styles = if text.len() == bytes.len() {
                self.styles_for_line(&text)
            } else {
                vec![STYLE_DEFAULT; bytes.len()]
            };
            // Clip to the requested range: the first and last lines may be
            // partially covered.
            let from = start.max(line_start);
            let to = (start + len).min(line_end);
            if from < to {
                let begin = (from - line_start) as usize;
                let end = (to - line_start) as usize;
                doc.set_styles(&styles[begin..end.min(styles.len())]);
            }
            // End-of-line bytes keep the default style.
            let eol_from = line_end.max(from);
            let eol_to = (start + len).min(next_start);
            if eol_from < eol_to {
                doc.set_style_for(eol_to - eol_from, STYLE_DEFAULT);
            }
        }
    }

    fn fold(&mut self, start: Position, len: Position, _init_style: i32, doc: &mut Document) {
        let first_line = doc.line_from_position(start);
        let last_line = doc.line_from_position(start + len - 1);
        let mut level = if first_line > 0 {
            doc.get_fold_level(first_line).number()
        } else {
            FoldLevel::BASE
        };
        for line in first_line..=last_line {
            let line_start = doc.line_start(line);
            let line_end = doc.line_end(line);
            let bytes = doc.text_range(line_start, line_end - line_start);
            let opens = bytes.iter().filter(|&&b| b == b'{').count() as i32;
            let closes = bytes.iter().filter(|&&b| b == b'}').count() as i32;
            let next_level = (level + opens - closes).max(FoldLevel::BASE);
            let mut line_level = level;
            if opens > closes {
                line_level |= FoldLevel::HEADER;
            }
            if bytes.iter().all(|b| b.is_ascii_whitespace()) {
                line_level |= FoldLevel::WHITE;
            }
            doc.set_level(line, line_level);
            level = next_level;
        }
    }
}
