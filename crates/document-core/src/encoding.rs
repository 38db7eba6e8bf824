//! Encoding classification.
//!
//! The document stores raw bytes and interprets them under a codepage: UTF-8,
//! a double-byte character set (DBCS), or a single-byte 8-bit encoding. This
//! module classifies codepages into families, validates UTF-8 sequences as
//! whole characters, and classifies DBCS lead/trail bytes for the supported
//! East Asian codepages.

/// Codepage identifier for UTF-8.
pub const CP_UTF8: i32 = 65001;

/// Maximum number of bytes in one UTF-8 character.
pub const UTF8_MAX_BYTES: usize = 4;

/// The longest UTF-8 byte length of a single combining sequence worth
/// protecting when segmenting text.
pub const LONGEST_UNICODE_CHARACTER_SEQUENCE_BYTES: usize = 16;

/// The Unicode replacement character U+FFFD, produced for invalid input.
pub const UNICODE_REPLACEMENT_CHAR: u32 = 0xFFFD;

/// Broad encoding family of a codepage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFamily {
    /// UTF-8: characters are 1..=4 bytes.
    Utf8,
    /// Double-byte character set: characters are 1 or 2 bytes with
    /// codepage-specific lead/trail ranges.
    Dbcs,
    /// Single-byte encoding: every byte is one character.
    EightBit,
}

/// Classify a codepage identifier into its encoding family.
///
/// Codepage 0 (and any unrecognised single-byte codepage) is `EightBit`.
pub fn family_of(codepage: i32) -> EncodingFamily {
    match codepage {
        CP_UTF8 => EncodingFamily::Utf8,
        932 | 936 | 949 | 950 | 1361 => EncodingFamily::Dbcs,
        _ => EncodingFamily::EightBit,
    }
}

/// True for bytes 0x00..=0x7F.
#[inline]
pub const fn utf8_is_ascii(byte: u8) -> bool {
    byte < 0x80
}

/// True for UTF-8 trail bytes 0x80..=0xBF.
#[inline]
pub const fn utf8_is_trail_byte(byte: u8) -> bool {
    (byte & 0xC0) == 0x80
}

/// Number of bytes a UTF-8 sequence starting with `lead` claims to occupy.
///
/// Invalid lead bytes (trail bytes, 0xC0, 0xC1, 0xF5..) claim one byte so a
/// scanner always makes progress.
#[inline]
pub const fn utf8_bytes_of_lead(lead: u8) -> usize {
    if lead < 0xC2 {
        1
    } else if lead < 0xE0 {
        2
    } else if lead < 0xF0 {
        3
    } else if lead < 0xF5 {
        4
    } else {
        1
    }
}

/// Validate the UTF-8 sequence at the front of `bytes` as one whole character.
///
/// Returns the byte width of the character when the sequence is a valid,
/// shortest-form, non-surrogate scalar; `None` otherwise. Only the first
/// `utf8_bytes_of_lead` bytes are examined.
pub fn utf8_classify(bytes: &[u8]) -> Option<usize> {
    let lead = *bytes.first()?;
    if utf8_is_ascii(lead) {
        return Some(1);
    }
    let width = utf8_bytes_of_lead(lead);
    if width == 1 || bytes.len() < width {
        return None;
    }
    for &b in &bytes[1..width] {
        if !utf8_is_trail_byte(b) {
            return None;
        }
    }
    // Shortest-form and scalar-range constraints on the second byte.
    let second = bytes[1];
    let valid = match lead {
        0xE0 => second >= 0xA0,
        0xED => second < 0xA0, // excludes surrogates D800..DFFF
        0xF0 => second >= 0x90,
        0xF4 => second < 0x90, // excludes > U+10FFFF
        _ => true,
    };
    if valid { Some(width) } else { None }
}

/// Decode the valid UTF-8 character at the front of `bytes`.
///
/// Callers must have validated the sequence with [`utf8_classify`] first.
pub fn unicode_from_utf8(bytes: &[u8]) -> u32 {
    let lead = bytes[0];
    match utf8_bytes_of_lead(lead) {
        2 => ((lead as u32 & 0x1F) << 6) | (bytes[1] as u32 & 0x3F),
        3 => {
            ((lead as u32 & 0x0F) << 12)
                | ((bytes[1] as u32 & 0x3F) << 6)
                | (bytes[2] as u32 & 0x3F)
        }
        4 => {
            ((lead as u32 & 0x07) << 18)
                | ((bytes[1] as u32 & 0x3F) << 12)
                | ((bytes[2] as u32 & 0x3F) << 6)
                | (bytes[3] as u32 & 0x3F)
        }
        _ => lead as u32,
    }
}

/// Encode `character` as UTF-8 into `out`, returning the byte width.
///
/// Invalid scalars encode as the replacement character.
pub fn utf8_from_unicode(character: u32, out: &mut [u8; UTF8_MAX_BYTES]) -> usize {
    match char::from_u32(character) {
        Some(ch) => ch.encode_utf8(&mut out[..]).len(),
        None => {
            let repl = char::from_u32(UNICODE_REPLACEMENT_CHAR).unwrap();
            repl.encode_utf8(&mut out[..]).len()
        }
    }
}

/// Lead/trail byte classification for one DBCS codepage.
///
/// Covers the codepages the engine recognises: 932 (Shift-JIS), 936 (GBK),
/// 949 (Korean Wansung), 950 (Big5) and 1361 (Korean Johab).
#[derive(Debug, Clone, Copy)]
pub struct DbcsClassifier {
    codepage: i32,
}

impl DbcsClassifier {
    /// Build a classifier for a DBCS codepage; `None` when the codepage is
    /// not double-byte.
    pub fn new(codepage: i32) -> Option<Self> {
        match codepage {
            932 | 936 | 949 | 950 | 1361 => Some(Self { codepage }),
            _ => None,
        }
    }

    /// The codepage this classifier was built for.
    pub fn codepage(&self) -> i32 {
        self.codepage
    }

    /// True when `byte` can start a two-byte character.
    pub fn is_lead_byte(&self, byte: u8) -> bool {
        match self.codepage {
            932 => matches!(byte, 0x81..=0x9F | 0xE0..=0xFC),
            936 | 949 | 950 => matches!(byte, 0x81..=0xFE),
            1361 => matches!(byte, 0x84..=0xD3 | 0xD8..=0xDE | 0xE0..=0xF9),
            _ => false,
        }
    }

    /// True when `byte` can be the second byte of a two-byte character.
    pub fn is_trail_byte(&self, byte: u8) -> bool {
        match self.codepage {
            932 => matches!(byte, 0x40..=0x7E | 0x80..=0xFC),
            936 => matches!(byte, 0x40..=0x7E | 0x80..=0xFE),
            949 => matches!(byte, 0x41..=0x5A | 0x61..=0x7A | 0x81..=0xFE),
            950 => matches!(byte, 0x40..=0x7E | 0xA1..=0xFE),
            1361 => matches!(byte, 0x31..=0x7E | 0x81..=0xFE),
            _ => false,
        }
    }

    /// The largest byte value that can never be a trail byte, minus nothing:
    /// positions holding bytes at or below this value are always character
    /// starts when scanning backwards.
    pub fn min_trail_byte(&self) -> u8 {
        match self.codepage {
            949 => 0x41,
            1361 => 0x31,
            _ => 0x40,
        }
    }
}

/// Per-codepage "safe byte" limits used by the search and brace-match scans.
///
/// A byte at or below the forward (backward) limit cannot be part of a
/// multi-byte character when scanning in that direction, so position snapping
/// can be skipped for it.
#[derive(Debug, Clone, Copy)]
pub struct SafeChars {
    /// Limit when scanning forwards.
    pub forward: u8,
    /// Limit when scanning backwards.
    pub backward: u8,
    /// Backward limit for pure-ASCII needles (brace matching).
    pub ascii_backward: u8,
}

impl SafeChars {
    /// Compute the limits for a codepage.
    pub fn for_codepage(codepage: i32) -> Self {
        match family_of(codepage) {
            EncodingFamily::EightBit => Self {
                forward: 0xFF,
                backward: 0xFF,
                ascii_backward: 0xFF,
            },
            EncodingFamily::Utf8 => Self {
                forward: 0x7F,
                backward: 0x7F,
                ascii_backward: 0xFF,
            },
            EncodingFamily::Dbcs => {
                let classify = DbcsClassifier::new(codepage).expect("dbcs codepage");
                let backward = classify.min_trail_byte() - 1;
                Self {
                    // minimum lead byte - 1
                    forward: 0x80,
                    backward,
                    ascii_backward: backward,
                }
            }
        }
    }
}
