//! Case folding for case-insensitive search.
//!
//! A case folder turns text into a normal form where strings that are equal
//! under case folding compare equal byte-wise. Folding a character may expand
//! it by up to four times its input width.

use crate::encoding::{UTF8_MAX_BYTES, utf8_classify, utf8_is_ascii};

/// Maximum expansion factor of a fold, per input character.
pub const MAX_FOLDING_EXPANSION: usize = 4;

/// A total case-folding transformation.
pub trait CaseFolder {
    /// Fold `mixed` into `folded`, returning the number of bytes written.
    ///
    /// Returns 0 when `folded` is too small for the result.
    fn fold(&self, folded: &mut [u8], mixed: &[u8]) -> usize;
}

/// Byte-table folder: identity except where a translation is installed.
///
/// The default table lower-cases ASCII letters.
pub struct CaseFolderTable {
    mapping: [u8; 256],
}

impl CaseFolderTable {
    /// Build the default table (ASCII lower-casing).
    pub fn new() -> Self {
        let mut mapping = [0u8; 256];
        for (i, slot) in mapping.iter_mut().enumerate() {
            *slot = (i as u8).to_ascii_lowercase();
        }
        Self { mapping }
    }

    /// Install a single-byte translation, for 8-bit codepages with letters
    /// above ASCII.
    pub fn set_translation(&mut self, ch: u8, translation: u8) {
        self.mapping[ch as usize] = translation;
    }
}

impl Default for CaseFolderTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseFolder for CaseFolderTable {
    fn fold(&self, folded: &mut [u8], mixed: &[u8]) -> usize {
        if folded.len() < mixed.len() {
            return 0;
        }
        for (dst, &src) in folded.iter_mut().zip(mixed) {
            *dst = self.mapping[src as usize];
        }
        mixed.len()
    }
}

/// Unicode folder for UTF-8 text: ASCII through the byte table, everything
/// else through Unicode lower-case mapping.
pub struct CaseFolderUnicode {
    table: CaseFolderTable,
}

impl CaseFolderUnicode {
    /// Build the folder.
    pub fn new() -> Self {
        Self {
            table: CaseFolderTable::new(),
        }
    }
}

impl Default for CaseFolderUnicode {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseFolder for CaseFolderUnicode {
    fn fold(&self, folded: &mut [u8], mixed: &[u8]) -> usize {
        let mut written = 0;
        let mut index = 0;
        while index < mixed.len() {
            let lead = mixed[index];
            if utf8_is_ascii(lead) {
                if written >= folded.len() {
                    return 0;
                }
                folded[written] = self.table.mapping[lead as usize];
                written += 1;
                index += 1;
                continue;
            }
            match utf8_classify(&mixed[index..]) {
                Some(width) => {
                    let text = std::str::from_utf8(&mixed[index..index + width])
                        .expect("validated utf-8");
                    let ch = text.chars().next().expect("one character");
                    let mut buf = [0u8; UTF8_MAX_BYTES];
                    for lower in ch.to_lowercase() {
                        let encoded = lower.encode_utf8(&mut buf);
                        if written + encoded.len() > folded.len() {
                            return 0;
                        }
                        folded[written..written + encoded.len()]
                            .copy_from_slice(encoded.as_bytes());
                        written += encoded.len();
                    }
                    index += width;
                }
                None => {
                    // Invalid byte passes through so search can still walk it.
                    if written >= folded.len() {
                        return 0;
                    }
                    folded[written] = lead;
                    written += 1;
                    index += 1;
                }
            }
        }
        written
    }
}
