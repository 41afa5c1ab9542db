//! Character category classification (`char.bin`).
//!
//! Packs, per code point, a category index plus flags controlling how the
//! unknown-word heuristics in [`Tokenizer`](crate::tokenizer::Tokenizer)
//! group runs of same-category characters into candidate morphemes.

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::error::{KotobaError, Result};
use crate::utf8::utf8_to_code_unit;

/// Longest run of category-matching characters grouped into a single
/// unknown-word candidate before the candidate is discarded.
const MAX_GROUPING_SIZE: usize = 24;

/// `(default_type, char_type, char_count, group, invoke)`, the five fields
/// packed into one 32-bit record per code point.
pub type CharInfo = (u8, u32, u8, u8, u8);

pub struct CharProperty {
    category_names: Vec<String>,
    mmap: Mmap,
    offset: usize,
}

impl CharProperty {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| KotobaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|source| KotobaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if mmap.len() < 4 {
            return Err(KotobaError::FormatError {
                path: path.to_path_buf(),
                reason: "file shorter than the category count header".to_string(),
            });
        }
        let num_categories = u32::from_le_bytes(mmap[0..4].try_into().unwrap()) as usize;
        let header_len = 4 + num_categories * 32;
        if mmap.len() < header_len {
            return Err(KotobaError::FormatError {
                path: path.to_path_buf(),
                reason: "file shorter than the category name table".to_string(),
            });
        }

        let mut category_names = Vec::with_capacity(num_categories);
        for i in 0..num_categories {
            let start = 4 + i * 32;
            let name_bytes = &mmap[start..start + 32];
            let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(32);
            category_names.push(String::from_utf8_lossy(&name_bytes[..end]).into_owned());
        }

        let offset = header_len;
        if mmap.len() < offset + 0x10000 * 4 {
            return Err(KotobaError::FormatError {
                path: path.to_path_buf(),
                reason: "file shorter than the 64Ki code point record table".to_string(),
            });
        }

        Ok(CharProperty {
            category_names,
            mmap,
            offset,
        })
    }

    pub fn category_names(&self) -> &[String] {
        &self.category_names
    }

    fn record(&self, code_point: u16) -> u32 {
        let start = self.offset + code_point as usize * 4;
        u32::from_le_bytes(self.mmap[start..start + 4].try_into().unwrap())
    }

    /// The 18-bit char_type bitmask only, without unpacking the other
    /// fields. Used on the hot path while scanning a grouping run.
    pub fn get_char_type(&self, code_point: u16) -> u32 {
        self.record(code_point) & 0x3FFFF
    }

    pub fn get_char_info(&self, code_point: u16) -> CharInfo {
        let v = self.record(code_point);
        (
            ((v >> 18) & 0xFF) as u8,
            v & 0x3FFFF,
            ((v >> 26) & 0xF) as u8,
            ((v >> 30) & 0x1) as u8,
            ((v >> 31) & 0x1) as u8,
        )
    }

    /// Greedily scans forward through `bytes` collecting characters whose
    /// `char_type` mask has `default_type`'s bit set. Returns the byte
    /// length of the run, or `-1` if it exceeds `MAX_GROUPING_SIZE + 1`.
    fn get_group_length(&self, bytes: &[u8], default_type: u8) -> isize {
        let mut i = 0usize;
        let mut char_count = 0usize;
        while i < bytes.len() {
            let (ch16, ln) = utf8_to_code_unit(bytes, i);
            if (1u32 << default_type) & self.get_char_type(ch16) != 0 {
                i += ln;
                char_count += 1;
                if char_count > MAX_GROUPING_SIZE + 1 {
                    return -1;
                }
            } else {
                break;
            }
        }
        i as isize
    }

    /// Collects exactly `count` consecutive category-matching characters,
    /// returning the total byte length or `-1` on the first mismatch or
    /// end of input.
    fn get_count_length(&self, bytes: &[u8], default_type: u8, count: usize) -> isize {
        let mut i = 0usize;
        let mut j = 0usize;
        while j < count {
            if i >= bytes.len() {
                return -1;
            }
            let (ch16, ln) = utf8_to_code_unit(bytes, i);
            if (1u32 << default_type) & self.get_char_type(ch16) == 0 {
                return -1;
            }
            i += ln;
            j += 1;
        }
        i as isize
    }

    /// Computes the candidate unknown-word lengths for the text starting at
    /// `bytes[0]`: `(default_type, byte_lengths, invoke)`.
    pub fn get_unknown_lengths(&self, bytes: &[u8]) -> (u8, Vec<usize>, bool) {
        let mut lengths = Vec::new();
        let (ch16, first_len) = utf8_to_code_unit(bytes, 0);
        let (default_type, _char_type, count, group, invoke) = self.get_char_info(ch16);

        if group != 0 {
            let ln = self.get_group_length(bytes, default_type);
            if ln > 0 {
                lengths.push(ln as usize);
            }
        }
        if count != 0 {
            for n in 1..=(count as usize) {
                let ln = self.get_count_length(bytes, default_type, n);
                if ln < 0 {
                    break;
                }
                lengths.push(ln as usize);
            }
        }
        if lengths.is_empty() {
            lengths.push(first_len);
        }

        (default_type, lengths, invoke == 1)
    }
}
