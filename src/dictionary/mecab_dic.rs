//! MeCab binary dictionary reader: double-array trie prefix search plus
//! token table / feature string retrieval. Used for the system dictionary,
//! an optional user dictionary, and the unknown-word dictionary — all three
//! share this exact file format.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use byteorder::{ByteOrder, LittleEndian};
use fxhash::FxBuildHasher;
use memmap2::{Mmap, MmapOptions};

use crate::char_property::CharProperty;
use crate::error::{KotobaError, Result};

/// XOR mask applied to the first header word; MeCab obfuscates the magic
/// number so dictionary files aren't mistaken for plain data.
const MAGIC_XOR: u32 = 0xef718f77;
const HEADER_LEN: usize = 72;

/// One row of the token table, carrying views into both the mmapped
/// dictionary (`feature`) and the caller's input buffer (`original`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DicEntry<'m, 'i> {
    pub original: &'i [u8],
    pub lc_attr: u16,
    pub rc_attr: u16,
    pub posid: u16,
    pub wcost: i16,
    pub feature: &'m [u8],
    pub skip: bool,
}

/// Decoded fields of one 16-byte token row, minus the `original`/`skip`
/// context supplied by the caller. Cached by `(token_index, count)` since
/// the same index range is looked up repeatedly within one analysis.
#[derive(Clone)]
struct RawRow {
    lc_attr: u16,
    rc_attr: u16,
    posid: u16,
    wcost: i16,
    feature_start: usize,
    feature_end: usize,
}

const CACHE_CAPACITY: usize = 1024;

struct DecodeCache {
    map: HashMap<(u32, u8), Vec<RawRow>, FxBuildHasher>,
    order: VecDeque<(u32, u8)>,
}

impl DecodeCache {
    fn new() -> Self {
        DecodeCache {
            map: HashMap::with_hasher(FxBuildHasher::default()),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &(u32, u8)) -> Option<Vec<RawRow>> {
        self.map.get(key).cloned()
    }

    fn insert(&mut self, key: (u32, u8), rows: Vec<RawRow>) {
        if !self.map.contains_key(&key) {
            if self.order.len() >= CACHE_CAPACITY {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
            self.order.push_back(key);
        }
        self.map.insert(key, rows);
    }
}

pub struct MecabDic {
    mmap: Mmap,
    da_offset: usize,
    token_offset: usize,
    feature_offset: usize,
    cache: Mutex<DecodeCache>,
}

impl MecabDic {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| KotobaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|source| KotobaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if mmap.len() < HEADER_LEN {
            return Err(KotobaError::FormatError {
                path: path.to_path_buf(),
                reason: "file shorter than the 72-byte header".to_string(),
            });
        }

        let magic = LittleEndian::read_u32(&mmap[0..4]) ^ MAGIC_XOR;
        // MeCab dictionaries store the file's own size as the obfuscated
        // first word; any value is structurally valid, so there's nothing
        // further to check about `magic` beyond having read it.
        let _size = magic;
        let _version = LittleEndian::read_u32(&mmap[4..8]);
        let _dictype = LittleEndian::read_u32(&mmap[8..12]);
        let _lexsize = LittleEndian::read_u32(&mmap[12..16]);
        let _lsize = LittleEndian::read_u32(&mmap[16..20]);
        let _rsize = LittleEndian::read_u32(&mmap[20..24]);
        let dsize = LittleEndian::read_u32(&mmap[24..28]) as usize;
        let tsize = LittleEndian::read_u32(&mmap[28..32]) as usize;
        let _fsize = LittleEndian::read_u32(&mmap[32..36]) as usize;
        let dummy = LittleEndian::read_u32(&mmap[36..40]);
        if dummy != 0 {
            return Err(KotobaError::FormatError {
                path: path.to_path_buf(),
                reason: format!("expected reserved header word to be 0, got {dummy}"),
            });
        }

        let da_offset = HEADER_LEN;
        let token_offset = da_offset + dsize;
        let feature_offset = token_offset + tsize;
        if mmap.len() < feature_offset {
            return Err(KotobaError::FormatError {
                path: path.to_path_buf(),
                reason: "file shorter than header-declared trie + token table size".to_string(),
            });
        }

        Ok(MecabDic {
            mmap,
            da_offset,
            token_offset,
            feature_offset,
            cache: Mutex::new(DecodeCache::new()),
        })
    }

    fn get_base_check(&self, idx: i64) -> (i32, u32) {
        let offset = (self.da_offset as i64 + idx * 8) as usize;
        let base = LittleEndian::read_i32(&self.mmap[offset..offset + 4]);
        let check = LittleEndian::read_u32(&self.mmap[offset + 4..offset + 8]);
        (base, check)
    }

    /// Returns only the final leaf value for an exact match of `bytes`, or
    /// `-1` if `bytes` isn't a key in the trie.
    pub fn exact_match_search(&self, bytes: &[u8]) -> i64 {
        let mut v: i64 = -1;
        let (mut b, _) = self.get_base_check(0);

        for &byte in bytes {
            let p = b as i64 + byte as i64 + 1;
            let (base, check) = self.get_base_check(p);
            if b as u32 == check {
                b = base;
            } else {
                return v;
            }
        }

        let (n, check) = self.get_base_check(b as i64);
        if b as u32 == check && n < 0 {
            v = -(n as i64) - 1;
        }
        v
    }

    /// Returns `(value, consumed_bytes)` for every prefix of `bytes` that is
    /// a dictionary key, shortest first.
    pub fn common_prefix_search(&self, bytes: &[u8]) -> Vec<(u32, usize)> {
        let mut results = Vec::new();
        let (mut b, _) = self.get_base_check(0);

        for (i, &byte) in bytes.iter().enumerate() {
            let (n, check) = self.get_base_check(b as i64);
            if b as u32 == check && n < 0 {
                results.push(((-(n as i64) - 1) as u32, i));
            }
            let p = b as i64 + byte as i64 + 1;
            let (base, check) = self.get_base_check(p);
            if b as u32 == check {
                b = base;
            } else {
                return results;
            }
        }

        let (n, check) = self.get_base_check(b as i64);
        if b as u32 == check && n < 0 {
            results.push(((-(n as i64) - 1) as u32, bytes.len()));
        }
        results
    }

    fn decode_rows(&self, idx: u32, count: u8) -> Vec<RawRow> {
        if let Some(cached) = self.cache.lock().unwrap().get(&(idx, count)) {
            return cached;
        }

        let mut rows = Vec::with_capacity(count as usize);
        let start = self.token_offset + idx as usize * 16;
        for i in 0..count as usize {
            let row_off = start + i * 16;
            let lc_attr = LittleEndian::read_u16(&self.mmap[row_off..row_off + 2]);
            let rc_attr = LittleEndian::read_u16(&self.mmap[row_off + 2..row_off + 4]);
            let posid = LittleEndian::read_u16(&self.mmap[row_off + 4..row_off + 6]);
            let wcost = LittleEndian::read_i16(&self.mmap[row_off + 6..row_off + 8]);
            let feature_off = LittleEndian::read_u32(&self.mmap[row_off + 8..row_off + 12]) as usize;
            // bytes [12..16) are the reserved "compound" field; unused here.

            let feature_start = self.feature_offset + feature_off;
            let mut k = feature_start;
            while self.mmap[k] != 0 {
                k += 1;
            }

            rows.push(RawRow {
                lc_attr,
                rc_attr,
                posid,
                wcost,
                feature_start,
                feature_end: k,
            });
        }

        self.cache.lock().unwrap().insert((idx, count), rows.clone());
        rows
    }

    /// Decodes `count` consecutive token rows starting at `idx`, attaching
    /// `original` and `skip` to every resulting entry.
    pub fn get_entries_by_index<'m, 'i>(
        &'m self,
        idx: u32,
        count: u8,
        original: &'i [u8],
        skip: bool,
    ) -> Vec<DicEntry<'m, 'i>> {
        self.decode_rows(idx, count)
            .into_iter()
            .map(|row| DicEntry {
                original,
                lc_attr: row.lc_attr,
                rc_attr: row.rc_attr,
                posid: row.posid,
                wcost: row.wcost,
                feature: &self.mmap[row.feature_start..row.feature_end],
                skip,
            })
            .collect()
    }

    /// Unpacks a trie leaf value into `(token_index, count)` and decodes it.
    pub fn get_entries<'m, 'i>(
        &'m self,
        packed: u32,
        original: &'i [u8],
        skip: bool,
    ) -> Vec<DicEntry<'m, 'i>> {
        self.get_entries_by_index(packed >> 8, (packed & 0xFF) as u8, original, skip)
    }

    /// All dictionary entries matching a prefix of `bytes`, shortest match
    /// first; `original` for each entry is the matched prefix itself.
    pub fn lookup<'m, 'i>(&'m self, bytes: &'i [u8]) -> Vec<DicEntry<'m, 'i>> {
        let mut results = Vec::new();
        for (packed, ln) in self.common_prefix_search(bytes) {
            results.extend(self.get_entries(packed, &bytes[..ln], false));
        }
        results
    }

    /// Unknown-word candidates for the text at `bytes[0]`, driven by
    /// `cp`'s character categorization. Returns the candidate entries and
    /// the `invoke` flag (force-add even when the normal dictionary
    /// already matched).
    pub fn lookup_unknowns<'m, 'i>(
        &'m self,
        bytes: &'i [u8],
        cp: &CharProperty,
    ) -> (Vec<DicEntry<'m, 'i>>, bool) {
        let (default_type, lengths, invoke) = cp.get_unknown_lengths(bytes);
        let category_name = &cp.category_names()[default_type as usize];
        let packed = self.exact_match_search(category_name.as_bytes());
        let is_space = category_name == "SPACE";

        let mut results = Vec::new();
        if packed >= 0 {
            for ln in lengths {
                results.extend(self.get_entries(packed as u32, &bytes[..ln], is_space));
            }
        }
        (results, invoke)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a MecabDic file with a trie containing a single key "a"
    /// (0x61) mapping to packed value `(token_index << 8) | count`, one
    /// token row, and one feature string. Mirrors the structure the real
    /// double-array construction produces for a single-entry trie.
    fn write_single_entry_fixture(key: u8, feature: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();

        let token_row_count = 1u8;
        let packed_value: i32 = 0i32 << 8 | token_row_count as i32;

        // Double-array layout for the single key `key`, following the
        // convention where a node's own base value doubles as its identity
        // for both child addressing and the self-referencing terminal
        // check (slot `base`, not the slot used to reach it from its
        // parent):
        //   root: base[0] = ROOT_BASE.
        //   descend slot for `key`: index ROOT_BASE + key + 1, holding
        //     (base = CHILD_ID, check = ROOT_BASE).
        //   terminal slot for the child: index CHILD_ID, holding
        //     (base = -(value+1), check = CHILD_ID).
        const ROOT_BASE: i32 = 1;
        const CHILD_ID: i32 = 200;
        let descend_idx = ROOT_BASE + key as i32 + 1;
        let highest_idx = descend_idx.max(CHILD_ID);
        let mut da = vec![0u8; (highest_idx as usize + 1) * 8];

        LittleEndian::write_i32(&mut da[0..4], ROOT_BASE);
        LittleEndian::write_u32(&mut da[4..8], 0);

        let descend_off = descend_idx as usize * 8;
        LittleEndian::write_i32(&mut da[descend_off..descend_off + 4], CHILD_ID);
        LittleEndian::write_u32(&mut da[descend_off + 4..descend_off + 8], ROOT_BASE as u32);

        let terminal_off = CHILD_ID as usize * 8;
        LittleEndian::write_i32(
            &mut da[terminal_off..terminal_off + 4],
            -(packed_value + 1),
        );
        LittleEndian::write_u32(&mut da[terminal_off + 4..terminal_off + 8], CHILD_ID as u32);

        let dsize = da.len() as u32;
        let feature_bytes = feature.as_bytes();
        let mut token = vec![0u8; 16];
        LittleEndian::write_u16(&mut token[0..2], 7); // lc_attr
        LittleEndian::write_u16(&mut token[2..4], 8); // rc_attr
        LittleEndian::write_u16(&mut token[4..6], 42); // posid
        LittleEndian::write_i16(&mut token[6..8], -100); // wcost
        LittleEndian::write_u32(&mut token[8..12], 0); // feature offset
        let tsize = token.len() as u32;
        let mut feature_region = feature_bytes.to_vec();
        feature_region.push(0);
        let fsize = feature_region.len() as u32;

        f.write_all(&(0u32 ^ MAGIC_XOR).to_le_bytes()).unwrap(); // size (obfuscated)
        f.write_all(&1u32.to_le_bytes()).unwrap(); // version
        f.write_all(&0u32.to_le_bytes()).unwrap(); // dictype
        f.write_all(&1u32.to_le_bytes()).unwrap(); // lexsize
        f.write_all(&1u32.to_le_bytes()).unwrap(); // lsize
        f.write_all(&1u32.to_le_bytes()).unwrap(); // rsize
        f.write_all(&dsize.to_le_bytes()).unwrap();
        f.write_all(&tsize.to_le_bytes()).unwrap();
        f.write_all(&fsize.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap(); // dummy
        f.write_all(&[0u8; 32]).unwrap(); // charset
        f.write_all(&da).unwrap();
        f.write_all(&token).unwrap();
        f.write_all(&feature_region).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn exact_match_finds_single_key() {
        let f = write_single_entry_fixture(b'a', "feat");
        let dic = MecabDic::open(f.path()).unwrap();
        assert_eq!(dic.exact_match_search(b"a"), 1);
        assert_eq!(dic.exact_match_search(b"b"), -1);
    }

    #[test]
    fn common_prefix_search_returns_match_at_consumed_length() {
        let f = write_single_entry_fixture(b'a', "feat");
        let dic = MecabDic::open(f.path()).unwrap();
        let results = dic.common_prefix_search(b"a");
        assert_eq!(results, vec![(1, 1)]);
    }

    #[test]
    fn lookup_decodes_feature_and_costs() {
        let f = write_single_entry_fixture(b'a', "名詞,一般,*");
        let dic = MecabDic::open(f.path()).unwrap();
        let entries = dic.lookup(b"a");
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.original, b"a");
        assert_eq!(e.lc_attr, 7);
        assert_eq!(e.rc_attr, 8);
        assert_eq!(e.posid, 42);
        assert_eq!(e.wcost, -100);
        assert_eq!(e.feature, "名詞,一般,*".as_bytes());
        assert!(!e.skip);
    }

    #[test]
    fn repeated_lookup_hits_cache_with_same_result() {
        let f = write_single_entry_fixture(b'a', "feat");
        let dic = MecabDic::open(f.path()).unwrap();
        let first = dic.lookup(b"a");
        let second = dic.lookup(b"a");
        assert_eq!(first[0].feature, second[0].feature);
    }
}
