//! Top-level entry point: loads the four dictionary files and runs
//! lattice-based morphological analysis over input text.

use std::path::Path;

use log::debug;

use crate::char_property::CharProperty;
use crate::config::Config;
use crate::dictionary::MecabDic;
use crate::error::Result;
use crate::lattice::{Lattice, Node, NodeType};
use crate::matrix::Matrix;

/// One decoded morpheme: the matched surface text and its raw feature
/// string, exactly as stored in the dictionary (comma-separated POS/
/// inflection/reading columns, left for the caller to parse further).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub surface: String,
    pub feature: String,
    pub node_type: NodeType,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}", self.surface, self.feature)
    }
}

fn node_to_token(node: &Node) -> Token {
    Token {
        surface: String::from_utf8_lossy(node.original.unwrap_or(b"")).into_owned(),
        feature: String::from_utf8_lossy(node.feature.unwrap_or(b"")).into_owned(),
        node_type: node.node_type,
    }
}

/// Owns the system dictionary, an optional user dictionary, the unknown-word
/// dictionary, the character property table, and the connection cost
/// matrix — everything a lattice build needs.
///
/// Construction is the only place this crate returns an error; once a
/// `Tokenizer` exists, `tokenize` and `tokenize_n_best` never fail, because
/// the unknown-word fallback guarantees the lattice always has a path from
/// BOS to EOS (see `Lattice::forward`'s doc comment for the one case this
/// relies on).
pub struct Tokenizer {
    sys_dic: MecabDic,
    user_dic: Option<MecabDic>,
    unk_dic: MecabDic,
    char_property: CharProperty,
    matrix: Matrix,
}

impl Tokenizer {
    /// Loads `sys.dic`, `unk.dic`, `char.bin`, and `matrix.bin` from
    /// `config.dicdir`, plus `config.userdic` if set.
    pub fn new(config: &Config) -> Result<Self> {
        let sys_dic = MecabDic::open(&config.dic_path("sys.dic"))?;
        let unk_dic = MecabDic::open(&config.dic_path("unk.dic"))?;
        let char_property = CharProperty::open(&config.dic_path("char.bin"))?;
        let matrix = Matrix::open(&config.dic_path("matrix.bin"))?;
        let user_dic = match &config.userdic {
            Some(path) => Some(MecabDic::open(path)?),
            None => None,
        };

        Ok(Tokenizer {
            sys_dic,
            user_dic,
            unk_dic,
            char_property,
            matrix,
        })
    }

    /// Convenience constructor for a dictionary directory with no rc file
    /// and no user dictionary.
    pub fn from_dicdir(dicdir: impl AsRef<Path>) -> Result<Self> {
        Self::new(&Config::from_dicdir(dicdir.as_ref()))
    }

    /// Builds a lattice covering `bytes`, running one forward pass: at each
    /// byte position, look up user dictionary and system dictionary
    /// matches, then add unknown-word candidates if nothing matched or the
    /// character category forces it (`invoke`).
    fn build_lattice<'t>(&self, bytes: &'t [u8]) -> Result<Lattice<'_, 't>> {
        let mut lat = Lattice::new(bytes.len());
        let mut pos = 0usize;

        while pos < bytes.len() {
            let remaining = &bytes[pos..];
            let mut matched = false;

            if let Some(user_dic) = &self.user_dic {
                let entries = user_dic.lookup(remaining);
                if !entries.is_empty() {
                    matched = true;
                    for entry in &entries {
                        lat.add(Node::from_entry(entry, NodeType::UserDict), &self.matrix);
                    }
                }
            }

            let sys_entries = self.sys_dic.lookup(remaining);
            if !sys_entries.is_empty() {
                matched = true;
                for entry in &sys_entries {
                    lat.add(Node::from_entry(entry, NodeType::SysDict), &self.matrix);
                }
            }

            let (unk_entries, invoke) = self.unk_dic.lookup_unknowns(remaining, &self.char_property);
            if invoke || !matched {
                for entry in &unk_entries {
                    lat.add(Node::from_entry(entry, NodeType::Unknown), &self.matrix);
                }
            }

            let advanced = lat.forward()?;
            debug!("lattice advanced {advanced} bytes from position {pos}");
            pos += advanced;
        }

        lat.end(&self.matrix);
        Ok(lat)
    }

    /// Analyzes `text`, returning the single cheapest (Viterbi) path as a
    /// sequence of tokens, BOS and EOS excluded.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        let bytes = text.as_bytes();
        let lattice = self.build_lattice(bytes)?;
        let path = lattice.backward();
        Ok(path[1..path.len() - 1].iter().map(node_to_token).collect())
    }

    /// Analyzes `text`, returning up to `n` candidate segmentations ordered
    /// cheapest first.
    pub fn tokenize_n_best(&self, text: &str, n: usize) -> Result<Vec<Vec<Token>>> {
        let bytes = text.as_bytes();
        let lattice = self.build_lattice(bytes)?;
        let paths = lattice.backward_astar(n, &self.matrix);
        Ok(paths
            .into_iter()
            .map(|path| path[1..path.len() - 1].iter().map(node_to_token).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};
    use std::io::Write;

    const MAGIC_XOR: u32 = 0xef718f77;

    /// Builds a one-category char.bin where every code point falls back to
    /// the DEFAULT category with char_count=1, group=0, invoke=0 — so
    /// unknown words are produced one character at a time.
    fn char_bin_fixture() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap();
        let mut name = [0u8; 32];
        name[..7].copy_from_slice(b"DEFAULT");
        f.write_all(&name).unwrap();

        // default_type=0, char_type bit0, char_count=1, group=0, invoke=0
        let record: u32 = (0u32 << 18) | 1 | (1 << 26);
        let mut records = vec![0u8; 0x10000 * 4];
        for cp in 0..0x10000usize {
            records[cp * 4..cp * 4 + 4].copy_from_slice(&record.to_le_bytes());
        }
        f.write_all(&records).unwrap();
        f.flush().unwrap();
        f
    }

    fn matrix_fixture() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&1u16.to_le_bytes()).unwrap();
        f.write_all(&1u16.to_le_bytes()).unwrap();
        f.write_all(&0i16.to_le_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    /// Empty dictionary: a single-node trie with no keys, so every lookup
    /// returns nothing and the unknown-word fallback always fires.
    ///
    /// Root base is a nonzero sentinel so that the zero-filled (unused)
    /// slots reachable from it never spuriously self-match (zeroed check
    /// would otherwise equal a zero root base).
    fn empty_dic_fixture() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        const ROOT_BASE: i32 = 1;
        let mut da = vec![0u8; 300 * 8];
        LittleEndian::write_i32(&mut da[0..4], ROOT_BASE);
        LittleEndian::write_u32(&mut da[4..8], 0);
        let dsize = da.len() as u32;

        f.write_all(&(0u32 ^ MAGIC_XOR).to_le_bytes()).unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap(); // version
        f.write_all(&0u32.to_le_bytes()).unwrap(); // dictype
        f.write_all(&0u32.to_le_bytes()).unwrap(); // lexsize
        f.write_all(&1u32.to_le_bytes()).unwrap(); // lsize
        f.write_all(&1u32.to_le_bytes()).unwrap(); // rsize
        f.write_all(&dsize.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap(); // tsize
        f.write_all(&0u32.to_le_bytes()).unwrap(); // fsize
        f.write_all(&0u32.to_le_bytes()).unwrap(); // dummy
        f.write_all(&[0u8; 32]).unwrap(); // charset
        f.write_all(&da).unwrap();
        f.flush().unwrap();
        f
    }

    /// An unk.dic with a single key "DEFAULT" (the only category name),
    /// one token row per unknown word, wcost chosen to be cheap.
    fn unk_dic_fixture() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let key = b"DEFAULT";

        const ROOT_BASE: i32 = 1;
        const CHILD_BASE: i32 = 20_000;
        // Chain one double-array node per byte of "DEFAULT", each at a
        // widely spaced base so descend slots (base + byte + 1, byte up to
        // 255) never collide with another node's base or terminal slot.
        // Terminates with a self-referencing leaf at CHILD_BASE.
        let mut da = vec![0u8; 21_000 * 8];
        LittleEndian::write_i32(&mut da[0..4], ROOT_BASE);

        let mut cur_base = ROOT_BASE;
        for (i, &byte) in key.iter().enumerate() {
            let is_last = i == key.len() - 1;
            let next_base = if is_last { CHILD_BASE } else { cur_base + 2000 };
            let p = (cur_base + byte as i32 + 1) as usize;
            LittleEndian::write_i32(&mut da[p * 8..p * 8 + 4], next_base);
            LittleEndian::write_u32(&mut da[p * 8 + 4..p * 8 + 8], cur_base as u32);
            cur_base = next_base;
        }
        let packed_value: i32 = 0; // token index 0, count 1
        let terminal_off = CHILD_BASE as usize * 8;
        LittleEndian::write_i32(&mut da[terminal_off..terminal_off + 4], -(packed_value + 1));
        LittleEndian::write_u32(
            &mut da[terminal_off + 4..terminal_off + 8],
            CHILD_BASE as u32,
        );
        let dsize = da.len() as u32;

        let mut token = vec![0u8; 16];
        LittleEndian::write_u16(&mut token[0..2], 0); // lc_attr
        LittleEndian::write_u16(&mut token[2..4], 0); // rc_attr
        LittleEndian::write_u16(&mut token[4..6], 0); // posid
        LittleEndian::write_i16(&mut token[6..8], 1); // wcost
        LittleEndian::write_u32(&mut token[8..12], 0); // feature offset
        let tsize = token.len() as u32;

        let feature = b"\xe6\x9c\xaa\xe7\x9f\xa5\xe8\xaa\x9e,*,*\0"; // "未知語,*,*\0"
        let fsize = feature.len() as u32;

        f.write_all(&(0u32 ^ MAGIC_XOR).to_le_bytes()).unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap();
        f.write_all(&1u32.to_le_bytes()).unwrap();
        f.write_all(&dsize.to_le_bytes()).unwrap();
        f.write_all(&tsize.to_le_bytes()).unwrap();
        f.write_all(&fsize.to_le_bytes()).unwrap();
        f.write_all(&0u32.to_le_bytes()).unwrap();
        f.write_all(&[0u8; 32]).unwrap();
        f.write_all(&da).unwrap();
        f.write_all(&token).unwrap();
        f.write_all(feature).unwrap();
        f.flush().unwrap();
        f
    }

    fn build_tokenizer() -> Tokenizer {
        let sys_dic = MecabDic::open(empty_dic_fixture().path()).unwrap();
        let unk_dic = MecabDic::open(unk_dic_fixture().path()).unwrap();
        let char_property = CharProperty::open(char_bin_fixture().path()).unwrap();
        let matrix = Matrix::open(matrix_fixture().path()).unwrap();
        Tokenizer {
            sys_dic,
            user_dic: None,
            unk_dic,
            char_property,
            matrix,
        }
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        let tok = build_tokenizer();
        assert_eq!(tok.tokenize("").unwrap(), Vec::<Token>::new());
    }

    #[test]
    fn unknown_word_fallback_covers_every_byte() {
        let tok = build_tokenizer();
        let tokens = tok.tokenize("AB").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].surface, "A");
        assert_eq!(tokens[1].surface, "B");
        assert_eq!(tokens[0].node_type, NodeType::Unknown);
    }

    #[test]
    fn n_best_returns_requested_count_when_available() {
        let tok = build_tokenizer();
        let paths = tok.tokenize_n_best("A", 3).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0][0].surface, "A");
    }
}
