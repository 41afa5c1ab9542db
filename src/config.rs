//! Minimal configuration collaborator: locates the dictionary directory.
//!
//! This intentionally stays thin — resolving a `mecabrc`-style config file
//! is a concern external to the analyzer core; all the core needs is a
//! directory to join dictionary file names onto.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{KotobaError, Result};

/// The well-known locations MeCab itself checks for a system-wide rc file.
const DEFAULT_RC_PATHS: &[&str] = &["/usr/local/etc/mecabrc", "/etc/mecabrc"];

pub struct Config {
    pub dicdir: PathBuf,
    pub userdic: Option<PathBuf>,
}

impl Config {
    /// Builds a config directly from a dictionary directory, bypassing rc
    /// file discovery entirely. The common case for embedding.
    pub fn from_dicdir(dicdir: impl Into<PathBuf>) -> Self {
        Config {
            dicdir: dicdir.into(),
            userdic: None,
        }
    }

    /// Parses a `mecabrc`-style file: lines of `key = value`, blank lines
    /// and anything without an `=` ignored.
    pub fn from_rc_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| KotobaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut map = HashMap::new();
        for line in contents.lines() {
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let dicdir = map.get("dicdir").ok_or_else(|| KotobaError::ConfigError {
            reason: format!("{} has no dicdir entry", path.display()),
        })?;

        Ok(Config {
            dicdir: PathBuf::from(dicdir),
            userdic: map.get("userdic").map(PathBuf::from),
        })
    }

    /// Resolves a config from an explicit rc path, or by searching the
    /// conventional system locations if `rc_path` is `None`.
    pub fn resolve(rc_path: Option<&Path>) -> Result<Self> {
        match rc_path {
            Some(path) => Self::from_rc_file(path),
            None => {
                let found = find_mecabrc().ok_or_else(|| KotobaError::ConfigError {
                    reason: "no mecabrc found in the default search locations".to_string(),
                })?;
                Self::from_rc_file(&found)
            }
        }
    }

    pub fn dic_path(&self, filename: &str) -> PathBuf {
        self.dicdir.join(filename)
    }
}

/// Searches the conventional system locations for a readable `mecabrc`.
pub fn find_mecabrc() -> Option<PathBuf> {
    DEFAULT_RC_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
