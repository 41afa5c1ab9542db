use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading dictionaries or tokenizing text.
///
/// Construction-time failures (missing files, malformed binary headers) are
/// the only errors this crate produces; see the error handling notes on
/// `Tokenizer::new` for why analysis itself never fails.
#[derive(Debug, Error)]
pub enum KotobaError {
    #[error("dictionary directory not found: {path}")]
    DictDirectoryNotFound { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dictionary file {path}: {reason}")]
    FormatError { path: PathBuf, reason: String },

    #[error("dictionary validation failed: {reason}")]
    DictValidationError { reason: String },

    #[error("connection matrix lookup out of range: left_id={left_id}, right_id={right_id}")]
    InvalidConnectionId { left_id: u16, right_id: u16 },

    #[error("invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error("system dictionary initialization failed: {reason}")]
    SystemDictInitError { reason: String },

    #[error("lattice forward() found no candidate covering byte offset {byte_offset}")]
    NoCandidateAtPosition { byte_offset: usize },
}

pub type Result<T> = std::result::Result<T, KotobaError>;
