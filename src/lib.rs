//! Japanese morphological analysis: double-array dictionary lookup plus a
//! Viterbi/A* lattice, in the spirit of MeCab's binary dictionary format.
//!
//! The typical entry point is [`Tokenizer`]:
//!
//! ```no_run
//! use kotoba::Tokenizer;
//!
//! let tokenizer = Tokenizer::from_dicdir("/usr/local/lib/mecab/dic/ipadic").unwrap();
//! for token in tokenizer.tokenize("すもももももももものうち").unwrap() {
//!     println!("{token}");
//! }
//! ```

pub mod char_property;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod lattice;
pub mod matrix;
pub mod tokenizer;
pub mod utf8;

pub use config::Config;
pub use error::{KotobaError, Result};
pub use tokenizer::{Token, Tokenizer};
