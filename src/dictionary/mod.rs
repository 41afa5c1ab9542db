pub mod mecab_dic;

pub use mecab_dic::{DicEntry, MecabDic};
