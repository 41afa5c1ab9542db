//! Connection cost matrix (`matrix.bin`): transition cost between a left
//! context ID and a right context ID.

use std::fs::File;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapOptions};

use crate::error::{KotobaError, Result};

pub struct Matrix {
    mmap: Mmap,
    lsize: u16,
    rsize: u16,
}

impl Matrix {
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
                reason: "file shorter than the lsize/rsize header".to_string(),
            });
        }
        let lsize = LittleEndian::read_u16(&mmap[0..2]);
        let rsize = LittleEndian::read_u16(&mmap[2..4]);
        let expected = 4 + lsize as usize * rsize as usize * 2;
        if mmap.len() < expected {
            return Err(KotobaError::FormatError {
                path: path.to_path_buf(),
                reason: format!(
                    "file has {} bytes, expected at least {expected} for a {lsize}x{rsize} cost table",
                    mmap.len()
                ),
            });
        }

        Ok(Matrix { mmap, lsize, rsize })
    }

    /// Transition cost from left context `id1` to right context `id2`.
    pub fn get_trans_cost(&self, id1: u16, id2: u16) -> i16 {
        let cost_id = id2 as usize * self.lsize as usize + id1 as usize;
        let offset = 4 + cost_id * 2;
        LittleEndian::read_i16(&self.mmap[offset..offset + 2])
    }

    pub fn lsize(&self) -> u16 {
        self.lsize
    }

    pub fn rsize(&self) -> u16 {
        self.rsize
    }
}
