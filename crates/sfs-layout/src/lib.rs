#![cfg_attr(not(test), no_std)]

//! On-disk layout of the simple filesystem: geometry constants, record
//! structures, and the byte-level codec shared by the engine and the tools.
//!
//! Every persistent record is a fixed-width little-endian integer layout.
//! Bitmap regions and indirect-pointer blocks are arrays of `i32` occupancy
//! words, encoded with [`words_to_bytes`] / [`bytes_to_words`].

use bincode::config::{self, Config};
use core::fmt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const BLOCK_SIZE: usize = 1024;
pub const TOTAL_BLOCKS: usize = 1024;
pub const MAX_INODES: usize = 128;
pub const MAX_FILENAME: usize = 32;
pub const NUM_DIRECT: usize = 12;
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / core::mem::size_of::<i32>();
pub const MAX_FILE_SIZE: usize = (NUM_DIRECT + POINTERS_PER_BLOCK) * BLOCK_SIZE;

pub const MAGIC: i32 = 0x5346_5330; // "SFS0"

// Region layout, by block index.
pub const SUPERBLOCK_BLOCK: usize = 0;
pub const INODE_TABLE_START: usize = 1;
pub const INODE_TABLE_BLOCKS: usize = 9;
pub const INODE_BITMAP_START: usize = 10;
pub const INODE_BITMAP_BLOCKS: usize = 4;
pub const DATA_BITMAP_START: usize = 14;
pub const DATA_BITMAP_BLOCKS: usize = 4;
pub const DIRECTORY_START: usize = 18;
pub const DIRECTORY_BLOCKS: usize = 5;
/// Blocks 0..23 hold filesystem metadata and are never allocated for data.
pub const RESERVED_BLOCKS: usize = 23;

pub const ROOT_DIR_INODE: usize = 1;
/// Name held by the reserved directory entry at slot 0.
pub const ROOT_NAME: &str = "root";

// Encoded record widths.
pub const SUPERBLOCK_DISK_SIZE: usize = 20;
pub const INODE_DISK_SIZE: usize = 72;
pub const DIR_ENTRY_DISK_SIZE: usize = 36;

fn codec() -> impl Config {
    config::standard().with_fixed_int_encoding()
}

#[derive(Debug)]
pub enum CodecError {
    Encode(bincode::error::EncodeError),
    Decode(bincode::error::DecodeError),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(e) => write!(f, "record encode error: {}", e),
            CodecError::Decode(e) => write!(f, "record decode error: {}", e),
        }
    }
}

impl core::error::Error for CodecError {}

/// Encode one record into the front of `out`.
pub fn encode_record<T: Serialize>(record: &T, out: &mut [u8]) -> Result<(), CodecError> {
    bincode::serde::encode_into_slice(record, out, codec())
        .map(|_| ())
        .map_err(CodecError::Encode)
}

/// Decode one record from the front of `buf`.
pub fn decode_record<T: DeserializeOwned>(buf: &[u8]) -> Result<T, CodecError> {
    bincode::serde::decode_from_slice(buf, codec())
        .map(|(record, _)| record)
        .map_err(CodecError::Decode)
}

/// Serialize occupancy words as little-endian `i32`s. Extra bytes in `out`
/// are left untouched, so region buffers must start zeroed.
pub fn words_to_bytes(words: &[i32], out: &mut [u8]) {
    for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

pub fn bytes_to_words(buf: &[u8], words: &mut [i32]) {
    for (word, chunk) in words.iter_mut().zip(buf.chunks_exact(4)) {
        *word = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SuperBlock {
    pub magic: i32,
    pub block_size: i32,
    pub fs_size: i32,
    pub inode_table_len: i32,
    pub root_dir_inode: i32,
}

impl SuperBlock {
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            block_size: BLOCK_SIZE as i32,
            fs_size: (TOTAL_BLOCKS * BLOCK_SIZE) as i32,
            inode_table_len: MAX_INODES as i32,
            root_dir_inode: ROOT_DIR_INODE as i32,
        }
    }
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Inode {
    /// 1 = file, 0 = free slot. Directories have no inode of their own.
    pub mode: i32,
    pub link_count: i32,
    pub uid: i32,
    pub gid: i32,
    pub size: i32,
    pub direct: [i32; NUM_DIRECT],
    pub indirect: i32, // points to a block of further pointers
}

impl Inode {
    pub fn new_file() -> Self {
        Self {
            mode: 1,
            ..Self::default()
        }
    }

    pub fn is_free(&self) -> bool {
        self.mode == 0
    }
}

impl Default for Inode {
    fn default() -> Self {
        Self {
            mode: 0,
            link_count: 0,
            uid: 0,
            gid: 0,
            size: 0,
            direct: [0; NUM_DIRECT],
            indirect: 0,
        }
    }
}

// Directory entry: 32-byte name, 4-byte inode index. A name may fill all 32
// bytes with no terminator; an entry is free iff the name is empty.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct DirEntry {
    pub name: [u8; MAX_FILENAME],
    pub inode: i32,
}

impl DirEntry {
    pub fn new(name_str: &str, inode: i32) -> Self {
        let mut name = [0u8; MAX_FILENAME];
        let bytes = name_str.as_bytes();
        let len = bytes.len().min(MAX_FILENAME);
        name[0..len].copy_from_slice(&bytes[0..len]);
        Self { name, inode }
    }

    /// The reserved entry at directory slot 0.
    pub fn root_sentinel() -> Self {
        Self::new(ROOT_NAME, -1)
    }

    pub fn name_as_str(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_FILENAME);
        core::str::from_utf8(&self.name[0..end]).unwrap_or("<invalid>")
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }
}

impl Default for DirEntry {
    fn default() -> Self {
        Self {
            name: [0; MAX_FILENAME],
            inode: 0,
        }
    }
}
