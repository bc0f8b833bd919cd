use sfs_disk::DiskError;
use sfs_layout::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SfsError {
    #[error("file name is {0} bytes, maximum is {max}", max = sfs_layout::MAX_FILENAME)]
    NameTooLong(usize),

    #[error("file name is empty")]
    InvalidName,

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file is not open")]
    NotOpen,

    #[error("file handle out of range: {0}")]
    BadHandle(usize),

    #[error("inode table is full")]
    InodesExhausted,

    #[error("directory table is full")]
    DirectoryFull,

    #[error("disk is full")]
    DiskFull,

    #[error("maximum file size exceeded")]
    FileTooLarge,

    #[error("filesystem corruption: {0}")]
    Corrupt(&'static str),

    #[error("disk error: {0}")]
    Disk(#[from] DiskError),

    #[error("on-disk record codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("device geometry mismatch: {actual_blocks} blocks of {actual_block_size} bytes")]
    Geometry {
        actual_block_size: usize,
        actual_blocks: usize,
    },
}
