//! A single-user, flat-directory filesystem over an emulated block device.
//!
//! The on-disk format is defined by [`sfs_layout`]; the backing device by
//! [`sfs_disk::DiskImage`]. [`FileSystem::format`] initializes fresh
//! structures, [`FileSystem::mount`] reloads them, and the remaining
//! methods expose the POSIX-like file API: open, close, read, write, seek,
//! remove, size query, and filename enumeration.
//!
//! ```no_run
//! use sfs::FileSystem;
//! use sfs_disk::DiskImage;
//! use sfs_layout::{BLOCK_SIZE, TOTAL_BLOCKS};
//!
//! # fn main() -> Result<(), sfs::SfsError> {
//! let disk = DiskImage::create("disk.img", BLOCK_SIZE, TOTAL_BLOCKS)?;
//! let mut fs = FileSystem::format(disk)?;
//! let fd = fs.open("notes.txt")?;
//! fs.write(fd, b"hello")?;
//! fs.close(fd)?;
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
pub mod error;
mod fs;

pub use bitmap::{Bitmap, BitmapKind};
pub use error::SfsError;
pub use fs::{FileSystem, OpenFile, SlotKind};
