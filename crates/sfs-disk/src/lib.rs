//! Emulated block device backed by a regular file.
//!
//! The device has a fixed geometry chosen at creation time and transfers
//! whole blocks only: `count` contiguous blocks starting at block `start`.
//! There is no caching; every call hits the backing file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("disk io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("block range at {start} (+{count}) past end of disk ({total} blocks)")]
    OutOfRange {
        start: usize,
        count: usize,
        total: usize,
    },

    #[error("buffer holds {actual} bytes, transfer needs {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("image is {actual} bytes, geometry needs {expected}")]
    ImageSize { expected: usize, actual: usize },
}

pub struct DiskImage {
    file: File,
    block_size: usize,
    block_count: usize,
}

impl DiskImage {
    /// Create a fresh zero-filled image, truncating any existing file.
    pub fn create<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        block_count: usize,
    ) -> Result<Self, DiskError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len((block_size * block_count) as u64)?;

        debug!(
            "created disk image {:?}: {} blocks of {} bytes",
            path.as_ref(),
            block_count,
            block_size
        );

        Ok(Self {
            file,
            block_size,
            block_count,
        })
    }

    /// Open an existing image and check it against the expected geometry.
    pub fn open<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        block_count: usize,
    ) -> Result<Self, DiskError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;

        let expected = block_size * block_count;
        let actual = file.metadata()?.len() as usize;
        if actual != expected {
            return Err(DiskError::ImageSize { expected, actual });
        }

        debug!(
            "opened disk image {:?}: {} blocks of {} bytes",
            path.as_ref(),
            block_count,
            block_size
        );

        Ok(Self {
            file,
            block_size,
            block_count,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    fn check_range(&self, start: usize, count: usize, buf_len: usize) -> Result<(), DiskError> {
        if start + count > self.block_count {
            return Err(DiskError::OutOfRange {
                start,
                count,
                total: self.block_count,
            });
        }
        let expected = count * self.block_size;
        if buf_len < expected {
            return Err(DiskError::BufferSize {
                expected,
                actual: buf_len,
            });
        }
        Ok(())
    }

    /// Read `count` contiguous blocks starting at block `start`.
    pub fn read_blocks(
        &mut self,
        start: usize,
        count: usize,
        buf: &mut [u8],
    ) -> Result<(), DiskError> {
        self.check_range(start, count, buf.len())?;
        let bytes = count * self.block_size;
        self.file
            .seek(SeekFrom::Start((start * self.block_size) as u64))?;
        self.file.read_exact(&mut buf[..bytes])?;
        Ok(())
    }

    /// Write `count` contiguous blocks starting at block `start`.
    pub fn write_blocks(
        &mut self,
        start: usize,
        count: usize,
        buf: &[u8],
    ) -> Result<(), DiskError> {
        self.check_range(start, count, buf.len())?;
        let bytes = count * self.block_size;
        self.file
            .seek(SeekFrom::Start((start * self.block_size) as u64))?;
        self.file.write_all(&buf[..bytes])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const BS: usize = 64;
    const NB: usize = 16;

    #[test]
    fn fresh_image_is_zero_filled() {
        let path = NamedTempFile::new().unwrap();
        let mut disk = DiskImage::create(path.path(), BS, NB).unwrap();

        let mut buf = [0xAAu8; BS * NB];
        disk.read_blocks(0, NB, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn blocks_round_trip() {
        let path = NamedTempFile::new().unwrap();
        let mut disk = DiskImage::create(path.path(), BS, NB).unwrap();

        let data = [0x5Au8; BS * 2];
        disk.write_blocks(3, 2, &data).unwrap();

        let mut back = [0u8; BS * 2];
        disk.read_blocks(3, 2, &mut back).unwrap();
        assert_eq!(data, back);

        // Neighbors untouched.
        let mut edge = [0u8; BS];
        disk.read_blocks(2, 1, &mut edge).unwrap();
        assert!(edge.iter().all(|&b| b == 0));
        disk.read_blocks(5, 1, &mut edge).unwrap();
        assert!(edge.iter().all(|&b| b == 0));
    }

    #[test]
    fn range_and_buffer_checks() {
        let path = NamedTempFile::new().unwrap();
        let mut disk = DiskImage::create(path.path(), BS, NB).unwrap();

        let mut buf = [0u8; BS];
        assert!(matches!(
            disk.read_blocks(NB, 1, &mut buf),
            Err(DiskError::OutOfRange { .. })
        ));
        assert!(matches!(
            disk.write_blocks(0, 2, &buf),
            Err(DiskError::BufferSize { .. })
        ));
    }

    #[test]
    fn open_rejects_geometry_mismatch() {
        let path = NamedTempFile::new().unwrap();
        DiskImage::create(path.path(), BS, NB).unwrap();

        assert!(DiskImage::open(path.path(), BS, NB).is_ok());
        assert!(matches!(
            DiskImage::open(path.path(), BS, NB * 2),
            Err(DiskError::ImageSize { .. })
        ));
    }

    #[test]
    fn reopen_preserves_contents() {
        let path = NamedTempFile::new().unwrap();
        {
            let mut disk = DiskImage::create(path.path(), BS, NB).unwrap();
            disk.write_blocks(7, 1, &[1u8; BS]).unwrap();
        }
        let mut disk = DiskImage::open(path.path(), BS, NB).unwrap();
        let mut buf = [0u8; BS];
        disk.read_blocks(7, 1, &mut buf).unwrap();
        assert_eq!(buf, [1u8; BS]);
    }
}
