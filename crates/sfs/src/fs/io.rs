//! Byte-addressed read and write paths: mapping file offsets to block
//! pointers, on-demand allocation, and partial-block transfers.

use log::{debug, error};
use sfs_layout::{BLOCK_SIZE, NUM_DIRECT, POINTERS_PER_BLOCK};

use crate::bitmap::BitmapKind;
use crate::error::SfsError;
use crate::fs::FileSystem;

impl FileSystem {
    /// Write `buf` at the file's write cursor, allocating blocks on
    /// demand, and advance the cursor. Returns the number of bytes
    /// written. Runs out of space or past the maximum file size with an
    /// error; bytes transferred by earlier iterations of the same call
    /// are already on disk, and the cursor always reflects exactly the
    /// bytes committed.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize, SfsError> {
        let descriptor = self.descriptor(fd)?;
        let inode_idx = descriptor.inode as usize;
        let mut pos = descriptor.write_pos as usize;

        let mut indirect = match self.inodes[inode_idx].indirect {
            0 => None,
            block => Some(self.load_pointer_block(block)?),
        };

        debug!("write: fd={} len={} at {}", fd, buf.len(), pos);

        let mut written = 0;
        while written < buf.len() {
            let block = self.map_write_block(inode_idx, pos, &mut indirect)?;
            let offset = pos % BLOCK_SIZE;
            let n = self.write_span(block, &buf[written..], offset)?;
            written += n;
            pos += n;

            let node = &mut self.inodes[inode_idx];
            node.size = node.size.max(pos as i32);
            // Advance the cursor with every committed block, not once at
            // the end: a later iteration may fail, and the cursor must
            // never fall behind bytes already on disk.
            self.open_files[fd].write_pos = pos as i32;

            // Persist allocator and index state as the file grows, so a
            // torn sequence loses at most the current block.
            self.flush_bitmap(BitmapKind::Data)?;
            if let Some(pointers) = &indirect {
                self.store_pointer_block(self.inodes[inode_idx].indirect, pointers)?;
            }
            self.flush_inode_table()?;
        }

        Ok(written)
    }

    /// Read from the file's read cursor into `buf`, clamped to end of
    /// file, and advance the cursor. Returns the number of bytes read.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, SfsError> {
        let descriptor = self.descriptor(fd)?;
        let inode_idx = descriptor.inode as usize;
        let size = self.inodes[inode_idx].size as usize;
        let mut pos = descriptor.read_pos as usize;
        let mut remaining = buf.len().min(size.saturating_sub(pos));

        let indirect = match self.inodes[inode_idx].indirect {
            0 => None,
            block => Some(self.load_pointer_block(block)?),
        };

        debug!("read: fd={} want={} clamped={} at {}", fd, buf.len(), remaining, pos);

        let mut total = 0;
        while remaining > 0 {
            let block = self.map_read_block(inode_idx, pos, indirect.as_deref())?;
            let offset = pos % BLOCK_SIZE;
            let want = remaining.min(BLOCK_SIZE - offset);
            let n = self.read_span(block, &mut buf[total..total + want], offset)?;
            total += n;
            pos += n;
            remaining -= n;
        }

        self.open_files[fd].read_pos = pos as i32;
        Ok(total)
    }

    /// Resolve the data block backing byte offset `pos`, allocating the
    /// block (and the indirect block, on first use) when absent.
    fn map_write_block(
        &mut self,
        inode_idx: usize,
        pos: usize,
        indirect: &mut Option<Vec<i32>>,
    ) -> Result<i32, SfsError> {
        let index = pos / BLOCK_SIZE;

        if index < NUM_DIRECT {
            let block = self.inodes[inode_idx].direct[index];
            if block != 0 {
                return Ok(block);
            }
            let block = self.alloc_data_block()?;
            self.inodes[inode_idx].direct[index] = block;
            return Ok(block);
        }

        let slot = index - NUM_DIRECT;
        if slot >= POINTERS_PER_BLOCK {
            error!("write past maximum file size (block index {})", index);
            return Err(SfsError::FileTooLarge);
        }

        if indirect.is_none() {
            // First use of the indirect region: allocate the pointer block
            // itself and start from an all-zero pointer array.
            let block = self.alloc_data_block()?;
            self.inodes[inode_idx].indirect = block;
        }
        let pointers = indirect.get_or_insert_with(|| vec![0; POINTERS_PER_BLOCK]);
        if pointers[slot] == 0 {
            pointers[slot] = self.alloc_data_block()?;
        }
        Ok(pointers[slot])
    }

    /// Resolve the data block backing byte offset `pos` for a read. A
    /// missing block inside the declared size is corruption.
    fn map_read_block(
        &self,
        inode_idx: usize,
        pos: usize,
        indirect: Option<&[i32]>,
    ) -> Result<i32, SfsError> {
        let index = pos / BLOCK_SIZE;

        if index < NUM_DIRECT {
            let block = self.inodes[inode_idx].direct[index];
            if block == 0 {
                error!("read: unallocated direct block inside file bounds");
                return Err(SfsError::Corrupt("unallocated block inside file bounds"));
            }
            return Ok(block);
        }

        let slot = index - NUM_DIRECT;
        if slot >= POINTERS_PER_BLOCK {
            return Err(SfsError::Corrupt("file size above addressable maximum"));
        }
        let pointers = indirect.ok_or_else(|| {
            error!("read: missing indirect block inside file bounds");
            SfsError::Corrupt("missing indirect block inside file bounds")
        })?;
        let block = pointers[slot];
        if block == 0 {
            error!("read: unallocated indirect block inside file bounds");
            return Err(SfsError::Corrupt("unallocated block inside file bounds"));
        }
        Ok(block)
    }

    /// Write the head of `data` into one block at `offset`. A mid-block
    /// start preserves the rest of the block via read-modify-write; a
    /// block-aligned start writes a freshly assembled zero-padded block.
    fn write_span(&mut self, block: i32, data: &[u8], offset: usize) -> Result<usize, SfsError> {
        let mut scratch = [0u8; BLOCK_SIZE];
        let n;
        if offset > 0 {
            n = data.len().min(BLOCK_SIZE - offset);
            self.disk.read_blocks(block as usize, 1, &mut scratch)?;
            scratch[offset..offset + n].copy_from_slice(&data[..n]);
        } else {
            n = data.len().min(BLOCK_SIZE);
            scratch[..n].copy_from_slice(&data[..n]);
        }
        self.disk.write_blocks(block as usize, 1, &scratch)?;
        Ok(n)
    }

    /// Copy one block's worth of bytes at `offset` into the head of `out`.
    fn read_span(&mut self, block: i32, out: &mut [u8], offset: usize) -> Result<usize, SfsError> {
        let mut scratch = [0u8; BLOCK_SIZE];
        self.disk.read_blocks(block as usize, 1, &mut scratch)?;
        let n = out.len().min(BLOCK_SIZE - offset);
        out[..n].copy_from_slice(&scratch[offset..offset + n]);
        Ok(n)
    }
}
