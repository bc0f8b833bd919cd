//! The filesystem engine: mount/format, table management, and the public
//! file API. Block mapping and the read/write drivers live in the `io`
//! submodule.
//!
//! All state sits in a single [`FileSystem`] value owned by the caller.
//! Three fixed tables of 128 entries (inodes, directory, open files) are
//! coupled by index: the handle returned by [`FileSystem::open`] is the
//! directory-slot index, and the open-file entry for that file lives at the
//! same index. Inode indices are independent and stored in the directory
//! entry.

mod io;

use log::{info, warn};
use sfs_disk::DiskImage;
use sfs_layout::{
    decode_record, encode_record, DirEntry, Inode, SuperBlock, BLOCK_SIZE, DATA_BITMAP_BLOCKS,
    DATA_BITMAP_START, DIRECTORY_BLOCKS, DIRECTORY_START, DIR_ENTRY_DISK_SIZE,
    INODE_BITMAP_BLOCKS, INODE_BITMAP_START, INODE_DISK_SIZE, INODE_TABLE_BLOCKS,
    INODE_TABLE_START, MAX_FILENAME, MAX_FILE_SIZE, MAX_INODES, NUM_DIRECT, POINTERS_PER_BLOCK,
    RESERVED_BLOCKS, ROOT_DIR_INODE, ROOT_NAME, SUPERBLOCK_BLOCK, TOTAL_BLOCKS,
};

use crate::bitmap::{Bitmap, BitmapKind};
use crate::error::SfsError;

/// Per-file descriptor state. A slot with inode 0 is free; inode 0 can
/// never back a file because inode allocation starts at index 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFile {
    pub inode: i32,
    pub read_pos: i32,
    pub write_pos: i32,
}

impl OpenFile {
    fn is_free(&self) -> bool {
        self.inode == 0
    }
}

/// Selects which fixed table a free-slot scan targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Inode,
    Directory,
    OpenFile,
}

pub struct FileSystem {
    disk: DiskImage,
    superblock: SuperBlock,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    inodes: Vec<Inode>,
    directory: Vec<DirEntry>,
    open_files: Vec<OpenFile>,
    dir_cursor: usize,
}

impl FileSystem {
    fn check_geometry(disk: &DiskImage) -> Result<(), SfsError> {
        if disk.block_size() != BLOCK_SIZE || disk.block_count() != TOTAL_BLOCKS {
            return Err(SfsError::Geometry {
                actual_block_size: disk.block_size(),
                actual_blocks: disk.block_count(),
            });
        }
        Ok(())
    }

    // All tables start zeroed so nothing bleeds between mounts. The
    // superblock is rebuilt from the compiled geometry in both modes; the
    // on-disk copy is written at format time and never reread.
    fn blank(disk: DiskImage) -> Self {
        Self {
            disk,
            superblock: SuperBlock::new(),
            inode_bitmap: Bitmap::new(MAX_INODES),
            data_bitmap: Bitmap::new(TOTAL_BLOCKS),
            inodes: vec![Inode::default(); MAX_INODES],
            directory: vec![DirEntry::default(); MAX_INODES],
            open_files: vec![OpenFile::default(); MAX_INODES],
            dir_cursor: 1,
        }
    }

    /// Initialize fresh on-disk structures on a blank device.
    pub fn format(disk: DiskImage) -> Result<Self, SfsError> {
        Self::check_geometry(&disk)?;
        let mut fs = Self::blank(disk);

        fs.flush_superblock()?;
        fs.flush_inode_table()?;

        fs.inode_bitmap.set(ROOT_DIR_INODE);
        fs.flush_bitmap(BitmapKind::Inode)?;

        // Metadata blocks are permanently occupied in the data bitmap.
        for block in 0..RESERVED_BLOCKS {
            fs.data_bitmap.set(block);
        }
        fs.flush_bitmap(BitmapKind::Data)?;

        fs.directory[0] = DirEntry::root_sentinel();
        fs.flush_directory()?;

        info!(
            "formatted filesystem: {} blocks of {} bytes, {} inodes",
            TOTAL_BLOCKS, BLOCK_SIZE, MAX_INODES
        );
        Ok(fs)
    }

    /// Reload the persistent regions from an existing image.
    pub fn mount(disk: DiskImage) -> Result<Self, SfsError> {
        Self::check_geometry(&disk)?;
        let mut fs = Self::blank(disk);

        fs.load_bitmap(BitmapKind::Inode)?;
        fs.load_directory()?;
        fs.load_inode_table()?;
        fs.load_bitmap(BitmapKind::Data)?;

        info!(
            "mounted filesystem: {} of {} inodes in use",
            (0..MAX_INODES).filter(|&i| !fs.inodes[i].is_free()).count(),
            MAX_INODES
        );
        Ok(fs)
    }

    /// Open `name`, creating it when absent. The returned handle is the
    /// file's directory-slot index; opening an already-open file returns
    /// the same handle. Writes append: the write cursor starts at the
    /// current size, the read cursor at 0.
    pub fn open(&mut self, name: &str) -> Result<usize, SfsError> {
        if name.is_empty() {
            return Err(SfsError::InvalidName);
        }
        if name.len() > MAX_FILENAME {
            warn!("open: name of {} bytes rejected", name.len());
            return Err(SfsError::NameTooLong(name.len()));
        }

        if let Some(slot) = self.lookup(name) {
            if !self.open_files[slot].is_free() {
                return Ok(slot);
            }
            let inode = self.directory[slot].inode;
            self.open_files[slot] = OpenFile {
                inode,
                read_pos: 0,
                write_pos: self.inodes[inode as usize].size,
            };
            return Ok(slot);
        }

        let dir_slot = self
            .find_free_slot(SlotKind::Directory)
            .ok_or(SfsError::DirectoryFull)?;
        let inode_slot = self
            .find_free_slot(SlotKind::Inode)
            .ok_or(SfsError::InodesExhausted)?;

        self.inodes[inode_slot] = Inode::new_file();
        self.directory[dir_slot] = DirEntry::new(name, inode_slot as i32);
        self.open_files[dir_slot] = OpenFile {
            inode: inode_slot as i32,
            read_pos: 0,
            write_pos: 0,
        };
        self.inode_bitmap.set(inode_slot);

        self.flush_inode_table()?;
        self.flush_directory()?;
        Ok(dir_slot)
    }

    /// Release the open-file slot behind a handle.
    pub fn close(&mut self, fd: usize) -> Result<(), SfsError> {
        if fd >= self.open_files.len() {
            return Err(SfsError::BadHandle(fd));
        }
        if self.open_files[fd].is_free() {
            return Err(SfsError::NotOpen);
        }
        self.open_files[fd] = OpenFile::default();
        Ok(())
    }

    /// Move both the read and write cursor to an absolute byte offset.
    /// Offsets beyond end of file are not validated; a later write extends
    /// the file and a later read is clamped to the current size.
    pub fn seek(&mut self, fd: usize, pos: usize) -> Result<(), SfsError> {
        let descriptor = self
            .open_files
            .get_mut(fd)
            .ok_or(SfsError::BadHandle(fd))?;
        if descriptor.is_free() {
            return Err(SfsError::NotOpen);
        }
        descriptor.read_pos = pos as i32;
        descriptor.write_pos = pos as i32;
        Ok(())
    }

    /// Size in bytes of the named file, or 0 when it does not exist.
    pub fn file_size(&self, name: &str) -> u64 {
        match self.lookup(name) {
            Some(slot) => self.inodes[self.directory[slot].inode as usize].size as u64,
            None => 0,
        }
    }

    /// Next filename in directory order. The cursor is process-wide and
    /// wraps: after the last name one call returns `None`, then the scan
    /// restarts from the first slot.
    pub fn next_filename(&mut self) -> Option<String> {
        while self.dir_cursor < MAX_INODES {
            let entry = &self.directory[self.dir_cursor];
            self.dir_cursor += 1;
            if entry.inode != 0 && entry.name_as_str() != ROOT_NAME {
                return Some(entry.name_as_str().to_string());
            }
        }
        self.dir_cursor = 1;
        None
    }

    /// Remove a file: drop its directory entry and open-file slot, scrub
    /// and free every data block it references (including the indirect
    /// block itself), and release the inode.
    pub fn remove(&mut self, name: &str) -> Result<(), SfsError> {
        let slot = self
            .lookup(name)
            .ok_or_else(|| SfsError::NotFound(name.to_string()))?;
        let inode_idx = self.directory[slot].inode as usize;

        self.directory[slot] = DirEntry::default();
        // The open-file slot is coupled by index; only clear it when it
        // still references this inode.
        if self.open_files[slot].inode as usize == inode_idx {
            self.open_files[slot] = OpenFile::default();
        }

        let zeros = [0u8; BLOCK_SIZE];
        let indirect = self.inodes[inode_idx].indirect;
        if indirect != 0 {
            let pointers = self.load_pointer_block(indirect)?;
            for block in pointers.into_iter().filter(|&p| p != 0) {
                self.disk.write_blocks(block as usize, 1, &zeros)?;
                self.data_bitmap.clear(block as usize);
            }
            self.disk.write_blocks(indirect as usize, 1, &zeros)?;
            self.data_bitmap.clear(indirect as usize);
        }
        for i in 0..NUM_DIRECT {
            let block = self.inodes[inode_idx].direct[i];
            if block != 0 {
                self.disk.write_blocks(block as usize, 1, &zeros)?;
                self.data_bitmap.clear(block as usize);
            }
        }

        self.inodes[inode_idx] = Inode::default();
        self.inode_bitmap.clear(inode_idx);

        self.flush_bitmap(BitmapKind::Inode)?;
        self.flush_bitmap(BitmapKind::Data)?;
        self.flush_directory()?;
        self.flush_inode_table()?;
        Ok(())
    }

    /// Verify the cross-table invariants. Intended for tests and tooling;
    /// the engine never calls this on the hot path.
    pub fn check_consistency(&mut self) -> Result<(), SfsError> {
        // Inode bitmap agrees with the table. Bit 1 is reserved for the
        // root directory at format time but is handed to a file by the
        // lowest-index allocation policy, so mode 0 with either bit value
        // is legal there.
        for i in 0..MAX_INODES {
            let allocated = !self.inodes[i].is_free();
            let bit = self.inode_bitmap.get(i);
            if allocated && !bit {
                return Err(SfsError::Corrupt("allocated inode missing its bitmap bit"));
            }
            if !allocated && bit && i != ROOT_DIR_INODE {
                return Err(SfsError::Corrupt("free inode marked in bitmap"));
            }
        }

        // Metadata blocks stay occupied.
        for block in 0..RESERVED_BLOCKS {
            if !self.data_bitmap.get(block) {
                return Err(SfsError::Corrupt("metadata block free in data bitmap"));
            }
        }

        // Every data block is referenced at most once, only by allocated
        // inodes, and exactly the referenced blocks are marked.
        let mut references = vec![0u32; TOTAL_BLOCKS];
        for i in 0..MAX_INODES {
            let node = self.inodes[i];
            if node.is_free() {
                continue;
            }
            if node.size as usize > MAX_FILE_SIZE {
                return Err(SfsError::Corrupt("inode size above addressable maximum"));
            }
            for &block in node.direct.iter().filter(|&&p| p != 0) {
                references[block as usize] += 1;
            }
            if node.indirect != 0 {
                references[node.indirect as usize] += 1;
                for block in self
                    .load_pointer_block(node.indirect)?
                    .into_iter()
                    .filter(|&p| p != 0)
                {
                    references[block as usize] += 1;
                }
            }
        }
        for block in 0..TOTAL_BLOCKS {
            let count = references[block];
            if count > 1 {
                return Err(SfsError::Corrupt("data block referenced more than once"));
            }
            if count == 1 && block < RESERVED_BLOCKS {
                return Err(SfsError::Corrupt("inode references a metadata block"));
            }
            if block >= RESERVED_BLOCKS && self.data_bitmap.get(block) != (count == 1) {
                return Err(SfsError::Corrupt("data bitmap disagrees with references"));
            }
        }

        // Directory entries point at allocated file inodes.
        for slot in 1..MAX_INODES {
            let entry = &self.directory[slot];
            if entry.is_free() {
                continue;
            }
            let inode = entry.inode;
            if inode <= 0 || inode as usize >= MAX_INODES {
                return Err(SfsError::Corrupt("directory entry inode out of range"));
            }
            if self.inodes[inode as usize].mode != 1 {
                return Err(SfsError::Corrupt("directory entry points at free inode"));
            }
        }

        // Open-file slots mirror their directory slots.
        for slot in 0..MAX_INODES {
            let descriptor = &self.open_files[slot];
            if descriptor.is_free() {
                continue;
            }
            if self.directory[slot].inode != descriptor.inode {
                return Err(SfsError::Corrupt("open file decoupled from directory slot"));
            }
        }

        Ok(())
    }

    /// The in-memory superblock. Rebuilt from the compiled geometry at
    /// mount, so its fields are valid in both mount modes.
    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    /// First free slot of the given table, or `None` on exhaustion.
    pub fn find_free_slot(&self, kind: SlotKind) -> Option<usize> {
        match kind {
            // Slot 0 of the inode table is reserved.
            SlotKind::Inode => (1..MAX_INODES).find(|&i| self.inodes[i].is_free()),
            SlotKind::Directory => (0..MAX_INODES).find(|&i| self.directory[i].is_free()),
            SlotKind::OpenFile => (0..MAX_INODES).find(|&i| self.open_files[i].is_free()),
        }
    }

    fn lookup(&self, name: &str) -> Option<usize> {
        (1..MAX_INODES)
            .find(|&i| !self.directory[i].is_free() && self.directory[i].name_as_str() == name)
    }

    fn descriptor(&self, fd: usize) -> Result<OpenFile, SfsError> {
        let descriptor = *self.open_files.get(fd).ok_or(SfsError::BadHandle(fd))?;
        if descriptor.is_free() {
            return Err(SfsError::NotOpen);
        }
        Ok(descriptor)
    }

    fn alloc_data_block(&mut self) -> Result<i32, SfsError> {
        let block = self.data_bitmap.find_free().ok_or_else(|| {
            warn!("data bitmap exhausted");
            SfsError::DiskFull
        })?;
        self.data_bitmap.set(block);
        Ok(block as i32)
    }

    fn bitmap(&self, kind: BitmapKind) -> &Bitmap {
        match kind {
            BitmapKind::Inode => &self.inode_bitmap,
            BitmapKind::Data => &self.data_bitmap,
        }
    }

    fn bitmap_mut(&mut self, kind: BitmapKind) -> &mut Bitmap {
        match kind {
            BitmapKind::Inode => &mut self.inode_bitmap,
            BitmapKind::Data => &mut self.data_bitmap,
        }
    }

    fn bitmap_region(kind: BitmapKind) -> (usize, usize) {
        match kind {
            BitmapKind::Inode => (INODE_BITMAP_START, INODE_BITMAP_BLOCKS),
            BitmapKind::Data => (DATA_BITMAP_START, DATA_BITMAP_BLOCKS),
        }
    }

    fn flush_superblock(&mut self) -> Result<(), SfsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        encode_record(&self.superblock, &mut buf)?;
        self.disk.write_blocks(SUPERBLOCK_BLOCK, 1, &buf)?;
        Ok(())
    }

    fn flush_bitmap(&mut self, kind: BitmapKind) -> Result<(), SfsError> {
        let (start, blocks) = Self::bitmap_region(kind);
        let mut buf = vec![0u8; blocks * BLOCK_SIZE];
        self.bitmap(kind).encode(&mut buf);
        self.disk.write_blocks(start, blocks, &buf)?;
        Ok(())
    }

    fn load_bitmap(&mut self, kind: BitmapKind) -> Result<(), SfsError> {
        let (start, blocks) = Self::bitmap_region(kind);
        let mut buf = vec![0u8; blocks * BLOCK_SIZE];
        self.disk.read_blocks(start, blocks, &mut buf)?;
        self.bitmap_mut(kind).decode(&buf);
        Ok(())
    }

    fn flush_inode_table(&mut self) -> Result<(), SfsError> {
        let mut buf = vec![0u8; INODE_TABLE_BLOCKS * BLOCK_SIZE];
        for (i, node) in self.inodes.iter().enumerate() {
            encode_record(node, &mut buf[i * INODE_DISK_SIZE..(i + 1) * INODE_DISK_SIZE])?;
        }
        self.disk
            .write_blocks(INODE_TABLE_START, INODE_TABLE_BLOCKS, &buf)?;
        Ok(())
    }

    fn load_inode_table(&mut self) -> Result<(), SfsError> {
        let mut buf = vec![0u8; INODE_TABLE_BLOCKS * BLOCK_SIZE];
        self.disk
            .read_blocks(INODE_TABLE_START, INODE_TABLE_BLOCKS, &mut buf)?;
        for (i, node) in self.inodes.iter_mut().enumerate() {
            *node = decode_record(&buf[i * INODE_DISK_SIZE..(i + 1) * INODE_DISK_SIZE])?;
        }
        Ok(())
    }

    fn flush_directory(&mut self) -> Result<(), SfsError> {
        let mut buf = vec![0u8; DIRECTORY_BLOCKS * BLOCK_SIZE];
        for (i, entry) in self.directory.iter().enumerate() {
            encode_record(
                entry,
                &mut buf[i * DIR_ENTRY_DISK_SIZE..(i + 1) * DIR_ENTRY_DISK_SIZE],
            )?;
        }
        self.disk
            .write_blocks(DIRECTORY_START, DIRECTORY_BLOCKS, &buf)?;
        Ok(())
    }

    fn load_directory(&mut self) -> Result<(), SfsError> {
        let mut buf = vec![0u8; DIRECTORY_BLOCKS * BLOCK_SIZE];
        self.disk
            .read_blocks(DIRECTORY_START, DIRECTORY_BLOCKS, &mut buf)?;
        for (i, entry) in self.directory.iter_mut().enumerate() {
            *entry = decode_record(&buf[i * DIR_ENTRY_DISK_SIZE..(i + 1) * DIR_ENTRY_DISK_SIZE])?;
        }
        Ok(())
    }

    fn load_pointer_block(&mut self, block: i32) -> Result<Vec<i32>, SfsError> {
        let mut raw = [0u8; BLOCK_SIZE];
        self.disk.read_blocks(block as usize, 1, &mut raw)?;
        let mut words = vec![0i32; POINTERS_PER_BLOCK];
        sfs_layout::bytes_to_words(&raw, &mut words);
        Ok(words)
    }

    fn store_pointer_block(&mut self, block: i32, words: &[i32]) -> Result<(), SfsError> {
        let mut raw = [0u8; BLOCK_SIZE];
        sfs_layout::words_to_bytes(words, &mut raw);
        self.disk.write_blocks(block as usize, 1, &raw)?;
        Ok(())
    }
}
