//! End-to-end coverage of the public file API over a real backing image.

use proptest::prelude::*;
use sfs::{FileSystem, SfsError};
use sfs_disk::DiskImage;
use sfs_layout::{BLOCK_SIZE, TOTAL_BLOCKS};
use tempfile::NamedTempFile;

fn fresh() -> (FileSystem, NamedTempFile) {
    let _ = env_logger::builder().is_test(true).try_init();
    let image = NamedTempFile::new().unwrap();
    let disk = DiskImage::create(image.path(), BLOCK_SIZE, TOTAL_BLOCKS).unwrap();
    (FileSystem::format(disk).unwrap(), image)
}

#[test]
fn write_seek_read_round_trip() {
    let (mut fs, _image) = fresh();

    let fd = fs.open("a").unwrap();
    assert_eq!(fs.write(fd, b"hello").unwrap(), 5);

    fs.seek(fd, 0).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    assert_eq!(fs.file_size("a"), 5);
    fs.check_consistency().unwrap();
}

#[test]
fn thirteen_block_file_spans_the_indirect_region() {
    let (mut fs, _image) = fresh();

    let fd = fs.open("big").unwrap();
    let data = vec![0x42u8; 13 * 1024];
    assert_eq!(fs.write(fd, &data).unwrap(), 13312);
    assert_eq!(fs.file_size("big"), 13312);

    fs.seek(fd, 0).unwrap();
    let mut back = vec![0u8; data.len()];
    assert_eq!(fs.read(fd, &mut back).unwrap(), data.len());
    assert_eq!(back, data);
    fs.check_consistency().unwrap();
}

#[test]
fn inode_table_exhaustion_fails_the_128th_create() {
    let (mut fs, _image) = fresh();

    for i in 0..127 {
        let name = format!("f{}", i);
        let fd = fs.open(&name).unwrap();
        assert_eq!(fs.write(fd, b"x").unwrap(), 1);
        fs.close(fd).unwrap();
    }

    assert!(fs.open("one-too-many").is_err());
    fs.check_consistency().unwrap();
}

#[test]
fn reopen_appends_and_preserves_content() {
    let (mut fs, _image) = fresh();

    let first: Vec<u8> = (0..2000u32).map(|i| (i % 256) as u8).collect();
    let fd = fs.open("x").unwrap();
    assert_eq!(fs.write(fd, &first).unwrap(), 2000);
    fs.close(fd).unwrap();

    let fd2 = fs.open("x").unwrap();
    assert_eq!(fd2, fd);

    let second = vec![0x99u8; 500];
    assert_eq!(fs.write(fd2, &second).unwrap(), 500);
    assert_eq!(fs.file_size("x"), 2500);

    fs.seek(fd2, 0).unwrap();
    let mut back = vec![0u8; 2500];
    assert_eq!(fs.read(fd2, &mut back).unwrap(), 2500);
    assert_eq!(&back[..2000], &first[..]);
    assert_eq!(&back[2000..], &second[..]);
    fs.check_consistency().unwrap();
}

#[test]
fn enumeration_walks_in_slot_order_and_wraps() {
    let (mut fs, _image) = fresh();

    for name in ["a", "b", "c"] {
        let fd = fs.open(name).unwrap();
        fs.write(fd, b"_").unwrap();
        fs.close(fd).unwrap();
    }

    assert_eq!(fs.next_filename().as_deref(), Some("a"));
    assert_eq!(fs.next_filename().as_deref(), Some("b"));
    assert_eq!(fs.next_filename().as_deref(), Some("c"));
    assert_eq!(fs.next_filename(), None);

    // The cursor wrapped; the walk restarts.
    assert_eq!(fs.next_filename().as_deref(), Some("a"));
}

#[test]
fn removed_file_reports_size_zero_and_recreates_empty() {
    let (mut fs, _image) = fresh();

    let fd = fs.open("t").unwrap();
    fs.write(fd, &vec![1u8; 3000]).unwrap();
    fs.remove("t").unwrap();
    assert_eq!(fs.file_size("t"), 0);

    let fd2 = fs.open("t").unwrap();
    assert_eq!(fs.file_size("t"), 0);
    let mut buf = [0u8; 8];
    assert_eq!(fs.read(fd2, &mut buf).unwrap(), 0);
    fs.check_consistency().unwrap();
}

#[test]
fn remove_of_missing_file_is_an_error() {
    let (mut fs, _image) = fresh();
    assert!(matches!(fs.remove("ghost"), Err(SfsError::NotFound(_))));
}

#[test]
fn close_is_single_shot() {
    let (mut fs, _image) = fresh();
    let fd = fs.open("a").unwrap();
    fs.close(fd).unwrap();
    assert!(matches!(fs.close(fd), Err(SfsError::NotOpen)));
    assert!(matches!(fs.close(4096), Err(SfsError::BadHandle(_))));
}

#[test]
fn seek_is_idempotent() {
    let (mut fs, _image) = fresh();
    let fd = fs.open("a").unwrap();
    fs.write(fd, b"0123456789").unwrap();

    fs.seek(fd, 4).unwrap();
    fs.seek(fd, 4).unwrap();
    let mut buf = [0u8; 3];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"456");
}

#[test]
fn contents_survive_a_remount() {
    let image = NamedTempFile::new().unwrap();

    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
    {
        let disk = DiskImage::create(image.path(), BLOCK_SIZE, TOTAL_BLOCKS).unwrap();
        let mut fs = FileSystem::format(disk).unwrap();

        let fd = fs.open("keep").unwrap();
        fs.write(fd, &payload).unwrap();
        fs.close(fd).unwrap();

        let fd = fs.open("small").unwrap();
        fs.write(fd, b"tiny").unwrap();
        fs.close(fd).unwrap();
    }

    let disk = DiskImage::open(image.path(), BLOCK_SIZE, TOTAL_BLOCKS).unwrap();
    let mut fs = FileSystem::mount(disk).unwrap();

    assert_eq!(fs.file_size("keep"), payload.len() as u64);
    assert_eq!(fs.file_size("small"), 4);
    assert_eq!(fs.next_filename().as_deref(), Some("keep"));
    assert_eq!(fs.next_filename().as_deref(), Some("small"));
    assert_eq!(fs.next_filename(), None);

    let fd = fs.open("keep").unwrap();
    fs.seek(fd, 0).unwrap();
    let mut back = vec![0u8; payload.len()];
    assert_eq!(fs.read(fd, &mut back).unwrap(), payload.len());
    assert_eq!(back, payload);
    fs.check_consistency().unwrap();
}

#[test]
fn append_grows_size_by_exactly_the_bytes_written() {
    let (mut fs, _image) = fresh();
    let fd = fs.open("log").unwrap();

    let mut expected = 0u64;
    for chunk in [3usize, 1024, 1500, 1] {
        fs.write(fd, &vec![5u8; chunk]).unwrap();
        expected += chunk as u64;
        assert_eq!(fs.file_size("log"), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // Sequential writes followed by a full read recover the exact
    // concatenation of the written buffers.
    #[test]
    fn sequential_writes_read_back_concatenated(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..2048), 1..8)
    ) {
        let (mut fs, _image) = fresh();
        let fd = fs.open("p").unwrap();

        let mut expected = Vec::new();
        for chunk in &chunks {
            prop_assert_eq!(fs.write(fd, chunk).unwrap(), chunk.len());
            expected.extend_from_slice(chunk);
        }
        prop_assert_eq!(fs.file_size("p"), expected.len() as u64);

        fs.seek(fd, 0).unwrap();
        let mut back = vec![0u8; expected.len()];
        prop_assert_eq!(fs.read(fd, &mut back).unwrap(), expected.len());
        prop_assert_eq!(back, expected);
        fs.check_consistency().unwrap();
    }
}
