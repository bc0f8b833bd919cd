use anyhow::bail;
use clap::Parser;
use sfs::FileSystem;
use sfs_disk::DiskImage;
use sfs_layout::{BLOCK_SIZE, MAX_INODES, RESERVED_BLOCKS, TOTAL_BLOCKS};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the disk image
    #[arg(short, long)]
    disk: PathBuf,

    /// Force overwrite
    #[arg(short, long)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.disk.exists() && !cli.force {
        bail!("{} already exists (use --force to overwrite)", cli.disk.display());
    }

    let disk = DiskImage::create(&cli.disk, BLOCK_SIZE, TOTAL_BLOCKS)?;
    let fs = FileSystem::format(disk)?;
    let sb = fs.superblock();

    println!(
        "Formatted {} ({} bytes, {} blocks of {} bytes)",
        cli.disk.display(),
        sb.fs_size,
        TOTAL_BLOCKS,
        sb.block_size
    );
    println!(
        "{} inodes, {} metadata blocks, {} data blocks",
        MAX_INODES,
        RESERVED_BLOCKS,
        TOTAL_BLOCKS - RESERVED_BLOCKS
    );

    Ok(())
}
