use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::debug;
use sfs::FileSystem;
use sfs_disk::DiskImage;
use sfs_layout::{BLOCK_SIZE, TOTAL_BLOCKS};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the disk image
    #[arg(short, long)]
    disk: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all files
    Ls,
    /// Print a file's contents to stdout
    Cat { name: String },
    /// Copy a host file into the filesystem
    Put {
        /// Host path to read
        source: PathBuf,
        /// Filename inside the image
        name: String,
    },
    /// Remove a file
    Rm { name: String },
    /// Print a file's size in bytes
    Stat { name: String },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let disk = DiskImage::open(&cli.disk, BLOCK_SIZE, TOTAL_BLOCKS)
        .with_context(|| format!("cannot open image {}", cli.disk.display()))?;
    let mut fs = FileSystem::mount(disk)?;

    match cli.command {
        Commands::Ls => {
            while let Some(name) = fs.next_filename() {
                println!("{:>10}  {}", fs.file_size(&name), name);
            }
        }
        Commands::Cat { name } => {
            let size = fs.file_size(&name);
            if size == 0 {
                bail!("no such file: {}", name);
            }
            let fd = fs.open(&name)?;
            let mut buf = vec![0u8; size as usize];
            let read = fs.read(fd, &mut buf)?;
            debug!("read {} of {} bytes", read, size);
            std::io::stdout().write_all(&buf[..read])?;
            fs.close(fd)?;
        }
        Commands::Put { source, name } => {
            let data = std::fs::read(&source)
                .with_context(|| format!("cannot read {}", source.display()))?;
            // Recreate so the new contents fully replace the old file.
            if fs.file_size(&name) > 0 {
                fs.remove(&name)?;
            }
            let fd = fs.open(&name)?;
            let written = fs.write(fd, &data)?;
            fs.close(fd)?;
            println!("{} -> {} ({} bytes)", source.display(), name, written);
        }
        Commands::Rm { name } => {
            fs.remove(&name)?;
        }
        Commands::Stat { name } => {
            println!("{}", fs.file_size(&name));
        }
    }

    Ok(())
}
