use clap::Parser;
use std::path::PathBuf;

/// Format a disk image with an empty wfs filesystem
#[derive(Parser)]
pub struct Cli {
    /// Disk image file
    #[arg(long, short)]
    pub disk: PathBuf,

    /// Number of inodes, rounded up to a multiple of 32
    #[arg(long, short)]
    pub inodes: usize,

    /// Number of data blocks, rounded up to a multiple of 32
    #[arg(long, short)]
    pub blocks: usize,

    /// Create or extend the image to this many MiB before formatting
    #[arg(long, short)]
    pub size_mib: Option<u64>,
}
