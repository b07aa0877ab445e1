use clap::Parser;
use std::path::PathBuf;

/// Mount a wfs disk image through FUSE
#[derive(Parser)]
pub struct Cli {
    /// Disk image file formatted by mkfs
    pub disk: PathBuf,

    /// Directory to mount on
    pub mountpoint: PathBuf,

    /// Mount options, comma separated (allow_other, auto_unmount, ro, ...)
    #[arg(short = 'o', value_name = "OPT")]
    pub options: Vec<String>,

    /// Stay in the foreground (always the case)
    #[arg(short = 'f')]
    pub foreground: bool,

    /// Single-threaded (always the case)
    #[arg(short = 's')]
    pub single_thread: bool,
}
