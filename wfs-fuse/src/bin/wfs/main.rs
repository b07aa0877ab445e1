mod cli;

use clap::Parser;
use cli::Cli;
use wfs::Wfs;
use wfs_fuse::{Error, MappedImage};

fn main() -> Result<(), Error> {
    env_logger::init();
    let cli = Cli::parse();

    let image = MappedImage::open(&cli.disk)?;
    let wfs = Wfs::open(Box::new(image))?;
    let statfs = wfs.statfs();
    log::info!(
        "opened {:?}: {}/{} inodes free, {}/{} blocks free",
        cli.disk,
        statfs.free_inodes,
        statfs.inodes,
        statfs.free_blocks,
        statfs.blocks
    );

    let options: Vec<_> = cli
        .options
        .iter()
        .flat_map(|opts| wfs_fuse::parse_mount_options(opts))
        .collect();
    wfs_fuse::mount(wfs, &cli.mountpoint, &options)
}
