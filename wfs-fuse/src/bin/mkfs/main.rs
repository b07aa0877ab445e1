mod cli;

use clap::Parser;
use cli::Cli;
use typed_bytesize::ByteSizeIec;
use wfs::{Geometry, Wfs};
use wfs_fuse::{current_owner, Error, MappedImage};

fn main() -> Result<(), Error> {
    env_logger::init();
    let cli = Cli::parse();

    let image = match cli.size_mib {
        Some(mib) => MappedImage::create(&cli.disk, ByteSizeIec::mib(mib).0)?,
        None => MappedImage::open(&cli.disk)?,
    };

    let geometry = Geometry::new(cli.inodes, cli.blocks);
    let fs = Wfs::format(Box::new(image), geometry, current_owner())?.into_inner();

    let sb = fs.super_block();
    println!("disk={:?}", cli.disk);
    println!("num_inodes={}", sb.num_inodes);
    println!("num_data_blocks={}", sb.num_data_blocks);
    println!("i_bitmap_ptr={:#x}", sb.i_bitmap_ptr);
    println!("d_bitmap_ptr={:#x}", sb.d_bitmap_ptr);
    println!("i_blocks_ptr={:#x}", sb.i_blocks_ptr);
    println!("d_blocks_ptr={:#x}", sb.d_blocks_ptr);

    Ok(())
}
