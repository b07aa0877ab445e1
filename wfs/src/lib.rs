//! # wfs
//!
//! 单镜像、单挂载的简易文件系统，整体架构自上而下：
//!
//! 操作表 | 目录层与路径解析 | 磁盘块管理器层 | 磁盘数据结构层 | 磁盘镜像

// 操作表：供桥接层调用的 getattr、readdir、mkdir 等入口
mod vfs;

// 目录层：把目录的数据块解释为目录项数组
mod dir;

// 路径解析：把路径切分为各级名字
mod path;

// 磁盘块管理器层：分配回收、inode 表、块读写与格式化
mod efs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 磁盘镜像：整块可按字节寻址的存储
mod image;

mod error;

pub use self::{
    efs::{Geometry, Owner, WfsFileSystem},
    error::{Error, Result},
    image::DiskImage,
    layout::{DirEntry, DiskInode, StatKind, SuperBlock},
    vfs::{DirEntryInfo, Stat, StatFs, Wfs},
};

pub const BLOCK_SIZE: usize = 512;
/// inode 表中每个 inode 独占的槽位大小
pub const INODE_SIZE: usize = BLOCK_SIZE;
/// 直接索引个数
pub const DIRECT_COUNT: usize = 7;
/// 一级索引块内的块指针个数
pub const INDIRECT_COUNT: usize = 64;
/// inode 的块指针总数，最后一个指向一级索引块
pub const N_BLOCKS: usize = DIRECT_COUNT + 1;
/// 目录项名字的字节容量，含结尾的 `\0`
pub const MAX_NAME: usize = 28;
/// 每个数据块容纳的目录项个数
pub const DENTRIES_PER_BLOCK: usize = BLOCK_SIZE / 32;
/// 单个文件的大小上限
pub const MAX_FILE_SIZE: usize = (DIRECT_COUNT + INDIRECT_COUNT) * BLOCK_SIZE;
/// 根目录的 inode 号
pub const ROOT_INO: u32 = 0;

type DataBlock = [u8; BLOCK_SIZE];
