//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：位图分配、inode 表读写、数据块访问。
//! 所有来自磁盘的偏移与编号都先核对其所属区域，越界一律视为损坏。

use crate::layout::*;
use crate::{DataBlock, DiskImage, Error, Result};
use crate::{BLOCK_SIZE, INDIRECT_COUNT, INODE_SIZE, ROOT_INO};

/// 格式化时请求的容量，两者都会向上取整到 32 的倍数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub num_inodes: usize,
    pub num_data_blocks: usize,
}

/// 新建 inode 的属主
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

pub struct WfsFileSystem {
    image: Box<dyn DiskImage>,
    super_block: SuperBlock,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
}

impl Geometry {
    pub fn new(num_inodes: usize, num_data_blocks: usize) -> Self {
        Self {
            num_inodes: num_inodes.next_multiple_of(32),
            num_data_blocks: num_data_blocks.next_multiple_of(32),
        }
    }

    #[inline]
    pub fn super_block(&self) -> SuperBlock {
        SuperBlock::new(self.num_inodes, self.num_data_blocks)
    }

    #[inline]
    pub fn required_bytes(&self) -> usize {
        self.super_block().required_bytes()
    }
}

impl WfsFileSystem {
    /// 在镜像中铺设空文件系统：超级块、清空的位图与各区域、根目录
    pub fn format(
        mut image: Box<dyn DiskImage>,
        geometry: Geometry,
        owner: Owner,
        now: i64,
    ) -> Result<Self> {
        if geometry.num_inodes == 0 || geometry.num_data_blocks == 0 {
            return Err(Error::InvalidGeometry);
        }

        let super_block = geometry.super_block();
        let required = super_block.required_bytes();
        if image.len() < required {
            return Err(Error::ImageTooSmall {
                required,
                actual: image.len(),
            });
        }

        let bytes = image.bytes_mut();
        bytes[..required].fill(0);
        let mut raw = [0; SuperBlock::SIZE];
        super_block.encode(&mut raw);
        bytes[..SuperBlock::SIZE].copy_from_slice(&raw);

        let mut fs = Self::with_super_block(image, super_block);

        let root = fs.alloc_inode()?;
        debug_assert_eq!(root, ROOT_INO);
        let mut root_inode = DiskInode::default();
        root_inode.init(ROOT_INO, S_IFDIR | 0o755, 2, owner.uid, owner.gid, now);
        fs.write_inode(&root_inode)?;

        if let Err(err) = fs.image.flush() {
            log::warn!("failed to flush freshly formatted image: {err}");
        }
        log::info!(
            "formatted: {} inodes, {} data blocks, data region at {:#x}",
            super_block.num_inodes,
            super_block.num_data_blocks,
            super_block.d_blocks_ptr
        );

        Ok(fs)
    }

    /// 读取并校验已格式化镜像的超级块
    pub fn open(image: Box<dyn DiskImage>) -> Result<Self> {
        let raw: &[u8; SuperBlock::SIZE] = image
            .bytes()
            .get(..SuperBlock::SIZE)
            .and_then(|raw| raw.try_into().ok())
            .ok_or(Error::Corrupted)?;
        let super_block = SuperBlock::decode(raw);

        if !super_block.is_valid(image.len()) {
            log::error!("invalid super block: {super_block:?}");
            return Err(Error::Corrupted);
        }

        let fs = Self::with_super_block(image, super_block);
        if !fs.inode_bitmap.get(fs.image.bytes(), ROOT_INO as usize) {
            log::error!("root inode is not allocated");
            return Err(Error::Corrupted);
        }
        Ok(fs)
    }

    fn with_super_block(image: Box<dyn DiskImage>, super_block: SuperBlock) -> Self {
        Self {
            image,
            inode_bitmap: Bitmap::new(super_block.i_bitmap_ptr, super_block.num_inodes),
            data_bitmap: Bitmap::new(super_block.d_bitmap_ptr, super_block.num_data_blocks),
            super_block,
        }
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    #[inline]
    pub fn into_image(self) -> Box<dyn DiskImage> {
        self.image
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.image.flush()
    }

    pub fn flush_async(&self) -> std::io::Result<()> {
        self.image.flush_async()
    }
}

impl WfsFileSystem {
    /// 在磁盘上分配新的 inode 并返回其编号
    pub fn alloc_inode(&mut self) -> Result<u32> {
        let num = self
            .inode_bitmap
            .alloc(self.image.bytes_mut())
            .ok_or(Error::NoSpace)?;
        log::trace!("alloc inode {num}");
        Ok(num as u32)
    }

    pub fn dealloc_inode(&mut self, num: u32) {
        debug_assert_ne!(num, ROOT_INO);
        log::trace!("dealloc inode {num}");
        self.inode_bitmap.dealloc(self.image.bytes_mut(), num as usize);
    }

    /// 在磁盘上分配新的数据块，清零后返回其字节偏移
    pub fn alloc_data(&mut self) -> Result<u64> {
        let index = self
            .data_bitmap
            .alloc(self.image.bytes_mut())
            .ok_or(Error::NoSpace)?;
        let offset = (self.super_block.d_blocks_ptr + index * BLOCK_SIZE) as u64;
        self.block_mut(offset)?.fill(0);
        log::trace!("alloc data block {index} at {offset:#x}");
        Ok(offset)
    }

    /// 一次分配 `count` 个数据块；中途用尽则归还已分配的部分
    pub fn alloc_data_batch(&mut self, count: usize) -> Result<Vec<u64>> {
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            match self.alloc_data() {
                Ok(block) => blocks.push(block),
                Err(err) => {
                    log::warn!("rolling back {} of {count} data blocks", blocks.len());
                    for block in blocks {
                        self.dealloc_data(block)?;
                    }
                    return Err(err);
                }
            }
        }
        Ok(blocks)
    }

    pub fn dealloc_data(&mut self, offset: u64) -> Result<()> {
        let index = self.data_index(offset)?;
        log::trace!("dealloc data block {index}");
        self.data_bitmap.dealloc(self.image.bytes_mut(), index);
        Ok(())
    }

    #[inline]
    pub fn free_inodes(&self) -> usize {
        self.inode_bitmap.capacity() - self.inode_bitmap.count_allocated(self.image.bytes())
    }

    #[inline]
    pub fn free_data_blocks(&self) -> usize {
        self.data_bitmap.capacity() - self.data_bitmap.count_allocated(self.image.bytes())
    }

    #[inline]
    pub fn is_inode_allocated(&self, num: u32) -> bool {
        self.inode_bitmap.get(self.image.bytes(), num as usize)
    }

    #[inline]
    pub fn is_data_allocated(&self, offset: u64) -> bool {
        self.data_index(offset)
            .is_ok_and(|index| self.data_bitmap.get(self.image.bytes(), index))
    }
}

impl WfsFileSystem {
    pub fn inode(&self, num: u32) -> Result<DiskInode> {
        let offset = self.inode_pos(num)?;
        let raw = self.record::<{ DiskInode::SIZE }>(offset)?;
        Ok(DiskInode::decode(raw))
    }

    pub fn write_inode(&mut self, inode: &DiskInode) -> Result<()> {
        let offset = self.inode_pos(inode.num)?;
        let raw = self.record_mut::<{ DiskInode::SIZE }>(offset)?;
        inode.encode(raw);
        Ok(())
    }

    /// 通过编号获取 inode 在镜像中的字节偏移
    fn inode_pos(&self, num: u32) -> Result<usize> {
        if num as usize >= self.super_block.num_inodes {
            log::error!("inode number {num} out of range");
            return Err(Error::Corrupted);
        }
        Ok(self.super_block.i_blocks_ptr + num as usize * INODE_SIZE)
    }
}

impl WfsFileSystem {
    pub fn block(&self, offset: u64) -> Result<&DataBlock> {
        self.data_index(offset)?;
        self.record::<BLOCK_SIZE>(offset as usize)
    }

    pub fn block_mut(&mut self, offset: u64) -> Result<&mut DataBlock> {
        self.data_index(offset)?;
        self.record_mut::<BLOCK_SIZE>(offset as usize)
    }

    /// 一级索引块内第 `index` 个数据块偏移
    pub fn indirect_entry(&self, indirect: u64, index: usize) -> Result<u64> {
        debug_assert!(index < INDIRECT_COUNT);
        let block = self.block(indirect)?;
        let mut raw = [0; 8];
        raw.copy_from_slice(&block[index * 8..(index + 1) * 8]);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn set_indirect_entry(&mut self, indirect: u64, index: usize, offset: u64) -> Result<()> {
        debug_assert!(index < INDIRECT_COUNT);
        let block = self.block_mut(indirect)?;
        block[index * 8..(index + 1) * 8].copy_from_slice(&offset.to_le_bytes());
        Ok(())
    }

    /// 数据块偏移对应的位图编号，要求落在数据区内且按块对齐
    fn data_index(&self, offset: u64) -> Result<usize> {
        let start = self.super_block.d_blocks_ptr;
        let offset = usize::try_from(offset).map_err(|_| Error::Corrupted)?;
        let relative = offset.checked_sub(start).ok_or(Error::Corrupted)?;
        let index = relative / BLOCK_SIZE;

        if relative % BLOCK_SIZE != 0 || index >= self.super_block.num_data_blocks {
            log::error!("block pointer {offset:#x} outside the data region");
            return Err(Error::Corrupted);
        }
        Ok(index)
    }

    fn record<const N: usize>(&self, offset: usize) -> Result<&[u8; N]> {
        self.image
            .bytes()
            .get(offset..offset + N)
            .and_then(|raw| raw.try_into().ok())
            .ok_or(Error::Corrupted)
    }

    fn record_mut<const N: usize>(&mut self, offset: usize) -> Result<&mut [u8; N]> {
        self.image
            .bytes_mut()
            .get_mut(offset..offset + N)
            .and_then(|raw| raw.try_into().ok())
            .ok_or(Error::Corrupted)
    }
}
