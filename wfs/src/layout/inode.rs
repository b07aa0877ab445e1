//! 索引结构
//! - 直接索引：`blocks[0..7]` 存放数据块的字节偏移
//! - 一级索引：`blocks[7]` 指向一个索引块，整个块连续存放 64 个数据块偏移
//!
//! 偏移为 0 表示尚未分配。数据区位于镜像中段，合法偏移不会为 0。

use enumflags2::{bitflags, BitFlags};

use super::{get_u32, get_u64, put_u32, put_u64};
use crate::efs::WfsFileSystem;
use crate::{BLOCK_SIZE, DIRECT_COUNT, INDIRECT_COUNT, MAX_FILE_SIZE, N_BLOCKS};
use crate::{Error, Result};

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = StatKind::DIR as u32;
pub const S_IFREG: u32 = StatKind::FILE as u32;

/// 文件类型，取值即 `mode` 中的类型位
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiskInode {
    /// 自身的编号
    pub num: u32,
    /// 类型位与权限位
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// 硬链接个数
    pub nlinks: u32,
    pub atim: i64,
    pub mtim: i64,
    pub ctim: i64,
    /// 前七个为直接索引，最后一个指向一级索引块
    pub blocks: [u64; N_BLOCKS],
}

impl DiskInode {
    /// 记录本身的字节数，在 inode 表中占据一整个槽位
    pub const SIZE: usize = 120;

    #[inline]
    pub fn init(&mut self, num: u32, mode: u32, nlinks: u32, uid: u32, gid: u32, now: i64) {
        *self = Self {
            num,
            mode,
            uid,
            gid,
            nlinks,
            atim: now,
            mtim: now,
            ctim: now,
            ..Default::default()
        }
    }

    /// 由类型位得出；设备、链接等其它类型一律视为普通文件
    #[inline]
    pub fn kind(&self) -> StatKind {
        BitFlags::<StatKind>::from_bits(self.mode & S_IFMT)
            .ok()
            .and_then(BitFlags::exactly_one)
            .unwrap_or_default()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == StatKind::DIR
    }

    /// 修改了内容：刷新全部时间戳
    #[inline]
    pub fn touch(&mut self, now: i64) {
        self.atim = now;
        self.mtim = now;
        self.ctim = now;
    }

    #[inline]
    pub fn direct(&self) -> &[u64] {
        &self.blocks[..DIRECT_COUNT]
    }

    #[inline]
    pub fn indirect(&self) -> u64 {
        self.blocks[DIRECT_COUNT]
    }

    /// 对外报告的占用块数：
    /// 文件按大小向上取整，目录只数已分配的直接块
    pub fn stat_blocks(&self) -> u64 {
        match self.kind() {
            StatKind::FILE => Self::count_data_block(self.size) as u64,
            StatKind::DIR => self.direct().iter().filter(|&&block| block != 0).count() as u64,
        }
    }

    pub fn decode(raw: &[u8; Self::SIZE]) -> Self {
        let mut blocks = [0; N_BLOCKS];
        for (i, block) in blocks.iter_mut().enumerate() {
            *block = get_u64(raw, 56 + i * 8);
        }

        Self {
            num: get_u32(raw, 0),
            mode: get_u32(raw, 4),
            uid: get_u32(raw, 8),
            gid: get_u32(raw, 12),
            size: get_u64(raw, 16),
            nlinks: get_u32(raw, 24),
            atim: get_u64(raw, 32) as i64,
            mtim: get_u64(raw, 40) as i64,
            ctim: get_u64(raw, 48) as i64,
            blocks,
        }
    }

    pub fn encode(&self, raw: &mut [u8; Self::SIZE]) {
        put_u32(raw, 0, self.num);
        put_u32(raw, 4, self.mode);
        put_u32(raw, 8, self.uid);
        put_u32(raw, 12, self.gid);
        put_u64(raw, 16, self.size);
        put_u32(raw, 24, self.nlinks);
        put_u32(raw, 28, 0);
        put_u64(raw, 32, self.atim as u64);
        put_u64(raw, 40, self.mtim as u64);
        put_u64(raw, 48, self.ctim as u64);
        for (i, &block) in self.blocks.iter().enumerate() {
            put_u64(raw, 56 + i * 8, block);
        }
    }
}

impl DiskInode {
    /// 逻辑上 inode 指向一系列数据块，此处传入的是这些数据块的索引（逻辑索引），
    /// 返回数据块在镜像中的字节偏移
    pub fn block_offset(&self, block_index: usize, fs: &WfsFileSystem) -> Result<u64> {
        let offset = if block_index < DIRECT_COUNT {
            self.blocks[block_index]
        } else if block_index < DIRECT_COUNT + INDIRECT_COUNT {
            // 剔去直接索引的部分
            fs.indirect_entry(self.indirect(), block_index - DIRECT_COUNT)?
        } else {
            return Err(Error::Corrupted);
        };

        if offset == 0 {
            log::error!("inode {} has no block at index {block_index}", self.num);
            return Err(Error::Corrupted);
        }
        Ok(offset)
    }

    /// 把一批已分配、已清零的块依序挂到索引上，并把大小扩至 `larger_size`
    pub fn expand_to(
        &mut self,
        larger_size: u64,
        new_blocks: Vec<u64>,
        fs: &mut WfsFileSystem,
    ) -> Result<()> {
        debug_assert!(larger_size >= self.size);
        let mut block_index = Self::count_data_block(self.size);
        let new_total_blocks = Self::count_data_block(larger_size);
        self.size = larger_size;
        let mut new_blocks = new_blocks.into_iter();
        let mut next = || new_blocks.next().ok_or(Error::NoSpace);

        /******************** 直接索引 ********************/
        while block_index < new_total_blocks.min(DIRECT_COUNT) {
            self.blocks[block_index] = next()?;
            block_index += 1;
        }
        /******************** END ********************/

        if new_total_blocks <= DIRECT_COUNT {
            return Ok(());
        }

        /******************** 一级索引 ********************/
        // 这次扩张越过了直接索引的容量，创建一级索引块
        if block_index == DIRECT_COUNT {
            self.blocks[DIRECT_COUNT] = next()?;
        }

        while block_index < new_total_blocks {
            fs.set_indirect_entry(self.indirect(), block_index - DIRECT_COUNT, next()?)?;
            block_index += 1;
        }
        /******************** END ********************/

        Ok(())
    }

    /// 摘下全部数据块与索引块，返回它们的偏移交由调用方回收
    pub fn clear(&mut self, fs: &WfsFileSystem) -> Result<Vec<u64>> {
        let mut drop_blocks: Vec<u64> = Vec::with_capacity(N_BLOCKS + INDIRECT_COUNT);
        drop_blocks.extend(self.direct().iter().copied().filter(|&block| block != 0));

        if self.indirect() != 0 {
            for index in 0..INDIRECT_COUNT {
                let block = fs.indirect_entry(self.indirect(), index)?;
                if block != 0 {
                    drop_blocks.push(block);
                }
            }
            drop_blocks.push(self.indirect());
        }

        self.blocks.fill(0);
        self.size = 0;
        Ok(drop_blocks)
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`
    pub fn read_at(&self, offset: usize, buf: &mut [u8], fs: &WfsFileSystem) -> Result<usize> {
        let mut start = offset;
        let end = start.saturating_add(buf.len()).min(self.size as usize);

        if start >= end {
            return Ok(0);
        }

        // 已读取多少字节
        let mut read_size = 0;
        loop {
            // 当前块的逻辑索引，第七块起经由一级索引
            let block_index = start / BLOCK_SIZE;
            // 当前块的末地址(字节)
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_read_size = current_block_end - start;

            let data_block = fs.block(self.block_offset(block_index, fs)?)?;
            // 绝对地址 % 块大小 = 块内偏移
            let src = &data_block[start % BLOCK_SIZE..start % BLOCK_SIZE + block_read_size];
            buf[read_size..read_size + block_read_size].copy_from_slice(src);

            read_size += block_read_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        Ok(read_size)
    }

    /// 写入已分配的范围，超出当前大小的部分会被截断；
    /// 扩张由调用方先经 [`DiskInode::expand_to`] 完成
    pub fn write_at(&self, offset: usize, buf: &[u8], fs: &mut WfsFileSystem) -> Result<usize> {
        let mut start = offset;
        let end = start.saturating_add(buf.len()).min(self.size as usize);

        if start >= end {
            return Ok(0);
        }

        let mut written_size = 0;
        loop {
            let block_index = start / BLOCK_SIZE;
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_write_size = current_block_end - start;

            let block_offset = self.block_offset(block_index, fs)?;
            let data_block = fs.block_mut(block_offset)?;
            let src = &buf[written_size..written_size + block_write_size];
            data_block[start % BLOCK_SIZE..start % BLOCK_SIZE + block_write_size]
                .copy_from_slice(src);

            written_size += block_write_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        Ok(written_size)
    }

    /// 计算容纳指定数据量需要多少个**数据块**
    #[inline]
    pub fn count_data_block(size: u64) -> usize {
        (size as usize).div_ceil(BLOCK_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据块** 和 **索引块**
    pub fn count_total_block(size: u64) -> usize {
        debug_assert!(size as usize <= MAX_FILE_SIZE);
        let data_blocks = Self::count_data_block(size);

        // 超出直接索引，使用一级索引块
        if data_blocks > DIRECT_COUNT {
            data_blocks + 1
        } else {
            data_blocks
        }
    }
}
