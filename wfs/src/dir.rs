//! # 目录层
//!
//! 目录的内容是其直接块的拼接，每块容纳 16 个目录项，
//! 空槽位由哨兵 inode 号标记，靠线性扫描发现，不另设空闲链表。
//! 目录至多使用 7 个直接块，不经由一级索引。

use crate::efs::WfsFileSystem;
use crate::layout::{DirEntry, DiskInode};
use crate::{DataBlock, Error, Result};

/// 目录项在镜像中的位置：所在块的偏移与块内槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotPos {
    block: u64,
    slot: usize,
}

/// 在单个块内按名字查找，跳过空槽位
pub fn lookup_in_block(block: &DataBlock, name: &str) -> Option<(usize, u32)> {
    (0..DirEntry::PER_BLOCK).find_map(|slot| {
        let entry = DirEntry::read_slot(block, slot);
        entry
            .inode()
            .filter(|_| entry.name() == name.as_bytes())
            .map(|num| (slot, num))
    })
}

impl WfsFileSystem {
    /// 在目录下通过名字获取目录项的 inode 号
    pub fn dir_lookup(&self, dir: &DiskInode, name: &str) -> Result<Option<u32>> {
        Ok(self.dir_find(dir, name)?.map(|(_, num)| num))
    }

    /// 依块、槽的顺序列出全部非空目录项
    pub fn dir_entries(&self, dir: &DiskInode) -> Result<Vec<DirEntry>> {
        debug_assert!(dir.is_dir());
        let mut entries = Vec::new();
        for &block in dir.direct().iter().filter(|&&block| block != 0) {
            let data_block = self.block(block)?;
            entries.extend(
                (0..DirEntry::PER_BLOCK)
                    .map(|slot| DirEntry::read_slot(data_block, slot))
                    .filter(|entry| !entry.is_free()),
            );
        }
        Ok(entries)
    }

    pub fn dir_is_empty(&self, dir: &DiskInode) -> Result<bool> {
        Ok(self.dir_entries(dir)?.is_empty())
    }

    /// 插入新目录项：优先复用最早出现的空槽位，没有就分配新块。
    /// 只修改 `dir` 的内存副本，由调用方写回。
    pub fn dir_insert(
        &mut self,
        dir: &mut DiskInode,
        name: &str,
        num: u32,
        now: i64,
    ) -> Result<()> {
        debug_assert!(dir.is_dir());
        let entry = DirEntry::new(name, num);

        match self.find_free_slot(dir)? {
            Some(SlotPos { block, slot }) => {
                entry.write_slot(self.block_mut(block)?, slot);
            }
            None => {
                // 直接块全部用尽
                let index = dir
                    .direct()
                    .iter()
                    .position(|&block| block == 0)
                    .ok_or(Error::NoSpace)?;
                let block = self.alloc_data()?;
                let data_block = self.block_mut(block)?;
                for slot in 0..DirEntry::PER_BLOCK {
                    DirEntry::free().write_slot(data_block, slot);
                }
                entry.write_slot(data_block, 0);
                dir.blocks[index] = block;
                log::trace!("directory {} grows to block #{index}", dir.num);
            }
        }

        dir.size += DirEntry::SIZE as u64;
        dir.touch(now);
        Ok(())
    }

    /// 按名字移除目录项并返回其 inode 号；块即使全空也不回收。
    /// 只修改 `dir` 的内存副本，由调用方写回。
    pub fn dir_remove(&mut self, dir: &mut DiskInode, name: &str, now: i64) -> Result<u32> {
        debug_assert!(dir.is_dir());
        let (SlotPos { block, slot }, num) = self.dir_find(dir, name)?.ok_or(Error::NotFound)?;

        DirEntry::free().write_slot(self.block_mut(block)?, slot);
        dir.size = dir.size.saturating_sub(DirEntry::SIZE as u64);
        dir.touch(now);
        Ok(num)
    }

    fn dir_find(&self, dir: &DiskInode, name: &str) -> Result<Option<(SlotPos, u32)>> {
        debug_assert!(dir.is_dir());
        for &block in dir.direct().iter().filter(|&&block| block != 0) {
            if let Some((slot, num)) = lookup_in_block(self.block(block)?, name) {
                return Ok(Some((SlotPos { block, slot }, num)));
            }
        }
        Ok(None)
    }

    fn find_free_slot(&self, dir: &DiskInode) -> Result<Option<SlotPos>> {
        for &block in dir.direct().iter().filter(|&&block| block != 0) {
            let data_block = self.block(block)?;
            if let Some(slot) = (0..DirEntry::PER_BLOCK)
                .find(|&slot| DirEntry::read_slot(data_block, slot).is_free())
            {
                return Ok(Some(SlotPos { block, slot }));
            }
        }
        Ok(None)
    }
}
