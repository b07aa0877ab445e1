use std::borrow::Cow;

use crate::{DataBlock, MAX_NAME};

/// 文件系统项的元信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    // 名字以 \0 结尾，最后一字节留给 \0
    name: [u8; MAX_NAME],
    /// 为 [`DirEntry::FREE`] 时表示空槽位
    num: i32,
}

impl DirEntry {
    /// 元信息大小恒为32字节
    pub const SIZE: usize = 32;
    pub const PER_BLOCK: usize = crate::DENTRIES_PER_BLOCK;
    /// 空槽位的哨兵 inode 号
    pub const FREE: i32 = -1;
    /// 名字的最大字节数
    pub const NAME_MAX_LEN: usize = MAX_NAME - 1;

    /// 调用方须保证名字不含 `\0` 且不超过 [`DirEntry::NAME_MAX_LEN`]
    #[inline]
    pub fn new(name: &str, num: u32) -> Self {
        let bytes = name.as_bytes();
        debug_assert!(bytes.len() <= Self::NAME_MAX_LEN);
        let len = bytes.len().min(Self::NAME_MAX_LEN);
        let mut name = [0; MAX_NAME];
        name[..len].copy_from_slice(&bytes[..len]);

        Self {
            name,
            num: num as i32,
        }
    }

    #[inline]
    pub fn free() -> Self {
        Self {
            name: [0; MAX_NAME],
            num: Self::FREE,
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.num < 0
    }

    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(MAX_NAME);
        &self.name[..len]
    }

    #[inline]
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name())
    }

    /// 空槽位没有 inode
    #[inline]
    pub fn inode(&self) -> Option<u32> {
        (!self.is_free()).then_some(self.num as u32)
    }

    /// 读出块内第 `slot` 个目录项
    pub fn read_slot(block: &DataBlock, slot: usize) -> Self {
        let raw = &block[slot * Self::SIZE..(slot + 1) * Self::SIZE];
        let mut name = [0; MAX_NAME];
        name.copy_from_slice(&raw[..MAX_NAME]);
        let mut num = [0; 4];
        num.copy_from_slice(&raw[MAX_NAME..]);

        Self {
            name,
            num: i32::from_le_bytes(num),
        }
    }

    pub fn write_slot(&self, block: &mut DataBlock, slot: usize) {
        let raw = &mut block[slot * Self::SIZE..(slot + 1) * Self::SIZE];
        raw[..MAX_NAME].copy_from_slice(&self.name);
        raw[MAX_NAME..].copy_from_slice(&self.num.to_le_bytes());
    }
}
