//! # 路径解析
//!
//! 路径以 `/` 分隔，空段（连续或结尾的 `/`）一律忽略。
//! 切分只借用调用方的字符串，不做修改也不分配。

use crate::efs::WfsFileSystem;
use crate::{Error, Result, ROOT_INO};

/// 依次产出路径的各级名字
#[inline]
pub fn components(path: &str) -> impl DoubleEndedIterator<Item = &str> {
    path.split('/').filter(|cmp| !cmp.is_empty())
}

/// 拆成父目录路径与最后一级名字；根路径没有最后一级
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let basename = components(trimmed).next_back()?;
    let parent = &trimmed[..trimmed.len() - basename.len()];
    Some((parent, basename))
}

impl WfsFileSystem {
    /// 从根目录出发逐级查找，返回路径指向的 inode 号
    pub fn resolve(&self, path: &str) -> Result<u32> {
        let mut num = ROOT_INO;
        for cmp in components(path) {
            let inode = self.inode(num)?;
            if !inode.is_dir() {
                return Err(Error::NotADirectory);
            }
            num = self.dir_lookup(&inode, cmp)?.ok_or(Error::NotFound)?;
        }
        Ok(num)
    }

    /// 解析到倒数第二级，返回父目录 inode 号与最后一级名字
    pub fn resolve_parent<'p>(&self, path: &'p str) -> Result<(u32, &'p str)> {
        let (parent, basename) = split_parent(path).ok_or(Error::NotFound)?;
        let num = self.resolve(parent)?;
        if !self.inode(num)?.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok((num, basename))
    }
}
