//! # 磁盘镜像接口层
//!
//! 磁盘镜像是一段长度固定、可按字节寻址的存储，所有磁盘数据结构都以
//! 固定的字节偏移存放其中。[`DiskImage`] 是对它的抽象：
//! 内存中的 `Vec<u8>` 可直接充当镜像，宿主工具则用文件的内存映射实现它。

use std::io;

/// 磁盘镜像特质
pub trait DiskImage: Send + Sync {
    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];

    /// 同步写回底层存储，返回时数据已落盘
    fn flush(&self) -> io::Result<()>;

    /// 安排写回但不等待完成
    fn flush_async(&self) -> io::Result<()> {
        self.flush()
    }

    #[inline]
    fn len(&self) -> usize {
        self.bytes().len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiskImage for Vec<u8> {
    #[inline]
    fn bytes(&self) -> &[u8] {
        self
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}
