use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::MmapMut;
use wfs::DiskImage;

/// 以共享映射打开的镜像文件，对映射的修改直接落到文件上
#[derive(Debug)]
pub struct MappedImage {
    map: MmapMut,
}

impl MappedImage {
    /// 映射已有的镜像文件，长度即文件长度
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Self::map(&fd)
    }

    /// 镜像文件不足 `len` 字节时先扩展到 `len`，已有内容保留
    pub fn create(path: impl AsRef<Path>, len: u64) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if fd.metadata()?.len() < len {
            fd.set_len(len)?;
        }
        Self::map(&fd)
    }

    fn map(fd: &File) -> io::Result<Self> {
        // SAFETY: 镜像文件在挂载期间归本进程独占，不会被外部截断
        let map = unsafe { MmapMut::map_mut(fd)? };
        log::debug!("mapped {} bytes", map.len());
        Ok(Self { map })
    }
}

impl DiskImage for MappedImage {
    #[inline]
    fn bytes(&self) -> &[u8] {
        &self.map
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    fn flush(&self) -> io::Result<()> {
        self.map.flush()
    }

    fn flush_async(&self) -> io::Result<()> {
        self.map.flush_async()
    }
}
