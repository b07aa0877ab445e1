//! # 操作表
//!
//! 桥接层以路径调用的入口：getattr、readdir、mkdir、rmdir、mknod、unlink、read、write。
//! 文件系统上下文由一把互斥锁保护，每个入口在整个调用期间持有它；
//! 修改类操作成功后安排一次写回。

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::efs::{Geometry, Owner, WfsFileSystem};
use crate::layout::{DirEntry, DiskInode, StatKind, S_IFDIR, S_IFMT, S_IFREG};
use crate::path::split_parent;
use crate::{DiskImage, Error, Result};
use crate::{BLOCK_SIZE, MAX_FILE_SIZE, ROOT_INO};

pub struct Wfs {
    fs: Mutex<WfsFileSystem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// inode 号
    pub ino: u32,
    pub kind: StatKind,
    /// 类型位与权限位
    pub mode: u32,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// 占用块数
    pub blocks: u64,
    pub block_size: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub ino: u32,
    pub kind: StatKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub free_blocks: u64,
    pub inodes: u64,
    pub free_inodes: u64,
    pub block_size: u32,
    pub name_max: u32,
}

impl Wfs {
    #[inline]
    pub fn new(fs: WfsFileSystem) -> Self {
        Self { fs: Mutex::new(fs) }
    }

    pub fn format(image: Box<dyn DiskImage>, geometry: Geometry, owner: Owner) -> Result<Self> {
        WfsFileSystem::format(image, geometry, owner, now()).map(Self::new)
    }

    pub fn open(image: Box<dyn DiskImage>) -> Result<Self> {
        WfsFileSystem::open(image).map(Self::new)
    }

    pub fn into_inner(self) -> WfsFileSystem {
        self.fs.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn getattr(&self, path: &str) -> Result<Stat> {
        log::debug!("getattr {path:?}");
        let fs = self.lock();
        let num = fs.resolve(path)?;
        Ok(Stat::from(&fs.inode(num)?))
    }

    /// 先列出 `.` 与 `..`，再依块、槽的顺序列出各目录项
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntryInfo>> {
        log::debug!("readdir {path:?}");
        let fs = self.lock();
        let num = fs.resolve(path)?;
        let dir = fs.inode(num)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        let parent = match split_parent(path) {
            Some((parent, _)) => fs.resolve(parent)?,
            None => ROOT_INO,
        };

        let mut entries = vec![
            DirEntryInfo {
                name: ".".into(),
                ino: num,
                kind: StatKind::DIR,
            },
            DirEntryInfo {
                name: "..".into(),
                ino: parent,
                kind: StatKind::DIR,
            },
        ];
        for entry in fs.dir_entries(&dir)? {
            let Some(ino) = entry.inode() else {
                continue;
            };
            entries.push(DirEntryInfo {
                name: entry.name_lossy().into_owned(),
                ino,
                kind: fs.inode(ino)?.kind(),
            });
        }

        Ok(entries)
    }

    pub fn mkdir(&self, path: &str, mode: u32, owner: Owner) -> Result<Stat> {
        log::debug!("mkdir {path:?} mode={mode:o}");
        self.create(path, S_IFDIR | (mode & 0o7777), 2, owner)
    }

    /// 创建普通文件；未给出类型位时按普通文件处理
    pub fn mknod(&self, path: &str, mode: u32, owner: Owner) -> Result<Stat> {
        log::debug!("mknod {path:?} mode={mode:o}");
        let kind = match mode & S_IFMT {
            0 | S_IFDIR => S_IFREG,
            kind => kind,
        };
        self.create(path, kind | (mode & 0o7777), 1, owner)
    }

    /// 删除空目录，父目录的链接数随之减一
    pub fn rmdir(&self, path: &str) -> Result<()> {
        log::debug!("rmdir {path:?}");
        let mut fs = self.lock();
        let num = fs.resolve(path)?;
        if num == ROOT_INO {
            return Err(Error::Busy);
        }
        let dir = fs.inode(num)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory);
        }
        if !fs.dir_is_empty(&dir)? {
            return Err(Error::DirectoryNotEmpty);
        }

        let (parent_num, name) = fs.resolve_parent(path)?;
        let mut parent = fs.inode(parent_num)?;
        fs.dir_remove(&mut parent, name, now())?;
        parent.nlinks = parent.nlinks.saturating_sub(1);
        fs.write_inode(&parent)?;

        Self::release(&mut fs, dir)?;
        Self::commit(&fs);
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        log::debug!("unlink {path:?}");
        let mut fs = self.lock();
        let num = fs.resolve(path)?;
        let inode = fs.inode(num)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        let (parent_num, name) = fs.resolve_parent(path)?;
        let mut parent = fs.inode(parent_num)?;
        fs.dir_remove(&mut parent, name, now())?;
        fs.write_inode(&parent)?;

        Self::release(&mut fs, inode)?;
        Self::commit(&fs);
        Ok(())
    }

    /// 从 `offset` 起读满 `buf`，到文件末尾为止，返回读到的字节数
    pub fn read(&self, path: &str, buf: &mut [u8], offset: usize) -> Result<usize> {
        log::debug!("read {path:?} size={} offset={offset}", buf.len());
        let mut fs = self.lock();
        let num = fs.resolve(path)?;
        let mut inode = fs.inode(num)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        let read_size = inode.read_at(offset, buf, &fs)?;
        inode.atim = now();
        fs.write_inode(&inode)?;
        Ok(read_size)
    }

    /// 写入 `data`，必要时先扩张文件；超过大小上限的部分被截去，
    /// 返回实际写入的字节数
    pub fn write(&self, path: &str, data: &[u8], offset: usize) -> Result<usize> {
        log::debug!("write {path:?} size={} offset={offset}", data.len());
        let mut fs = self.lock();
        let num = fs.resolve(path)?;
        let mut inode = fs.inode(num)?;
        if inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        if data.is_empty() {
            return Ok(0);
        }
        if offset >= MAX_FILE_SIZE {
            return Err(Error::NoSpace);
        }
        let end = offset.saturating_add(data.len()).min(MAX_FILE_SIZE);
        let data = &data[..end - offset];

        if end as u64 > inode.size {
            let new_blocks = DiskInode::count_total_block(end as u64)
                - DiskInode::count_total_block(inode.size);
            // 要么全部分配成功，要么一块都不占
            let new_blocks = fs.alloc_data_batch(new_blocks)?;
            inode.expand_to(end as u64, new_blocks, &mut fs)?;
        }

        let written_size = inode.write_at(offset, data, &mut fs)?;
        let now = now();
        inode.mtim = now;
        inode.ctim = now;
        fs.write_inode(&inode)?;

        Self::commit(&fs);
        Ok(written_size)
    }

    pub fn statfs(&self) -> StatFs {
        let fs = self.lock();
        let sb = fs.super_block();
        StatFs {
            blocks: sb.num_data_blocks as u64,
            free_blocks: fs.free_data_blocks() as u64,
            inodes: sb.num_inodes as u64,
            free_inodes: fs.free_inodes() as u64,
            block_size: BLOCK_SIZE as u32,
            name_max: DirEntry::NAME_MAX_LEN as u32,
        }
    }

    /// 同步写回整个镜像
    pub fn sync(&self) -> std::io::Result<()> {
        self.lock().flush()
    }
}

impl Wfs {
    #[inline]
    fn lock(&self) -> MutexGuard<'_, WfsFileSystem> {
        // 每个操作要么完整生效，要么在返回错误前已回滚，中毒的锁仍可继续使用
        self.fs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// mkdir 与 mknod 的公共部分
    fn create(&self, path: &str, mode: u32, nlinks: u32, owner: Owner) -> Result<Stat> {
        let mut fs = self.lock();
        match fs.resolve(path) {
            Ok(_) => return Err(Error::AlreadyExists),
            Err(Error::NotFound) => {}
            Err(err) => return Err(err),
        }

        let (parent_num, name) = fs.resolve_parent(path)?;
        // `.` 与 `..` 由 readdir 合成，总是已存在
        if matches!(name, "." | "..") {
            return Err(Error::AlreadyExists);
        }
        if name.len() > DirEntry::NAME_MAX_LEN {
            return Err(Error::NameTooLong);
        }
        let mut parent = fs.inode(parent_num)?;
        let now = now();

        let num = fs.alloc_inode()?;
        if let Err(err) = fs.dir_insert(&mut parent, name, num, now) {
            log::warn!("insert {name:?} failed, releasing inode {num}");
            fs.dealloc_inode(num);
            return Err(err);
        }

        let mut inode = DiskInode::default();
        inode.init(num, mode, nlinks, owner.uid, owner.gid, now);
        if inode.is_dir() {
            parent.nlinks += 1;
        }
        fs.write_inode(&inode)?;
        fs.write_inode(&parent)?;

        Self::commit(&fs);
        Ok(Stat::from(&inode))
    }

    /// 回收 inode 的全部数据块与其自身
    fn release(fs: &mut WfsFileSystem, mut inode: DiskInode) -> Result<()> {
        for block in inode.clear(fs)? {
            fs.dealloc_data(block)?;
        }
        fs.dealloc_inode(inode.num);
        Ok(())
    }

    fn commit(fs: &WfsFileSystem) {
        if let Err(err) = fs.flush_async() {
            log::warn!("failed to schedule image write-back: {err}");
        }
    }
}

impl From<&DiskInode> for Stat {
    fn from(inode: &DiskInode) -> Self {
        Self {
            ino: inode.num,
            kind: inode.kind(),
            mode: inode.mode,
            perm: (inode.mode & 0o7777) as u16,
            nlink: inode.nlinks,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            blocks: inode.stat_blocks(),
            block_size: BLOCK_SIZE as u32,
            atime: inode.atim,
            mtime: inode.mtim,
            ctime: inode.ctim,
        }
    }
}

/// 当前的 Unix 时间戳(秒)
fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}
