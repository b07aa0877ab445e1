//! 把 FUSE 以 inode 号发来的请求翻译为按路径调用的操作表

use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::raw::c_int;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyStatfs, ReplyWrite, Request, TimeOrNow, FUSE_ROOT_ID,
};
use wfs::{Owner, Stat, StatKind, Wfs};

use crate::errno;

/// 属性与目录项的缓存时长
const TTL: Duration = Duration::from_secs(1);

pub struct WfsFuse {
    wfs: Wfs,
    /// FUSE inode 号到路径，由 lookup 与创建类操作登记
    paths: HashMap<u64, String>,
}

impl WfsFuse {
    pub fn new(wfs: Wfs) -> Self {
        Self {
            wfs,
            paths: HashMap::from([(FUSE_ROOT_ID, "/".to_owned())]),
        }
    }

    fn path(&self, ino: u64) -> Result<&str, c_int> {
        self.paths.get(&ino).map(String::as_str).ok_or_else(|| {
            log::trace!("unknown inode {ino}");
            libc::ENOENT
        })
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let parent = self.path(parent)?;
        let name = name.to_str().ok_or(libc::EINVAL)?;
        Ok(if parent == "/" {
            format!("/{name}")
        } else {
            format!("{parent}/{name}")
        })
    }

    /// 登记新见到的路径并生成目录项回复
    fn remember(&mut self, path: String, stat: &Stat) -> FileAttr {
        let attr = to_file_attr(stat);
        self.paths.insert(attr.ino, path);
        attr
    }

    fn forget(&mut self, path: &str) {
        self.paths.retain(|_, known| known != path);
    }
}

/// 记录失败的请求并取出 errno；ENOENT 在查找时很常见，只记 trace
fn log_errno(op: &'static str, ino: u64, err: &wfs::Error) -> c_int {
    let errno = errno(err);
    if errno == libc::ENOENT {
        log::trace!("{op} ino={ino}: {err}");
    } else {
        log::warn!("{op} ino={ino} failed: {err} (errno {errno})");
    }
    errno
}

/// FUSE 传来的偏移；负数无效
#[inline]
pub(crate) fn byte_offset(offset: i64) -> Result<usize, c_int> {
    usize::try_from(offset).map_err(|_| libc::EINVAL)
}

#[inline]
pub fn to_fuse_ino(num: u32) -> u64 {
    u64::from(num) + 1
}

fn to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

pub fn to_file_attr(stat: &Stat) -> FileAttr {
    FileAttr {
        ino: to_fuse_ino(stat.ino),
        size: stat.size,
        blocks: stat.blocks,
        atime: to_system_time(stat.atime),
        mtime: to_system_time(stat.mtime),
        ctime: to_system_time(stat.ctime),
        crtime: to_system_time(stat.ctime),
        kind: to_file_type(stat.kind),
        perm: stat.perm,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: stat.block_size,
        flags: 0,
    }
}

fn to_file_type(kind: StatKind) -> FileType {
    match kind {
        StatKind::DIR => FileType::Directory,
        StatKind::FILE => FileType::RegularFile,
    }
}

impl Filesystem for WfsFuse {
    fn destroy(&mut self) {
        if let Err(err) = self.wfs.sync() {
            log::error!("failed to write back image on unmount: {err}");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.wfs.getattr(&path) {
            Ok(stat) => {
                let attr = self.remember(path, &stat);
                reply.entry(&TTL, &attr, 0);
            }
            Err(err) => reply.error(log_errno("lookup", parent, &err)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let result = self.path(ino).map(|path| self.wfs.getattr(path));
        match result {
            Ok(Ok(stat)) => reply.attr(&TTL, &to_file_attr(&stat)),
            Ok(Err(err)) => reply.error(log_errno("getattr", ino, &err)),
            Err(errno) => reply.error(errno),
        }
    }

    /// 不支持截断；其余属性修改被忽略，按原样返回当前属性
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        if let Some(size) = size {
            log::debug!("setattr ino={ino}: truncate to {size} is not supported");
            return reply.error(libc::ENOSYS);
        }
        self.getattr(req, ino, None, reply);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.path(ino).map(|path| self.wfs.readdir(path)) {
            Ok(Ok(entries)) => entries,
            Ok(Err(err)) => return reply.error(log_errno("readdir", ino, &err)),
            Err(errno) => return reply.error(errno),
        };

        let skip = match byte_offset(offset) {
            Ok(skip) => skip,
            Err(errno) => return reply.error(errno),
        };
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            // 偏移指向下一项
            let full = reply.add(
                to_fuse_ino(entry.ino),
                (i + 1) as i64,
                to_file_type(entry.kind),
                &entry.name,
            );
            if full {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let owner = Owner {
            uid: req.uid(),
            gid: req.gid(),
        };
        match self.wfs.mkdir(&path, mode & !umask, owner) {
            Ok(stat) => {
                let attr = self.remember(path, &stat);
                reply.entry(&TTL, &attr, 0);
            }
            Err(err) => reply.error(log_errno("mkdir", parent, &err)),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let owner = Owner {
            uid: req.uid(),
            gid: req.gid(),
        };
        match self.wfs.mknod(&path, mode & !umask, owner) {
            Ok(stat) => {
                let attr = self.remember(path, &stat);
                reply.entry(&TTL, &attr, 0);
            }
            Err(err) => reply.error(log_errno("mknod", parent, &err)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.wfs.unlink(&path) {
            Ok(()) => {
                self.forget(&path);
                reply.ok();
            }
            Err(err) => reply.error(log_errno("unlink", parent, &err)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        match self.wfs.rmdir(&path) {
            Ok(()) => {
                self.forget(&path);
                reply.ok();
            }
            Err(err) => reply.error(log_errno("rmdir", parent, &err)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let offset = match byte_offset(offset) {
            Ok(offset) => offset,
            Err(errno) => {
                log::warn!("read ino={ino}: negative offset {offset}");
                return reply.error(errno);
            }
        };
        let mut buf = vec![0; size as usize];
        match self.path(ino).map(|path| self.wfs.read(path, &mut buf, offset)) {
            Ok(Ok(read_size)) => reply.data(&buf[..read_size]),
            Ok(Err(err)) => reply.error(log_errno("read", ino, &err)),
            Err(errno) => reply.error(errno),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let offset = match byte_offset(offset) {
            Ok(offset) => offset,
            Err(errno) => {
                log::warn!("write ino={ino}: negative offset {offset}");
                return reply.error(errno);
            }
        };
        match self.path(ino).map(|path| self.wfs.write(path, data, offset)) {
            Ok(Ok(written_size)) => reply.written(written_size as u32),
            Ok(Err(err)) => reply.error(log_errno("write", ino, &err)),
            Err(errno) => reply.error(errno),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let statfs = self.wfs.statfs();
        reply.statfs(
            statfs.blocks,
            statfs.free_blocks,
            statfs.free_blocks,
            statfs.inodes,
            statfs.free_inodes,
            statfs.block_size,
            statfs.name_max,
            statfs.block_size,
        );
    }
}
