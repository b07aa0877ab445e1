
mod bridge;
mod image_file;

use std::io;
use std::os::raw::c_int;
use std::path::Path;

use fuser::MountOption;
use wfs::{Owner, Wfs};

pub use self::{
    bridge::{to_file_attr, to_fuse_ino, WfsFuse},
    image_file::MappedImage,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("image I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("filesystem error: {0}")]
    Fs(#[from] wfs::Error),
    #[error("invalid mountpoint: {0}")]
    InvalidMountpoint(String),
}

/// 文件系统错误对应的 errno
pub fn errno(err: &wfs::Error) -> c_int {
    use wfs::Error::*;

    match err {
        NotFound => libc::ENOENT,
        AlreadyExists => libc::EEXIST,
        NotADirectory => libc::ENOTDIR,
        IsADirectory => libc::EISDIR,
        NoSpace => libc::ENOSPC,
        DirectoryNotEmpty => libc::ENOTEMPTY,
        NameTooLong => libc::ENAMETOOLONG,
        Busy => libc::EBUSY,
        InvalidGeometry | ImageTooSmall { .. } => libc::EINVAL,
        Corrupted => libc::EIO,
    }
}

/// 解析形如 `allow_other,ro` 的挂载选项，不认识的原样透传
pub fn parse_mount_options(opts: &str) -> Vec<MountOption> {
    opts.split(',')
        .filter(|opt| !opt.is_empty())
        .map(|opt| match opt {
            "allow_other" => MountOption::AllowOther,
            "allow_root" => MountOption::AllowRoot,
            "auto_unmount" => MountOption::AutoUnmount,
            "default_permissions" => MountOption::DefaultPermissions,
            "noatime" => MountOption::NoAtime,
            "ro" => MountOption::RO,
            "rw" => MountOption::RW,
            other => MountOption::CUSTOM(other.to_owned()),
        })
        .collect()
}

/// 当前进程的属主
pub fn current_owner() -> Owner {
    // SAFETY: getuid 与 getgid 总是成功且无副作用
    unsafe {
        Owner {
            uid: libc::getuid(),
            gid: libc::getgid(),
        }
    }
}

/// 挂载并阻塞到卸载为止
pub fn mount(wfs: Wfs, mountpoint: impl AsRef<Path>, options: &[MountOption]) -> Result<(), Error> {
    let mountpoint = mountpoint.as_ref();
    if !mountpoint.is_dir() {
        return Err(Error::InvalidMountpoint(format!(
            "{} is not a directory",
            mountpoint.display()
        )));
    }

    let mut opts = vec![MountOption::FSName("wfs".to_owned())];
    opts.extend_from_slice(options);
    log::info!("mounting at {} with {opts:?}", mountpoint.display());

    fuser::mount2(WfsFuse::new(wfs), mountpoint, &opts)?;
    Ok(())
}
