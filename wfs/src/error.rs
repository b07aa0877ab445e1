use derive_more::Display;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[display(fmt = "no such file or directory")]
    NotFound,
    #[display(fmt = "file exists")]
    AlreadyExists,
    #[display(fmt = "not a directory")]
    NotADirectory,
    #[display(fmt = "is a directory")]
    IsADirectory,
    #[display(fmt = "no space left on device")]
    NoSpace,
    #[display(fmt = "directory not empty")]
    DirectoryNotEmpty,
    #[display(fmt = "file name too long")]
    NameTooLong,
    #[display(fmt = "root directory cannot be removed")]
    Busy,
    #[display(fmt = "inode and block counts must be positive")]
    InvalidGeometry,
    #[display(fmt = "disk image too small: {} bytes required, {} available", required, actual)]
    ImageTooSmall { required: usize, actual: usize },
    /// 磁盘上的偏移或编号越出其所属区域
    #[display(fmt = "corrupted disk image")]
    Corrupted,
}

impl std::error::Error for Error {}
