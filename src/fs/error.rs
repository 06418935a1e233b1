use core::fmt;

/// Filesystem error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    BadInode,
    OffsetPastEnd,
    BadDataBlock,
    CorruptImage,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "No such file or directory"),
            FsError::BadInode => write!(f, "Inode out of range"),
            FsError::OffsetPastEnd => write!(f, "Offset past end of file"),
            FsError::BadDataBlock => write!(f, "Data block out of range"),
            FsError::CorruptImage => write!(f, "Corrupt filesystem image"),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
