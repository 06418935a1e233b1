pub mod error;
pub mod fd;
pub mod rofs;

pub use error::{FsError, FsResult};
pub use rofs::{DirEntry, FileSystem, FileType};
