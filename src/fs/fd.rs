use bitflags::bitflags;

use super::FileType;

/// What a descriptor is bound to. Chosen once at `open`, fixed until `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOps {
    TerminalIn,
    TerminalOut,
    Rtc,
    Directory,
    Regular,
    Closed,
}

impl FileOps {
    pub fn for_type(file_type: FileType) -> FileOps {
        match file_type {
            FileType::Rtc => FileOps::Rtc,
            FileType::Directory => FileOps::Directory,
            FileType::Regular => FileOps::Regular,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u32 {
        const OPEN = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FileDescriptor {
    pub ops: FileOps,
    pub flags: FileFlags,
    pub inode: u32,
    /// Byte offset for regular files, entry index for directories.
    pub position: u32,
}

impl FileDescriptor {
    pub const CLOSED: FileDescriptor = FileDescriptor {
        ops: FileOps::Closed,
        flags: FileFlags::empty(),
        inode: 0,
        position: 0,
    };

    pub const fn terminal(ops: FileOps) -> FileDescriptor {
        FileDescriptor {
            ops,
            flags: FileFlags::OPEN,
            inode: 0,
            position: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.flags.contains(FileFlags::OPEN)
    }
}
