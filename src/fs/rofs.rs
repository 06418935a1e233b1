//! Read-only boot filesystem.
//!
//! The image is a sequence of 4 KiB blocks: one boot block holding the
//! directory, then `inode_count` inodes, then `data_block_count` data blocks.

use super::error::{FsError, FsResult};
use crate::config::FILE_NAME_LENGTH;

pub const BLOCK_SIZE: usize = 4096;

const DENTRY_SIZE: usize = 64;
const DENTRY_TABLE_OFFSET: usize = 64;
pub const MAX_DENTRIES: usize = (BLOCK_SIZE - DENTRY_TABLE_OFFSET) / DENTRY_SIZE;
const BLOCKS_PER_INODE: usize = BLOCK_SIZE / 4 - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Rtc,
    Directory,
    Regular,
}

impl FileType {
    fn from_raw(raw: u32) -> FsResult<FileType> {
        match raw {
            0 => Ok(FileType::Rtc),
            1 => Ok(FileType::Directory),
            2 => Ok(FileType::Regular),
            _ => Err(FsError::CorruptImage),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    name: [u8; FILE_NAME_LENGTH],
    pub file_type: FileType,
    pub inode: u32,
}

impl DirEntry {
    /// Stored name without NUL padding. A full 32-byte name has no terminator.
    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(FILE_NAME_LENGTH);
        &self.name[..len]
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

pub struct FileSystem<'a> {
    image: &'a [u8],
    dir_count: usize,
    inode_count: u32,
    data_block_count: u32,
}

impl<'a> FileSystem<'a> {
    /// Validate the boot block and the overall image size.
    pub fn new(image: &'a [u8]) -> FsResult<Self> {
        if image.len() < BLOCK_SIZE {
            return Err(FsError::CorruptImage);
        }
        let dir_count = read_u32(image, 0) as usize;
        let inode_count = read_u32(image, 4);
        let data_block_count = read_u32(image, 8);

        let blocks = 1 + inode_count as usize + data_block_count as usize;
        if dir_count > MAX_DENTRIES || image.len() < blocks * BLOCK_SIZE {
            return Err(FsError::CorruptImage);
        }
        Ok(FileSystem {
            image,
            dir_count,
            inode_count,
            data_block_count,
        })
    }

    pub fn dir_count(&self) -> usize {
        self.dir_count
    }

    pub fn lookup_by_index(&self, index: usize) -> FsResult<DirEntry> {
        if index >= self.dir_count {
            return Err(FsError::NotFound);
        }
        let raw = &self.image[DENTRY_TABLE_OFFSET + index * DENTRY_SIZE..][..DENTRY_SIZE];
        let mut name = [0u8; FILE_NAME_LENGTH];
        name.copy_from_slice(&raw[..FILE_NAME_LENGTH]);
        Ok(DirEntry {
            name,
            file_type: FileType::from_raw(read_u32(raw, FILE_NAME_LENGTH))?,
            inode: read_u32(raw, FILE_NAME_LENGTH + 4),
        })
    }

    /// Exact match against the stored name. Names longer than 32 bytes never match.
    pub fn lookup_by_name(&self, name: &[u8]) -> FsResult<DirEntry> {
        if name.is_empty() || name.len() > FILE_NAME_LENGTH {
            return Err(FsError::NotFound);
        }
        for index in 0..self.dir_count {
            let entry = self.lookup_by_index(index)?;
            if entry.name() == name {
                return Ok(entry);
            }
        }
        Err(FsError::NotFound)
    }

    fn inode_block(&self, inode: u32) -> FsResult<&'a [u8]> {
        if inode >= self.inode_count {
            return Err(FsError::BadInode);
        }
        let start = (1 + inode as usize) * BLOCK_SIZE;
        Ok(&self.image[start..start + BLOCK_SIZE])
    }

    pub fn file_length(&self, inode: u32) -> FsResult<u32> {
        Ok(read_u32(self.inode_block(inode)?, 0))
    }

    /// Copy file bytes starting at `offset` into `buf`, stopping at the end of
    /// the file. Returns the number of bytes copied; 0 at end of file.
    pub fn read_data(&self, inode: u32, offset: u32, buf: &mut [u8]) -> FsResult<usize> {
        let block = self.inode_block(inode)?;
        let length = read_u32(block, 0);
        if offset > length {
            return Err(FsError::OffsetPastEnd);
        }

        let total = buf.len().min((length - offset) as usize);
        let data_base = (1 + self.inode_count as usize) * BLOCK_SIZE;
        let mut done = 0;
        let mut position = offset as usize;
        while done < total {
            let slot = position / BLOCK_SIZE;
            if slot >= BLOCKS_PER_INODE {
                return Err(FsError::CorruptImage);
            }
            let data_block = read_u32(block, 4 + slot * 4);
            if data_block >= self.data_block_count {
                return Err(FsError::BadDataBlock);
            }
            let within = position % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - within).min(total - done);
            let src = data_base + data_block as usize * BLOCK_SIZE + within;
            buf[done..done + chunk].copy_from_slice(&self.image[src..src + chunk]);
            done += chunk;
            position += chunk;
        }
        Ok(done)
    }
}
