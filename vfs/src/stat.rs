use crate::DirEntryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(32))]
pub struct Stat {
    pub mode: DirEntryType,
    /// Inode number, i.e. the sector holding the inode header
    pub inode: u64,
    /// Optimal I/O block size
    pub block_size: u64,
    /// Occupying data blocks
    pub blocks: u64,
    /// File size
    pub size: u64,
}
