use core::mem;

use super::SectorLayout;
use crate::config::{FS_MAGIC, SECTOR_SIZE};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位空闲位图
#[derive(Debug)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 文件系统占据扇区数
    pub total_sectors: u32,
    pub free_map_start: u32,
    pub free_map_sectors: u32,
    _pad: [u32; 124],
}

const _: () = assert!(mem::size_of::<SuperBlock>() == SECTOR_SIZE);

unsafe impl SectorLayout for SuperBlock {}

impl SuperBlock {
    #[inline]
    pub fn new(total_sectors: u32, free_map_start: u32, free_map_sectors: u32) -> Self {
        Self {
            magic: FS_MAGIC,
            total_sectors,
            free_map_start,
            free_map_sectors,
            _pad: [0; 124],
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == FS_MAGIC
    }
}
