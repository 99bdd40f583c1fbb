//! # 磁盘数据结构层
//!
//! sector-fs 的磁盘布局：
//! 超级块 | 根目录 inode | 空闲位图 | inode 与数据扇区混合区域
//!
//! 每个 inode 独占一个扇区，扇区号即 inode 号。

use core::mem;
use core::ptr;

use crate::BufferCache;
use crate::DataBlock;
use crate::SectorId;

mod super_block;
pub use super_block::SuperBlock;

mod inode;
pub use inode::DiskInode;

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;

/// 恰好占据一个扇区的磁盘结构，可以与扇区字节直接互相解释。
///
/// # Safety
///
/// 实现者必须是`#[repr(C)]`，大小恰为一个扇区，且任意位模式都是合法值。
pub unsafe trait SectorLayout: Sized {
    #[inline]
    fn zeroed() -> Self {
        unsafe { mem::zeroed() }
    }

    #[inline]
    fn as_block(&self) -> &DataBlock {
        unsafe { &*ptr::from_ref(self).cast() }
    }

    #[inline]
    fn as_block_mut(&mut self) -> &mut DataBlock {
        unsafe { &mut *ptr::from_mut(self).cast() }
    }

    /// 经由缓存读出扇区并解释为`Self`
    fn load(cache: &BufferCache, sector: SectorId) -> Self {
        let mut value = Self::zeroed();
        cache.read(sector, value.as_block_mut());
        value
    }

    /// 经由缓存写入扇区
    #[inline]
    fn store(&self, cache: &BufferCache, sector: SectorId) {
        cache.write(sector, self.as_block());
    }
}
