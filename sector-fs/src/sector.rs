//! 扇区号

use derive_more::{Add, Display, From, Into};

/// 块设备上的扇区号。
///
/// 磁盘上的索引槽以裸`u32`存放，值为 0 表示尚未分配；
/// 0 号扇区是超级块，不会被分配给文件。
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Add, From, Into)]
#[repr(transparent)]
pub struct SectorId(u32);

impl core::ops::Add<u32> for SectorId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        self + Self(rhs)
    }
}

impl SectorId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// 块设备驱动使用的块ID
    #[inline]
    pub fn block(self) -> usize {
        self.0 as usize
    }
}
