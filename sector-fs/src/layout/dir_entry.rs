use core::{ptr, slice};

use crate::SectorId;
use crate::config::NAME_MAX;

/// 目录项：子文件的名字与其 inode 所在扇区
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    inode_sector: u32,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX + 1],
    in_use: u8,
}

const _: () = assert!(core::mem::size_of::<DirEntry>() == DirEntry::SIZE);

impl DirEntry {
    /// 目录项大小恒为20字节
    pub const SIZE: usize = 20;

    /// 调用者须保证`name`不超过 [`NAME_MAX`] 字节
    #[inline]
    pub fn new(name: &str, inode_sector: SectorId) -> Self {
        let bytes = name.as_bytes();
        let mut name = [0; NAME_MAX + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self {
            inode_sector: inode_sector.raw(),
            name,
            in_use: 1,
        }
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX);
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[inline]
    pub fn inode_sector(&self) -> SectorId {
        SectorId::new(self.inode_sector)
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.in_use != 0
    }

    #[inline]
    pub fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use as u8;
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}
