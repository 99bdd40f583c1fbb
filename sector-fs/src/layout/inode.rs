//! 磁盘 inode 与间接索引块
//!
//! - 直接索引：inode 内的 [`DIRECT_COUNT`] 个扇区号，每个都指向一个**数据扇区**
//! - 一级索引：整个扇区连续存储扇区号，每个编号都指向一个数据扇区
//! - 二级索引：整个扇区连续存储扇区号，每个编号都指向一个一级索引块
//!
//! 目录的空间用于存放子项的元信息；
//! 文件的空间用于存放它的数据。
//!
//! ## 块索引编码
//!
//! - 剔去直接索引与一级索引后的逻辑索引除以 [`INDIRECT_COUNT`]，得到一级索引块在二级索引块内的位置
//! - 同一逻辑索引模 [`INDIRECT_COUNT`]，得到数据扇区在一级索引块内的位置
//!
//! ## 分配与释放
//!
//! 三层共用一个按层级参数化的递归过程：
//! 第 0 层是数据扇区本身，第 1 层的每个槽位管 1 个数据扇区，
//! 第 2 层的每个槽位管一整个一级索引块，即 [`INDIRECT_COUNT`] 个数据扇区。
//! 递归结束后待处理扇区数必须恰好归零，否则说明记账出错。

use core::mem;

use vfs::Error;

use super::SectorLayout;
use crate::config::{
    DIRECT_COUNT, INDIRECT_COUNT, INODE_MAGIC, MAX_SECTORS, SECTOR_SIZE,
};
use crate::{BufferCache, Result, SectorAllocator, SectorId};

/// 间接索引块
type IndirectBlock = [u32; INDIRECT_COUNT];

unsafe impl SectorLayout for IndirectBlock {}

/// 一级索引块可编号数量
const INDIRECT1_COUNT: usize = INDIRECT_COUNT;
/// 二级索引块可编号数量
const INDIRECT2_COUNT: usize = INDIRECT_COUNT.pow(2);
/// 直接索引时的编号容量
const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
const INDIRECT1_CAP: usize = DIRECT_CAP + INDIRECT1_COUNT;

#[derive(Debug, Clone)]
#[repr(C)]
pub struct DiskInode {
    /// 指向一个二级索引块
    d_indirect: u32,
    /// 指向一个一级索引块
    indirect: u32,
    /// 直接索引，包含 DIRECT_COUNT 个扇区号
    direct: [u32; DIRECT_COUNT],
    // 不用usize是为了严控布局
    length: u32,
    magic: u32,
    is_dir: u8,
    _pad: [u8; 3],
}

const _: () = assert!(mem::size_of::<DiskInode>() == SECTOR_SIZE);

unsafe impl SectorLayout for DiskInode {}

impl DiskInode {
    /// 尚未分配任何扇区的 inode；分配由 [`DiskInode::reserve`] 完成
    #[inline]
    pub fn new(length: u32, is_dir: bool) -> Self {
        Self {
            d_indirect: 0,
            indirect: 0,
            direct: [0; DIRECT_COUNT],
            length,
            magic: INODE_MAGIC,
            is_dir: is_dir as u8,
            _pad: [0; 3],
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.length
    }

    #[inline]
    pub fn set_length(&mut self, length: u32) {
        self.length = length;
    }

    /// 逻辑上 inode 指向一系列数据扇区，此处传入的是这些扇区的索引（逻辑索引），
    /// 返回给**块缓存层**使用的扇区号；超出三级寻址范围时返回空。
    pub fn sector_number(&self, index: usize, cache: &BufferCache) -> Option<SectorId> {
        let raw = if index < DIRECT_CAP {
            self.direct[index]
        } else if index < INDIRECT1_CAP {
            // 剔去直接索引的部分
            IndirectBlock::load(cache, SectorId::new(self.indirect))[index - DIRECT_CAP]
        } else if index < MAX_SECTORS {
            // 剔去使用了一级索引的部分
            let index = index - INDIRECT1_CAP;
            let outer = IndirectBlock::load(cache, SectorId::new(self.d_indirect));
            let inner = IndirectBlock::load(cache, SectorId::new(outer[index / INDIRECT1_COUNT]));
            inner[index % INDIRECT1_COUNT]
        } else {
            return None;
        };

        Some(SectorId::new(raw))
    }

    /// 让已分配的扇区足以容纳`new_length`字节，新分配的数据扇区全部清零。
    ///
    /// 只增不减。中途分配失败时返回 [`Error::NoSpace`]，
    /// 本次调用里已经分配的扇区不会回收。
    pub fn reserve(
        &mut self,
        new_length: u32,
        cache: &BufferCache,
        allocator: &dyn SectorAllocator,
    ) -> Result<()> {
        let mut sectors = Self::count_sectors(new_length);
        if sectors > MAX_SECTORS {
            return Err(Error::FileTooLarge);
        }

        /******************** 直接索引 ********************/
        let count = sectors.min(DIRECT_COUNT);
        for slot in &mut self.direct[..count] {
            reserve_indirect(slot, 1, 0, cache, allocator)?;
        }
        sectors -= count;
        if sectors == 0 {
            return Ok(());
        }

        /******************** 一级索引 ********************/
        let count = sectors.min(INDIRECT1_COUNT);
        reserve_indirect(&mut self.indirect, count, 1, cache, allocator)?;
        sectors -= count;
        if sectors == 0 {
            return Ok(());
        }

        /******************** 二级索引 ********************/
        let count = sectors.min(INDIRECT2_COUNT);
        reserve_indirect(&mut self.d_indirect, count, 2, cache, allocator)?;
        sectors -= count;

        if sectors != 0 {
            log::error!("reserve: {sectors} sectors unaccounted for");
            return Err(Error::Corrupted);
        }

        Ok(())
    }

    /// 释放当前长度覆盖的全部数据扇区与索引块，先子后父
    pub fn delete(&self, cache: &BufferCache, allocator: &dyn SectorAllocator) -> Result<()> {
        let mut sectors = Self::count_sectors(self.length);

        /******************** 直接索引 ********************/
        let count = sectors.min(DIRECT_COUNT);
        for &sector in &self.direct[..count] {
            allocator.release(SectorId::new(sector), 1);
        }
        sectors -= count;

        /******************** 一级索引 ********************/
        let count = sectors.min(INDIRECT1_COUNT);
        if count > 0 {
            delete_indirect(self.indirect, count, 1, cache, allocator)?;
            sectors -= count;
        }

        /******************** 二级索引 ********************/
        let count = sectors.min(INDIRECT2_COUNT);
        if count > 0 {
            delete_indirect(self.d_indirect, count, 2, cache, allocator)?;
            sectors -= count;
        }

        if sectors != 0 {
            log::error!("delete: {sectors} sectors unaccounted for");
            return Err(Error::Corrupted);
        }

        Ok(())
    }

    /// 计算容纳指定数据量需要多少个**数据扇区**
    #[inline]
    pub fn count_sectors(length: u32) -> usize {
        (length as usize).div_ceil(SECTOR_SIZE)
    }
}

/// 每个槽位所管辖的数据扇区数
#[inline]
fn chunk(level: u32) -> usize {
    if level > 1 { INDIRECT_COUNT } else { 1 }
}

/// 确保`slot`所指的第`level`层结构覆盖了`num`个数据扇区
fn reserve_indirect(
    slot: &mut u32,
    mut num: usize,
    level: u32,
    cache: &BufferCache,
    allocator: &dyn SectorAllocator,
) -> Result<()> {
    debug_assert!(level <= 2);

    let fresh = *slot == 0;
    if fresh {
        let Some(sector) = allocator.allocate(1) else {
            log::warn!("reserve: out of free sectors at level {level}");
            return Err(Error::NoSpace);
        };
        cache.zeroize(sector);
        *slot = sector.raw();
    }

    if level == 0 {
        return Ok(());
    }

    let sector = SectorId::new(*slot);
    // 新块刚被清零，无需再读
    let mut block = if fresh {
        IndirectBlock::zeroed()
    } else {
        IndirectBlock::load(cache, sector)
    };

    let chunk = chunk(level);
    for child in block.iter_mut().take(num.div_ceil(chunk)) {
        let count = num.min(chunk);
        reserve_indirect(child, count, level - 1, cache, allocator)?;
        num -= count;
    }

    if num != 0 {
        log::error!("reserve: level {level} block {sector} left {num} sectors");
        return Err(Error::Corrupted);
    }

    block.store(cache, sector);
    Ok(())
}

fn delete_indirect(
    sector: u32,
    mut num: usize,
    level: u32,
    cache: &BufferCache,
    allocator: &dyn SectorAllocator,
) -> Result<()> {
    debug_assert!(level <= 2);

    let sector = SectorId::new(sector);
    if level == 0 {
        allocator.release(sector, 1);
        return Ok(());
    }

    let chunk = chunk(level);
    let block = IndirectBlock::load(cache, sector);
    for &child in block.iter().take(num.div_ceil(chunk)) {
        let count = num.min(chunk);
        delete_indirect(child, count, level - 1, cache, allocator)?;
        num -= count;
    }

    if num != 0 {
        log::error!("delete: level {level} block {sector} left {num} sectors");
        return Err(Error::Corrupted);
    }

    allocator.release(sector, 1);
    Ok(())
}
