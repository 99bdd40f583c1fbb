//! # 空闲扇区位图
//!
//! 每个扇区对应一位，置 1 表示已分配。
//! 位图常驻内存，每次修改后把涉及的位图扇区经缓存写回。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::BufferCache;
use crate::DataBlock;
use crate::SectorId;
use crate::config::{FREE_MAP_SECTOR, ROOT_DIR_SECTOR, SECTOR_BITS, SECTOR_SIZE, SUPER_BLOCK_SECTOR};

/// 扇区分配器
pub trait SectorAllocator: Send + Sync {
    /// 分配`count`个连续扇区，返回首个扇区号；空间不足时返回空
    fn allocate(&self, count: usize) -> Option<SectorId>;

    /// 归还从`sector`开始的`count`个连续扇区
    fn release(&self, sector: SectorId, count: usize);
}

pub struct FreeMap {
    cache: Arc<BufferCache>,
    /// 位图的起始扇区
    start: SectorId,
    /// 位图占用扇区数
    sectors: u32,
    /// 位图所指示的总扇区数
    total: u32,
    bits: Mutex<Vec<u8>>,
}

impl FreeMap {
    /// 位图自身需要多少扇区
    #[inline]
    pub fn sectors_for(total: u32) -> u32 {
        (total as usize).div_ceil(SECTOR_BITS) as u32
    }

    /// 格式化时建立位图：超级块、根目录与位图自身所在扇区标记为已分配
    pub fn create(cache: Arc<BufferCache>, total: u32) -> Self {
        let sectors = Self::sectors_for(total);
        let free_map = Self {
            cache,
            start: SectorId::new(FREE_MAP_SECTOR),
            sectors,
            total,
            bits: Mutex::new(vec![0; sectors as usize * SECTOR_SIZE]),
        };

        {
            let mut bits = free_map.bits.lock();
            set(&mut bits, SUPER_BLOCK_SECTOR as usize, true);
            set(&mut bits, ROOT_DIR_SECTOR as usize, true);
            for sector in FREE_MAP_SECTOR..FREE_MAP_SECTOR + sectors {
                set(&mut bits, sector as usize, true);
            }
            // 超出设备范围的尾部位永远不可分配
            for sector in total as usize..bits.len() * 8 {
                set(&mut bits, sector, true);
            }
        }
        free_map.persist(0..sectors as usize * SECTOR_BITS);

        free_map
    }

    /// 挂载时从磁盘读入位图
    pub fn open(cache: Arc<BufferCache>, start: SectorId, sectors: u32, total: u32) -> Self {
        let mut bits = vec![0; sectors as usize * SECTOR_SIZE];
        for (i, chunk) in bits.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            let mut block = [0; SECTOR_SIZE];
            cache.read(start + i as u32, &mut block);
            chunk.copy_from_slice(&block);
        }

        Self {
            cache,
            start,
            sectors,
            total,
            bits: Mutex::new(bits),
        }
    }

    pub fn free_count(&self) -> usize {
        let bits = self.bits.lock();
        (0..self.total as usize)
            .filter(|&sector| !get(&bits, sector))
            .count()
    }

    pub fn is_allocated(&self, sector: SectorId) -> bool {
        get(&self.bits.lock(), sector.block())
    }

    #[inline]
    pub fn sectors(&self) -> u32 {
        self.sectors
    }

    /// 把覆盖位区间`range`的位图扇区写回缓存
    fn persist(&self, range: core::ops::Range<usize>) {
        if range.is_empty() {
            return;
        }
        let first = range.start / SECTOR_BITS;
        let last = (range.end - 1) / SECTOR_BITS;

        let bits = self.bits.lock();
        for index in first..=last {
            let mut block: DataBlock = [0; SECTOR_SIZE];
            block.copy_from_slice(&bits[index * SECTOR_SIZE..(index + 1) * SECTOR_SIZE]);
            self.cache.write(self.start + index as u32, &block);
        }
    }
}

impl SectorAllocator for FreeMap {
    fn allocate(&self, count: usize) -> Option<SectorId> {
        if count == 0 {
            return None;
        }

        let first = {
            let mut bits = self.bits.lock();
            let total = self.total as usize;

            // 首次适配：找到第一段长度足够的连续空闲位
            let mut run = 0;
            let mut first = None;
            for sector in 0..total {
                if get(&bits, sector) {
                    run = 0;
                    continue;
                }
                run += 1;
                if run == count {
                    first = Some(sector + 1 - count);
                    break;
                }
            }

            let first = first?;
            for sector in first..first + count {
                set(&mut bits, sector, true);
            }
            first
        };

        self.persist(first..first + count);
        Some(SectorId::new(first as u32))
    }

    fn release(&self, sector: SectorId, count: usize) {
        let first = sector.block();
        {
            let mut bits = self.bits.lock();
            for sector in first..first + count {
                if !get(&bits, sector) {
                    log::error!("free map: releasing free sector {sector}");
                }
                debug_assert!(get(&bits, sector));
                set(&mut bits, sector, false);
            }
        }

        self.persist(first..first + count);
    }
}

#[inline]
fn get(bits: &[u8], index: usize) -> bool {
    bits[index / 8] & (1 << (index % 8)) != 0
}

#[inline]
fn set(bits: &mut [u8], index: usize, value: bool) {
    if value {
        bits[index / 8] |= 1 << (index % 8);
    } else {
        bits[index / 8] &= !(1 << (index % 8));
    }
}
