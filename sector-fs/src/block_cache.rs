//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此在内存中开辟固定数量的缓存行，
//! 把最近操作的扇区保留在内存里。缓存层对使用者透明：
//! 引擎对块设备的所有访问都经过这里，且只有这里会碰块设备。
//!
//! 淘汰策略为时钟（二次机会）算法：
//! 指针循环扫描缓存行，无效行直接取用；
//! 访问位为 1 的有效行清零访问位后放过；
//! 第一个访问位已为 0 的有效行即为牺牲者，脏行先写回再复用。
//!
//! 整个缓存只有一把锁，查找、选牺牲者、写回、填充、拷贝都在锁内完成。
//! 选牺牲者与写回是 [`CacheInner`] 的方法，只能经由锁守卫调用。

use alloc::boxed::Box;
use alloc::sync::Arc;

use block_dev::BlockDevice;
use enumflags2::{BitFlags, bitflags};
use spin::Mutex;

use crate::DataBlock;
use crate::SectorId;
use crate::config::{CACHE_CAPACITY, SECTOR_SIZE};

/// 缓存行状态
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineFlag {
    /// 行内数据来自设备且仍然有效
    Valid = 0b001,
    /// 行内数据比设备上的新
    Dirty = 0b010,
    /// 上次被扫描后又被访问过
    Referenced = 0b100,
}

/// 缓存命中与淘汰的计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// 写回设备的次数，包括淘汰与冲刷
    pub write_backs: u64,
}

/// 扇区缓存，挂载时创建一次，以共享引用传给各层
pub struct BufferCache {
    /// 底层块设备的引用
    device: Arc<dyn BlockDevice>,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    lines: Box<[CacheLine]>,
    /// 时钟指针
    hand: usize,
    stats: CacheStats,
}

/// 内存中的一行扇区缓存
struct CacheLine {
    flags: BitFlags<LineFlag>,
    /// 对应的扇区号
    sector: SectorId,
    /// 缓存的数据
    data: DataBlock,
}

impl BufferCache {
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            device,
            inner: Mutex::new(CacheInner::new()),
        }
    }

    /// 把扇区的最新内容拷贝进`buf`
    pub fn read(&self, sector: SectorId, buf: &mut DataBlock) {
        let mut inner = self.inner.lock();
        let index = inner.acquire(sector, self.device.as_ref());
        buf.copy_from_slice(&inner.lines[index].data);
    }

    /// 以`data`替换扇区的缓存内容，并标记为脏
    pub fn write(&self, sector: SectorId, data: &DataBlock) {
        let mut inner = self.inner.lock();
        let index = inner.acquire(sector, self.device.as_ref());
        let line = &mut inner.lines[index];
        line.data.copy_from_slice(data);
        line.flags.insert(LineFlag::Dirty);
    }

    /// 把扇区清零
    #[inline]
    pub fn zeroize(&self, sector: SectorId) {
        self.write(sector, &[0; SECTOR_SIZE]);
    }

    /// 写回所有脏行，用于卸载
    pub fn flush(&self) {
        self.inner.lock().flush_all(self.device.as_ref());
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

impl Drop for BufferCache {
    fn drop(&mut self) {
        self.flush();
    }
}

impl CacheInner {
    fn new() -> Self {
        Self {
            lines: (0..CACHE_CAPACITY).map(|_| CacheLine::new()).collect(),
            hand: 0,
            stats: CacheStats::default(),
        }
    }

    fn lookup(&self, sector: SectorId) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.flags.contains(LineFlag::Valid) && line.sector == sector)
    }

    /// 返回缓存了`sector`的行；未命中就选出一行并从设备填充
    fn acquire(&mut self, sector: SectorId, device: &dyn BlockDevice) -> usize {
        if let Some(index) = self.lookup(sector) {
            self.stats.hits += 1;
            self.lines[index].flags.insert(LineFlag::Referenced);
            return index;
        }

        self.stats.misses += 1;
        let index = self.select_victim(device);
        let line = &mut self.lines[index];
        device.read_block(sector.block(), &mut line.data);
        line.sector = sector;
        line.flags = LineFlag::Valid | LineFlag::Referenced;
        log::trace!("cache fill: sector={sector} line={index}");

        index
    }

    /// 时钟扫描，返回一条已失效、可直接复用的行
    fn select_victim(&mut self, device: &dyn BlockDevice) -> usize {
        loop {
            let index = self.hand;
            self.hand = (self.hand + 1) % self.lines.len();

            let line = &mut self.lines[index];
            if !line.flags.contains(LineFlag::Valid) {
                return index;
            }
            if line.flags.contains(LineFlag::Referenced) {
                line.flags.remove(LineFlag::Referenced);
                continue;
            }

            log::trace!("cache evict: sector={} line={index}", line.sector);
            self.flush_line(index, device);
            self.lines[index].flags = BitFlags::empty();
            self.stats.evictions += 1;
            return index;
        }
    }

    fn flush_line(&mut self, index: usize, device: &dyn BlockDevice) {
        let line = &mut self.lines[index];
        debug_assert!(line.flags.contains(LineFlag::Valid));

        if line.flags.contains(LineFlag::Dirty) {
            device.write_block(line.sector.block(), &line.data);
            line.flags.remove(LineFlag::Dirty);
            self.stats.write_backs += 1;
        }
    }

    fn flush_all(&mut self, device: &dyn BlockDevice) {
        for index in 0..self.lines.len() {
            if self.lines[index].flags.contains(LineFlag::Valid) {
                self.flush_line(index, device);
            }
        }
    }
}

impl CacheLine {
    fn new() -> Self {
        Self {
            flags: BitFlags::empty(),
            sector: SectorId::new(0),
            data: [0; SECTOR_SIZE],
        }
    }
}
