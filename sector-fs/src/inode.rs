//! # 索引节点层
//!
//! 每个扇区至多对应一个内存 inode，由 [`InodeTable`] 登记并引用计数。
//! inode 的内容被视为一段字节流，读写按扇区切分后经缓存完成。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use spin::Mutex;
use vfs::Error;

use crate::config::{MAX_FILE_SIZE, SECTOR_SIZE};
use crate::layout::{DiskInode, SectorLayout};
use crate::{BufferCache, DataBlock, Result, SectorAllocator, SectorId};

/// 内存中的 inode
#[derive(Debug)]
pub struct Inode {
    /// 磁盘 inode 所在扇区，也是 inode 号
    sector: SectorId,
    inner: Mutex<InodeInner>,
}

#[derive(Debug)]
struct InodeInner {
    open_cnt: usize,
    /// 已被删除，最后一次关闭时回收
    removed: bool,
    deny_write_cnt: usize,
    disk: DiskInode,
}

/// 已打开 inode 的登记表
#[derive(Debug, Default)]
pub struct InodeTable {
    open: Mutex<BTreeMap<SectorId, Arc<Inode>>>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在`sector`上写入一个长度为`length`的新 inode，并为其分配数据扇区
    pub fn create(
        &self,
        cache: &BufferCache,
        allocator: &dyn SectorAllocator,
        sector: SectorId,
        length: u32,
        is_dir: bool,
    ) -> Result<()> {
        let mut disk_inode = DiskInode::new(length, is_dir);
        disk_inode.reserve(length, cache, allocator)?;
        disk_inode.store(cache, sector);
        log::debug!("inode create: sector={sector} length={length} dir={is_dir}");

        Ok(())
    }

    /// 打开`sector`上的 inode；已打开则共享同一实例
    pub fn open(&self, cache: &BufferCache, sector: SectorId) -> Result<Arc<Inode>> {
        let mut open = self.open.lock();
        if let Some(inode) = open.get(&sector) {
            inode.inner.lock().open_cnt += 1;
            return Ok(inode.clone());
        }

        let disk = DiskInode::load(cache, sector);
        if !disk.is_valid() {
            log::debug!("inode open: sector={sector} has no inode");
            return Err(Error::NotFound);
        }

        let inode = Arc::new(Inode {
            sector,
            inner: Mutex::new(InodeInner {
                open_cnt: 1,
                removed: false,
                deny_write_cnt: 0,
                disk,
            }),
        });
        open.insert(sector, inode.clone());
        log::debug!("inode open: sector={sector}");

        Ok(inode)
    }

    #[inline]
    pub fn reopen(&self, inode: &Arc<Inode>) -> Arc<Inode> {
        inode.inner.lock().open_cnt += 1;
        inode.clone()
    }

    /// 关闭一次。最后一次关闭时注销；若已被删除，则回收其全部扇区
    pub fn close(
        &self,
        cache: &BufferCache,
        allocator: &dyn SectorAllocator,
        inode: Arc<Inode>,
    ) -> Result<()> {
        let mut open = self.open.lock();
        let mut inner = inode.inner.lock();
        debug_assert!(inner.open_cnt > 0);

        inner.open_cnt -= 1;
        if inner.open_cnt > 0 {
            return Ok(());
        }

        open.remove(&inode.sector);
        log::debug!("inode close: sector={}", inode.sector);
        if inner.removed {
            inner.disk.delete(cache, allocator)?;
            cache.zeroize(inode.sector);
            allocator.release(inode.sector, 1);
            log::debug!("inode freed: sector={}", inode.sector);
        }

        Ok(())
    }

    /// 当前登记的 inode 数
    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }
}

impl Inode {
    #[inline]
    pub fn inumber(&self) -> SectorId {
        self.sector
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.inner.lock().disk.length()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.inner.lock().disk.is_dir()
    }

    /// 标记删除，回收推迟到最后一次关闭
    #[inline]
    pub fn remove(&self) {
        self.inner.lock().removed = true;
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.inner.lock().removed
    }

    #[inline]
    pub fn open_count(&self) -> usize {
        self.inner.lock().open_cnt
    }

    pub fn deny_write(&self) {
        let mut inner = self.inner.lock();
        inner.deny_write_cnt += 1;
        assert!(inner.deny_write_cnt <= inner.open_cnt);
    }

    pub fn allow_write(&self) {
        let mut inner = self.inner.lock();
        assert!(inner.deny_write_cnt > 0);
        assert!(inner.deny_write_cnt <= inner.open_cnt);
        inner.deny_write_cnt -= 1;
    }

    /// 从`offset`起读入`buf`，返回实际读到的字节数；越过末尾的部分读不到
    pub fn read_at(&self, cache: &BufferCache, buf: &mut [u8], offset: usize) -> usize {
        let inner = self.inner.lock();
        let length = inner.disk.length() as usize;
        let mut bounce: DataBlock = [0; SECTOR_SIZE];

        let mut offset = offset;
        let mut done = 0;
        while done < buf.len() && offset < length {
            let Some(sector) = inner.disk.sector_number(offset / SECTOR_SIZE, cache) else {
                break;
            };
            let sector_ofs = offset % SECTOR_SIZE;
            let chunk = (buf.len() - done)
                .min(SECTOR_SIZE - sector_ofs)
                .min(length - offset);
            let dst = &mut buf[done..done + chunk];

            if let Ok(block) = <&mut DataBlock>::try_from(&mut *dst) {
                cache.read(sector, block);
            } else {
                cache.read(sector, &mut bounce);
                dst.copy_from_slice(&bounce[sector_ofs..sector_ofs + chunk]);
            }

            offset += chunk;
            done += chunk;
        }

        done
    }

    /// 从`offset`起写入`buf`，必要时扩展文件，返回写入的字节数。
    /// 禁止写入期间返回 0。
    pub fn write_at(
        &self,
        cache: &BufferCache,
        allocator: &dyn SectorAllocator,
        buf: &[u8],
        offset: usize,
    ) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.deny_write_cnt > 0 || buf.is_empty() {
            return Ok(0);
        }

        let end = offset
            .checked_add(buf.len())
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(Error::FileTooLarge)?;
        if end > inner.disk.length() as usize {
            inner.disk.reserve(end as u32, cache, allocator)?;
            inner.disk.set_length(end as u32);
            inner.disk.store(cache, self.sector);
            log::debug!("inode grow: sector={} length={end}", self.sector);
        }

        let mut bounce: DataBlock = [0; SECTOR_SIZE];
        let mut offset = offset;
        let mut done = 0;
        while done < buf.len() {
            let Some(sector) = inner.disk.sector_number(offset / SECTOR_SIZE, cache) else {
                break;
            };
            let sector_ofs = offset % SECTOR_SIZE;
            let chunk = (buf.len() - done).min(SECTOR_SIZE - sector_ofs);
            let src = &buf[done..done + chunk];

            if let Ok(block) = <&DataBlock>::try_from(src) {
                cache.write(sector, block);
            } else {
                // 不足一个扇区，先读出原内容再覆盖其中一段
                cache.read(sector, &mut bounce);
                bounce[sector_ofs..sector_ofs + chunk].copy_from_slice(src);
                cache.write(sector, &bounce);
            }

            offset += chunk;
            done += chunk;
        }

        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::FileSystem;
    use crate::config::{DIRECT_COUNT, INDIRECT_COUNT};
    use crate::test_util;

    fn new_inode(fs: &FileSystem, length: u32) -> Arc<Inode> {
        let sector = fs.free_map().allocate(1).unwrap();
        fs.inodes()
            .create(fs.cache(), fs.free_map(), sector, length, false)
            .unwrap();
        fs.open_inode(sector).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn open_twice_shares_instance() {
        let (_disk, fs) = test_util::format(256);
        let inode = new_inode(&fs, 0);
        let again = fs.open_inode(inode.inumber()).unwrap();

        assert!(Arc::ptr_eq(&inode, &again));
        assert_eq!(inode.open_count(), 2);

        fs.close_inode(again).unwrap();
        assert_eq!(inode.open_count(), 1);
        let sector = inode.inumber();
        fs.close_inode(inode).unwrap();

        let fresh = fs.open_inode(sector).unwrap();
        assert_eq!(fresh.open_count(), 1);
        fs.close_inode(fresh).unwrap();
    }

    #[test]
    fn open_non_inode_sector() {
        let (_disk, fs) = test_util::format(256);
        let sector = fs.free_map().allocate(1).unwrap();
        assert_eq!(fs.open_inode(sector).unwrap_err(), Error::NotFound);
    }

    #[test]
    fn read_past_end_is_short() {
        let (_disk, fs) = test_util::format(256);
        let inode = new_inode(&fs, 0);
        let data = pattern(700);
        assert_eq!(
            inode.write_at(fs.cache(), fs.free_map(), &data, 0),
            Ok(700)
        );

        let mut buf = vec![0; 100];
        assert_eq!(inode.read_at(fs.cache(), &mut buf, 650), 50);
        assert_eq!(&buf[..50], &data[650..]);
        assert_eq!(inode.read_at(fs.cache(), &mut buf, 700), 0);
        assert_eq!(inode.read_at(fs.cache(), &mut buf, 5000), 0);
    }

    #[test]
    fn write_past_end_zero_fills_gap() {
        let (_disk, fs) = test_util::format(256);
        let inode = new_inode(&fs, 10);
        assert_eq!(
            inode.write_at(fs.cache(), fs.free_map(), b"tail", 1500),
            Ok(4)
        );
        assert_eq!(inode.length(), 1504);

        let mut buf = vec![0xff; 1504];
        assert_eq!(inode.read_at(fs.cache(), &mut buf, 0), 1504);
        assert!(buf[..1500].iter().all(|&b| b == 0));
        assert_eq!(&buf[1500..], b"tail");
    }

    #[test]
    fn round_trip_across_tiers() {
        let (_disk, fs) = test_util::format(1024);
        let inode = new_inode(&fs, 0);

        // 跨越直接索引与一级索引、一级索引与二级索引的边界
        for boundary in [DIRECT_COUNT, DIRECT_COUNT + INDIRECT_COUNT] {
            let offset = boundary * SECTOR_SIZE - 300;
            let data = pattern(1000);
            assert_eq!(
                inode.write_at(fs.cache(), fs.free_map(), &data, offset),
                Ok(1000)
            );
            let mut buf = vec![0; 1000];
            assert_eq!(inode.read_at(fs.cache(), &mut buf, offset), 1000);
            assert_eq!(buf, data);
        }
    }

    #[test]
    fn deny_write_blocks_writes() {
        let (_disk, fs) = test_util::format(256);
        let inode = new_inode(&fs, 0);
        inode.deny_write();
        assert_eq!(inode.write_at(fs.cache(), fs.free_map(), b"abc", 0), Ok(0));
        assert_eq!(inode.length(), 0);

        inode.allow_write();
        assert_eq!(inode.write_at(fs.cache(), fs.free_map(), b"abc", 0), Ok(3));
    }

    #[test]
    fn write_beyond_max_size() {
        let (_disk, fs) = test_util::format(256);
        let inode = new_inode(&fs, 0);
        assert_eq!(
            inode.write_at(fs.cache(), fs.free_map(), b"x", MAX_FILE_SIZE),
            Err(Error::FileTooLarge)
        );
        assert_eq!(
            inode.write_at(fs.cache(), fs.free_map(), b"x", usize::MAX),
            Err(Error::FileTooLarge)
        );
        assert_eq!(inode.length(), 0);
    }

    #[test]
    fn removal_is_deferred_to_last_close() {
        let (_disk, fs) = test_util::format(256);
        let free = fs.free_map().free_count();

        let inode = new_inode(&fs, 3 * SECTOR_SIZE as u32);
        let sector = inode.inumber();
        let other = fs.open_inode(sector).unwrap();
        assert_eq!(fs.free_map().free_count(), free - 4);

        inode.remove();
        fs.close_inode(inode).unwrap();
        assert!(fs.free_map().is_allocated(sector));
        let mut buf = [0; 4];
        assert_eq!(other.read_at(fs.cache(), &mut buf, 0), 4);

        fs.close_inode(other).unwrap();
        assert_eq!(fs.free_map().free_count(), free);
        assert_eq!(fs.open_inode(sector).unwrap_err(), Error::NotFound);
    }

    #[test]
    fn concurrent_open_shares_instance() {
        let (_disk, fs) = test_util::format(256);
        let sector = {
            let inode = new_inode(&fs, 0);
            let sector = inode.inumber();
            fs.close_inode(inode).unwrap();
            sector
        };

        // 各线程反复开关同一扇区，持有期间必须拿到同一个实例
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fs = fs.clone();
                std::thread::spawn(move || {
                    let mut live: Vec<Arc<Inode>> = Vec::new();
                    for _ in 0..200 {
                        let inode = fs.open_inode(sector).unwrap();
                        assert!(live.iter().all(|other| Arc::ptr_eq(other, &inode)));
                        live.push(inode);
                        if live.len() > 4 {
                            fs.close_inode(live.remove(0)).unwrap();
                        }
                    }
                    live
                })
            })
            .collect();

        let live: Vec<_> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        assert!(live.iter().all(|inode| Arc::ptr_eq(inode, &live[0])));
        assert_eq!(live[0].open_count(), live.len());
        assert_eq!(fs.inodes().len(), 1);

        for inode in live {
            fs.close_inode(inode).unwrap();
        }
        assert!(fs.inodes().is_empty());
    }
}
