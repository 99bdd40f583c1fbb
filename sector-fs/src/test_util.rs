use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use block_dev::BlockDevice;
use spin::Mutex;

use crate::DataBlock;
use crate::FileSystem;
use crate::config::SECTOR_SIZE;

/// 内存中的块设备，记录读写次数
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; sectors * SECTOR_SIZE]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn sector(&self, id: usize) -> DataBlock {
        let mut buf = [0; SECTOR_SIZE];
        buf.copy_from_slice(&self.data.lock()[id * SECTOR_SIZE..(id + 1) * SECTOR_SIZE]);
        buf
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let data = self.data.lock();
        buf.copy_from_slice(&data[block_id * SECTOR_SIZE..(block_id + 1) * SECTOR_SIZE]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut data = self.data.lock();
        data[block_id * SECTOR_SIZE..(block_id + 1) * SECTOR_SIZE].copy_from_slice(buf);
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 在新的内存盘上格式化一个文件系统
pub fn format(sectors: usize) -> (Arc<RamDisk>, Arc<FileSystem>) {
    init_logger();
    let disk = Arc::new(RamDisk::new(sectors));
    let fs = FileSystem::format(disk.clone(), sectors as u32).unwrap();
    (disk, fs)
}
