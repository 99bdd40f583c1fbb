
use std::fs::File;
use std::io::{Read, Write};
use std::io::{Seek, SeekFrom};
use std::sync::Mutex;

use block_dev::BlockDevice;
use sector_fs::config::SECTOR_SIZE;

/// 以镜像文件充当块设备，`n`号扇区位于文件的`n * SECTOR_SIZE`字节处
#[derive(Debug)]
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    #[inline]
    pub fn new(fd: File) -> Self {
        Self(Mutex::new(fd))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().expect("block file poisoned");
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete block!");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().expect("block file poisoned");
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete block!");
        file.write_all(buf).expect("not a complete block!");
    }
}
