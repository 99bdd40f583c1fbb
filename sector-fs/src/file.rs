//! # 打开文件层
//!
//! 带读写位置的 inode 句柄。

use alloc::sync::Arc;

use crate::{FileSystem, Inode, Result};

#[derive(Debug)]
pub struct File {
    inode: Arc<Inode>,
    /// **文件**内的偏移量，可以超过文件长度
    pos: usize,
    /// 本句柄是否禁止了 inode 的写入
    deny_write: bool,
}

impl File {
    /// 接管`inode`的一次引用
    #[inline]
    pub fn open(inode: Arc<Inode>) -> Self {
        Self {
            inode,
            pos: 0,
            deny_write: false,
        }
    }

    #[inline]
    pub fn reopen(&self, fs: &FileSystem) -> Self {
        Self::open(fs.inodes().reopen(&self.inode))
    }

    pub fn close(mut self, fs: &FileSystem) -> Result<()> {
        self.allow_write();
        fs.close_inode(self.inode)
    }

    #[inline]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    pub fn read(&mut self, fs: &FileSystem, buf: &mut [u8]) -> usize {
        let read = self.read_at(fs, buf, self.pos);
        self.pos += read;
        read
    }

    #[inline]
    pub fn read_at(&self, fs: &FileSystem, buf: &mut [u8], offset: usize) -> usize {
        self.inode.read_at(fs.cache(), buf, offset)
    }

    pub fn write(&mut self, fs: &FileSystem, buf: &[u8]) -> Result<usize> {
        let written = self.write_at(fs, buf, self.pos)?;
        self.pos += written;
        Ok(written)
    }

    #[inline]
    pub fn write_at(&self, fs: &FileSystem, buf: &[u8], offset: usize) -> Result<usize> {
        self.inode.write_at(fs.cache(), fs.free_map(), buf, offset)
    }

    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.inode.length()
    }

    /// 禁止任何句柄写入该 inode，直到本句柄允许或关闭
    pub fn deny_write(&mut self) {
        if !self.deny_write {
            self.deny_write = true;
            self.inode.deny_write();
        }
    }

    pub fn allow_write(&mut self) {
        if self.deny_write {
            self.deny_write = false;
            self.inode.allow_write();
        }
    }
}
