//! # 目录层
//!
//! 目录 inode 的字节流被解释为 [`DirEntry`] 数组。
//! 0 号目录项固定指向父目录，不参与按名查找，也不会被复用；
//! 根目录的父目录是它自己。

use alloc::string::String;
use alloc::sync::Arc;

use vfs::Error;

use crate::config::{NAME_MAX, ROOT_DIR_SECTOR};
use crate::layout::DirEntry;
use crate::{FileSystem, Inode, Result, SectorId};

/// 打开的目录：一个 inode 引用加上`readdir`的游标
#[derive(Debug)]
pub struct Dir {
    inode: Arc<Inode>,
    /// 字节偏移
    pos: usize,
}

impl Dir {
    /// 在`sector`上建立一个可容纳`entry_cnt`项的目录，0 号项先指向自身
    pub fn create(fs: &FileSystem, sector: SectorId, entry_cnt: usize) -> Result<()> {
        let length = (entry_cnt * DirEntry::SIZE) as u32;
        fs.inodes()
            .create(fs.cache(), fs.free_map(), sector, length, true)?;

        let inode = fs.open_inode(sector)?;
        let result = write_entry(fs, &inode, 0, &DirEntry::new("", sector));
        fs.close_inode(inode)?;
        result
    }

    /// 接管`inode`的一次引用
    #[inline]
    pub fn open(inode: Arc<Inode>) -> Self {
        Self {
            inode,
            pos: DirEntry::SIZE,
        }
    }

    pub fn open_root(fs: &FileSystem) -> Result<Self> {
        fs.open_inode(SectorId::new(ROOT_DIR_SECTOR)).map(Self::open)
    }

    #[inline]
    pub fn reopen(&self, fs: &FileSystem) -> Self {
        Self::open(fs.inodes().reopen(&self.inode))
    }

    #[inline]
    pub fn close(self, fs: &FileSystem) -> Result<()> {
        fs.close_inode(self.inode)
    }

    #[inline]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    /// 按名字查找并打开子项
    pub fn lookup(&self, fs: &FileSystem, name: &str) -> Result<Arc<Inode>> {
        match name {
            "." => Ok(fs.inodes().reopen(&self.inode)),
            ".." => {
                let parent = self.entry_at(fs, 0).ok_or(Error::Corrupted)?;
                fs.open_inode(parent.inode_sector())
            }
            _ => {
                let (_, entry) = self.find(fs, name).ok_or(Error::NotFound)?;
                fs.open_inode(entry.inode_sector())
            }
        }
    }

    /// 添加一个名为`name`、inode 位于`sector`的子项
    pub fn add(&self, fs: &FileSystem, name: &str, sector: SectorId, is_dir: bool) -> Result<()> {
        if name.is_empty() || name.len() > NAME_MAX {
            return Err(Error::InvalidName);
        }
        if self.find(fs, name).is_some() {
            return Err(Error::AlreadyExists);
        }

        if is_dir {
            // 子目录的 0 号项指回这里
            let child = fs.open_inode(sector)?;
            let result = write_entry(fs, &child, 0, &DirEntry::new("", self.inode.inumber()));
            fs.close_inode(child)?;
            result?;
        }

        // 找不到空位就追加在末尾
        let mut offset = DirEntry::SIZE;
        while let Some(entry) = self.entry_at(fs, offset) {
            if !entry.in_use() {
                break;
            }
            offset += DirEntry::SIZE;
        }

        write_entry(fs, &self.inode, offset, &DirEntry::new(name, sector))?;
        log::debug!("dir add: {name} -> {sector} in {}", self.inode.inumber());

        Ok(())
    }

    /// 删除名为`name`的子项；子目录非空时拒绝
    pub fn remove(&self, fs: &FileSystem, name: &str) -> Result<()> {
        let (offset, mut entry) = self.find(fs, name).ok_or(Error::NotFound)?;
        let inode = fs.open_inode(entry.inode_sector())?;

        if inode.is_dir() {
            let child = Self::open(fs.inodes().reopen(&inode));
            let empty = child.is_empty(fs);
            child.close(fs)?;
            if !empty {
                fs.close_inode(inode)?;
                return Err(Error::DirectoryNotEmpty);
            }
        }

        entry.set_in_use(false);
        if let Err(err) = write_entry(fs, &self.inode, offset, &entry) {
            fs.close_inode(inode)?;
            return Err(err);
        }

        inode.remove();
        log::debug!("dir remove: {name} in {}", self.inode.inumber());
        fs.close_inode(inode)
    }

    /// 从游标处读出下一个在用子项的名字
    pub fn readdir(&mut self, fs: &FileSystem) -> Option<String> {
        while let Some(entry) = self.entry_at(fs, self.pos) {
            self.pos += DirEntry::SIZE;
            if entry.in_use() {
                return Some(String::from(entry.name()));
            }
        }

        None
    }

    /// 除 0 号项外没有在用的子项
    pub fn is_empty(&self, fs: &FileSystem) -> bool {
        let mut offset = DirEntry::SIZE;
        while let Some(entry) = self.entry_at(fs, offset) {
            if entry.in_use() {
                return false;
            }
            offset += DirEntry::SIZE;
        }

        true
    }
}

impl Dir {
    fn entry_at(&self, fs: &FileSystem, offset: usize) -> Option<DirEntry> {
        let mut entry = DirEntry::default();
        (self.inode.read_at(fs.cache(), entry.as_bytes_mut(), offset) == DirEntry::SIZE)
            .then_some(entry)
    }

    /// 返回在用子项的偏移与内容
    fn find(&self, fs: &FileSystem, name: &str) -> Option<(usize, DirEntry)> {
        let mut offset = DirEntry::SIZE;
        while let Some(entry) = self.entry_at(fs, offset) {
            if entry.in_use() && entry.name() == name {
                return Some((offset, entry));
            }
            offset += DirEntry::SIZE;
        }

        None
    }
}

fn write_entry(fs: &FileSystem, inode: &Inode, offset: usize, entry: &DirEntry) -> Result<()> {
    match inode.write_at(fs.cache(), fs.free_map(), entry.as_bytes(), offset)? {
        DirEntry::SIZE => Ok(()),
        _ => Err(Error::NoSpace),
    }
}
