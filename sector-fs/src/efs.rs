//! # 文件系统层
//!
//! 构建出磁盘的布局并使用：
//! 格式化、挂载、卸载，以及按路径创建、打开、删除。

use alloc::sync::Arc;

use block_dev::BlockDevice;
use spin::RwLock;
use vfs::Error;

use crate::config::{
    DIR_ENTRIES, FREE_MAP_SECTOR, NAME_MAX, ROOT_DIR_ENTRIES, ROOT_DIR_SECTOR, SUPER_BLOCK_SECTOR,
};
use crate::layout::{SectorLayout, SuperBlock};
use crate::path::{self, split_path};
use crate::{BufferCache, Dir, FreeMap, Inode, InodeTable, Result, SectorAllocator, SectorId};

pub struct FileSystem {
    cache: Arc<BufferCache>,
    free_map: FreeMap,
    inodes: InodeTable,
    /// 读者共享、写者独占的全局闸门，由会话层使用
    gate: RwLock<()>,
}

impl FileSystem {
    /// 在设备上建立全新的文件系统
    pub fn format(device: Arc<dyn BlockDevice>, total_sectors: u32) -> Result<Arc<Self>> {
        let free_map_sectors = FreeMap::sectors_for(total_sectors);
        // 至少要放得下超级块、根目录、位图和根目录的一个数据扇区
        if total_sectors <= FREE_MAP_SECTOR + free_map_sectors {
            return Err(Error::NoSpace);
        }

        let cache = Arc::new(BufferCache::new(device));
        SuperBlock::new(total_sectors, FREE_MAP_SECTOR, free_map_sectors)
            .store(&cache, SectorId::new(SUPER_BLOCK_SECTOR));
        let free_map = FreeMap::create(cache.clone(), total_sectors);

        let fs = Self {
            cache,
            free_map,
            inodes: InodeTable::new(),
            gate: RwLock::new(()),
        };
        Dir::create(&fs, SectorId::new(ROOT_DIR_SECTOR), ROOT_DIR_ENTRIES)?;
        fs.cache.flush();
        log::info!(
            "format: {total_sectors} sectors, {} free",
            fs.free_map.free_count()
        );

        Ok(Arc::new(fs))
    }

    /// 挂载设备上已有的文件系统
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Arc<Self>> {
        let cache = Arc::new(BufferCache::new(device));
        let super_block = SuperBlock::load(&cache, SectorId::new(SUPER_BLOCK_SECTOR));
        if !super_block.is_valid() {
            log::warn!("mount: bad superblock magic");
            return Err(Error::BadMagic);
        }

        let free_map = FreeMap::open(
            cache.clone(),
            SectorId::new(super_block.free_map_start),
            super_block.free_map_sectors,
            super_block.total_sectors,
        );
        log::info!(
            "mount: {} sectors, {} free",
            super_block.total_sectors,
            free_map.free_count()
        );

        Ok(Arc::new(Self {
            cache,
            free_map,
            inodes: InodeTable::new(),
            gate: RwLock::new(()),
        }))
    }

    /// 写回所有脏扇区
    pub fn shutdown(&self) {
        self.cache.flush();
        let stats = self.cache.stats();
        log::info!(
            "shutdown: hits={} misses={} evictions={} write_backs={}",
            stats.hits,
            stats.misses,
            stats.evictions,
            stats.write_backs
        );
        if !self.inodes.is_empty() {
            log::warn!("shutdown: {} inodes still open", self.inodes.len());
        }
    }

    #[inline]
    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    #[inline]
    pub fn free_map(&self) -> &FreeMap {
        &self.free_map
    }

    #[inline]
    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    #[inline]
    pub(crate) fn gate(&self) -> &RwLock<()> {
        &self.gate
    }

    #[inline]
    pub fn open_inode(&self, sector: SectorId) -> Result<Arc<Inode>> {
        self.inodes.open(&self.cache, sector)
    }

    #[inline]
    pub fn close_inode(&self, inode: Arc<Inode>) -> Result<()> {
        self.inodes.close(&self.cache, &self.free_map, inode)
    }
}

impl FileSystem {
    /// 沿路径逐级打开目录。
    /// 绝对路径或没有工作目录时从根目录出发，否则从`cwd`出发。
    pub fn open_dir(&self, cwd: Option<&Dir>, path: &str) -> Result<Dir> {
        let mut dir = match cwd {
            Some(cwd) if !path::is_absolute(path) => cwd.reopen(self),
            _ => Dir::open_root(self)?,
        };

        for name in path::components(path) {
            let inode = match dir.lookup(self, name) {
                Ok(inode) => inode,
                Err(err) => {
                    dir.close(self)?;
                    return Err(err);
                }
            };
            dir.close(self)?;

            if !inode.is_dir() {
                self.close_inode(inode)?;
                return Err(Error::NotADirectory);
            }
            dir = Dir::open(inode);
        }

        if dir.inode().is_removed() {
            dir.close(self)?;
            return Err(Error::NotFound);
        }

        Ok(dir)
    }

    /// 创建长度为`size`的文件，或者一个空目录
    pub fn create(&self, cwd: Option<&Dir>, path: &str, size: u32, is_dir: bool) -> Result<()> {
        let (dir_path, name) = split_path(path);
        if name.is_empty() || name.len() > NAME_MAX {
            return Err(Error::InvalidName);
        }

        let dir = self.open_dir(cwd, dir_path)?;
        let result = self.create_in(&dir, name, size, is_dir);
        dir.close(self)?;

        result
    }

    fn create_in(&self, dir: &Dir, name: &str, size: u32, is_dir: bool) -> Result<()> {
        let Some(sector) = self.free_map.allocate(1) else {
            log::warn!("create: no free sector for {name}");
            return Err(Error::NoSpace);
        };

        let created = if is_dir {
            Dir::create(self, sector, DIR_ENTRIES)
        } else {
            self.inodes
                .create(&self.cache, &self.free_map, sector, size, false)
        };
        if let Err(err) = created {
            self.free_map.release(sector, 1);
            return Err(err);
        }

        if let Err(err) = dir.add(self, name, sector, is_dir) {
            // 连同数据扇区一并回收
            let inode = self.open_inode(sector)?;
            inode.remove();
            self.close_inode(inode)?;
            return Err(err);
        }

        Ok(())
    }

    /// 打开路径所指的文件或目录；名字为空时打开目录本身
    pub fn open(&self, cwd: Option<&Dir>, path: &str) -> Result<Arc<Inode>> {
        if path.is_empty() {
            return Err(Error::NotFound);
        }

        let (dir_path, name) = split_path(path);
        let dir = self.open_dir(cwd, dir_path)?;
        let inode = if name.is_empty() {
            Ok(self.inodes.reopen(dir.inode()))
        } else {
            dir.lookup(self, name)
        };
        dir.close(self)?;

        let inode = inode?;
        if inode.is_removed() {
            self.close_inode(inode)?;
            return Err(Error::NotFound);
        }

        Ok(inode)
    }

    pub fn remove(&self, cwd: Option<&Dir>, path: &str) -> Result<()> {
        let (dir_path, name) = split_path(path);
        if name.is_empty() {
            return Err(Error::InvalidName);
        }

        let dir = self.open_dir(cwd, dir_path)?;
        let result = dir.remove(self, name);
        dir.close(self)?;

        result
    }
}
