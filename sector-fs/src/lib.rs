#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* sector-fs 的整体架构，自上而下 */

// 会话层：工作目录与文件描述符表
mod session;

// 打开文件层：带读写位置的文件句柄
mod file;

// 文件系统层：格式化、挂载以及按路径的创建、打开、删除
mod efs;

// 目录层：把目录 inode 的字节流解释为目录项数组
mod dir;
mod path;

// 索引节点层：每个扇区唯一的内存 inode 及其字节流读写
mod inode;

// 磁盘数据结构层：超级块、磁盘 inode、间接索引块、目录项
mod layout;

// 空闲扇区位图
mod free_map;

// 块缓存层：时钟算法淘汰的定长扇区缓存
mod block_cache;

pub mod config;
mod sector;

#[cfg(test)]
mod test_util;

pub use self::{
    block_cache::{BufferCache, CacheStats},
    dir::Dir,
    efs::FileSystem,
    file::File,
    free_map::{FreeMap, SectorAllocator},
    inode::{Inode, InodeTable},
    path::split_path,
    sector::SectorId,
    session::Session,
};

pub use block_dev::BlockDevice;

pub type Result<T> = core::result::Result<T, vfs::Error>;

type DataBlock = [u8; config::SECTOR_SIZE];
