//! 引擎常量
//!
//! 几何参数属于磁盘格式的一部分，改动即不兼容。

/// 扇区大小
pub const SECTOR_SIZE: usize = 512;
/// 一个扇区的位数
pub const SECTOR_BITS: usize = SECTOR_SIZE * 8;

/// 块缓存的行数，固定不变
pub const CACHE_CAPACITY: usize = 64;

/// 磁盘 inode 的直接索引个数
pub const DIRECT_COUNT: usize = 123;
/// 间接索引块的编号容量
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;
/// 文件可寻址的最大扇区数
pub const MAX_SECTORS: usize = DIRECT_COUNT + INDIRECT_COUNT + INDIRECT_COUNT * INDIRECT_COUNT;
/// 文件的最大字节长度
pub const MAX_FILE_SIZE: usize = MAX_SECTORS * SECTOR_SIZE;

/// 文件名的最大字节数，不含结尾的 `\0`
pub const NAME_MAX: usize = 14;

/// 超级块所在扇区
pub const SUPER_BLOCK_SECTOR: u32 = 0;
/// 根目录 inode 所在扇区
pub const ROOT_DIR_SECTOR: u32 = 1;
/// 空闲位图的起始扇区
pub const FREE_MAP_SECTOR: u32 = 2;
/// 根目录初始可容纳的目录项数
pub const ROOT_DIR_ENTRIES: usize = 16;
/// 新建子目录初始可容纳的目录项数
pub const DIR_ENTRIES: usize = 16;

/// 磁盘 inode 的魔数
pub const INODE_MAGIC: u32 = 0x494e_4f44;
/// 超级块的魔数
pub const FS_MAGIC: u32 = 0x5346_5331;
