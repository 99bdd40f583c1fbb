//! # 块设备接口层
//!
//! 块设备是以**扇区**为单位存储数据的设备；
//! [`BlockDevice`] 是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 读写都是同步的：方法返回时传输已经完成。

#![no_std]

use core::any::Any;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 把编号为`block_id`的扇区读入`buf`，`buf`恰好一个扇区大小
    fn read_block(&self, block_id: usize, buf: &mut [u8]);

    /// 把`buf`写入编号为`block_id`的扇区
    fn write_block(&self, block_id: usize, buf: &[u8]);

    fn handle_irq(&self) {}
}
