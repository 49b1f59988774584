//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、U盘、镜像文件等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 本层不做任何重试，读写失败原样交给调用者。

#![no_std]

use core::any::Any;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 设备的总块数
    fn num_blocks(&self) -> usize;

    /// 读出第 `block_id` 块，`buf` 的长度恰为一块
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// 写入第 `block_id` 块，`buf` 的长度恰为一块
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError>;

    /// 把设备自身的缓冲落盘
    fn flush(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("block {block_id} is out of range")]
    OutOfRange { block_id: usize },

    /// 只读/写了块的一部分
    #[error("incomplete transfer on block {block_id}")]
    Incomplete { block_id: usize },

    #[error("read failed on block {block_id}")]
    Read { block_id: usize },

    #[error("write failed on block {block_id}")]
    Write { block_id: usize },

    #[error("flush failed")]
    Flush,
}
