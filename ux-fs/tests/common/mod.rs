//! 测试共用的内存块设备

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ux_fs::{BLOCK_SIZE, BlockDevice, DeviceError, FIRST_DATA_BLOCK, MAX_BLOCKS, Options, UxFileSystem};

pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    num_blocks: usize,
    /// 打开后所有写入都失败
    fail_writes: AtomicBool,
    /// 对这一块的读写都失败
    bad_block: AtomicUsize,
}

impl RamDisk {
    pub fn new(num_blocks: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; num_blocks * BLOCK_SIZE]),
            num_blocks,
            fail_writes: AtomicBool::new(false),
            bad_block: AtomicUsize::new(usize::MAX),
        }
    }

    /// 能用满整个数据区的大小
    pub fn full() -> Arc<Self> {
        Arc::new(Self::new(FIRST_DATA_BLOCK + MAX_BLOCKS))
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_block(&self, block_id: Option<usize>) {
        self.bad_block.store(block_id.unwrap_or(usize::MAX), Ordering::SeqCst);
    }

    /// 设备内容的快照
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    pub fn block(&self, block_id: usize) -> Vec<u8> {
        self.data.lock().unwrap()[block_id * BLOCK_SIZE..(block_id + 1) * BLOCK_SIZE].to_vec()
    }
}

impl BlockDevice for RamDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        if block_id >= self.num_blocks {
            return Err(DeviceError::OutOfRange { block_id });
        }
        if buf.len() != BLOCK_SIZE {
            return Err(DeviceError::Incomplete { block_id });
        }
        if self.bad_block.load(Ordering::SeqCst) == block_id {
            return Err(DeviceError::Read { block_id });
        }
        let start = block_id * BLOCK_SIZE;
        buf.copy_from_slice(&self.data.lock().unwrap()[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        if block_id >= self.num_blocks {
            return Err(DeviceError::OutOfRange { block_id });
        }
        if buf.len() != BLOCK_SIZE {
            return Err(DeviceError::Incomplete { block_id });
        }
        if self.fail_writes.load(Ordering::SeqCst)
            || self.bad_block.load(Ordering::SeqCst) == block_id
        {
            return Err(DeviceError::Write { block_id });
        }
        let start = block_id * BLOCK_SIZE;
        self.data.lock().unwrap()[start..start + BLOCK_SIZE].copy_from_slice(buf);
        Ok(())
    }
}

/// 格式化并挂载一块全新的盘
pub fn mount() -> (Arc<RamDisk>, Arc<UxFileSystem>) {
    let disk = RamDisk::full();
    UxFileSystem::format(disk.clone(), &Options::default()).unwrap();
    let fs = UxFileSystem::open(disk.clone(), Options::default()).unwrap();
    (disk, fs)
}

pub fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}
