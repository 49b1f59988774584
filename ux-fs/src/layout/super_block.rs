use core::{mem, ptr, slice};

use crate::error::{Error, Result};
use crate::{BLOCK_SIZE, MAGIC, MAX_BLOCKS, MAX_INODES, RESERVED};

const FREE: u32 = 0;
const INUSE: u32 = 1;

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录每个 inode 与数据块的占用情况及空闲计数
///
/// 数据块状态按**逻辑块号**索引，即相对 [`FIRST_DATA_BLOCK`](crate::FIRST_DATA_BLOCK) 的偏移。
#[derive(Debug, Clone)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    state: u32,
    pub free_inodes: u32,
    pub free_blocks: u32,
    inode_status: [u32; MAX_INODES],
    block_status: [u32; MAX_BLOCKS],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FsState {
    Clean = 0,
    Dirty = 1,
}

impl SuperBlock {
    pub const SIZE: usize = mem::size_of::<Self>();
    /// 超级块横跨的块数
    pub const BLOCKS: usize = Self::SIZE.div_ceil(BLOCK_SIZE);

    /// 刚格式化时的超级块：前 [`RESERVED`] 个 inode 与数据块已占用
    pub fn new() -> Self {
        let mut inode_status = [FREE; MAX_INODES];
        inode_status[..RESERVED].fill(INUSE);
        let mut block_status = [FREE; MAX_BLOCKS];
        block_status[..RESERVED].fill(INUSE);

        Self {
            magic: MAGIC,
            state: FsState::Clean as u32,
            free_inodes: (MAX_INODES - RESERVED) as u32,
            free_blocks: (MAX_BLOCKS - RESERVED) as u32,
            inode_status,
            block_status,
        }
    }

    #[inline]
    pub fn magic(&self) -> u32 {
        self.magic
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// 非法的状态值视作脏
    pub fn state(&self) -> FsState {
        match self.state {
            0 => FsState::Clean,
            _ => FsState::Dirty,
        }
    }

    #[inline]
    pub fn set_state(&mut self, state: FsState) {
        self.state = state as u32;
    }

    pub fn inode_in_use(&self, ino: u32) -> bool {
        self.inode_status
            .get(ino as usize)
            .is_some_and(|&status| status == INUSE)
    }

    pub fn block_in_use(&self, index: u32) -> bool {
        self.block_status
            .get(index as usize)
            .is_some_and(|&status| status == INUSE)
    }

    /// 从 inode 3 起寻找首个空闲 inode 并占用
    pub fn alloc_inode(&mut self) -> Result<u32> {
        if self.free_inodes == 0 {
            return Err(Error::OutOfInodes);
        }

        let ino = Self::claim(&mut self.inode_status, 3).ok_or(Error::OutOfInodes)?;
        self.free_inodes -= 1;
        Ok(ino)
    }

    /// 保留的 inode 永不释放
    pub fn free_inode(&mut self, ino: u32) -> Result<()> {
        if (ino as usize) < RESERVED {
            return Err(Error::InvalidInode(ino));
        }
        let status = self
            .inode_status
            .get_mut(ino as usize)
            .ok_or(Error::InvalidInode(ino))?;
        if *status != INUSE {
            return Err(Error::NotAllocated);
        }
        *status = FREE;
        self.free_inodes += 1;
        Ok(())
    }

    /// 从逻辑块 1 起寻找首个空闲块并占用，返回逻辑块号。
    /// 逻辑块 0 永远属于根目录。
    pub fn alloc_block(&mut self) -> Result<u32> {
        if self.free_blocks == 0 {
            return Err(Error::OutOfSpace);
        }

        let index = Self::claim(&mut self.block_status, 1).ok_or(Error::OutOfSpace)?;
        self.free_blocks -= 1;
        Ok(index)
    }

    /// 保留的逻辑块永不释放
    pub fn free_block(&mut self, index: u32) -> Result<()> {
        if (index as usize) < RESERVED {
            return Err(Error::InvalidBlock(index));
        }
        let status = self
            .block_status
            .get_mut(index as usize)
            .ok_or(Error::InvalidBlock(index))?;
        if *status != INUSE {
            return Err(Error::NotAllocated);
        }
        *status = FREE;
        self.free_blocks += 1;
        Ok(())
    }

    /// 空闲计数与状态数组是否一致
    pub fn is_consistent(&self) -> bool {
        let count = |status: &[u32]| status.iter().filter(|&&s| s == FREE).count() as u32;
        count(&self.inode_status) == self.free_inodes
            && count(&self.block_status) == self.free_blocks
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    /// 从超级块区域的原始字节还原
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= Self::SIZE);
        // 全是 u32 字段，任意位模式都合法
        unsafe { ptr::read_unaligned(bytes.as_ptr().cast()) }
    }
}

impl SuperBlock {
    /// 线性扫描，没有空闲链表
    fn claim(status: &mut [u32], from: usize) -> Option<u32> {
        let (index, slot) = status
            .iter_mut()
            .enumerate()
            .skip(from)
            .find(|(_, s)| **s == FREE)?;
        *slot = INUSE;
        Some(index as u32)
    }
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self::new()
    }
}
