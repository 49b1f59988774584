//! # 磁盘块管理器层
//!
//! 持有超级块并负责 inode 与数据块的分配、回收；
//! 每次分配或回收都**同步**写回超级块，没有日志。

use alloc::sync::Arc;
use alloc::vec;

use block_dev::BlockDevice;
use spin::{Mutex, RwLock};

use crate::attr::{AttrWriter, ZeroAttrs};
use crate::block_cache::BlockCacheManager;
use crate::error::{Error, Result};
use crate::layout::*;
use crate::vfs::{Directory, Node};
use crate::{
    BLOCK_SIZE, DataBlock, FIRST_DATA_BLOCK, INODE_BLOCK, MAX_BLOCKS, MAX_INODES, RESERVED, ROOT_INO,
};

/// 挂载与格式化时注入的外部协作者
#[derive(Clone)]
pub struct Options {
    /// 属性块的编码者
    pub attrs: Arc<dyn AttrWriter>,
    /// 时间戳来源（秒）
    pub clock: fn() -> u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            attrs: Arc::new(ZeroAttrs),
            clock: || 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub free_inodes: u32,
    pub free_blocks: u32,
    pub state: FsState,
}

pub struct UxFileSystem {
    cache: BlockCacheManager,
    /// 分配器的唯一临界区：扫描、占用、计数、写回
    super_block: Mutex<SuperBlock>,
    /// 以 inode 号为下标的锁，目录项与块映射的修改都在其写锁下进行
    inode_locks: [RwLock<()>; MAX_INODES],
    options: Options,
}

impl UxFileSystem {
    /// 挂载：校验魔数，并把状态改为脏
    pub fn open(block_device: Arc<dyn BlockDevice>, options: Options) -> Result<Arc<Self>> {
        let mut super_block = read_super(&block_device)?;
        if !super_block.is_valid() {
            return Err(Error::InvalidMagic(super_block.magic()));
        }
        if super_block.state() == FsState::Dirty {
            log::warn!("uxfs was not cleanly unmounted");
        }
        if !super_block.is_consistent() {
            log::warn!("uxfs free counts disagree with the status arrays");
        }

        super_block.set_state(FsState::Dirty);
        write_super(&block_device, &super_block)?;
        log::info!(
            "uxfs mounted: {} free inodes, {} free blocks",
            super_block.free_inodes,
            super_block.free_blocks
        );

        Ok(Arc::new(Self {
            cache: BlockCacheManager::new(block_device),
            super_block: Mutex::new(super_block),
            inode_locks: [const { RwLock::new(()) }; MAX_INODES],
            options,
        }))
    }

    /// 写回所有缓存块，标记为干净并落盘
    pub fn unmount(&self) -> Result<()> {
        self.cache.sync_all()?;
        self.update_super(|sb| {
            sb.set_state(FsState::Clean);
            Ok(())
        })?;
        self.cache.block_device().flush()?;
        log::info!("uxfs unmounted");
        Ok(())
    }

    #[inline]
    pub fn sync(&self) -> Result<()> {
        self.cache.sync_all()
    }

    pub fn statfs(&self) -> StatFs {
        let sb = self.super_block.lock();
        StatFs {
            free_inodes: sb.free_inodes,
            free_blocks: sb.free_blocks,
            state: sb.state(),
        }
    }

    /// 超级块的快照
    pub fn super_block(&self) -> SuperBlock {
        self.super_block.lock().clone()
    }

    pub fn root(self: &Arc<Self>) -> Result<Directory> {
        match self.node(ROOT_INO)? {
            Node::Directory(root) => Ok(root),
            Node::File(_) => Err(Error::NotADirectory),
        }
    }

    /// 按类型取得 inode 的句柄
    pub fn node(self: &Arc<Self>, ino: u32) -> Result<Node> {
        let kind = self.on_disk(ino, DiskInode::kind)?;
        Node::new(self.clone(), ino, kind)
    }

    /// 在磁盘上分配新的 inode 并返回其ID
    pub fn allocate_inode(&self) -> Result<u32> {
        let ino = self
            .update_super(|sb| sb.alloc_inode())
            .inspect_err(|err| log::warn!("uxfs: {err}"))?;
        log::debug!("allocated inode {ino}");
        Ok(ino)
    }

    /// 调用者须已回收该 inode 的全部块
    pub fn release_inode(&self, ino: u32) -> Result<()> {
        if (ino as usize) < RESERVED {
            return Err(Error::InvalidInode(ino));
        }
        self.update_super(|sb| sb.free_inode(ino))?;
        log::debug!("released inode {ino}");
        Ok(())
    }

    /// 在磁盘上分配新的数据块并返回其物理块号
    pub fn allocate_block(&self) -> Result<u32> {
        let index = self
            .update_super(|sb| sb.alloc_block())
            .inspect_err(|err| log::warn!("uxfs: {err}"))?;
        log::debug!("allocated block {index}");
        Ok(FIRST_DATA_BLOCK as u32 + index)
    }

    /// 按逻辑块号回收
    pub fn release_block(&self, index: u32) -> Result<()> {
        self.update_super(|sb| sb.free_block(index))?;
        log::debug!("released block {index}");
        Ok(())
    }

    /// 物理块号转逻辑块号，不在数据区则为空
    pub fn logical_block(block: u32) -> Option<u32> {
        (block as usize)
            .checked_sub(FIRST_DATA_BLOCK)
            .filter(|&index| index < MAX_BLOCKS)
            .map(|index| index as u32)
    }
}

impl UxFileSystem {
    /// 一次写回回收一批物理块
    pub(crate) fn release_blocks(&self, blocks: &[u32]) -> Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }
        self.update_super(|sb| {
            blocks.iter().try_for_each(|&block| {
                sb.free_block(Self::logical_block(block).ok_or(Error::InvalidBlock(block))?)
            })
        })?;
        log::debug!("released blocks {blocks:?}");
        Ok(())
    }

    #[inline]
    pub(crate) fn cache(&self) -> &BlockCacheManager {
        &self.cache
    }

    #[inline]
    pub(crate) fn now(&self) -> u32 {
        (self.options.clock)()
    }

    pub(crate) fn inode_lock(&self, ino: u32) -> Result<&RwLock<()>> {
        inode_block(ino)?;
        Ok(&self.inode_locks[ino as usize])
    }

    /// 读取对磁盘的映射并处理
    pub(crate) fn on_disk<V>(&self, ino: u32, f: impl FnOnce(&DiskInode) -> V) -> Result<V> {
        Ok(self.cache.get(inode_block(ino)?)?.lock().map(0, f))
    }

    /// 以某种方式修改对磁盘的映射
    pub(crate) fn on_disk_mut<V>(
        &self,
        ino: u32,
        f: impl FnOnce(&mut DiskInode) -> V,
    ) -> Result<V> {
        Ok(self.cache.get(inode_block(ino)?)?.lock().map_mut(0, f))
    }

    /// 清零一个数据块
    pub(crate) fn zero_block(&self, block: u32) -> Result<()> {
        self.cache.get(block as usize)?.lock().zeroize();
        Ok(())
    }

    /// 清零属性块，交给 [`AttrWriter`] 填写，并记入 inode
    pub(crate) fn write_attrs(&self, ino: u32, inode: &mut DiskInode, attr_block: u32) -> Result<()> {
        write_attrs(&self.cache, self.options.attrs.as_ref(), ino, inode, attr_block)
    }

    /// 在副本上修改超级块，写回成功后才生效。
    /// 写回失败时尽力写回旧的超级块，使盘上内容与内存一致
    fn update_super<V>(&self, f: impl FnOnce(&mut SuperBlock) -> Result<V>) -> Result<V> {
        let mut super_block = self.super_block.lock();
        let mut next = super_block.clone();
        let value = f(&mut next)?;
        if let Err(err) = write_super(self.cache.block_device(), &next) {
            if let Err(restore) = write_super(self.cache.block_device(), &super_block) {
                log::error!("superblock may be torn on disk: {restore}");
            }
            return Err(err);
        }
        *super_block = next;
        Ok(value)
    }
}

/// inode 所在块
pub(crate) fn inode_block(ino: u32) -> Result<usize> {
    if ino == 0 || ino as usize >= MAX_INODES {
        return Err(Error::InvalidInode(ino));
    }
    Ok(INODE_BLOCK + ino as usize)
}

pub(crate) fn write_attrs(
    cache: &BlockCacheManager,
    attrs: &dyn AttrWriter,
    ino: u32,
    inode: &mut DiskInode,
    attr_block: u32,
) -> Result<()> {
    let block = cache.get(attr_block as usize)?;
    let mut block = block.lock();
    block.zeroize();
    let size = block.map_mut(0, |buf: &mut DataBlock| {
        attrs.write_attrs(ino, inode, attr_block, buf)
    });

    inode.attr_block = attr_block;
    inode.attr_size = size.min(BLOCK_SIZE as u32);
    Ok(())
}

/// 超级块横跨多块，绕过块缓存直接读写设备
pub(crate) fn read_super(block_device: &Arc<dyn BlockDevice>) -> Result<SuperBlock> {
    let mut buf = vec![0; SuperBlock::BLOCKS * BLOCK_SIZE];
    for (block_id, chunk) in buf.chunks_mut(BLOCK_SIZE).enumerate() {
        block_device.read_block(block_id, chunk)?;
    }
    Ok(SuperBlock::from_bytes(&buf))
}

pub(crate) fn write_super(block_device: &Arc<dyn BlockDevice>, super_block: &SuperBlock) -> Result<()> {
    let mut buf = vec![0; SuperBlock::BLOCKS * BLOCK_SIZE];
    buf[..SuperBlock::SIZE].copy_from_slice(super_block.as_bytes());
    // 块 0 最后写：魔数与空闲计数在状态数组落盘之后才改变
    for (block_id, chunk) in buf.chunks(BLOCK_SIZE).enumerate().rev() {
        block_device.write_block(block_id, chunk)?;
    }
    Ok(())
}
