//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟缓冲区，
//! 把即将操作的块复制到内存中，提高对块设备的操作效率。
//! 同时，块缓存层也会尝试返回已缓存的块。
//!
//! 每个文件系统实例拥有自己的缓存管理器，不同设备的同号块互不干扰。
//! 操作块时一定在缓冲区当中；超级块例外，它由分配器直接写回设备。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::error::Result;
use crate::{BLOCK_SIZE, DataBlock};

/// 按 8 字节对齐的块数据，使 `#[repr(C)]` 的磁盘结构可以原地映射
#[repr(C, align(8))]
struct AlignedBlock(DataBlock);

/// 内存中的块缓存
pub struct BlockCache {
    /// 缓存的数据
    data: Box<AlignedBlock>,
    /// 对应的块ID
    block_id: usize,
    /// 底层块设备的引用
    block_device: Arc<dyn BlockDevice>,
    /// 是否为脏块
    modified: bool,
}

impl BlockCache {
    pub fn new(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut data = Box::new(AlignedBlock([0; BLOCK_SIZE]));
        block_device.read_block(block_id, &mut data.0)?;

        Ok(Self {
            data,
            block_id,
            block_device,
            modified: false,
        })
    }

    pub fn sync(&mut self) -> Result<()> {
        if self.modified {
            self.block_device.write_block(self.block_id, &self.data.0)?;
            self.modified = false;
        }
        Ok(())
    }

    pub fn get<T: Sized>(&self, offset: usize) -> &T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= BLOCK_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        let addr = self.offset(offset).cast();
        unsafe { &*addr }
    }

    pub fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= BLOCK_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        self.modified = true;
        let addr = self.offset(offset).cast_mut().cast();
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Sized, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }

    #[inline]
    pub fn zeroize(&mut self) {
        self.data.0.fill(0);
        self.modified = true;
    }
}

impl BlockCache {
    #[inline]
    fn offset(&self, count: usize) -> *const u8 {
        &self.data.0[count]
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        if let Err(err) = self.sync() {
            log::error!("losing block {}: {err}", self.block_id);
        }
    }
}

/// 块缓存管理，缓存、调度块缓存
pub struct BlockCacheManager {
    block_device: Arc<dyn BlockDevice>,
    queue: Mutex<Vec<(usize, Arc<Mutex<BlockCache>>)>>,
}

impl BlockCacheManager {
    /// 块缓存个数的上限
    const CAPACITY: usize = 16;

    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            block_device,
            queue: Mutex::new(Vec::with_capacity(Self::CAPACITY)),
        }
    }

    // 块缓存调度策略：踢走闲置块
    pub fn get(&self, block_id: usize) -> Result<Arc<Mutex<BlockCache>>> {
        let mut queue = self.queue.lock();

        // 尝试从缓冲区中读取块
        if let Some(cache) = queue
            .iter()
            .find_map(|(id, cache)| (block_id == *id).then_some(cache))
        {
            return Ok(Arc::clone(cache));
        };

        // 触及上限，写回一个块
        if queue.len() >= Self::CAPACITY {
            // 没有其它引用的才能写回
            match queue
                .iter()
                .position(|(_, cache)| Arc::strong_count(cache) == 1)
            {
                Some(index) => {
                    queue[index].1.lock().sync()?;
                    queue.remove(index);
                }
                None => log::warn!("every cached block is busy, growing past {}", Self::CAPACITY),
            }
        }

        // 缓存新块
        let block_cache = Arc::new(Mutex::new(BlockCache::new(
            block_id,
            self.block_device.clone(),
        )?));
        queue.push((block_id, block_cache.clone()));

        Ok(block_cache)
    }

    /// 写回一个块（若已缓存）
    pub fn sync(&self, block_id: usize) -> Result<()> {
        let cache = self
            .queue
            .lock()
            .iter()
            .find_map(|(id, cache)| (block_id == *id).then(|| cache.clone()));
        match cache {
            Some(cache) => cache.lock().sync(),
            None => Ok(()),
        }
    }

    pub fn sync_all(&self) -> Result<()> {
        // 先放开队列锁，持有某块的线程可能正等着队列
        let caches: Vec<_> = self
            .queue
            .lock()
            .iter()
            .map(|(_, cache)| cache.clone())
            .collect();
        caches.iter().try_for_each(|cache| cache.lock().sync())
    }

    #[inline]
    pub fn block_device(&self) -> &Arc<dyn BlockDevice> {
        &self.block_device
    }
}
