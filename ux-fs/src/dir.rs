//! # 目录项引擎
//!
//! 目录的内容是 `direct[..blocks]` 指向的一串块，每块是 [`DirBlock`]。
//! 查找、插入、删除都按块序、槽序线性扫描；删除只留下墓碑，不做压缩。
//!
//! 带 `_entry` 后缀的方法不加锁，由调用者持有目录的 inode 锁。

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::layout::{DirBlock, DirEntry, DiskInode};
use crate::ufs::inode_block;
use crate::{BLOCK_SIZE, DIRECT_BLOCKS, UxFileSystem};

impl UxFileSystem {
    /// 按名字查找目录项，不存在不算错误
    pub fn find(&self, dir: u32, name: &str) -> Result<Option<u32>> {
        let _guard = self.inode_lock(dir)?.read();
        self.find_entry(dir, name.as_bytes())
    }

    /// 把 `name -> ino` 放进首个墓碑，没有墓碑则为目录新增一块。
    /// 不检查重名。
    pub fn add(&self, dir: u32, name: &str, ino: u32) -> Result<()> {
        let entry = Self::new_entry(name, ino)?;
        let _guard = self.inode_lock(dir)?.write();
        self.add_entry(dir, entry)?;
        self.cache().sync_all()
    }

    /// 删除首个同名目录项并返回其 inode 号；不存在时什么也不做。
    ///
    /// 链接计数由调用者维护。
    pub fn remove(&self, dir: u32, name: &str) -> Result<Option<u32>> {
        let _guard = self.inode_lock(dir)?.write();
        let removed = self.remove_entry(dir, name.as_bytes())?;
        self.cache().sync_all()?;
        Ok(removed)
    }

    /// 从字节偏移 `offset` 起遍历目录项，跳过墓碑
    pub fn iterate(&self, dir: u32, offset: usize) -> DirIter<'_> {
        DirIter {
            fs: self,
            dir,
            offset,
            done: false,
        }
    }
}

impl UxFileSystem {
    /// inode 0 即墓碑，不能作为目录项的目标
    pub(crate) fn new_entry(name: &str, ino: u32) -> Result<DirEntry> {
        if ino == 0 {
            return Err(Error::InvalidInode(ino));
        }
        DirEntry::new(name, ino)
    }

    /// 目录的内容块，非目录报错
    fn dir_blocks(&self, dir: u32) -> Result<Vec<u32>> {
        self.on_disk(dir, |inode| {
            inode.is_dir().then(|| inode.dir_blocks().to_vec())
        })?
        .ok_or(Error::NotADirectory)
    }

    pub(crate) fn find_entry(&self, dir: u32, name: &[u8]) -> Result<Option<u32>> {
        for block in self.dir_blocks(dir)? {
            let found = self.cache().get(block as usize)?.lock().map(0, |entries: &DirBlock| {
                entries
                    .iter()
                    .find(|entry| entry.matches(name))
                    .map(DirEntry::inode_id)
            });
            if found.is_some() {
                log::trace!("found {:?} in inode {dir}", core::str::from_utf8(name));
                return Ok(found);
            }
        }

        Ok(None)
    }

    /// 目录 inode 所在的缓存块在写入目录项之前取到手，
    /// 此后只剩不会失败的步骤，无需回滚已写入的目录项
    pub(crate) fn add_entry(&self, dir: u32, entry: DirEntry) -> Result<()> {
        let blocks = self.dir_blocks(dir)?;
        let dir_inode = self.cache().get(inode_block(dir)?)?;
        let now = self.now();

        // 首次适配：先块后槽
        for &block in &blocks {
            let cache = self.cache().get(block as usize)?;
            let mut cache = cache.lock();
            let slot = cache.map(0, |entries: &DirBlock| entries.iter().position(DirEntry::is_free));
            if let Some(slot) = slot {
                log::debug!("inode {dir}: {:?} -> slot {slot} of block {block}", entry.name_str());
                cache.map_mut(0, |entries: &mut DirBlock| entries[slot] = entry);
                drop(cache);
                dir_inode.lock().map_mut(0, |inode: &mut DiskInode| {
                    inode.mtime = now;
                    inode.ctime = now;
                });
                return Ok(());
            }
        }

        if blocks.len() >= DIRECT_BLOCKS {
            return Err(Error::NoSpace);
        }

        let block = self.allocate_block()?;
        let init = self.cache().get(block as usize).map(|cache| {
            let mut cache = cache.lock();
            cache.zeroize();
            cache.map_mut(0, |entries: &mut DirBlock| entries[0] = entry);
        });
        if let Err(err) = init {
            self.release_blocks(&[block])?;
            return Err(err);
        }

        dir_inode.lock().map_mut(0, |inode: &mut DiskInode| {
            inode.set_block(blocks.len(), block);
            inode.blocks += 1;
            inode.size += BLOCK_SIZE as u32;
            inode.mtime = now;
            inode.ctime = now;
        });
        log::debug!("inode {dir}: grew to {} blocks", blocks.len() + 1);

        Ok(())
    }

    pub(crate) fn remove_entry(&self, dir: u32, name: &[u8]) -> Result<Option<u32>> {
        for block in self.dir_blocks(dir)? {
            let cache = self.cache().get(block as usize)?;
            let mut cache = cache.lock();
            let slot = cache.map(0, |entries: &DirBlock| {
                entries.iter().position(|entry| entry.matches(name))
            });
            if let Some(slot) = slot {
                let ino = cache.map_mut(0, |entries: &mut DirBlock| {
                    let ino = entries[slot].inode_id();
                    entries[slot].clear();
                    ino
                });
                drop(cache);
                log::debug!("inode {dir}: removed entry for inode {ino}");
                self.touch(dir)?;
                return Ok(Some(ino));
            }
        }

        Ok(None)
    }

    /// 目录中只剩 `.` 与 `..`
    pub(crate) fn only_dots(&self, dir: u32) -> Result<bool> {
        for block in self.dir_blocks(dir)? {
            let busy = self.cache().get(block as usize)?.lock().map(0, |entries: &DirBlock| {
                entries
                    .iter()
                    .any(|entry| !entry.is_free() && !matches!(entry.name(), b"." | b".."))
            });
            if busy {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn touch(&self, dir: u32) -> Result<()> {
        let now = self.now();
        self.on_disk_mut(dir, |inode| {
            inode.mtime = now;
            inode.ctime = now;
        })
    }
}

/// 遍历得到的一个目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirItem {
    /// 该目录项在目录内容中的字节偏移
    pub offset: usize,
    pub entry: DirEntry,
}

impl DirItem {
    #[inline]
    pub fn name(&self) -> &[u8] {
        self.entry.name()
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.entry.inode_id()
    }

    /// 从此处继续遍历时应传入的偏移
    #[inline]
    pub fn next_offset(&self) -> usize {
        self.offset + DirEntry::SIZE
    }
}

/// 惰性的目录遍历器，每步只在读锁下取一个目录项，止于目录的 `size`
pub struct DirIter<'a> {
    fs: &'a UxFileSystem,
    dir: u32,
    offset: usize,
    done: bool,
}

impl DirIter<'_> {
    /// 下一次读取的偏移
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn step(&mut self) -> Result<Option<DirItem>> {
        let _guard = self.fs.inode_lock(self.dir)?.read();
        let (size, blocks) = self.fs.on_disk(self.dir, |inode| {
            (inode.size as usize, inode.is_dir().then(|| inode.dir_blocks().to_vec()))
        })?;
        let blocks = blocks.ok_or(Error::NotADirectory)?;

        // 偏移须落在目录项边界上
        self.offset = self.offset.next_multiple_of(DirEntry::SIZE);
        while self.offset < size {
            let offset = self.offset;
            let Some(&block) = blocks.get(offset / BLOCK_SIZE) else {
                break;
            };
            self.offset += DirEntry::SIZE;

            let slot = offset % BLOCK_SIZE / DirEntry::SIZE;
            let entry = self
                .fs
                .cache()
                .get(block as usize)?
                .lock()
                .map(0, |entries: &DirBlock| entries[slot].clone());
            if !entry.is_free() {
                return Ok(Some(DirItem { offset, entry }));
            }
        }

        Ok(None)
    }
}

impl Iterator for DirIter<'_> {
    type Item = Result<DirItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = self.step().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}
