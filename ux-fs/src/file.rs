//! # 文件块映射
//!
//! 逻辑块号即 `direct` 的下标，没有间接索引，
//! 文件最大 `DIRECT_BLOCKS * BLOCK_SIZE` 字节。

use core::iter;

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::layout::{DiskInode, InodeKind};
use crate::ufs::inode_block;
use crate::{BLOCK_SIZE, DIRECT_BLOCKS, DataBlock, UxFileSystem};

/// 文件容量上限（字节）
pub const MAX_FILE_SIZE: usize = DIRECT_BLOCKS * BLOCK_SIZE;

impl UxFileSystem {
    /// 返回文件第 `index` 个逻辑块所在的物理块。
    ///
    /// 未分配时：`create` 则分配新块（首次还会为 inode 分配属性块）并写回 inode，
    /// 否则返回空，调用者把它当作全零的空洞。
    pub fn resolve_block(&self, ino: u32, index: usize, create: bool) -> Result<Option<u32>> {
        let _guard = self.inode_lock(ino)?.write();
        let block = self.map_block(ino, index, create)?;
        if create {
            self.cache().sync(inode_block(ino)?)?;
        }
        Ok(block)
    }

    /// 从 `offset` 读出数据填充 `buf`，止于文件大小
    pub fn read_at(&self, ino: u32, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let _guard = self.inode_lock(ino)?.read();
        let size = self.file_inode(ino, |inode| inode.size as usize)?;
        if offset >= size {
            return Ok(0);
        }

        let mut start = offset;
        let end = offset.saturating_add(buf.len()).min(size);

        // 已读取多少字节
        let mut read_size = 0;
        while start < end {
            let block_index = start / BLOCK_SIZE;
            // 当前块的末地址(字节)
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_read_size = current_block_end - start;
            let dest = &mut buf[read_size..read_size + block_read_size];

            match self.map_block(ino, block_index, false)? {
                Some(block) => {
                    self.cache()
                        .get(block as usize)?
                        .lock()
                        .map(0, |data_block: &DataBlock| {
                            // 绝对地址 % 块大小 = 块内偏移
                            let src = &data_block
                                [start % BLOCK_SIZE..start % BLOCK_SIZE + block_read_size];
                            dest.copy_from_slice(src);
                        })
                }
                None => dest.fill(0),
            }

            read_size += block_read_size;
            start = current_block_end;
        }

        Ok(read_size)
    }

    /// 写入 `buf`，按需分配块，并把文件大小扩到写入的末尾
    pub fn write_at(&self, ino: u32, offset: usize, buf: &[u8]) -> Result<usize> {
        let _guard = self.inode_lock(ino)?.write();
        self.file_inode(ino, |_| ())?;

        let end = offset
            .checked_add(buf.len())
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(Error::FileTooLarge)?;

        let mut start = offset;
        let mut written_size = 0;
        let mut result = Ok(());
        while start < end {
            let block_index = start / BLOCK_SIZE;
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_write_size = current_block_end - start;

            let src = &buf[written_size..written_size + block_write_size];
            result = self.write_block_at(ino, block_index, start % BLOCK_SIZE, src);
            if result.is_err() {
                break;
            }

            written_size += block_write_size;
            start = current_block_end;
        }

        // 写入中途失败时，已写入的部分依旧计入大小
        if written_size > 0 {
            let now = self.now();
            self.on_disk_mut(ino, |inode| {
                inode.size = inode.size.max((offset + written_size) as u32);
                inode.mtime = now;
                inode.ctime = now;
            })?;
        }
        self.cache().sync_all()?;

        result.map(|()| written_size)
    }

    /// 释放文件的全部数据块，大小归零；属性块保留
    pub fn truncate(&self, ino: u32) -> Result<()> {
        let _guard = self.inode_lock(ino)?.write();
        self.file_inode(ino, |_| ())?;
        self.clear_inode(ino, true)?;
        self.cache().sync_all()
    }
}

impl UxFileSystem {
    pub(crate) fn map_block(&self, ino: u32, index: usize, create: bool) -> Result<Option<u32>> {
        if index >= DIRECT_BLOCKS {
            return Err(Error::FileTooLarge);
        }

        let (current, has_attr) =
            self.file_inode(ino, |inode| (inode.block(index), inode.attr_block != 0))?;
        if current.is_some() || !create {
            return Ok(current);
        }

        let block = self.allocate_block()?;
        // 每个 inode 只有一个属性块
        let attr_block = if has_attr {
            None
        } else {
            match self.allocate_block() {
                Ok(attr_block) => Some(attr_block),
                Err(err) => {
                    self.release_blocks(&[block])?;
                    return Err(err);
                }
            }
        };

        if let Err(err) = self.install_block(ino, index, block, attr_block) {
            let acquired: Vec<u32> = iter::once(block).chain(attr_block).collect();
            self.release_blocks(&acquired)?;
            return Err(err);
        }
        log::debug!("inode {ino}: logical block {index} -> {block}");

        Ok(Some(block))
    }

    /// 回收 inode 的数据块，`keep_attrs` 为假时连同属性块
    pub(crate) fn clear_inode(&self, ino: u32, keep_attrs: bool) -> Result<()> {
        let dropped = self.on_disk_mut(ino, |inode| {
            let mut dropped = inode.clear();
            if !keep_attrs {
                dropped.extend(inode.take_attr_block());
            }
            dropped
        })?;
        self.release_blocks(&dropped)
    }

    /// 只接受普通文件
    fn file_inode<V>(&self, ino: u32, f: impl FnOnce(&DiskInode) -> V) -> Result<V> {
        self.on_disk(ino, |inode| match inode.kind() {
            Some(InodeKind::File) => Ok(f(inode)),
            Some(InodeKind::Directory) => Err(Error::IsADirectory),
            None => Err(Error::InvalidInode(ino)),
        })?
    }

    fn install_block(
        &self,
        ino: u32,
        index: usize,
        block: u32,
        attr_block: Option<u32>,
    ) -> Result<()> {
        // 新块清零，读者不会看到上一个主人的数据
        self.zero_block(block)?;

        let mut inode = self.on_disk(ino, DiskInode::clone)?;
        if let Some(attr_block) = attr_block {
            self.write_attrs(ino, &mut inode, attr_block)?;
        }
        inode.set_block(index, block);
        inode.blocks += 1;
        inode.ctime = self.now();

        self.on_disk_mut(ino, |disk_inode| *disk_inode = inode)
    }

    fn write_block_at(&self, ino: u32, index: usize, offset: usize, src: &[u8]) -> Result<()> {
        let block = self
            .map_block(ino, index, true)?
            .ok_or(Error::OutOfSpace)?;
        self.cache()
            .get(block as usize)?
            .lock()
            .map_mut(0, |data_block: &mut DataBlock| {
                data_block[offset..offset + src.len()].copy_from_slice(src);
            });
        Ok(())
    }
}
