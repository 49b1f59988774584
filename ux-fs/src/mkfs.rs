//! # 格式化
//!
//! 在空设备上写出全新的 uxfs：
//!
//! | 数据块 | 用途 |
//! | ------ | ---- |
//! | 50 | 根目录内容：`.`、`..`、`lost+found` |
//! | 51 | 根目录属性块 |
//! | 52 | `lost+found` 内容：`.`、`..` |
//! | 53 | `lost+found` 属性块 |

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::attr::AttrWriter;
use crate::block_cache::BlockCacheManager;
use crate::error::{Error, Result};
use crate::layout::{DirBlock, DirEntry, DiskInode, InodeKind, Permission, SuperBlock};
use crate::ufs::{Options, inode_block, write_attrs, write_super};
use crate::{
    BLOCK_SIZE, FIRST_DATA_BLOCK, INODE_BLOCK, LOST_FOUND_INO, MAX_BLOCKS, MAX_INODES, ROOT_INO,
    UxFileSystem,
};

const ROOT_BLOCK: u32 = FIRST_DATA_BLOCK as u32;
const LOST_FOUND_BLOCK: u32 = ROOT_BLOCK + 2;

impl UxFileSystem {
    /// 把设备格式化为空的 uxfs，只含根目录与 `lost+found`
    pub fn format(block_device: Arc<dyn BlockDevice>, options: &Options) -> Result<()> {
        let blocks = block_device.num_blocks();
        if blocks < MAX_BLOCKS {
            return Err(Error::DeviceTooSmall {
                blocks,
                required: MAX_BLOCKS,
            });
        }

        write_super(&block_device, &SuperBlock::new())?;

        let cache = BlockCacheManager::new(block_device.clone());
        // 清空 inode 表
        for block_id in INODE_BLOCK..INODE_BLOCK + MAX_INODES {
            cache.get(block_id)?.lock().zeroize();
        }

        let now = (options.clock)();
        let attrs = options.attrs.as_ref();
        make_dir(&cache, attrs, now, ROOT_INO, ROOT_BLOCK, &[
            (".", ROOT_INO),
            ("..", ROOT_INO),
            ("lost+found", LOST_FOUND_INO),
        ])?;
        // lost+found 的 `..` 也指向根目录
        make_dir(&cache, attrs, now, LOST_FOUND_INO, LOST_FOUND_BLOCK, &[
            (".", ROOT_INO),
            ("..", ROOT_INO),
        ])?;
        // 根目录额外被 lost+found 的 `..` 引用
        cache
            .get(inode_block(ROOT_INO)?)?
            .lock()
            .map_mut(0, |inode: &mut DiskInode| inode.links += 1);

        cache.sync_all()?;
        drop(cache);
        block_device.flush()?;

        log::info!(
            "formatted uxfs: {} inodes, {} data blocks, {blocks} device blocks",
            MAX_INODES,
            MAX_BLOCKS
        );
        Ok(())
    }
}

/// 写出一个目录：内容块紧跟着属性块
fn make_dir(
    cache: &BlockCacheManager,
    attrs: &dyn AttrWriter,
    now: u32,
    ino: u32,
    block: u32,
    entries: &[(&str, u32)],
) -> Result<()> {
    let mut inode = DiskInode::default();
    inode.init(InodeKind::Directory, Permission::dir_default(), now);
    inode.size = BLOCK_SIZE as u32;
    inode.blocks = 1;
    inode.set_block(0, block);
    write_attrs(cache, attrs, ino, &mut inode, block + 1)?;

    let content = cache.get(block as usize)?;
    let mut content = content.lock();
    content.zeroize();
    for (slot, &(name, entry_ino)) in entries.iter().enumerate() {
        let entry = DirEntry::new(name, entry_ino)?;
        content.map_mut(0, |dir_block: &mut DirBlock| dir_block[slot] = entry);
    }
    drop(content);

    cache
        .get(inode_block(ino)?)?
        .lock()
        .map_mut(0, |disk_inode: &mut DiskInode| *disk_inode = inode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_blocks_match_the_pristine_super_block() {
        let sb = SuperBlock::new();
        for block in [ROOT_BLOCK, ROOT_BLOCK + 1, LOST_FOUND_BLOCK, LOST_FOUND_BLOCK + 1] {
            let index = UxFileSystem::logical_block(block).unwrap();
            assert!(sb.block_in_use(index));
        }
        let next = UxFileSystem::logical_block(LOST_FOUND_BLOCK + 2).unwrap();
        assert!(!sb.block_in_use(next));
    }
}
