//! 磁盘上的索引节点
//!
//! 每个 inode 独占 inode 表中的一块，只有直接索引：
//! `direct[i]` 即文件第 i 个逻辑块所在的物理块，0 表示未分配。
//!
//! 目录的空间用于存放目录项；文件的空间用于存放它的数据。

use alloc::vec::Vec;

use enumflags2::{BitFlags, bitflags};

use crate::DIRECT_BLOCKS;

#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DiskInode {
    /// 类型与权限位
    pub mode: u32,
    /// 硬链接个数
    pub links: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub uid: u32,
    pub gid: u32,
    // 不用usize是为了严控布局
    pub size: u32,
    /// 已用的直接索引块个数
    pub blocks: u32,
    direct: [u32; DIRECT_BLOCKS],
    /// 扩展属性块，0 表示尚未分配
    pub attr_block: u32,
    pub attr_size: u32,
}

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Directory = 0o040000,
    File = 0o100000,
}

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    OtherExec = 0o001,
    OtherWrite = 0o002,
    OtherRead = 0o004,
    GroupExec = 0o010,
    GroupWrite = 0o020,
    GroupRead = 0o040,
    OwnerExec = 0o100,
    OwnerWrite = 0o200,
    OwnerRead = 0o400,
}

impl Permission {
    /// 0755
    pub fn dir_default() -> BitFlags<Self> {
        BitFlags::from_bits_truncate(0o755)
    }

    /// 0644
    pub fn file_default() -> BitFlags<Self> {
        BitFlags::from_bits_truncate(0o644)
    }
}

impl DiskInode {
    /// 目录初始两个链接：`.` 与父目录中的名字
    pub fn init(&mut self, kind: InodeKind, perms: BitFlags<Permission>, now: u32) {
        *self = Self {
            mode: kind as u32 | perms.bits(),
            links: match kind {
                InodeKind::Directory => 2,
                InodeKind::File => 1,
            },
            atime: now,
            mtime: now,
            ctime: now,
            ..Default::default()
        }
    }

    /// 无法识别的类型位返回空
    pub fn kind(&self) -> Option<InodeKind> {
        BitFlags::<InodeKind>::from_bits_truncate(self.mode).exactly_one()
    }

    #[inline]
    pub fn permissions(&self) -> BitFlags<Permission> {
        BitFlags::from_bits_truncate(self.mode)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == Some(InodeKind::Directory)
    }

    /// 第 `index` 个逻辑块所在的物理块
    pub fn block(&self, index: usize) -> Option<u32> {
        self.direct.get(index).copied().filter(|&blk| blk != 0)
    }

    pub fn set_block(&mut self, index: usize, block: u32) {
        self.direct[index] = block;
    }

    /// 目录内容块，按逻辑顺序
    #[inline]
    pub fn dir_blocks(&self) -> &[u32] {
        &self.direct[..(self.blocks as usize).min(DIRECT_BLOCKS)]
    }

    /// 清空直接索引，返回原先占用的数据块；属性块不动
    pub fn clear(&mut self) -> Vec<u32> {
        let dropped = self.direct.iter().copied().filter(|&b| b != 0).collect();
        self.direct.fill(0);
        self.blocks = 0;
        self.size = 0;
        dropped
    }

    /// 摘下属性块
    pub fn take_attr_block(&mut self) -> Option<u32> {
        self.attr_size = 0;
        match core::mem::take(&mut self.attr_block) {
            0 => None,
            block => Some(block),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_bits() {
        let mut inode = DiskInode::default();
        inode.init(InodeKind::Directory, Permission::dir_default(), 7);
        assert_eq!(inode.mode, 0o040755);
        assert_eq!(inode.links, 2);
        assert!(inode.is_dir());
        assert_eq!(inode.permissions().bits(), 0o755);

        inode.init(InodeKind::File, Permission::file_default(), 7);
        assert_eq!(inode.mode, 0o100644);
        assert_eq!(inode.links, 1);
        assert_eq!(inode.kind(), Some(InodeKind::File));

        inode.mode = 0o644;
        assert_eq!(inode.kind(), None);
    }

    #[test]
    fn clear_keeps_attr_block() {
        let mut inode = DiskInode::default();
        inode.init(InodeKind::File, Permission::file_default(), 0);
        inode.set_block(0, 60);
        inode.set_block(3, 63);
        inode.blocks = 2;
        inode.attr_block = 61;
        inode.size = 2000;

        assert_eq!(inode.block(3), Some(63));
        assert_eq!(inode.block(1), None);
        assert_eq!(inode.block(DIRECT_BLOCKS), None);

        assert_eq!(inode.clear(), [60, 63]);
        assert_eq!(inode.blocks, 0);
        assert_eq!(inode.size, 0);
        assert_eq!(inode.block(0), None);
        assert_eq!(inode.attr_block, 61);

        assert_eq!(inode.take_attr_block(), Some(61));
        assert_eq!(inode.take_attr_block(), None);
    }
}
