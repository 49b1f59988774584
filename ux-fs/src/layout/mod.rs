//! # 磁盘数据结构层
//!
//! uxfs 的磁盘布局（以块计）：
//! 超级块 [0, 8) | 索引节点表 [8, 8 + 32) | 空闲 | 数据块区域 [50, 50 + 470)

mod super_block;
pub use super_block::{FsState, SuperBlock};

mod inode;
pub use inode::{DiskInode, InodeKind, Permission};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;

/// 目录内容块：定长目录项的数组
pub type DirBlock = [DirEntry; crate::DIRENTS_PER_BLOCK];
