#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* uxfs 的整体架构，自上而下 */

// 索引节点层：文件与目录的句柄，创建、删除、读写等操作
mod vfs;

// 目录项引擎：目录内容块上的增删查与遍历
mod dir;

// 文件块映射：逻辑块号到物理块号
mod file;

// 磁盘块管理器层：超级块分配器、挂载与格式化
mod ufs;
mod mkfs;

// 扩展属性块的写入者
mod attr;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;

mod error;

pub use block_dev::{BlockDevice, DeviceError};

pub use self::{
    attr::{AttrWriter, ZeroAttrs},
    dir::{DirItem, DirIter},
    error::{Error, Result},
    file::MAX_FILE_SIZE,
    layout::{DirEntry, DiskInode, FsState, InodeKind, Permission, SuperBlock},
    ufs::{Options, StatFs, UxFileSystem},
    vfs::{Directory, File, Node, Stat},
};

pub const MAGIC: u32 = 0x5849_4e55;
pub const BLOCK_SIZE: usize = 512;

/// 索引节点的数量上限
pub const MAX_INODES: usize = 32;
/// 数据块的数量上限
pub const MAX_BLOCKS: usize = 470;
/// 每个索引节点的直接索引块个数，没有间接索引
pub const DIRECT_BLOCKS: usize = 16;

/// 目录项中名字的字节数
pub const NAME_LEN: usize = 28;
pub const DIRENT_SIZE: usize = 32;
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;

/// 索引节点表的起始块，第 n 个 inode 独占第 `INODE_BLOCK + n` 块
pub const INODE_BLOCK: usize = 8;
pub const FIRST_DATA_BLOCK: usize = 50;

pub const ROOT_INO: u32 = 2;
pub const LOST_FOUND_INO: u32 = 3;
/// inode 0..=3 与数据块 0..=3 在格式化时即被占用
pub const RESERVED: usize = 4;

pub type DataBlock = [u8; BLOCK_SIZE];
