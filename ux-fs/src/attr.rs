//! 扩展属性块
//!
//! uxfs 只负责给每个 inode 分配一个属性块并记下其地址，
//! 块内的编码（xattr、ACL 等）交给 [`AttrWriter`]。

use crate::DataBlock;
use crate::layout::DiskInode;

pub trait AttrWriter: Send + Sync {
    /// 填写 `ino` 的属性块 `attr_block`，返回有效字节数，记入 `attr_size`。
    ///
    /// `buf` 是该块的缓存，进来时已清零。
    fn write_attrs(&self, ino: u32, inode: &DiskInode, attr_block: u32, buf: &mut DataBlock)
    -> u32;
}

/// 不写任何属性，块保持全零
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroAttrs;

impl AttrWriter for ZeroAttrs {
    fn write_attrs(&self, _: u32, _: &DiskInode, _: u32, _: &mut DataBlock) -> u32 {
        0
    }
}
