use core::{ptr, slice};

use crate::error::{Error, Result};
use crate::{DIRENT_SIZE, NAME_LEN};

/// 目录项：inode 号 + 定长名字
///
/// inode 号为 0 的目录项是墓碑，留给之后的插入复用，从不压缩。
/// 名字占满 [`NAME_LEN`] 字节时没有结尾的 `\0`。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct DirEntry {
    inode_id: u32,
    name: [u8; NAME_LEN],
}

impl DirEntry {
    /// 元信息大小恒为32字节
    pub const SIZE: usize = DIRENT_SIZE;

    pub fn new(name: &str, inode_id: u32) -> Result<Self> {
        let bytes = Self::check_name(name)?;
        let mut buf = [0; NAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            inode_id,
            name: buf,
        })
    }

    /// 目录项可以容纳的名字
    pub fn check_name(name: &str) -> Result<&[u8]> {
        let bytes = name.as_bytes();
        if bytes.len() > NAME_LEN {
            return Err(Error::NameTooLong);
        }
        if bytes.is_empty() || bytes.iter().any(|&b| b == b'\0' || b == b'/') {
            return Err(Error::InvalidName);
        }
        Ok(bytes)
    }

    /// 名字的有效字节，长度受缓冲区限制
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_LEN);
        &self.name[..len]
    }

    #[inline]
    pub fn name_str(&self) -> Option<&str> {
        core::str::from_utf8(self.name()).ok()
    }

    /// 非墓碑且名字逐字节相等
    #[inline]
    pub fn matches(&self, name: &[u8]) -> bool {
        !self.is_free() && self.name() == name
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.inode_id == 0
    }

    /// 变为墓碑
    #[inline]
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }
}
