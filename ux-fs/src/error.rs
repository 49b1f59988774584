use block_dev::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("out of inodes")]
    OutOfInodes,

    /// 没有空闲的数据块
    #[error("out of space")]
    OutOfSpace,

    /// 目录已用满直接索引块，无法再增长
    #[error("directory cannot grow any further")]
    NoSpace,

    #[error("file would exceed the direct block limit")]
    FileTooLarge,

    #[error("no such entry")]
    NotFound,

    #[error("device holds {blocks} blocks, at least {required} required")]
    DeviceTooSmall { blocks: usize, required: usize },

    #[error("device I/O failure: {0}")]
    DeviceIo(#[from] DeviceError),

    #[error("bad magic {0:#x}")]
    InvalidMagic(u32),

    #[error("invalid inode number {0}")]
    InvalidInode(u32),

    /// 逻辑块号越界或属于保留区
    #[error("invalid block index {0}")]
    InvalidBlock(u32),

    /// 释放了一个本就空闲的 inode 或块
    #[error("releasing a slot that is not in use")]
    NotAllocated,

    #[error("name is longer than the directory record allows")]
    NameTooLong,

    #[error("invalid name")]
    InvalidName,

    #[error("entry already exists")]
    AlreadyExists,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("directory not empty")]
    DirectoryNotEmpty,
}

pub type Result<T> = core::result::Result<T, Error>;
