//! # 索引节点层
//!
//! 文件与目录的句柄。一个 inode 要么是 [`File`] 要么是 [`Directory`]，
//! 由 [`Node`] 区分；命名空间上的操作（创建、删除、链接）在这里完成，
//! 并负责维护链接计数。
//!
//! 锁序：父目录的 inode 锁 → 子 inode 的锁 → 超级块锁 → 块缓存。

use alloc::sync::Arc;
use alloc::vec::Vec;

use enumflags2::BitFlags;

use crate::dir::{DirItem, DirIter};
use crate::error::{Error, Result};
use crate::layout::{DirBlock, DirEntry, DiskInode, InodeKind, Permission};
use crate::ufs::inode_block;
use crate::{BLOCK_SIZE, LOST_FOUND_INO, UxFileSystem};

pub enum Node {
    File(File),
    Directory(Directory),
}

pub struct File {
    ino: u32,
    fs: Arc<UxFileSystem>,
}

pub struct Directory {
    ino: u32,
    fs: Arc<UxFileSystem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub ino: u32,
    pub kind: InodeKind,
    pub perms: BitFlags<Permission>,
    pub links: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    /// 占用的直接索引块
    pub blocks: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

impl Node {
    pub(crate) fn new(fs: Arc<UxFileSystem>, ino: u32, kind: Option<InodeKind>) -> Result<Self> {
        match kind {
            Some(InodeKind::File) => Ok(Self::File(File { ino, fs })),
            Some(InodeKind::Directory) => Ok(Self::Directory(Directory { ino, fs })),
            None => Err(Error::InvalidInode(ino)),
        }
    }

    pub fn ino(&self) -> u32 {
        match self {
            Self::File(file) => file.ino,
            Self::Directory(dir) => dir.ino,
        }
    }

    pub fn stat(&self) -> Result<Stat> {
        match self {
            Self::File(file) => file.stat(),
            Self::Directory(dir) => dir.stat(),
        }
    }

    pub fn into_dir(self) -> Result<Directory> {
        match self {
            Self::Directory(dir) => Ok(dir),
            Self::File(_) => Err(Error::NotADirectory),
        }
    }

    pub fn into_file(self) -> Result<File> {
        match self {
            Self::File(file) => Ok(file),
            Self::Directory(_) => Err(Error::IsADirectory),
        }
    }
}

impl File {
    #[inline]
    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        self.fs.read_at(self.ino, offset, buf)
    }

    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        self.fs.write_at(self.ino, offset, buf)
    }

    pub fn resolve_block(&self, index: usize, create: bool) -> Result<Option<u32>> {
        self.fs.resolve_block(self.ino, index, create)
    }

    pub fn truncate(&self) -> Result<()> {
        self.fs.truncate(self.ino)
    }

    pub fn stat(&self) -> Result<Stat> {
        stat(&self.fs, self.ino)
    }
}

impl Directory {
    #[inline]
    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn stat(&self) -> Result<Stat> {
        stat(&self.fs, self.ino)
    }

    pub fn find(&self, name: &str) -> Result<Option<u32>> {
        self.fs.find(self.ino, name)
    }

    pub fn add(&self, name: &str, ino: u32) -> Result<()> {
        self.fs.add(self.ino, name, ino)
    }

    pub fn remove(&self, name: &str) -> Result<Option<u32>> {
        self.fs.remove(self.ino, name)
    }

    pub fn iterate(&self, offset: usize) -> DirIter<'_> {
        self.fs.iterate(self.ino, offset)
    }

    /// 全部目录项，按槽序
    pub fn entries(&self) -> Result<Vec<DirItem>> {
        self.iterate(0).collect()
    }

    /// 根据文件名获取 inode
    pub fn lookup(&self, name: &str) -> Result<Node> {
        DirEntry::check_name(name)?;
        let ino = self.find(name)?.ok_or(Error::NotFound)?;
        self.fs.node(ino)
    }

    /// 在当前目录下创建空文件
    pub fn create(&self, name: &str) -> Result<File> {
        DirEntry::check_name(name)?;
        let _guard = self.fs.inode_lock(self.ino)?.write();
        // 确认没有已创建的同名项
        if self.fs.find_entry(self.ino, name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let ino = self.fs.allocate_inode()?;
        let now = self.fs.now();
        let created = self
            .fs
            .on_disk_mut(ino, |inode| {
                inode.init(InodeKind::File, Permission::file_default(), now)
            })
            .and_then(|()| self.fs.add_entry(self.ino, DirEntry::new(name, ino)?));
        if let Err(err) = created {
            self.abandon(ino, &[])?;
            return Err(err);
        }

        self.fs.sync()?;
        log::debug!("created {name:?} as inode {ino}");
        Ok(File {
            ino,
            fs: self.fs.clone(),
        })
    }

    /// 新建子目录：一个内容块（`.` 与 `..`）和一个属性块，父目录链接数加一
    pub fn mkdir(&self, name: &str) -> Result<Directory> {
        DirEntry::check_name(name)?;
        let _guard = self.fs.inode_lock(self.ino)?.write();
        if self.fs.find_entry(self.ino, name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists);
        }

        // 先取得父目录 inode 所在的缓存块，最后的链接计数更新就不会再失败
        let parent = self.fs.cache().get(inode_block(self.ino)?)?;
        let ino = self.fs.allocate_inode()?;
        let mut acquired = Vec::with_capacity(2);
        let made = self.build_dir(ino, &mut acquired).and_then(|()| {
            self.fs.add_entry(self.ino, DirEntry::new(name, ino)?)
        });
        if let Err(err) = made {
            self.abandon(ino, &acquired)?;
            return Err(err);
        }

        parent
            .lock()
            .map_mut(0, |parent: &mut DiskInode| parent.links += 1);
        drop(parent);
        self.fs.sync()?;
        log::debug!("made directory {name:?} as inode {ino}");
        Ok(Directory {
            ino,
            fs: self.fs.clone(),
        })
    }

    /// 删除只含 `.` 与 `..` 的子目录，并回收它的块与 inode
    pub fn rmdir(&self, name: &str) -> Result<()> {
        DirEntry::check_name(name)?;
        if matches!(name, "." | "..") {
            return Err(Error::InvalidName);
        }

        let _guard = self.fs.inode_lock(self.ino)?.write();
        let ino = self
            .fs
            .find_entry(self.ino, name.as_bytes())?
            .ok_or(Error::NotFound)?;
        // lost+found 的 inode 与块属于保留区
        if ino == self.ino || ino == LOST_FOUND_INO {
            return Err(Error::InvalidName);
        }
        if !self.fs.on_disk(ino, DiskInode::is_dir)? {
            return Err(Error::NotADirectory);
        }

        let _child = self.fs.inode_lock(ino)?.write();
        if !self.fs.only_dots(ino)? {
            return Err(Error::DirectoryNotEmpty);
        }

        self.fs.remove_entry(self.ino, name.as_bytes())?;
        // 子目录的 `..` 随之消失
        self.fs
            .on_disk_mut(self.ino, |parent| parent.links = parent.links.saturating_sub(1))?;
        self.reclaim(ino)?;

        self.fs.sync()?;
        log::debug!("removed directory {name:?} (inode {ino})");
        Ok(())
    }

    /// 为文件 `target` 增加一个名字
    pub fn link(&self, name: &str, target: &File) -> Result<()> {
        DirEntry::check_name(name)?;
        let _guard = self.fs.inode_lock(self.ino)?.write();
        if self.fs.find_entry(self.ino, name.as_bytes())?.is_some() {
            return Err(Error::AlreadyExists);
        }

        let _child = self.fs.inode_lock(target.ino)?.write();
        self.fs
            .add_entry(self.ino, DirEntry::new(name, target.ino)?)?;
        let now = self.fs.now();
        self.fs.on_disk_mut(target.ino, |inode| {
            inode.links += 1;
            inode.ctime = now;
        })?;

        self.fs.sync()
    }

    /// 删除文件的一个名字，链接数归零时回收
    pub fn unlink(&self, name: &str) -> Result<()> {
        DirEntry::check_name(name)?;
        let _guard = self.fs.inode_lock(self.ino)?.write();
        let ino = self
            .fs
            .find_entry(self.ino, name.as_bytes())?
            .ok_or(Error::NotFound)?;
        if self.fs.on_disk(ino, DiskInode::is_dir)? {
            return Err(Error::IsADirectory);
        }

        let _child = self.fs.inode_lock(ino)?.write();
        self.fs.remove_entry(self.ino, name.as_bytes())?;
        let now = self.fs.now();
        let links = self.fs.on_disk_mut(ino, |inode| {
            inode.links = inode.links.saturating_sub(1);
            inode.ctime = now;
            inode.links
        })?;
        if links == 0 {
            self.reclaim(ino)?;
        }

        self.fs.sync()
    }
}

impl Directory {
    /// 写出新目录的 inode 与内容块，获得的块记入 `acquired`
    fn build_dir(&self, ino: u32, acquired: &mut Vec<u32>) -> Result<()> {
        let block = self.fs.allocate_block()?;
        acquired.push(block);
        let attr_block = self.fs.allocate_block()?;
        acquired.push(attr_block);

        let mut inode = DiskInode::default();
        inode.init(InodeKind::Directory, Permission::dir_default(), self.fs.now());
        inode.size = BLOCK_SIZE as u32;
        inode.blocks = 1;
        inode.set_block(0, block);
        self.fs.write_attrs(ino, &mut inode, attr_block)?;

        let dot = DirEntry::new(".", ino)?;
        let dotdot = DirEntry::new("..", self.ino)?;
        let cache = self.fs.cache().get(block as usize)?;
        let mut cache = cache.lock();
        cache.zeroize();
        cache.map_mut(0, |entries: &mut DirBlock| {
            entries[0] = dot;
            entries[1] = dotdot;
        });
        drop(cache);

        self.fs.on_disk_mut(ino, |disk_inode| *disk_inode = inode)
    }

    /// 回收 inode 的全部块，清空其槽位并归还 inode 号
    fn reclaim(&self, ino: u32) -> Result<()> {
        self.fs.clear_inode(ino, false)?;
        self.fs.on_disk_mut(ino, |inode| *inode = DiskInode::default())?;
        self.fs.release_inode(ino)
    }

    /// 创建失败时撤销已占用的块与 inode
    fn abandon(&self, ino: u32, blocks: &[u32]) -> Result<()> {
        self.fs.release_blocks(blocks)?;
        self.fs.on_disk_mut(ino, |inode| *inode = DiskInode::default())?;
        self.fs.release_inode(ino)
    }
}

fn stat(fs: &UxFileSystem, ino: u32) -> Result<Stat> {
    fs.on_disk(ino, |inode| {
        Some(Stat {
            ino,
            kind: inode.kind()?,
            perms: inode.permissions(),
            links: inode.links,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            blocks: inode.blocks,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        })
    })?
    .ok_or(Error::InvalidInode(ino))
}
