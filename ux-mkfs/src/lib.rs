//! 宿主机上的 uxfs 工具：以文件充当块设备，并在其上格式化


use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use block_dev::{BlockDevice, DeviceError};
use ux_fs::{BLOCK_SIZE, FIRST_DATA_BLOCK, MAX_BLOCKS, Options, StatFs, UxFileSystem};

/// 能用满整个数据区的镜像大小
pub const IMAGE_SIZE: u64 = ((FIRST_DATA_BLOCK + MAX_BLOCKS) * BLOCK_SIZE) as u64;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Fs(#[from] ux_fs::Error),
}

/// 普通文件或块设备文件
#[derive(Debug)]
pub struct BlockFile {
    inner: Mutex<File>,
    num_blocks: usize,
}

impl BlockFile {
    /// 块数取自文件长度，不足一块的尾部不用
    pub fn new(mut fd: File) -> io::Result<Self> {
        // 块设备的元数据长度为 0，只能靠 seek 得到容量
        let len = fd.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner: Mutex::new(fd),
            num_blocks: len as usize / BLOCK_SIZE,
        })
    }

    /// `create` 时镜像不存在则新建，不足 [`IMAGE_SIZE`] 则补齐
    pub fn open(path: &Path, create: bool) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(path)?;
        if create && fd.metadata()?.len() < IMAGE_SIZE {
            fd.set_len(IMAGE_SIZE)?;
        }

        Self::new(fd)
    }

    fn seek_block(&self, block_id: usize) -> Result<MutexGuard<'_, File>, DeviceError> {
        if block_id >= self.num_blocks {
            return Err(DeviceError::OutOfRange { block_id });
        }
        let mut file = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(|err| {
                log::error!("seeking to block {block_id}: {err}");
                DeviceError::OutOfRange { block_id }
            })?;
        Ok(file)
    }
}

impl BlockDevice for BlockFile {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.seek_block(block_id)?.read_exact(buf).map_err(|err| {
            log::error!("reading block {block_id}: {err}");
            match err.kind() {
                ErrorKind::UnexpectedEof => DeviceError::Incomplete { block_id },
                _ => DeviceError::Read { block_id },
            }
        })
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        self.seek_block(block_id)?.write_all(buf).map_err(|err| {
            log::error!("writing block {block_id}: {err}");
            match err.kind() {
                ErrorKind::WriteZero => DeviceError::Incomplete { block_id },
                _ => DeviceError::Write { block_id },
            }
        })
    }

    fn flush(&self) -> Result<(), DeviceError> {
        let file = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        file.sync_all().map_err(|err| {
            log::error!("flushing: {err}");
            DeviceError::Flush
        })
    }
}

/// 当前时间（秒），早于纪元则为 0
pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as u32)
}

/// 格式化 `path`，再挂载一次确认结果并干净地卸载
pub fn mkfs(path: &Path, create: bool) -> Result<StatFs, Error> {
    let device: Arc<dyn BlockDevice> = Arc::new(BlockFile::open(path, create)?);
    log::info!("{}: {} blocks", path.display(), device.num_blocks());

    let options = Options {
        clock: unix_now,
        ..Options::default()
    };
    UxFileSystem::format(device.clone(), &options)?;

    let fs = UxFileSystem::open(device, options)?;
    let stat = fs.statfs();
    fs.unmount()?;

    Ok(stat)
}
