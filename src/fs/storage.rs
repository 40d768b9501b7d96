//! Flash 存储抽象层
//!
//! 把 SPI Flash 上的一个分区适配为 littlefs2 所需的块设备接口。
//! 底层设备只需实现 `embedded_storage::nor_flash::NorFlash`:
//! 设备上是 `esp_storage::FlashStorage`，测试中是内存模拟 Flash。

use core::fmt;

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};
use littlefs2::{consts, driver::Storage, io};

use crate::config::{LFS_BLOCK_SIZE, LFS_PROG_SIZE, LFS_READ_SIZE};
use crate::log_debug;
use crate::sync::{with_flash, SharedFlash};

/// 存储操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// 读取失败
    ReadError,
    /// 写入失败
    WriteError,
    /// 擦除失败
    EraseError,
    /// 地址越界
    OutOfBounds,
    /// 对齐错误
    AlignmentError,
}

impl StorageError {
    /// 静态描述
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReadError => "Flash read error",
            Self::WriteError => "Flash write error",
            Self::EraseError => "Flash erase error",
            Self::OutOfBounds => "Address out of bounds",
            Self::AlignmentError => "Address alignment error",
        }
    }

    /// 把 NorFlash 错误归类，无法细分时使用 `fallback`
    fn from_flash<E: NorFlashError>(err: E, fallback: Self) -> Self {
        match err.kind() {
            NorFlashErrorKind::NotAligned => Self::AlignmentError,
            NorFlashErrorKind::OutOfBounds => Self::OutOfBounds,
            _ => fallback,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分区存储适配器
///
/// `BLOCKS` 是 LittleFS 使用的块数 (littlefs2 0.4 要求编译期常量)，
/// 分区可以更大，超出部分不会被访问。
pub struct PartitionStorage<'f, F, const BLOCKS: usize> {
    /// 共享 Flash 设备
    flash: &'f SharedFlash<F>,
    /// 分区起始偏移
    offset: u32,
    /// 最近一次底层错误
    last_error: Option<StorageError>,
}

impl<'f, F, const BLOCKS: usize> PartitionStorage<'f, F, BLOCKS> {
    /// 文件系统占用的字节数
    pub const SIZE: usize = BLOCKS * LFS_BLOCK_SIZE;

    /// 创建适配器
    pub const fn new(flash: &'f SharedFlash<F>, offset: u32) -> Self {
        Self {
            flash,
            offset,
            last_error: None,
        }
    }

    /// 分区起始偏移
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// 最近一次底层错误 (littlefs 只能看到通用 IO 错误)
    pub fn last_error(&self) -> Option<StorageError> {
        self.last_error
    }

    /// 把分区内偏移转换为 Flash 绝对地址
    ///
    /// 区间末端也必须落在 32 位地址空间内。
    fn address(&self, off: usize, len: usize) -> Result<u32, StorageError> {
        let end = off.checked_add(len).ok_or(StorageError::OutOfBounds)?;
        if end > Self::SIZE {
            return Err(StorageError::OutOfBounds);
        }
        let start = u32::try_from(off)
            .ok()
            .and_then(|off| self.offset.checked_add(off))
            .ok_or(StorageError::OutOfBounds)?;
        u32::try_from(len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .ok_or(StorageError::OutOfBounds)?;
        Ok(start)
    }

    fn fail(&mut self, err: StorageError) -> io::Error {
        log_debug!("partition @0x{:x}: {}", self.offset, err.as_str());
        self.last_error = Some(err);
        io::Error::Io
    }
}

impl<'f, F: NorFlash, const BLOCKS: usize> Storage for PartitionStorage<'f, F, BLOCKS> {
    const READ_SIZE: usize = LFS_READ_SIZE;
    const WRITE_SIZE: usize = LFS_PROG_SIZE;
    const BLOCK_SIZE: usize = LFS_BLOCK_SIZE;
    const BLOCK_COUNT: usize = BLOCKS;

    type CACHE_SIZE = consts::U512;
    type LOOKAHEAD_SIZE = consts::U2;

    fn read(&mut self, off: usize, buf: &mut [u8]) -> io::Result<usize> {
        let addr = self.address(off, buf.len()).map_err(|e| self.fail(e))?;
        let result = with_flash(self.flash, |flash| flash.read(addr, buf));
        result.map_err(|e| self.fail(StorageError::from_flash(e, StorageError::ReadError)))?;
        Ok(buf.len())
    }

    fn write(&mut self, off: usize, data: &[u8]) -> io::Result<usize> {
        let addr = self.address(off, data.len()).map_err(|e| self.fail(e))?;
        let result = with_flash(self.flash, |flash| flash.write(addr, data));
        result.map_err(|e| self.fail(StorageError::from_flash(e, StorageError::WriteError)))?;
        Ok(data.len())
    }

    fn erase(&mut self, off: usize, len: usize) -> io::Result<usize> {
        let from = self.address(off, len).map_err(|e| self.fail(e))?;
        // address() 已保证 from + len 不溢出
        let to = from.wrapping_add(len as u32);
        let result = with_flash(self.flash, |flash| flash.erase(from, to));
        result.map_err(|e| self.fail(StorageError::from_flash(e, StorageError::EraseError)))?;
        Ok(len)
    }
}
