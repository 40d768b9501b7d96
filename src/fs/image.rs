//! LittleFS 镜像生成
//!
//! 在内存缓冲区中为分区表里的某个分区生成 LittleFS 镜像 (4096 字节块，256 字节页)。
//! 镜像烧录到 `Image::offset` 处后，`mount` 可以直接挂载而不需要格式化。

use core::fmt;

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};
use littlefs2::{fs::Filesystem, path::PathBuf};

use super::partition::PartitionTable;
use super::storage::PartitionStorage;
use crate::config::{LFS_BLOCK_SIZE, LFS_PATH_MAX};
use crate::log_info;
use crate::sync::shared_flash;

/// 镜像中的一个条目，按给定顺序创建
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEntry<'a> {
    /// 文件 (路径, 内容)
    File(&'a str, &'a [u8]),
    /// 目录，必须先于其中的文件出现
    Dir(&'a str),
}

impl<'a> ImageEntry<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Self::File(name, _) | Self::Dir(name) => *name,
        }
    }
}

/// 镜像生成错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// 分区表中没有该标签的数据分区
    PartitionNotFound,
    /// 分区尺寸或对齐不满足文件系统配置
    InvalidSize,
    /// 输出缓冲区小于文件系统
    BufferTooSmall,
    /// 条目名称为空或超过 LittleFS 路径上限
    InvalidName,
    /// 格式化或写入失败 (通常是空间不足)
    Filesystem,
}

impl ImageError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PartitionNotFound => "partition not found",
            Self::InvalidSize => "invalid partition size",
            Self::BufferTooSmall => "image buffer too small",
            Self::InvalidName => "invalid entry name",
            Self::Filesystem => "filesystem error",
        }
    }
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 生成结果: 镜像应烧录的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Image {
    /// 分区在 Flash 中的偏移
    pub offset: u32,
    /// 镜像长度 (缓冲区前 `len` 字节)
    pub len: usize,
}

/// 把缓冲区当作从 `base` 开始的一段 NOR Flash
struct BufferFlash<'b> {
    base: u32,
    data: &'b mut [u8],
}

impl BufferFlash<'_> {
    fn range(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>, NorFlashErrorKind> {
        let start = addr.checked_sub(self.base).ok_or(NorFlashErrorKind::OutOfBounds)? as usize;
        let end = start.checked_add(len).ok_or(NorFlashErrorKind::OutOfBounds)?;
        if end > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl ErrorType for BufferFlash<'_> {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for BufferFlash<'_> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for BufferFlash<'_> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = LFS_BLOCK_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let len = to.checked_sub(from).ok_or(NorFlashErrorKind::OutOfBounds)? as usize;
        let range = self.range(from, len)?;
        self.data[range].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        for (cell, byte) in self.data[range].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// 为 `label` 分区生成 LittleFS 镜像
///
/// 镜像写入 `out` 的前 `BLOCKS * LFS_BLOCK_SIZE` 字节，其余部分不变。
/// 分区可以大于文件系统，与挂载时的规则一致。
pub fn build_image<const BLOCKS: usize>(
    table: &PartitionTable,
    label: &str,
    entries: &[ImageEntry<'_>],
    out: &mut [u8],
) -> Result<Image, ImageError> {
    let partition = table
        .find_by_label(label)
        .filter(|p| p.is_data())
        .ok_or(ImageError::PartitionNotFound)?;

    let len = BLOCKS * LFS_BLOCK_SIZE;
    if (partition.size as usize) < len || partition.offset as usize % LFS_BLOCK_SIZE != 0 {
        return Err(ImageError::InvalidSize);
    }
    // PathBuf::from 对超长路径会 panic
    if entries
        .iter()
        .any(|e| e.name().is_empty() || e.name().len() > LFS_PATH_MAX)
    {
        return Err(ImageError::InvalidName);
    }

    let data = out.get_mut(..len).ok_or(ImageError::BufferTooSmall)?;
    data.fill(0xFF);

    let flash = shared_flash(BufferFlash {
        base: partition.offset,
        data,
    });
    let mut storage = PartitionStorage::<_, BLOCKS>::new(&flash, partition.offset);

    Filesystem::format(&mut storage).map_err(|_| ImageError::Filesystem)?;
    Filesystem::mount_and_then(&mut storage, |fs| {
        for entry in entries {
            match *entry {
                ImageEntry::Dir(name) => fs.create_dir(&PathBuf::from(name))?,
                ImageEntry::File(name, contents) => fs.write(&PathBuf::from(name), contents)?,
            }
        }
        Ok(())
    })
    .map_err(|_| ImageError::Filesystem)?;

    log_info!(
        "Built LittleFS image for {}: {} entries, {} bytes at 0x{:x}",
        label,
        entries.len(),
        len,
        partition.offset
    );

    Ok(Image {
        offset: partition.offset,
        len,
    })
}
