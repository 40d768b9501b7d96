//! 测试辅助: 内存模拟 Flash、分区内容与事件记录器

#![allow(dead_code)]

use core::ops::Range;

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

use crate::config::{LFS_BLOCK_SIZE, PARTITION_TABLE_LEN, PARTITION_TABLE_OFFSET};
use crate::fs::{build_image, ImageEntry, PartitionTable, ProcessError, Reporter};
use crate::sync::{with_flash, SharedFlash};

/// 测试分区使用的块数 (128KB)
pub const TEST_BLOCKS: usize = 32;

/// 测试用分区布局
pub const TEST_PARTITIONS_CSV: &str = "\
# Name, Type, SubType, Offset, Size, Flags
nvs, data, nvs, 0x9000, 0x6000,
factory, app, factory, 0x10000, 64K,
partitions_a, data, littlefs, , 128K,
partitions_b, data, littlefs, , 128K,
";

/// 内存模拟的 NOR Flash
///
/// 写入只能把位从 1 清为 0，擦除以 4KB 扇区为单位恢复为 0xFF。
/// `fail_reads_in` 之后，与给定地址范围重叠的读取都返回错误。
pub struct RamFlash {
    data: Vec<u8>,
    bad_reads: Option<Range<u32>>,
}

impl RamFlash {
    pub const WORD: u32 = 4;
    pub const SECTOR: u32 = 4096;

    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            bad_reads: None,
        }
    }

    /// 让 `range` 内的读取失败 (模拟坏块)
    pub fn fail_reads_in(&mut self, range: Range<u32>) {
        self.bad_reads = Some(range);
    }

    fn range(&self, offset: u32, len: usize, align: u32) -> Result<core::ops::Range<usize>, NorFlashErrorKind> {
        if offset % align != 0 || len % align as usize != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl ErrorType for RamFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len(), 1)?;
        if let Some(bad) = &self.bad_reads {
            if (range.start as u32) < bad.end && bad.start < range.end as u32 {
                return Err(NorFlashErrorKind::Other);
            }
        }
        bytes.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = Self::WORD as usize;
    const ERASE_SIZE: usize = Self::SECTOR as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if to < from {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        let range = self.range(from, (to - from) as usize, Self::SECTOR)?;
        self.data[range].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len(), Self::WORD)?;
        for (cell, byte) in self.data[range].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// 按 CSV 布局生成带分区表的空白 Flash
pub fn flash_with_table(csv: &str) -> (RamFlash, PartitionTable) {
    let table = PartitionTable::from_csv(csv).unwrap();
    let end = table
        .partitions()
        .iter()
        .map(|p| p.end_offset() as usize)
        .max()
        .unwrap_or(0);
    let table_end = PARTITION_TABLE_OFFSET as usize + PARTITION_TABLE_LEN;

    let mut flash = RamFlash::new(end.max(table_end));
    let mut image = [0u8; PARTITION_TABLE_LEN];
    table.to_flash_data(&mut image).unwrap();
    flash.write(PARTITION_TABLE_OFFSET, &image).unwrap();

    (flash, table)
}

/// 为 `label` 分区生成镜像并写入 Flash
pub fn populate(flash: &SharedFlash<RamFlash>, table: &PartitionTable, label: &str, entries: &[ImageEntry<'_>]) {
    let mut buf = vec![0u8; TEST_BLOCKS * LFS_BLOCK_SIZE];
    let image = build_image::<TEST_BLOCKS>(table, label, entries, &mut buf).unwrap();
    with_flash(flash, |f| {
        f.erase(image.offset, image.offset + image.len as u32).unwrap();
        f.write(image.offset, &buf[..image.len]).unwrap();
    });
}

/// 分区内前两个块 (超级块所在的元数据对) 之后的地址范围
pub fn data_blocks(table: &PartitionTable, label: &str) -> Range<u32> {
    let offset = table.find_by_label(label).unwrap().offset;
    let start = offset + 2 * LFS_BLOCK_SIZE as u32;
    start..offset + (TEST_BLOCKS * LFS_BLOCK_SIZE) as u32
}

/// 记录到的处理事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Listing(String),
    Entry(String),
    Reading(String),
    Line(String),
    Error(ProcessError, String),
}

/// 记录全部事件的 Reporter
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    /// 从 `Listing(mount_point)` 开始到下一个 `Listing` 之前的事件
    pub fn events_for(&self, mount_point: &str) -> Vec<Event> {
        let start = self
            .events
            .iter()
            .position(|e| matches!(e, Event::Listing(m) if m == mount_point));
        let Some(start) = start else {
            return Vec::new();
        };
        let len = self.events[start + 1..]
            .iter()
            .position(|e| matches!(e, Event::Listing(_)))
            .unwrap_or(self.events.len() - start - 1);
        self.events[start..start + 1 + len].to_vec()
    }

    pub fn entries(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Entry(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Line(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for Recorder {
    fn listing(&mut self, mount_point: &str) {
        self.events.push(Event::Listing(mount_point.into()));
    }

    fn entry(&mut self, name: &str) {
        self.events.push(Event::Entry(name.into()));
    }

    fn reading(&mut self, path: &str) {
        self.events.push(Event::Reading(path.into()));
    }

    fn line(&mut self, text: &[u8]) {
        self.events.push(Event::Line(String::from_utf8_lossy(text).into_owned()));
    }

    fn error(&mut self, error: ProcessError, subject: &str) {
        self.events.push(Event::Error(error, subject.into()));
    }
}
