//! ESP32 分区表支持
//!
//! 解析和管理 ESP32 分区表，按标签定位 LittleFS 分区。
//!
//! 支持两种来源:
//! - Flash 中的二进制分区表 (`PARTITION_TABLE_OFFSET`)
//! - ESP-IDF 的 `partitions.csv` 文本 (构建工具与测试使用)

use core::fmt;

use embedded_storage::nor_flash::ReadNorFlash;

use crate::config::{PARTITION_TABLE_LEN, PARTITION_TABLE_OFFSET};

/// 分区表魔数 (ESP-IDF 格式)
const PARTITION_TABLE_MAGIC: u16 = 0xAA50;

/// 分区表最大条目数
const MAX_PARTITION_ENTRIES: usize = 95;

/// 单个分区条目大小
const PARTITION_ENTRY_SIZE: usize = 32;

/// 分区标签最大长度
pub const PARTITION_LABEL_LEN: usize = 16;

/// CSV 中未指定偏移时的起始地址 (紧跟分区表之后)
const CSV_DEFAULT_OFFSET: u32 = 0x9000;

/// 分区表错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    /// 第一个条目魔数无效 (Flash 中没有分区表)
    InvalidMagic,
    /// 条目超过上限
    TableFull,
    /// 标签超过 16 字节
    LabelTooLong,
    /// CSV 行无法解析 (行号从 1 开始)
    InvalidCsv(usize),
    /// 读取 Flash 失败
    Flash,
    /// 输出缓冲区不足
    BufferTooSmall,
}

impl PartitionError {
    /// 静态描述 (兼容 defmt 的 `{}`)
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMagic => "invalid partition table magic",
            Self::TableFull => "partition table full",
            Self::LabelTooLong => "partition label too long",
            Self::InvalidCsv(_) => "invalid partition csv",
            Self::Flash => "flash read failed",
            Self::BufferTooSmall => "buffer too small",
        }
    }
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCsv(line) => write!(f, "{} (line {})", self.as_str(), line),
            other => f.write_str(other.as_str()),
        }
    }
}

/// 分区类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    /// 应用程序分区
    App,
    /// 数据分区
    Data,
    /// 未知类型
    Unknown(u8),
}

impl From<u8> for PartitionType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::App,
            0x01 => Self::Data,
            other => Self::Unknown(other),
        }
    }
}

impl PartitionType {
    /// 转换为 u8 值
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::App => 0x00,
            Self::Data => 0x01,
            Self::Unknown(v) => *v,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "app" => Some(Self::App),
            "data" => Some(Self::Data),
            other => parse_u32(other).and_then(|v| u8::try_from(v).ok()).map(Self::from),
        }
    }
}

/// 数据分区子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSubType {
    /// OTA 数据
    Ota,
    /// PHY 初始化数据
    Phy,
    /// NVS (Non-Volatile Storage)
    Nvs,
    /// Core dump
    CoreDump,
    /// NVS 密钥
    NvsKeys,
    /// eFuse 模拟
    EFuse,
    /// 未定义/用户自定义
    Undefined,
    /// FAT 文件系统
    Fat,
    /// SPIFFS 文件系统
    Spiffs,
    /// LittleFS 文件系统
    LittleFs,
    /// 未知子类型
    Unknown(u8),
}

impl From<u8> for DataSubType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Ota,
            0x01 => Self::Phy,
            0x02 => Self::Nvs,
            0x03 => Self::CoreDump,
            0x04 => Self::NvsKeys,
            0x05 => Self::EFuse,
            0x06 => Self::Undefined,
            0x81 => Self::Fat,
            0x82 => Self::Spiffs,
            0x83 => Self::LittleFs,
            other => Self::Unknown(other),
        }
    }
}

impl DataSubType {
    /// 转换为 u8 值
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Ota => 0x00,
            Self::Phy => 0x01,
            Self::Nvs => 0x02,
            Self::CoreDump => 0x03,
            Self::NvsKeys => 0x04,
            Self::EFuse => 0x05,
            Self::Undefined => 0x06,
            Self::Fat => 0x81,
            Self::Spiffs => 0x82,
            Self::LittleFs => 0x83,
            Self::Unknown(v) => *v,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        let subtype = match s {
            "ota" => Self::Ota,
            "phy" => Self::Phy,
            "nvs" => Self::Nvs,
            "coredump" => Self::CoreDump,
            "nvs_keys" => Self::NvsKeys,
            "efuse" => Self::EFuse,
            "undefined" => Self::Undefined,
            "fat" => Self::Fat,
            "spiffs" => Self::Spiffs,
            "littlefs" => Self::LittleFs,
            other => return parse_u32(other).and_then(|v| u8::try_from(v).ok()).map(Self::from),
        };
        Some(subtype)
    }
}

/// 应用分区子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppSubType {
    /// 工厂应用
    Factory,
    /// OTA 应用 0-15
    Ota(u8),
    /// 测试应用
    Test,
    /// 未知
    Unknown(u8),
}

impl From<u8> for AppSubType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Factory,
            0x10..=0x1F => Self::Ota(value - 0x10),
            0x20 => Self::Test,
            other => Self::Unknown(other),
        }
    }
}

impl AppSubType {
    /// 转换为 u8 值
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Factory => 0x00,
            Self::Ota(n) => 0x10 + n,
            Self::Test => 0x20,
            Self::Unknown(v) => *v,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "factory" => Some(Self::Factory),
            "test" => Some(Self::Test),
            other => match other.strip_prefix("ota_") {
                Some(n) => n.parse::<u8>().ok().filter(|n| *n < 16).map(Self::Ota),
                None => parse_u32(other).and_then(|v| u8::try_from(v).ok()).map(Self::from),
            },
        }
    }
}

/// 分区标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionFlags {
    /// 分区已加密
    pub encrypted: bool,
    /// 分区只读
    pub readonly: bool,
}

impl From<u32> for PartitionFlags {
    fn from(value: u32) -> Self {
        Self {
            encrypted: (value & 0x01) != 0,
            readonly: (value & 0x02) != 0,
        }
    }
}

impl PartitionFlags {
    /// 转换为原始位
    pub fn bits(&self) -> u32 {
        (self.encrypted as u32) | ((self.readonly as u32) << 1)
    }

    /// 解析 CSV 标志列 (`encrypted:readonly`)
    fn parse(s: &str) -> Option<Self> {
        let mut flags = Self::default();
        for flag in s.split(':').map(str::trim).filter(|f| !f.is_empty()) {
            match flag {
                "encrypted" => flags.encrypted = true,
                "readonly" => flags.readonly = true,
                _ => return None,
            }
        }
        Some(flags)
    }
}

/// 单个分区描述
#[derive(Clone)]
pub struct Partition {
    /// 分区标签 (最长 16 字节，不足时 null 结尾)
    pub label: heapless::String<PARTITION_LABEL_LEN>,
    /// 分区类型
    pub partition_type: PartitionType,
    /// 子类型 (原始值)
    pub subtype: u8,
    /// 分区在 Flash 中的偏移量
    pub offset: u32,
    /// 分区大小 (字节)
    pub size: u32,
    /// 分区标志
    pub flags: PartitionFlags,
}

impl Partition {
    /// 从原始字节解析分区条目
    pub fn from_bytes(data: &[u8; PARTITION_ENTRY_SIZE]) -> Option<Self> {
        let magic = u16::from_le_bytes([data[0], data[1]]);
        if magic != PARTITION_TABLE_MAGIC {
            return None;
        }

        let partition_type = PartitionType::from(data[2]);
        let subtype = data[3];
        let offset = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let size = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);

        // 标签 (12-27 字节，null 结尾)
        let label_bytes = &data[12..28];
        let label_len = label_bytes.iter().position(|&b| b == 0).unwrap_or(PARTITION_LABEL_LEN);
        let label_str = core::str::from_utf8(&label_bytes[..label_len]).ok()?;
        let mut label = heapless::String::new();
        label.push_str(label_str).ok()?;

        let flags = PartitionFlags::from(u32::from_le_bytes([data[28], data[29], data[30], data[31]]));

        Some(Self {
            label,
            partition_type,
            subtype,
            offset,
            size,
            flags,
        })
    }

    /// 编码为 32 字节分区条目
    pub fn to_bytes(&self) -> [u8; PARTITION_ENTRY_SIZE] {
        let mut data = [0u8; PARTITION_ENTRY_SIZE];
        data[0..2].copy_from_slice(&PARTITION_TABLE_MAGIC.to_le_bytes());
        data[2] = self.partition_type.as_u8();
        data[3] = self.subtype;
        data[4..8].copy_from_slice(&self.offset.to_le_bytes());
        data[8..12].copy_from_slice(&self.size.to_le_bytes());
        let label = self.label.as_bytes();
        data[12..12 + label.len()].copy_from_slice(label);
        data[28..32].copy_from_slice(&self.flags.bits().to_le_bytes());
        data
    }

    /// 检查是否为数据分区
    pub fn is_data(&self) -> bool {
        matches!(self.partition_type, PartitionType::Data)
    }

    /// 检查是否为应用分区
    pub fn is_app(&self) -> bool {
        matches!(self.partition_type, PartitionType::App)
    }

    /// 获取数据子类型
    pub fn data_subtype(&self) -> Option<DataSubType> {
        if self.is_data() {
            Some(DataSubType::from(self.subtype))
        } else {
            None
        }
    }

    /// 获取应用子类型
    pub fn app_subtype(&self) -> Option<AppSubType> {
        if self.is_app() {
            Some(AppSubType::from(self.subtype))
        } else {
            None
        }
    }

    /// 检查是否为 LittleFS 分区
    pub fn is_littlefs(&self) -> bool {
        self.is_data() && self.subtype == DataSubType::LittleFs.as_u8()
    }

    /// 获取分区结束地址
    pub fn end_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// 计算分区包含的块数 (给定块大小)
    pub fn block_count(&self, block_size: u32) -> u32 {
        self.size / block_size
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("label", &self.label.as_str())
            .field("type", &self.partition_type)
            .field("subtype", &self.subtype)
            .field("offset", &format_args!("0x{:08X}", self.offset))
            .field("size", &format_args!("0x{:08X} ({}KB)", self.size, self.size / 1024))
            .field("flags", &self.flags)
            .finish()
    }
}

/// 分区表
pub struct PartitionTable {
    /// 分区列表
    partitions: heapless::Vec<Partition, MAX_PARTITION_ENTRIES>,
}

impl PartitionTable {
    /// 创建空分区表
    pub const fn new() -> Self {
        Self {
            partitions: heapless::Vec::new(),
        }
    }

    /// 从 Flash 读取分区表
    ///
    /// 读取 `PARTITION_TABLE_OFFSET` 处的 `PARTITION_TABLE_LEN` 字节并解析。
    pub fn read_from<F: ReadNorFlash>(flash: &mut F) -> Result<Self, PartitionError> {
        let mut data = [0u8; PARTITION_TABLE_LEN];
        flash
            .read(PARTITION_TABLE_OFFSET, &mut data)
            .map_err(|_| PartitionError::Flash)?;
        Self::from_flash_data(&data)
    }

    /// 从 Flash 数据解析分区表
    ///
    /// 解析在第一个 `0xFFFF` 条目或第一个魔数不匹配的条目处停止
    /// (例如末尾的 MD5 校验条目 `0xEBEB`)。
    pub fn from_flash_data(data: &[u8]) -> Result<Self, PartitionError> {
        let mut table = Self::new();

        for chunk in data.chunks_exact(PARTITION_ENTRY_SIZE) {
            let Ok(entry_data) = <&[u8; PARTITION_ENTRY_SIZE]>::try_from(chunk) else {
                break;
            };

            // 结束标记
            if entry_data[0] == 0xFF && entry_data[1] == 0xFF {
                break;
            }

            match Partition::from_bytes(entry_data) {
                Some(partition) => table
                    .partitions
                    .push(partition)
                    .map_err(|_| PartitionError::TableFull)?,
                None => break,
            }
        }

        if table.partitions.is_empty() {
            Err(PartitionError::InvalidMagic)
        } else {
            Ok(table)
        }
    }

    /// 从 ESP-IDF `partitions.csv` 文本解析
    ///
    /// 列: `name, type, subtype, offset, size, flags`。
    /// 偏移为空时紧跟上一个分区 (首个分区从 0x9000 开始)；
    /// 大小支持十进制、`0x` 十六进制以及 `K` / `M` 后缀；没有大小的行被忽略。
    pub fn from_csv(csv: &str) -> Result<Self, PartitionError> {
        let mut table = Self::new();
        let mut offset = CSV_DEFAULT_OFFSET;

        for (index, raw) in csv.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(',').map(str::trim);
            let name = fields.next().unwrap_or("");
            let ptype = fields.next().unwrap_or("");
            let subtype = fields.next().unwrap_or("");
            let part_offset = fields.next().unwrap_or("");
            let size = fields.next().unwrap_or("");
            let flags = fields.next().unwrap_or("");

            if size.is_empty() {
                continue;
            }

            let invalid = PartitionError::InvalidCsv(line_no);
            let part_size = parse_size(size).ok_or(invalid)?;
            if !part_offset.is_empty() {
                offset = parse_size(part_offset).ok_or(invalid)?;
            }

            let partition_type = PartitionType::parse(ptype).ok_or(invalid)?;
            let subtype = match partition_type {
                PartitionType::App => AppSubType::parse(subtype).map(|s| s.as_u8()),
                PartitionType::Data => DataSubType::parse(subtype).map(|s| s.as_u8()),
                PartitionType::Unknown(_) => parse_u32(subtype).and_then(|v| u8::try_from(v).ok()),
            }
            .ok_or(invalid)?;
            let flags = PartitionFlags::parse(flags).ok_or(invalid)?;

            table.add_partition(name, partition_type, subtype, offset, part_size)?;
            if let Some(last) = table.partitions.last_mut() {
                last.flags = flags;
            }

            offset = offset.checked_add(part_size).ok_or(invalid)?;
        }

        Ok(table)
    }

    /// 编码为 Flash 中的二进制格式
    ///
    /// 条目之后的剩余空间填充 0xFF，返回写入的条目字节数。
    pub fn to_flash_data(&self, out: &mut [u8]) -> Result<usize, PartitionError> {
        let used = self.partitions.len() * PARTITION_ENTRY_SIZE;
        if out.len() < used {
            return Err(PartitionError::BufferTooSmall);
        }

        for (partition, chunk) in self.partitions.iter().zip(out.chunks_exact_mut(PARTITION_ENTRY_SIZE)) {
            chunk.copy_from_slice(&partition.to_bytes());
        }
        out[used..].fill(0xFF);

        Ok(used)
    }

    /// 手动添加分区
    ///
    /// # 参数
    /// - `label`: 分区标签
    /// - `partition_type`: 分区类型
    /// - `subtype`: 子类型
    /// - `offset`: Flash 偏移量
    /// - `size`: 分区大小
    pub fn add_partition(
        &mut self,
        label: &str,
        partition_type: PartitionType,
        subtype: u8,
        offset: u32,
        size: u32,
    ) -> Result<(), PartitionError> {
        let mut label_str = heapless::String::new();
        label_str.push_str(label).map_err(|_| PartitionError::LabelTooLong)?;

        self.partitions
            .push(Partition {
                label: label_str,
                partition_type,
                subtype,
                offset,
                size,
                flags: PartitionFlags::default(),
            })
            .map_err(|_| PartitionError::TableFull)
    }

    /// 按标签查找分区
    pub fn find_by_label(&self, label: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.label.as_str() == label)
    }

    /// 获取所有分区
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// 获取分区数量
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// 检查分区表是否为空
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

impl Default for PartitionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PartitionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionTable")
            .field("count", &self.partitions.len())
            .field("partitions", &self.partitions.as_slice())
            .finish()
    }
}

/// 解析 `2M` / `64K` / `0x4000` / `4096`
fn parse_size(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(mb) = s.strip_suffix('M') {
        mb.trim().parse::<u32>().ok()?.checked_mul(1024 * 1024)
    } else if let Some(kb) = s.strip_suffix('K') {
        kb.trim().parse::<u32>().ok()?.checked_mul(1024)
    } else {
        parse_u32(s)
    }
}

fn parse_u32(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse::<u32>().ok(),
    }
}
