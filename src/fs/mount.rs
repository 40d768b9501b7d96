//! 分区挂载与挂载表
//!
//! 按标签在分区表中查找分区，挂载其上的 LittleFS (无有效镜像时先格式化)，
//! 并登记到 `MountTable`。挂载表由顶层上下文持有并按引用传递，
//! 挂载后的文件系统在整个运行期间保持有效，不会卸载。

use core::fmt;

use embedded_storage::nor_flash::NorFlash;
use heapless::{String, Vec};
use littlefs2::{
    driver::Storage,
    fs::{Allocation, Filesystem},
};

use super::partition::{PartitionTable, PARTITION_LABEL_LEN};
use super::storage::PartitionStorage;
use crate::config::{LFS_BLOCK_SIZE, MOUNT_POINT_LEN};
use crate::sync::SharedFlash;
use crate::{log_error, log_info, log_warn};

/// 驱动层错误，携带错误名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// 挂载点已被占用
    InvalidState,
    /// 分区尺寸或对齐不满足文件系统配置
    InvalidSize,
    /// 标签或挂载点格式无效
    InvalidArg,
    /// 挂载表已满
    NoMem,
}

impl DriverError {
    /// 错误名 (与 ESP-IDF `esp_err_to_name` 一致)
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InvalidState => "ESP_ERR_INVALID_STATE",
            Self::InvalidSize => "ESP_ERR_INVALID_SIZE",
            Self::InvalidArg => "ESP_ERR_INVALID_ARG",
            Self::NoMem => "ESP_ERR_NO_MEM",
        }
    }
}

/// 挂载错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountError {
    /// 挂载失败 (格式化后仍失败，或格式化本身失败)
    MountOrFormatFailed,
    /// 分区表中没有该标签的数据分区
    PartitionNotFound,
    /// 其它驱动层错误
    OtherDriverError(DriverError),
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MountOrFormatFailed => write!(f, "Failed to mount or format filesystem"),
            Self::PartitionNotFound => write!(f, "Failed to find LittleFS partition"),
            Self::OtherDriverError(e) => write!(f, "Failed to initialize LittleFS ({})", e.name()),
        }
    }
}

impl From<DriverError> for MountError {
    fn from(e: DriverError) -> Self {
        Self::OtherDriverError(e)
    }
}

/// 分区描述: 标签 + 挂载点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    /// 分区表中的标签
    pub label: &'static str,
    /// 挂载路径
    pub mount_point: &'static str,
}

impl PartitionDescriptor {
    pub const fn new(label: &'static str, mount_point: &'static str) -> Self {
        Self { label, mount_point }
    }
}

/// 分区容量 (字节)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub total: usize,
    pub used: usize,
}

/// 单个分区的挂载资源
///
/// littlefs2 的文件系统实例借用存储适配器和缓存区，
/// 因此它们需要放在比挂载表活得更久的地方 (固件中是 main 的局部变量)。
pub struct MountSlot<'f, F: NorFlash, const BLOCKS: usize> {
    storage: Option<PartitionStorage<'f, F, BLOCKS>>,
    alloc: Allocation<PartitionStorage<'f, F, BLOCKS>>,
}

impl<'f, F: NorFlash, const BLOCKS: usize> MountSlot<'f, F, BLOCKS> {
    pub fn new() -> Self {
        Self {
            storage: None,
            alloc: Filesystem::allocate(),
        }
    }
}

impl<'f, F: NorFlash, const BLOCKS: usize> Default for MountSlot<'f, F, BLOCKS> {
    fn default() -> Self {
        Self::new()
    }
}

/// 挂载表条目
pub struct MountedFs<'a, S: Storage> {
    label: String<PARTITION_LABEL_LEN>,
    mount_point: String<MOUNT_POINT_LEN>,
    fs: Filesystem<'a, S>,
}

impl<'a, S: Storage> MountedFs<'a, S> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn fs(&self) -> &Filesystem<'a, S> {
        &self.fs
    }
}

/// 挂载表: 挂载点 -> 文件系统
pub struct MountTable<'a, S: Storage, const N: usize> {
    mounts: Vec<MountedFs<'a, S>, N>,
}

impl<'a, S: Storage, const N: usize> MountTable<'a, S, N> {
    /// 创建空挂载表
    pub const fn new() -> Self {
        Self { mounts: Vec::new() }
    }

    /// 挂载点是否已登记
    pub fn is_mounted(&self, mount_point: &str) -> bool {
        self.find(mount_point).is_some()
    }

    /// 按挂载点查找文件系统
    pub fn get(&self, mount_point: &str) -> Option<&Filesystem<'a, S>> {
        self.find(mount_point).map(MountedFs::fs)
    }

    /// 按挂载点查找条目
    pub fn find(&self, mount_point: &str) -> Option<&MountedFs<'a, S>> {
        self.mounts.iter().find(|m| m.mount_point.as_str() == mount_point)
    }

    /// 把完整路径解析为 (文件系统, 相对路径)
    ///
    /// 只在路径分隔处匹配: `/part_ab/x` 不属于 `/part_a`。
    /// 相对路径不带前导 `/`，挂载点本身解析为空串。
    pub fn resolve<'p>(&self, path: &'p str) -> Option<(&Filesystem<'a, S>, &'p str)> {
        self.mounts.iter().find_map(|m| {
            split_mount_path(&m.mount_point, path).map(|rest| (&m.fs, rest))
        })
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.mounts.is_full()
    }

    fn insert(&mut self, entry: MountedFs<'a, S>) -> Result<(), DriverError> {
        self.mounts.push(entry).map_err(|_| DriverError::NoMem)
    }
}

impl<'a, S: Storage, const N: usize> Default for MountTable<'a, S, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// `path` 位于 `mount_point` 之下时返回去掉挂载点后的相对部分
pub fn split_mount_path<'p>(mount_point: &str, path: &'p str) -> Option<&'p str> {
    let rest = path.strip_prefix(mount_point)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix('/').map(|r| r.trim_start_matches('/'))
}

/// 挂载分区
///
/// 成功时返回容量信息；容量查询失败只记录日志并返回 `Ok(None)`，不影响挂载。
/// 失败时错误已经记录，调用方只需要决定是否继续处理该分区。
pub fn mount<'a, 'f: 'a, F, const BLOCKS: usize, const N: usize>(
    mounts: &mut MountTable<'a, PartitionStorage<'f, F, BLOCKS>, N>,
    table: &PartitionTable,
    flash: &'f SharedFlash<F>,
    slot: &'a mut MountSlot<'f, F, BLOCKS>,
    desc: PartitionDescriptor,
) -> Result<Option<Capacity>, MountError>
where
    F: NorFlash,
{
    log_info!("Initializing LittleFS for {}", desc.label);

    match attach(mounts, table, flash, slot, desc) {
        Ok(capacity) => {
            match capacity {
                Some(c) => log_info!(
                    "Partition {} size: total: {}, used: {}",
                    desc.label,
                    c.total,
                    c.used
                ),
                None => log_error!("Failed to get LittleFS partition information ({})", desc.label),
            }
            Ok(capacity)
        }
        Err(e) => {
            match e {
                MountError::MountOrFormatFailed => log_error!("Failed to mount or format filesystem"),
                MountError::PartitionNotFound => log_error!("Failed to find LittleFS partition"),
                MountError::OtherDriverError(d) => {
                    log_error!("Failed to initialize LittleFS ({})", d.name())
                }
            }
            Err(e)
        }
    }
}

fn attach<'a, 'f: 'a, F, const BLOCKS: usize, const N: usize>(
    mounts: &mut MountTable<'a, PartitionStorage<'f, F, BLOCKS>, N>,
    table: &PartitionTable,
    flash: &'f SharedFlash<F>,
    slot: &'a mut MountSlot<'f, F, BLOCKS>,
    desc: PartitionDescriptor,
) -> Result<Option<Capacity>, MountError>
where
    F: NorFlash,
{
    if mounts.is_mounted(desc.mount_point) {
        return Err(DriverError::InvalidState.into());
    }
    if mounts.is_full() {
        return Err(DriverError::NoMem.into());
    }
    let label = String::try_from(desc.label).map_err(|_| DriverError::InvalidArg)?;
    let mount_point = String::try_from(desc.mount_point).map_err(|_| DriverError::InvalidArg)?;
    if !desc.mount_point.starts_with('/') || desc.mount_point.len() < 2 || desc.mount_point.ends_with('/') {
        return Err(DriverError::InvalidArg.into());
    }

    // 与 ESP-IDF 一致: 只在数据分区中按标签查找
    let partition = table
        .find_by_label(desc.label)
        .filter(|p| p.is_data())
        .ok_or(MountError::PartitionNotFound)?;

    let required = PartitionStorage::<'f, F, BLOCKS>::SIZE;
    if (partition.size as usize) < required || partition.offset as usize % LFS_BLOCK_SIZE != 0 {
        return Err(DriverError::InvalidSize.into());
    }
    if partition.size as usize > required {
        log_warn!(
            "Partition {} is {} bytes, LittleFS uses the first {}",
            desc.label,
            partition.size,
            required
        );
    }

    let MountSlot { storage, alloc } = slot;
    if storage.is_some() {
        return Err(DriverError::InvalidState.into());
    }
    let storage = storage.insert(PartitionStorage::new(flash, partition.offset));

    if !Filesystem::is_mountable(storage) {
        log_warn!("No LittleFS image on {}, formatting", desc.label);
        Filesystem::format(storage).map_err(|_| MountError::MountOrFormatFailed)?;
    }
    let fs = Filesystem::mount(alloc, storage).map_err(|_| MountError::MountOrFormatFailed)?;

    let capacity = capacity(&fs);
    mounts.insert(MountedFs { label, mount_point, fs })?;
    log_info!("Mounted {} at {}", desc.label, desc.mount_point);

    Ok(capacity)
}

fn capacity<S: Storage>(fs: &Filesystem<'_, S>) -> Option<Capacity> {
    let total = fs.total_space();
    let available = fs.available_space().ok()?;
    Some(Capacity {
        total,
        used: total.saturating_sub(available),
    })
}
