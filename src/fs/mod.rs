//! 文件系统模块
//!
//! 基于 littlefs2 的双分区挂载与内容诊断:
//! - `partition`: ESP32 分区表 (二进制 / CSV)
//! - `storage`: 分区到 littlefs2 块设备的适配
//! - `mount`: 挂载与挂载表
//! - `dir`: 根目录枚举与后缀过滤
//! - `image`: 为分区生成 LittleFS 镜像
//! - `reader`: 按行读取文本文件
//! - `report`: 处理事件输出

pub mod dir;
pub mod image;
pub mod mount;
pub mod partition;
pub mod reader;
pub mod report;
pub mod storage;

pub use dir::{is_text_file, join_path, process_partition};
pub use image::{build_image, Image, ImageEntry, ImageError};
pub use mount::{mount, Capacity, DriverError, MountError, MountSlot, MountTable, MountedFs, PartitionDescriptor};
pub use partition::{AppSubType, DataSubType, Partition, PartitionError, PartitionTable, PartitionType};
pub use reader::{read_and_log, strip_newline, LineReader};
pub use report::{LogReporter, ProcessError, Reporter};
pub use storage::{PartitionStorage, StorageError};
