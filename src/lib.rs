//! dualfs - ESP32-S3 双 LittleFS 分区诊断固件库
//!
//! 本库提供以下功能:
//! - ESP32 分区表解析 (Flash 二进制 / partitions.csv)
//! - 基于 littlefs2 的分区挂载 (无有效镜像时自动格式化)
//! - 根目录枚举与 `.txt` 文件逐行输出
//! - 条件编译日志系统

#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod fs;
pub mod sync;
pub mod util;

#[cfg(test)]
mod testutil;

// ===== 重导出常用类型 =====
pub use fs::{
    LogReporter, MountError, MountSlot, MountTable, PartitionDescriptor, PartitionStorage, PartitionTable,
    ProcessError, Reporter,
};
pub use sync::{shared_flash, SharedFlash};

// ===== 版本信息 =====
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 系统配置常量
pub mod config {
    use crate::fs::PartitionDescriptor;

    /// 分区表在 Flash 中的偏移量
    pub const PARTITION_TABLE_OFFSET: u32 = 0x8000;

    /// 分区表区域长度 (ESP-IDF 固定 0xC00)
    pub const PARTITION_TABLE_LEN: usize = 0xC00;

    /// LittleFS 块大小 (与 Flash 扇区一致)
    pub const LFS_BLOCK_SIZE: usize = 4096;

    /// LittleFS 最小读取单位
    pub const LFS_READ_SIZE: usize = 256;

    /// LittleFS 最小编程单位
    pub const LFS_PROG_SIZE: usize = 256;

    /// 每个分区的 LittleFS 块数 (1MB)
    pub const PARTITION_BLOCKS: usize = 256;

    /// LittleFS 路径上限 (littlefs2 的 PATH_MAX)
    pub const LFS_PATH_MAX: usize = 255;

    /// 挂载表容量
    pub const MAX_MOUNTS: usize = 2;

    /// 挂载点最大长度
    pub const MOUNT_POINT_LEN: usize = 16;

    /// 完整路径缓冲区大小
    pub const MAX_PATH_LEN: usize = 512;

    /// 行缓冲区大小 (含 1 字节保留，与 fgets 一致)
    pub const LINE_BUFFER_SIZE: usize = 128;

    /// 分区 A
    pub const PARTITION_A: PartitionDescriptor = PartitionDescriptor::new("partitions_a", "/part_a");

    /// 分区 B
    pub const PARTITION_B: PartitionDescriptor = PartitionDescriptor::new("partitions_b", "/part_b");

    /// 按顺序挂载并处理的分区
    pub const DEMO_PARTITIONS: [PartitionDescriptor; MAX_MOUNTS] = [PARTITION_A, PARTITION_B];

    /// 启动延时 (等待 USB 串口监视器连接)
    pub const STARTUP_DELAY_MS: u64 = 5000;

    /// 空闲循环周期
    pub const IDLE_PERIOD_MS: u64 = 1000;

    /// 演示用分区布局 (与烧录的分区表一致)
    pub const DEMO_PARTITIONS_CSV: &str = include_str!("../partitions.csv");
}
