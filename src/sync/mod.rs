//! 同步原语模块
//!
//! 基于 embassy-sync 封装:
//! - `CriticalBlockingMutex`: 临界区阻塞互斥锁
//! - `SharedFlash`: 多个分区共享的 Flash 设备

pub mod primitives;

pub use primitives::{shared_flash, with_flash, CriticalBlockingMutex, SharedFlash};
