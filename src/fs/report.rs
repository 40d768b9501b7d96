//! 处理事件输出
//!
//! 目录处理器和文本读取器通过 `Reporter` 输出它们观察到的内容，
//! 固件使用 `LogReporter` 写入日志，测试使用记录器断言事件序列。

use core::fmt;

use crate::{log_error, log_info};

/// 目录/文件处理错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// 目录无法打开 (挂载点不存在或驱动报错)
    DirectoryOpenFailed,
    /// 枚举过程中出错
    DirectoryReadFailed,
    /// 文件无法打开
    FileOpenFailed,
    /// 读取过程中出错
    FileReadFailed,
    /// 完整路径超出路径缓冲区
    PathTooLong,
}

impl ProcessError {
    /// 静态描述 (兼容 defmt 的 `{}`)
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DirectoryOpenFailed => "Failed to open directory",
            Self::DirectoryReadFailed => "Failed to read directory",
            Self::FileOpenFailed => "Failed to open file for reading",
            Self::FileReadFailed => "Failed to read file",
            Self::PathTooLong => "Path too long",
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 处理事件接收者
pub trait Reporter {
    /// 开始列出挂载点
    fn listing(&mut self, mount_point: &str);

    /// 发现一个目录项 (无论是否为文本文件)
    fn entry(&mut self, name: &str);

    /// 文件打开成功，即将输出内容
    fn reading(&mut self, path: &str);

    /// 一行 (或超长行的一段) 内容，已去掉末尾换行
    fn line(&mut self, text: &[u8]);

    /// 处理错误，`subject` 是出错的路径或名称
    fn error(&mut self, error: ProcessError, subject: &str);
}

/// 写入日志的 Reporter
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn listing(&mut self, mount_point: &str) {
        log_info!("Listing files in {}", mount_point);
    }

    fn entry(&mut self, name: &str) {
        log_info!("Found file: {}", name);
    }

    fn reading(&mut self, path: &str) {
        log_info!("Reading content of {}:", path);
    }

    fn line(&mut self, text: &[u8]) {
        match core::str::from_utf8(text) {
            Ok(s) => log_info!("  {}", s),
            Err(e) => {
                // 超长行按字节切分时可能截断多字节字符
                let valid = core::str::from_utf8(&text[..e.valid_up_to()]).unwrap_or("");
                log_info!("  {} <{} bytes not UTF-8>", valid, text.len() - e.valid_up_to());
            }
        }
    }

    fn error(&mut self, error: ProcessError, subject: &str) {
        log_error!("{}: {}", error.as_str(), subject);
    }
}
