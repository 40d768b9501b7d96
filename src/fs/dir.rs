//! 目录处理
//!
//! 列出挂载点根目录的全部条目，把以 `.txt` 结尾的条目交给文本读取器。
//! 不递归子目录，也不排序: 顺序由 LittleFS 决定。

use heapless::String;
use littlefs2::{driver::Storage, path::PathBuf};

use super::mount::MountTable;
use super::reader::read_and_log;
use super::report::{ProcessError, Reporter};
use crate::config::MAX_PATH_LEN;

/// 文本文件后缀 (区分大小写)
pub const TEXT_SUFFIX: &str = ".txt";

/// 文件名是否按文本文件处理
///
/// 名称长度必须严格大于后缀长度，因此单独的 `.txt` 不算文本文件。
pub fn is_text_file(name: &str) -> bool {
    name.len() > TEXT_SUFFIX.len() && name.ends_with(TEXT_SUFFIX)
}

/// 拼接 `mount_point/name`
///
/// 超出 `MAX_PATH_LEN` 时返回 `PathTooLong`，不做截断。
pub fn join_path(mount_point: &str, name: &str) -> Result<String<MAX_PATH_LEN>, ProcessError> {
    let mut path = String::new();
    path.push_str(mount_point).map_err(|_| ProcessError::PathTooLong)?;
    path.push('/').map_err(|_| ProcessError::PathTooLong)?;
    path.push_str(name).map_err(|_| ProcessError::PathTooLong)?;
    Ok(path)
}

/// 处理一个挂载点
///
/// 目录打开失败时报告错误并直接返回，不向调用方传播。
pub fn process_partition<S, R, const N: usize>(mounts: &MountTable<'_, S, N>, mount_point: &str, reporter: &mut R)
where
    S: Storage,
    R: Reporter,
{
    reporter.listing(mount_point);

    let Some(fs) = mounts.get(mount_point) else {
        reporter.error(ProcessError::DirectoryOpenFailed, mount_point);
        return;
    };

    let mut opened = false;
    let result = fs.read_dir_and_then(&PathBuf::from("/"), |dir| {
        opened = true;
        for entry in dir {
            let entry = entry?;
            let name: &str = entry.file_name().as_ref();
            // LittleFS 会列出自身和父目录
            if name == "." || name == ".." {
                continue;
            }

            reporter.entry(name);
            if !is_text_file(name) {
                continue;
            }

            match join_path(mount_point, name) {
                Ok(path) => read_and_log(mounts, &path, reporter),
                Err(e) => reporter.error(e, name),
            }
        }
        Ok(())
    });

    if result.is_err() {
        let error = if opened {
            ProcessError::DirectoryReadFailed
        } else {
            ProcessError::DirectoryOpenFailed
        };
        reporter.error(error, mount_point);
    }
}
