//! 文本文件读取
//!
//! 逐行读取文件并输出。行缓冲区固定为 `LINE_BUFFER_SIZE` 字节，
//! 与 C 的 `fgets` 相同地保留 1 字节: 超过 `LINE_BUFFER_SIZE - 1` 字节的行
//! 会被拆成多段输出，各段拼接后等于原始行。

use littlefs2::{driver::Storage, io, path::PathBuf};

use super::mount::MountTable;
use super::report::{ProcessError, Reporter};
use crate::config::{LFS_PATH_MAX, LINE_BUFFER_SIZE};

/// 单次从文件读取的字节数
const READ_CHUNK: usize = 256;

/// 按 `fgets` 语义切分的行读取器
pub struct LineReader<'r, R> {
    inner: &'r R,
    buf: [u8; READ_CHUNK],
    pos: usize,
    len: usize,
    eof: bool,
}

impl<'r, R: io::Read> LineReader<'r, R> {
    pub fn new(inner: &'r R) -> Self {
        Self {
            inner,
            buf: [0; READ_CHUNK],
            pos: 0,
            len: 0,
            eof: false,
        }
    }

    /// 读取下一段
    ///
    /// 一段在 `\n` 之后、文件结尾或满 `LINE_BUFFER_SIZE - 1` 字节时结束，
    /// 结尾的 `\n` 保留在返回值中。文件读完返回 `None`。
    pub fn next_line<'b>(&mut self, line: &'b mut [u8; LINE_BUFFER_SIZE]) -> io::Result<Option<&'b [u8]>> {
        let cap = LINE_BUFFER_SIZE - 1;
        let mut n = 0;

        while n < cap {
            if self.pos == self.len && !self.fill()? {
                break;
            }
            let byte = self.buf[self.pos];
            self.pos += 1;
            line[n] = byte;
            n += 1;
            if byte == b'\n' {
                break;
            }
        }

        Ok(if n == 0 { None } else { Some(&line[..n]) })
    }

    fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let n = self.inner.read(&mut self.buf)?;
        self.pos = 0;
        self.len = n;
        self.eof = n == 0;
        Ok(n > 0)
    }
}

/// 去掉末尾的一个 `\n` (不处理 `\r` 和其它空白)
pub fn strip_newline(chunk: &[u8]) -> &[u8] {
    match chunk.split_last() {
        Some((b'\n', rest)) => rest,
        _ => chunk,
    }
}

/// 读取文本文件并逐行输出
///
/// `path` 是包含挂载点的完整路径。打开失败时报告 `FileOpenFailed` 并返回；
/// 文件句柄在闭包结束时关闭，任何返回路径都不会泄漏。
pub fn read_and_log<S, R, const N: usize>(mounts: &MountTable<'_, S, N>, path: &str, reporter: &mut R)
where
    S: Storage,
    R: Reporter,
{
    let Some((fs, rel)) = mounts.resolve(path) else {
        reporter.error(ProcessError::FileOpenFailed, path);
        return;
    };
    // PathBuf::from 对超长路径会 panic
    if rel.is_empty() || rel.len() > LFS_PATH_MAX {
        reporter.error(ProcessError::FileOpenFailed, path);
        return;
    }

    let mut opened = false;
    let result = fs.open_file_and_then(&PathBuf::from(rel), |file| {
        opened = true;
        reporter.reading(path);

        let mut lines = LineReader::new(file);
        let mut line = [0u8; LINE_BUFFER_SIZE];
        while let Some(chunk) = lines.next_line(&mut line)? {
            reporter.line(strip_newline(chunk));
        }
        Ok(())
    });

    if result.is_err() {
        let error = if opened {
            ProcessError::FileReadFailed
        } else {
            ProcessError::FileOpenFailed
        };
        reporter.error(error, path);
    }
}
