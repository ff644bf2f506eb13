//! 下载相关的数据模型定义。
//!
//! 包含下载请求、分段计划、运行状态、进度样本、事件与最终结果等核心数据结构。

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use super::error::DownloadError;

/// 一次下载的输入：下载地址、保存路径与分段数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    pub workers: usize,
}

impl DownloadRequest {
    pub fn new(
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        workers: usize,
    ) -> Result<Self, DownloadError> {
        let request = Self {
            url: url.into(),
            destination: destination.into(),
            workers,
        };
        request.validate()?;
        Ok(request)
    }

    pub(crate) fn validate(&self) -> Result<(), DownloadError> {
        if self.url.trim().is_empty() {
            return Err(DownloadError::InvalidRequest("url is empty".to_string()));
        }
        if self.workers == 0 {
            return Err(DownloadError::InvalidRequest(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(DownloadError::InvalidRequest(
                "destination path is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// 分配给一个下载线程的连续字节区间。
///
/// 只有空文件的唯一分段 `len` 为 0。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub start: u64,
    pub len: u64,
    pub temp_path: PathBuf,
}

impl Segment {
    /// 闭区间结束偏移；空分段为 `None`。
    pub fn end(&self) -> Option<u64> {
        (self.len > 0).then(|| self.start + self.len - 1)
    }

    /// `Range` 请求头的值，例如 `bytes=0-249999`。
    pub fn range_header(&self) -> Option<String> {
        self.end().map(|end| format!("bytes={}-{}", self.start, end))
    }
}

/// `<destination>.part<index>`
pub fn part_path(destination: &Path, index: usize) -> PathBuf {
    let mut raw: OsString = destination.as_os_str().to_owned();
    raw.push(format!(".part{index}"));
    PathBuf::from(raw)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub total_size: u64,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Probing,
    Downloading,
    Merging,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub(crate) fn can_enter(self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Probing, Downloading)
                | (Probing, Failed)
                | (Probing, Cancelled)
                | (Downloading, Merging)
                | (Downloading, Failed)
                | (Downloading, Cancelled)
                | (Merging, Completed)
                | (Merging, Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Probing => "probing",
            Self::Downloading => "downloading",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// 单次下载共享的停止标志。
///
/// 由调用方（`request_stop`）或失败的下载线程设置，设置后不会清除。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 幂等，可在任意线程任意时刻调用。
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub percent: u8,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub bytes_per_second: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        };
        f.write_str(name)
    }
}

/// 下载过程中引擎上报给调用方的事件。
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Progress(ProgressSample),
    Log { message: String, level: LogLevel },
    Speed(f64),
    Finished { success: bool, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadReport {
    pub total_size: u64,
    pub segments: usize,
    pub suggested_filename: Option<String>,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum DownloadOutcome {
    Completed(DownloadReport),
    Failed(DownloadError),
    Cancelled,
}

impl DownloadOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Completed(_) => RunStatus::Completed,
            Self::Failed(_) => RunStatus::Failed,
            Self::Cancelled => RunStatus::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_index_suffix() {
        let p = part_path(Path::new("/tmp/out/tool.zip"), 3);
        assert_eq!(p, PathBuf::from("/tmp/out/tool.zip.part3"));
    }

    #[test]
    fn zero_length_segment_has_no_range() {
        let seg = Segment {
            index: 0,
            start: 0,
            len: 0,
            temp_path: PathBuf::from("x.part0"),
        };
        assert_eq!(seg.len, 0);
        assert_eq!(seg.end(), None);
        assert_eq!(seg.range_header(), None);
    }

    #[test]
    fn range_header_is_inclusive() {
        let seg = Segment {
            index: 1,
            start: 250_000,
            len: 250_000,
            temp_path: PathBuf::from("x.part1"),
        };
        assert_eq!(seg.range_header().as_deref(), Some("bytes=250000-499999"));
    }

    #[test]
    fn request_rejects_zero_workers() {
        let err = DownloadRequest::new("https://example.com/a", "a", 0).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidRequest(_)));
    }

    #[test]
    fn cancel_token_is_shared_and_sticky() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.request_stop();
        clone.request_stop();
        assert!(token.is_cancelled());
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        for terminal in [RunStatus::Completed, RunStatus::Failed, RunStatus::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_enter(RunStatus::Downloading));
        }
        assert!(RunStatus::Probing.can_enter(RunStatus::Downloading));
        assert!(!RunStatus::Probing.can_enter(RunStatus::Merging));
    }
}
