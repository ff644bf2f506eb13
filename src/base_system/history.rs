//! 下载历史记录（JSON 文件，仅保留最近若干条）。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub time: String,
    pub size: u64,
}

#[derive(Debug)]
pub struct DownloadHistory {
    path: PathBuf,
    limit: usize,
    entries: Vec<HistoryEntry>,
}

impl DownloadHistory {
    /// 文件不存在或内容损坏时从空记录开始。
    pub fn load(path: impl Into<PathBuf>, limit: usize) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Vec<HistoryEntry>>(&raw).unwrap_or_else(|e| {
                warn!(target: "history", path = %path.display(), error = %e, "history unreadable, starting fresh");
                Vec::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(target: "history", path = %path.display(), error = %e, "history unreadable, starting fresh");
                Vec::new()
            }
        };
        let mut history = Self {
            path,
            limit: limit.max(1),
            entries,
        };
        history.truncate();
        history
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// 追加一条完成记录，并只持久化最近 `limit` 条。
    pub fn record(&mut self, url: &str, size: u64) -> Result<(), HistoryError> {
        let time = timestamp(local_now())?;
        self.push(HistoryEntry {
            url: url.to_string(),
            time,
            size,
        });
        self.save()
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        self.truncate();
    }

    fn truncate(&mut self) {
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
    }

    fn save(&self) -> Result<(), HistoryError> {
        let json = serde_json::to_vec_pretty(&self.entries)?;
        write_atomic(&self.path, &json).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(target: "history", entries = self.entries.len(), "history saved");
        Ok(())
    }
}

/// 本地时间；无法确定本地时区时退回 UTC。
fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn timestamp(at: OffsetDateTime) -> Result<String, time::error::Format> {
    at.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(tmp, path)
}
