//! 文件大小探测（HEAD 请求，仅获取元数据）。

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderMap};
use tracing::debug;

use super::error::DownloadError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub total_size: u64,
    pub suggested_filename: Option<String>,
}

/// 通过 HEAD 请求获取文件大小（不下载内容）。
///
/// 重定向按客户端默认策略跟随；`Content-Length` 缺失或无法解析时返回
/// [`DownloadError::SizeUnavailable`]。
pub fn probe(client: &Client, url: &str, timeout: Duration) -> Result<ProbeResult, DownloadError> {
    debug!(target: "probe", %url, timeout_secs = timeout.as_secs(), "HEAD");

    let resp = client
        .head(url)
        .timeout(timeout)
        .send()
        .map_err(|e| DownloadError::network(url, e))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    let headers = resp.headers();
    let total_size = parse_content_length(headers).ok_or(DownloadError::SizeUnavailable)?;
    let suggested_filename = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition);

    debug!(
        target: "probe",
        total_size,
        final_url = %resp.url(),
        filename = ?suggested_filename,
        "probe ok"
    );

    Ok(ProbeResult {
        total_size,
        suggested_filename,
    })
}

pub(crate) fn parse_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// `attachment; filename="tool.zip"` -> `tool.zip`
pub(crate) fn filename_from_disposition(value: &str) -> Option<String> {
    // 仅做 ASCII 小写，保证字节偏移不变
    let lower = value.to_ascii_lowercase();
    let pos = lower.find("filename=")?;
    let raw = value[pos + "filename=".len()..].split(';').next()?;
    let name = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
