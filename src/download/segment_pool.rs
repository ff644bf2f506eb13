//! 分段下载工作池。
//!
//! 每个分段一个线程，同时启动；线程把字节增量与结束状态通过 channel
//! 发回协调线程，自身不触碰任何共享计数器。

use std::fs::File;
use std::io::{Read, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as channel;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use tracing::{debug, warn};

use super::error::DownloadError;
use super::models::{CancelToken, Segment};

pub(crate) const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug)]
pub(crate) enum SegmentOutcome {
    Completed,
    /// 检测到停止标志后提前退出
    Stopped,
    Failed(DownloadError),
}

#[derive(Debug)]
pub(crate) enum SegmentEvent {
    Wrote { bytes: u64 },
    Finished { index: usize, outcome: SegmentOutcome },
}

pub(crate) struct SegmentPool {
    rx_evt: channel::Receiver<SegmentEvent>,
    handles: Vec<(usize, JoinHandle<()>)>,
}

impl SegmentPool {
    /// 每个分段启动一个线程，全部同时开始。
    ///
    /// 线程创建失败时设置停止标志、等待已启动的线程结束，再返回错误。
    pub(crate) fn spawn(
        client: &Client,
        url: &str,
        segments: &[Segment],
        cancel: &CancelToken,
        chunk_size: usize,
    ) -> Result<Self, DownloadError> {
        let (tx_evt, rx_evt) = channel::unbounded::<SegmentEvent>();
        let mut handles = Vec::with_capacity(segments.len());

        for segment in segments {
            let index = segment.index;
            let worker_client = client.clone();
            let worker_url = url.to_string();
            let worker_segment = segment.clone();
            let worker_cancel = cancel.clone();
            let worker_tx = tx_evt.clone();

            let spawned = thread::Builder::new()
                .name(format!("segment-{index}"))
                .spawn(move || {
                    let outcome = download_segment(
                        &worker_client,
                        &worker_url,
                        &worker_segment,
                        &worker_cancel,
                        chunk_size,
                        &worker_tx,
                    );
                    let _ = worker_tx.send(SegmentEvent::Finished { index, outcome });
                });

            match spawned {
                Ok(handle) => handles.push((index, handle)),
                Err(source) => {
                    cancel.request_stop();
                    let mut pool = Self { rx_evt, handles };
                    pool.join();
                    return Err(DownloadError::SegmentFailed {
                        index,
                        cause: Box::new(DownloadError::io(&segment.temp_path, source)),
                    });
                }
            }
        }

        // 之后只有下载线程持有发送端
        drop(tx_evt);
        Ok(Self { rx_evt, handles })
    }

    /// 所有线程结束后返回 Disconnected。
    pub(crate) fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<SegmentEvent, channel::RecvTimeoutError> {
        self.rx_evt.recv_timeout(timeout)
    }

    /// 等待全部线程结束，返回 panic 的分段序号。
    pub(crate) fn join(&mut self) -> Vec<usize> {
        let mut panicked = Vec::new();
        for (index, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                panicked.push(index);
            }
        }
        panicked
    }
}

fn download_segment(
    client: &Client,
    url: &str,
    segment: &Segment,
    cancel: &CancelToken,
    chunk_size: usize,
    tx_evt: &channel::Sender<SegmentEvent>,
) -> SegmentOutcome {
    match stream_segment(client, url, segment, cancel, chunk_size, tx_evt) {
        Ok(true) => {
            debug!(target: "segment", index = segment.index, bytes = segment.len, "segment done");
            SegmentOutcome::Completed
        }
        Ok(false) => {
            debug!(target: "segment", index = segment.index, "segment stopped");
            SegmentOutcome::Stopped
        }
        Err(err) if cancel.is_cancelled() => {
            // 其他分段已失败或调用方已停止，此错误只是连带结果
            debug!(target: "segment", index = segment.index, error = %err, "error after stop");
            SegmentOutcome::Stopped
        }
        Err(err) => {
            cancel.request_stop();
            warn!(target: "segment", index = segment.index, error = %err, "segment failed");
            SegmentOutcome::Failed(err)
        }
    }
}

/// 整段写入磁盘返回 `Ok(true)`，中途停止返回 `Ok(false)`。
fn stream_segment(
    client: &Client,
    url: &str,
    segment: &Segment,
    cancel: &CancelToken,
    chunk_size: usize,
    tx_evt: &channel::Sender<SegmentEvent>,
) -> Result<bool, DownloadError> {
    let path = &segment.temp_path;
    let mut file = File::create(path).map_err(|e| DownloadError::io(path, e))?;

    let Some(range) = segment.range_header() else {
        return Ok(true);
    };
    if cancel.is_cancelled() {
        return Ok(false);
    }

    debug!(target: "segment", index = segment.index, %range, "GET");
    let mut resp = client
        .get(url)
        .header(RANGE, range)
        .send()
        .map_err(|e| DownloadError::network(url, e))?;

    let status = resp.status();
    let honored = status == StatusCode::PARTIAL_CONTENT
        || (status == StatusCode::OK && segment.start == 0);
    if !honored {
        if status.is_success() {
            return Err(DownloadError::RangeNotHonored { status });
        }
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut written = 0u64;
    loop {
        let n = resp.read(&mut buf).map_err(|source| DownloadError::Transfer {
            url: url.to_string(),
            source,
        })?;
        if n == 0 {
            break;
        }
        if cancel.is_cancelled() {
            return Ok(false);
        }
        if written + n as u64 > segment.len {
            return Err(DownloadError::LengthMismatch {
                expected: segment.len,
                actual: written + n as u64,
            });
        }
        file.write_all(&buf[..n])
            .map_err(|e| DownloadError::io(path, e))?;
        written += n as u64;
        let _ = tx_evt.send(SegmentEvent::Wrote { bytes: n as u64 });
    }

    if written != segment.len {
        return Err(DownloadError::LengthMismatch {
            expected: segment.len,
            actual: written,
        });
    }
    file.flush().map_err(|e| DownloadError::io(path, e))?;
    Ok(true)
}
