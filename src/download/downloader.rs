//! 下载主流程编排。
//!
//! 探测大小 → 生成分段计划 → 并发下载各分段 → 合并 → 上报结果。
//! 运行状态只由协调线程修改；取消是协作式的，由各下载线程在写入每个数据块前检查。

use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use reqwest::blocking::Client;
use tracing::debug;

use super::error::DownloadError;
use super::merger;
use super::models::{
    CancelToken, DownloadEvent, DownloadOutcome, DownloadPlan, DownloadReport, DownloadRequest,
    LogLevel, RunStatus,
};
use super::plan;
use super::probe::{self, ProbeResult};
use super::progress::{ProgressAggregator, ProgressReporter, format_size};
use super::segment_pool::{CHUNK_SIZE, SegmentEvent, SegmentOutcome, SegmentPool};
use crate::base_system::context::Config;
use crate::base_system::file_cleaner;

const USER_AGENT: &str = concat!("gh-accel-downloader/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub probe_timeout: Duration,
    /// 作用于建立连接与每次读取，而非整个传输过程
    pub segment_timeout: Duration,
    pub connect_timeout: Duration,
    pub chunk_size: usize,
    pub sample_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            segment_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            chunk_size: CHUNK_SIZE,
            sample_interval: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            probe_timeout: cfg.probe_timeout(),
            segment_timeout: cfg.segment_timeout(),
            connect_timeout: cfg.connect_timeout(),
            ..Self::default()
        }
    }
}

/// 单次下载的运行状态，随一次 `run` 创建和销毁。
struct RunState {
    status: RunStatus,
    downloaded_bytes: u64,
    started_at: Instant,
    cancel: CancelToken,
}

impl RunState {
    fn new(cancel: CancelToken) -> Self {
        Self {
            status: RunStatus::Probing,
            downloaded_bytes: 0,
            started_at: Instant::now(),
            cancel,
        }
    }

    fn enter(
        &mut self,
        next: RunStatus,
        level: LogLevel,
        message: impl Into<String>,
        reporter: &mut ProgressReporter<'_>,
    ) {
        debug_assert!(
            self.status.can_enter(next),
            "illegal transition {} -> {}",
            self.status,
            next
        );
        debug!(target: "download", from = %self.status, to = %next, "state change");
        self.status = next;
        reporter.log(level, message);
    }
}

enum SegmentsResult {
    Done,
    Failed(DownloadError),
    Cancelled,
}

pub struct Downloader {
    client: Client,
    options: EngineOptions,
}

impl Downloader {
    pub fn new(options: EngineOptions) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(options.connect_timeout)
            .timeout(options.segment_timeout)
            .build()
            .map_err(DownloadError::Client)?;
        Ok(Self { client, options })
    }

    /// 执行一次下载直到终态。
    ///
    /// 阻塞调用线程。`events` 接收进度、速度与日志事件，并在返回前恰好收到一次
    /// `Finished`。可在其他线程通过 `cancel` 的克隆停止下载。
    pub fn run(
        &self,
        request: &DownloadRequest,
        cancel: &CancelToken,
        events: &mut dyn FnMut(DownloadEvent),
    ) -> DownloadOutcome {
        let mut reporter = ProgressReporter::new(events);
        let mut state = RunState::new(cancel.clone());

        let outcome = self.drive(request, &mut state, &mut reporter);
        debug_assert!(state.status.is_terminal());
        debug_assert_eq!(state.status, outcome.status());

        match &outcome {
            DownloadOutcome::Completed(report) => reporter.finish(
                true,
                format!("download complete ({})", format_size(report.total_size)),
            ),
            DownloadOutcome::Failed(err) => reporter.finish(false, err.to_string()),
            DownloadOutcome::Cancelled => reporter.finish(false, "download cancelled"),
        }
        outcome
    }

    fn drive(
        &self,
        request: &DownloadRequest,
        state: &mut RunState,
        reporter: &mut ProgressReporter<'_>,
    ) -> DownloadOutcome {
        reporter.log(LogLevel::Info, format!("probing {}", request.url));

        if let Err(err) = request.validate() {
            return fail(state, reporter, err, None);
        }

        let probed = match probe::probe(&self.client, &request.url, self.options.probe_timeout) {
            Ok(p) => p,
            Err(err) => return fail(state, reporter, err, None),
        };
        let ProbeResult {
            total_size,
            suggested_filename,
        } = probed;
        reporter.log(
            LogLevel::Info,
            format!("file size: {}", format_size(total_size)),
        );
        if let Some(name) = suggested_filename.as_deref() {
            reporter.log(LogLevel::Info, format!("server suggested filename: {name}"));
        }

        if state.cancel.is_cancelled() {
            return cancelled(state, reporter, None);
        }

        let plan = plan::plan(total_size, request.workers, &request.destination);
        state.enter(
            RunStatus::Downloading,
            LogLevel::Info,
            format!(
                "downloading {} in {} segment(s)",
                request.destination.display(),
                plan.segments.len()
            ),
            reporter,
        );

        match self.download_segments(request, &plan, state, reporter) {
            SegmentsResult::Done => {}
            SegmentsResult::Failed(err) => return fail(state, reporter, err, Some(&plan)),
            SegmentsResult::Cancelled => return cancelled(state, reporter, Some(&plan)),
        }

        state.enter(
            RunStatus::Merging,
            LogLevel::Info,
            "merging temporary files",
            reporter,
        );
        let merged = match merger::merge(&plan.segments, &request.destination) {
            Ok(bytes) => bytes,
            Err(err) => return fail(state, reporter, err, Some(&plan)),
        };
        debug!(target: "download", merged, downloaded = state.downloaded_bytes, "merge finished");

        let elapsed = state.started_at.elapsed();
        state.enter(
            RunStatus::Completed,
            LogLevel::Success,
            format!("download complete in {:.1}s", elapsed.as_secs_f64()),
            reporter,
        );
        DownloadOutcome::Completed(DownloadReport {
            total_size,
            segments: plan.segments.len(),
            suggested_filename,
            elapsed,
        })
    }

    /// 启动全部下载线程，汇总字节增量，并等待全部结束。
    fn download_segments(
        &self,
        request: &DownloadRequest,
        plan: &DownloadPlan,
        state: &mut RunState,
        reporter: &mut ProgressReporter<'_>,
    ) -> SegmentsResult {
        let mut pool = match SegmentPool::spawn(
            &self.client,
            &request.url,
            &plan.segments,
            &state.cancel,
            self.options.chunk_size,
        ) {
            Ok(pool) => pool,
            Err(err) => return SegmentsResult::Failed(err),
        };

        let interval = self.options.sample_interval;
        let mut aggregator = ProgressAggregator::new(plan.total_size);
        reporter.progress(aggregator.snapshot());

        let mut finished: Vec<bool> = vec![false; plan.segments.len()];
        let mut failure: Option<DownloadError> = None;
        let mut last_sample = Instant::now();

        loop {
            let wait = interval.saturating_sub(last_sample.elapsed());
            match pool.recv_timeout(wait) {
                Ok(SegmentEvent::Wrote { bytes }) => {
                    let sample = aggregator.record(bytes);
                    state.downloaded_bytes = sample.downloaded_bytes;
                    reporter.progress(sample);
                }
                Ok(SegmentEvent::Finished { index, outcome }) => {
                    finished[index] = true;
                    match outcome {
                        SegmentOutcome::Completed => {
                            debug!(target: "download", segment = index, "segment completed");
                        }
                        SegmentOutcome::Stopped => {
                            debug!(target: "download", segment = index, "segment stopped");
                        }
                        SegmentOutcome::Failed(err) => {
                            reporter.log(
                                LogLevel::Error,
                                format!("segment {} failed: {err}", index + 1),
                            );
                            if failure.is_none() {
                                failure = Some(DownloadError::SegmentFailed {
                                    index,
                                    cause: Box::new(err),
                                });
                            }
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let since = last_sample.elapsed();
            if since >= interval {
                last_sample = Instant::now();
                reporter.speed(aggregator.sample_speed(since));
            }
        }

        for index in pool.join() {
            reporter.log(
                LogLevel::Error,
                format!("segment {} worker panicked", index + 1),
            );
            finished[index] = true;
            failure.get_or_insert(DownloadError::SegmentFailed {
                index,
                cause: Box::new(DownloadError::WorkerPanicked),
            });
        }
        debug_assert!(finished.iter().all(|f| *f));

        if let Some(err) = failure {
            SegmentsResult::Failed(err)
        } else if state.cancel.is_cancelled() {
            SegmentsResult::Cancelled
        } else {
            SegmentsResult::Done
        }
    }
}

fn cleanup(plan: Option<&DownloadPlan>, reporter: &mut ProgressReporter<'_>) {
    let Some(plan) = plan else {
        return;
    };
    let removed = file_cleaner::remove_files(plan.segments.iter().map(|s| &s.temp_path));
    if removed > 0 {
        reporter.log(
            LogLevel::Info,
            format!("removed {removed} temporary file(s)"),
        );
    }
}

fn fail(
    state: &mut RunState,
    reporter: &mut ProgressReporter<'_>,
    err: DownloadError,
    plan: Option<&DownloadPlan>,
) -> DownloadOutcome {
    cleanup(plan, reporter);
    state.enter(
        RunStatus::Failed,
        LogLevel::Error,
        format!("download failed: {err}"),
        reporter,
    );
    DownloadOutcome::Failed(err)
}

fn cancelled(
    state: &mut RunState,
    reporter: &mut ProgressReporter<'_>,
    plan: Option<&DownloadPlan>,
) -> DownloadOutcome {
    cleanup(plan, reporter);
    state.enter(
        RunStatus::Cancelled,
        LogLevel::Warning,
        "download cancelled",
        reporter,
    );
    DownloadOutcome::Cancelled
}
