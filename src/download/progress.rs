//! 进度聚合与事件上报。
//!
//! 下载线程只通过 channel 发送字节增量；本模块中的聚合器由协调线程独占，
//! 不存在多写者共享计数器。

use std::time::Duration;

use tracing::{error, info, warn};

use super::models::{DownloadEvent, LogLevel, ProgressSample};

pub fn percent_of(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (downloaded as u128 * 100) / total as u128;
    pct.min(100) as u8
}

#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    total_bytes: u64,
    downloaded_bytes: u64,
    sampled_bytes: u64,
    percent: u8,
    bytes_per_second: f64,
}

impl ProgressAggregator {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            downloaded_bytes: 0,
            sampled_bytes: 0,
            percent: 0,
            bytes_per_second: 0.0,
        }
    }

    /// 累加一个下载线程上报的字节增量。
    pub fn record(&mut self, bytes: u64) -> ProgressSample {
        self.downloaded_bytes = self.downloaded_bytes.saturating_add(bytes);
        // 百分比只增不减
        self.percent = self
            .percent
            .max(percent_of(self.downloaded_bytes, self.total_bytes));
        self.snapshot()
    }

    /// 自上次采样以来的平均速度；`elapsed` 为距上次采样的时间。
    pub fn sample_speed(&mut self, elapsed: Duration) -> f64 {
        let delta = self.downloaded_bytes.saturating_sub(self.sampled_bytes);
        self.sampled_bytes = self.downloaded_bytes;
        let secs = elapsed.as_secs_f64();
        self.bytes_per_second = if secs > 0.0 { delta as f64 / secs } else { 0.0 };
        self.bytes_per_second
    }

    pub fn snapshot(&self) -> ProgressSample {
        ProgressSample {
            percent: self.percent,
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            bytes_per_second: self.bytes_per_second,
        }
    }
}

/// 将引擎事件转发给调用方回调，并把日志同步写入 `tracing`。
pub(crate) struct ProgressReporter<'a> {
    sink: &'a mut dyn FnMut(DownloadEvent),
    finished: bool,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sink: &'a mut dyn FnMut(DownloadEvent)) -> Self {
        Self {
            sink,
            finished: false,
        }
    }

    pub(crate) fn progress(&mut self, sample: ProgressSample) {
        (self.sink)(DownloadEvent::Progress(sample));
    }

    pub(crate) fn speed(&mut self, bytes_per_second: f64) {
        (self.sink)(DownloadEvent::Speed(bytes_per_second));
    }

    pub(crate) fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!(target: "download", "{message}"),
            LogLevel::Warning => warn!(target: "download", "{message}"),
            LogLevel::Error => error!(target: "download", "{message}"),
        }
        (self.sink)(DownloadEvent::Log { message, level });
    }

    /// 结束事件，只发送一次。
    pub(crate) fn finish(&mut self, success: bool, message: impl Into<String>) {
        if self.finished {
            return;
        }
        self.finished = true;
        (self.sink)(DownloadEvent::Finished {
            success,
            message: message.into(),
        });
    }
}

pub fn format_size(size: u64) -> String {
    let mut value = size as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_floored_and_clamped() {
        assert_eq!(percent_of(0, 0), 0);
        assert_eq!(percent_of(10, 0), 0);
        assert_eq!(percent_of(999, 1000), 99);
        assert_eq!(percent_of(1000, 1000), 100);
        assert_eq!(percent_of(5000, 1000), 100);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn aggregator_sums_deltas_monotonically() {
        let mut agg = ProgressAggregator::new(1_000);
        let mut last = 0u8;
        for _ in 0..12 {
            let s = agg.record(100);
            assert!(s.percent >= last);
            assert!(s.percent <= 100);
            last = s.percent;
        }
        assert_eq!(agg.snapshot().downloaded_bytes, 1_200);
        assert_eq!(agg.snapshot().percent, 100);
    }

    #[test]
    fn speed_uses_delta_since_previous_sample() {
        let mut agg = ProgressAggregator::new(10_000);
        agg.record(4_096);
        assert_eq!(agg.sample_speed(Duration::from_secs(1)), 4_096.0);
        agg.record(1_024);
        agg.record(1_024);
        assert_eq!(agg.sample_speed(Duration::from_secs(2)), 1_024.0);
        assert_eq!(agg.sample_speed(Duration::from_secs(1)), 0.0);
        assert_eq!(agg.sample_speed(Duration::ZERO), 0.0);
    }

    #[test]
    fn reporter_finishes_once() {
        let mut events = Vec::new();
        let mut sink = |e: DownloadEvent| events.push(e);
        let mut reporter = ProgressReporter::new(&mut sink);
        reporter.log(LogLevel::Info, "hello");
        reporter.finish(true, "done");
        reporter.finish(false, "again");
        drop(reporter);
        let finished = events
            .iter()
            .filter(|e| matches!(e, DownloadEvent::Finished { .. }))
            .count();
        assert_eq!(finished, 1);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 * 1024), "3.00 TB");
    }
}
