//! 分段下载引擎入口。
//!
//! 子模块：
//! - `models`        — 数据模型（DownloadRequest / Segment / DownloadEvent 等）
//! - `error`         — 错误类型
//! - `probe`         — HEAD 探测文件大小与建议文件名
//! - `plan`          — 字节区间分段计划
//! - `segment_pool`  — 分段下载工作线程
//! - `merger`        — 临时分段文件合并
//! - `progress`      — 进度聚合、速度采样与事件上报
//! - `downloader`    — 下载主流程编排

pub mod downloader;
pub mod error;
pub mod merger;
pub mod models;
pub mod plan;
pub mod probe;
pub mod progress;
pub(crate) mod segment_pool;

pub use downloader::{Downloader, EngineOptions};
pub use error::DownloadError;
pub use models::{
    CancelToken, DownloadEvent, DownloadOutcome, DownloadPlan, DownloadReport, DownloadRequest,
    LogLevel, ProgressSample, RunStatus, Segment, part_path,
};
pub use progress::{ProgressAggregator, format_size};
