//! 分段计划：把文件字节区间切分给各个下载线程。

use std::path::Path;

use super::models::{DownloadPlan, Segment, part_path};

/// 实际使用的分段数：至少 1 个，且不超过文件字节数。
pub fn effective_workers(total_size: u64, workers: usize) -> usize {
    (workers.max(1) as u64).min(total_size).max(1) as usize
}

/// 将 `[0, total_size)` 划分为连续的字节区间。
///
/// 前 n-1 段各 `total_size / n` 字节，余数并入最后一段；空文件得到一个长度为 0 的分段。
pub fn plan(total_size: u64, workers: usize, destination: &Path) -> DownloadPlan {
    let n = effective_workers(total_size, workers);
    let base = total_size / n as u64;

    let segments = (0..n)
        .map(|i| {
            let start = i as u64 * base;
            let len = if i == n - 1 { total_size - start } else { base };
            Segment {
                index: i,
                start,
                len,
                temp_path: part_path(destination, i),
            }
        })
        .collect();

    DownloadPlan {
        total_size,
        segments,
    }
}
