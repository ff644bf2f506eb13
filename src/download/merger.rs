//! 合并临时分段文件。
//!
//! 先写入目标目录下的暂存文件，全部分段拼接成功后再原子重命名为最终文件；
//! 失败时暂存文件随 `NamedTempFile` 一起删除，不会留下截断的目标文件。
//! 暂存文件按普通新建文件的权限创建（受 umask 约束），而不是临时文件默认的 0600。

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use super::error::DownloadError;
use super::models::Segment;

/// 按分段序号升序把临时文件拼接到 `destination`，返回写入的字节数。
///
/// 每个分段文件拷贝完成后立即删除。
pub fn merge(segments: &[Segment], destination: &Path) -> Result<u64, DownloadError> {
    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staging = staging_file(dir).map_err(|e| DownloadError::merge(dir, e))?;

    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index);

    let mut total = 0u64;
    for segment in ordered {
        let path = &segment.temp_path;
        let mut part = File::open(path).map_err(|e| DownloadError::merge(path, e))?;
        let copied = io::copy(&mut part, &mut staging).map_err(|e| DownloadError::merge(path, e))?;
        drop(part);
        fs::remove_file(path).map_err(|e| DownloadError::merge(path, e))?;
        debug!(target: "merge", index = segment.index, bytes = copied, "segment merged");
        total += copied;
    }

    staging
        .flush()
        .map_err(|e| DownloadError::merge(staging.path(), e))?;
    staging
        .as_file()
        .sync_all()
        .map_err(|e| DownloadError::merge(staging.path(), e))?;
    staging
        .persist(destination)
        .map_err(|e| DownloadError::merge(destination, e.error))?;

    Ok(total)
}

fn staging_file(dir: &Path) -> io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(".merge-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // 与 File::create 相同：0666 & !umask
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::plan::plan;
    use tempfile::tempdir;

    fn write_parts(segments: &[Segment], data: &[u8]) {
        for seg in segments {
            let start = seg.start as usize;
            let end = start + seg.len as usize;
            fs::write(&seg.temp_path, &data[start..end]).unwrap();
        }
    }

    #[test]
    fn split_then_merge_is_identity() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("payload.bin");
        let data: Vec<u8> = (0..100_003u32).map(|i| (i * 31 % 251) as u8).collect();

        let plan = plan(data.len() as u64, 7, &dest);
        write_parts(&plan.segments, &data);

        let written = merge(&plan.segments, &dest).unwrap();
        assert_eq!(written, data.len() as u64);
        assert_eq!(fs::read(&dest).unwrap(), data);
        assert!(plan.segments.iter().all(|s| !s.temp_path.exists()));
    }

    #[test]
    fn merge_follows_index_not_slice_order() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("ordered.txt");
        let data = b"HelloWorld!";
        let mut segments = plan(data.len() as u64, 3, &dest).segments;
        write_parts(&segments, data);
        segments.reverse();

        merge(&segments, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn empty_file_merges_to_empty_output() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("empty.dat");
        let plan = plan(0, 4, &dest);
        fs::write(&plan.segments[0].temp_path, b"").unwrap();

        assert_eq!(merge(&plan.segments, &dest).unwrap(), 0);
        assert_eq!(fs::metadata(&dest).unwrap().len(), 0);
    }

    #[test]
    fn missing_part_fails_without_touching_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("broken.bin");
        let data = vec![7u8; 64];
        let plan = plan(data.len() as u64, 4, &dest);
        write_parts(&plan.segments, &data);
        fs::remove_file(&plan.segments[2].temp_path).unwrap();

        let err = merge(&plan.segments, &dest).unwrap_err();
        assert!(matches!(err, DownloadError::Merge { .. }));
        assert!(!dest.exists());
        // only the final part and the destination dir contents remain
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        assert_eq!(leftovers, vec![plan.segments[3].temp_path.clone()]);
    }

    #[cfg(unix)]
    #[test]
    fn merged_file_gets_regular_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let data = b"abcdefgh";
        let plan = plan(data.len() as u64, 2, &dest);
        write_parts(&plan.segments, data);
        merge(&plan.segments, &dest).unwrap();

        let plain = dir.path().join("plain.bin");
        fs::write(&plain, b"x").unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&dest), mode(&plain));
    }
}
