//! 临时分段文件清理。

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

/// 删除给定的文件，返回实际删除的数量。
///
/// 文件不存在不算错误；其他失败只记录警告并跳过。
pub fn remove_files<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> usize {
    let mut removed = 0;
    for path in paths {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(target: "cleanup", path = %path.display(), "removed");
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(target: "cleanup", path = %path.display(), error = %e, "remove failed");
            }
        }
    }
    removed
}
