//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // 下载配置
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,
    #[serde(default = "default_segment_timeout")]
    pub segment_timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    // 路径配置
    #[serde(default)]
    pub save_path: String,

    // 镜像加速
    #[serde(default = "default_mirror_prefix")]
    pub mirror_prefix: String,

    // 下载历史
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_history_file")]
    pub history_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            probe_timeout: default_probe_timeout(),
            segment_timeout: default_segment_timeout(),
            connect_timeout: default_connect_timeout(),
            save_path: String::new(),
            mirror_prefix: default_mirror_prefix(),
            history_limit: default_history_limit(),
            history_file: default_history_file(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 8] = [
            FieldMeta {
                name: "workers",
                description: "分段下载线程数 (1-16)",
            },
            FieldMeta {
                name: "probe_timeout",
                description: "获取文件大小的请求超时时间（秒）",
            },
            FieldMeta {
                name: "segment_timeout",
                description: "分段下载读取超时时间（秒）",
            },
            FieldMeta {
                name: "connect_timeout",
                description: "建立连接超时时间（秒）",
            },
            FieldMeta {
                name: "save_path",
                description: "保存路径（留空为当前目录）",
            },
            FieldMeta {
                name: "mirror_prefix",
                description: "GitHub 加速镜像前缀，例如 https://ghfast.top/ 或 https://gh-proxy.net/\n留空表示直连",
            },
            FieldMeta {
                name: "history_limit",
                description: "下载历史最多保留条数",
            },
            FieldMeta {
                name: "history_file",
                description: "下载历史文件名（相对数据目录）",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn clamped_workers(&self) -> usize {
        self.workers.clamp(MIN_WORKERS, MAX_WORKERS)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout.max(1))
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.max(1))
    }
}

/// 将远端文件名清理为本地可创建的文件名。
pub fn safe_fs_name(name: &str, replacement: char, max_len: usize) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            ':' | '"' | '<' | '>' | '/' | '\\' | '|' | '?' | '*' => replacement,
            c if (c as u32) < 32 => replacement,
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let upper = cleaned.to_uppercase();
    if RESERVED.contains(&upper.as_str()) {
        cleaned = format!("_{}", cleaned);
    }

    if cleaned.len() > max_len {
        let mut end = max_len;
        while end > 0 && !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    cleaned
}

fn default_workers() -> usize {
    4
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_segment_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_mirror_prefix() -> String {
    "https://ghfast.top/".to_string()
}

fn default_history_limit() -> usize {
    100
}

fn default_history_file() -> String {
    "download_history.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workers_are_clamped() {
        let mut cfg = Config::default();
        assert_eq!(cfg.clamped_workers(), 4);
        cfg.workers = 0;
        assert_eq!(cfg.clamped_workers(), 1);
        cfg.workers = 64;
        assert_eq!(cfg.clamped_workers(), 16);
    }

    #[test]
    fn every_field_has_metadata() {
        let value = serde_yaml::to_value(Config::default()).unwrap();
        let map = value.as_mapping().unwrap();
        assert_eq!(map.len(), Config::fields().len());
        for field in Config::fields() {
            assert!(map.contains_key(serde_yaml::Value::String(field.name.to_string())));
        }
    }

    #[test]
    fn unsafe_names_are_cleaned() {
        assert_eq!(safe_fs_name("a:b?c.zip", '_', 255), "a_b_c.zip");
        assert_eq!(safe_fs_name("CON", '_', 255), "_CON");
        assert_eq!(safe_fs_name("trailing. ", '_', 255), "trailing");
        assert_eq!(safe_fs_name("abcdef", '_', 3), "abc");
    }
}
