//! 配置文件读写与带注释生成。
//!
//! 用户文件中的键覆盖默认值；缺失的键会用默认值补齐并回写（带字段说明注释）。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
    fn fields() -> &'static [FieldMeta];
}

#[derive(Debug)]
pub struct LoadedConfig<T> {
    pub config: T,
    pub path: PathBuf,
    /// 文件原本不存在，已按默认值生成
    pub created: bool,
    /// 文件缺少字段，已补齐并回写
    pub upgraded: bool,
}

/// 从 `base_dir`（默认当前目录）读取 `FILE_NAME`，不存在时创建。
pub fn load_or_create_with_base<T: ConfigSpec>(
    base_dir: Option<&Path>,
) -> Result<LoadedConfig<T>, ConfigError> {
    let path = match base_dir {
        Some(base) => base.join(T::FILE_NAME),
        None => PathBuf::from(T::FILE_NAME),
    };
    load_or_create_at(&path)
}

pub fn load_or_create_at<T: ConfigSpec>(path: &Path) -> Result<LoadedConfig<T>, ConfigError> {
    ensure_parent(path)?;

    if !path.exists() {
        let config = T::default();
        write_with_comments(&config, path)?;
        return Ok(LoadedConfig {
            config,
            path: path.to_path_buf(),
            created: true,
            upgraded: false,
        });
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let user: Value = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    // an empty file parses as null
    let user = match user {
        Value::Null => Value::Mapping(Mapping::new()),
        other => other,
    };
    let missing = missing_fields::<T>(&user);

    let mut merged = to_value(&T::default())?;
    overlay(&mut merged, user);
    let config: T =
        serde_yaml::from_value(merged).map_err(|err| ConfigError::Validation(err.to_string()))?;

    let upgraded = !missing.is_empty();
    if upgraded {
        write_with_comments(&config, path)?;
    }

    Ok(LoadedConfig {
        config,
        path: path.to_path_buf(),
        created: false,
        upgraded,
    })
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    ensure_parent(path)?;
    let yaml = generate_yaml_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn generate_yaml_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(mapping) = to_value(config)? else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut out = String::new();
    for field in T::fields() {
        for line in field.description.lines().filter(|l| !l.is_empty()) {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let entry = serde_yaml::to_string(&Mapping::from_iter([(key, val)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        out.push_str(entry.trim_end());
        out.push('\n');
    }
    Ok(out)
}

fn to_value<T: Serialize>(config: &T) -> Result<Value, ConfigError> {
    serde_yaml::to_value(config).map_err(|err| ConfigError::Validation(err.to_string()))
}

fn missing_fields<T: ConfigSpec>(user: &Value) -> Vec<&'static str> {
    let Value::Mapping(map) = user else {
        return T::fields().iter().map(|f| f.name).collect();
    };
    T::fields()
        .iter()
        .filter(|f| !map.contains_key(Value::String(f.name.to_string())))
        .map(|f| f.name)
        .collect()
}

/// 嵌套映射逐键合并，其余类型直接以用户值覆盖默认值。
fn overlay(base: &mut Value, user: Value) {
    match (base, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                match dest.get_mut(&key) {
                    Some(dest_val) => overlay(dest_val, user_val),
                    None => {
                        dest.insert(key, user_val);
                    }
                }
            }
        }
        (dest, other) => *dest = other,
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::context::Config;
    use tempfile::tempdir;

    #[test]
    fn creates_commented_default_file() {
        let dir = tempdir().unwrap();
        let loaded = load_or_create_with_base::<Config>(Some(dir.path())).unwrap();
        assert!(loaded.created);
        assert_eq!(loaded.config, Config::default());

        let raw = fs::read_to_string(dir.path().join("config.yml")).unwrap();
        assert!(raw.contains("# 分段下载线程数"));
        assert!(raw.contains("workers: 4"));
    }

    #[test]
    fn user_values_override_and_missing_keys_are_added() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "workers: 8\nmirror_prefix: ''\n").unwrap();

        let loaded = load_or_create_at::<Config>(&path).unwrap();
        assert!(!loaded.created);
        assert!(loaded.upgraded);
        assert_eq!(loaded.config.workers, 8);
        assert_eq!(loaded.config.mirror_prefix, "");
        assert_eq!(loaded.config.history_limit, 100);

        let again = load_or_create_at::<Config>(&path).unwrap();
        assert!(!again.upgraded);
        assert_eq!(again.config, loaded.config);
    }

    #[test]
    fn broken_yaml_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "workers: [1, 2\n").unwrap();
        let err = load_or_create_at::<Config>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
