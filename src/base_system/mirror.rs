//! GitHub 镜像加速地址与输出文件名推导。
//!
//! 加速方式为前缀拼接：`https://ghfast.top/` + `github.com/<owner>/<repo>/...`。

use tracing::info;

use super::context::safe_fs_name;

/// (label, prefix)
pub const KNOWN_MIRRORS: [(&str, &str); 2] = [
    ("ghfast.top", "https://ghfast.top/"),
    ("gh-proxy.net", "https://gh-proxy.net/"),
];

const GITHUB_PREFIXES: [&str; 3] = [
    "https://github.com/",
    "https://raw.githubusercontent.com/",
    "https://codeload.github.com/",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorRoute {
    Accelerated(String),
    /// 镜像前缀为空，直连
    Direct(String),
    /// 非 GitHub 下载地址，原样下载
    Unsupported(String),
}

impl MirrorRoute {
    pub fn url(&self) -> &str {
        match self {
            Self::Accelerated(u) | Self::Direct(u) | Self::Unsupported(u) => u,
        }
    }
}

pub fn is_github_url(url: &str) -> bool {
    GITHUB_PREFIXES.iter().any(|p| url.starts_with(p))
}

pub fn route(url: &str, prefix: &str) -> MirrorRoute {
    let url = url.trim();
    let prefix = prefix.trim();
    if !is_github_url(url) {
        return MirrorRoute::Unsupported(url.to_string());
    }
    if prefix.is_empty() {
        return MirrorRoute::Direct(url.to_string());
    }

    let bare = &url["https://".len()..];
    let accelerated = if prefix.ends_with('/') {
        format!("{prefix}{bare}")
    } else {
        format!("{prefix}/{bare}")
    };
    info!(target: "mirror", "使用镜像加速下载地址: {accelerated}");
    MirrorRoute::Accelerated(accelerated)
}

/// 解析 `--mirror` 参数：已知镜像名或直接给出的前缀。
pub fn resolve_prefix(value: &str) -> String {
    KNOWN_MIRRORS
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(value.trim()))
        .map(|(_, prefix)| prefix.to_string())
        .unwrap_or_else(|| value.trim().to_string())
}

/// 取原始地址路径的最后一段作为文件名（去掉查询参数），
/// 取不到时使用 `download_<unix_secs>.zip`。
pub fn file_name_from_url(url: &str, unix_secs: u64) -> String {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let after_scheme = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let name = after_scheme
        .split_once('/')
        .and_then(|(_, p)| p.rsplit('/').next())
        .unwrap_or("");
    let name = safe_fs_name(name, '_', 200);
    if name.is_empty() {
        format!("download_{unix_secs}.zip")
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_urls_get_prefixed() {
        let url = "https://github.com/YuxuanBai1/Luogu-Plus/releases/download/v1.0.1/Luogu.Plus.crx";
        assert_eq!(
            route(url, "https://ghfast.top/"),
            MirrorRoute::Accelerated(
                "https://ghfast.top/github.com/YuxuanBai1/Luogu-Plus/releases/download/v1.0.1/Luogu.Plus.crx"
                    .to_string()
            )
        );
        assert_eq!(
            route("https://raw.githubusercontent.com/o/r/main/x.txt", "https://gh-proxy.net").url(),
            "https://gh-proxy.net/raw.githubusercontent.com/o/r/main/x.txt"
        );
    }

    #[test]
    fn empty_prefix_means_direct() {
        let url = "https://codeload.github.com/o/r/zip/refs/heads/main";
        assert_eq!(route(url, ""), MirrorRoute::Direct(url.to_string()));
    }

    #[test]
    fn other_hosts_are_untouched() {
        let url = "https://example.com/file.iso";
        assert_eq!(
            route(url, "https://ghfast.top/"),
            MirrorRoute::Unsupported(url.to_string())
        );
    }

    #[test]
    fn mirror_labels_resolve() {
        assert_eq!(resolve_prefix("gh-proxy.net"), "https://gh-proxy.net/");
        assert_eq!(resolve_prefix("https://my.mirror/"), "https://my.mirror/");
        assert_eq!(resolve_prefix(""), "");
    }

    #[test]
    fn file_name_comes_from_url_path() {
        assert_eq!(
            file_name_from_url("https://github.com/o/r/releases/download/v1/tool.tar.gz?x=1", 7),
            "tool.tar.gz"
        );
        assert_eq!(
            file_name_from_url("https://github.com/", 1700000000),
            "download_1700000000.zip"
        );
        assert_eq!(file_name_from_url("https://github.com", 5), "download_5.zip");
    }
}
