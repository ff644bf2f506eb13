use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::{info, warn};

use gh_accel_downloader::base_system::config::load_or_create_with_base;
use gh_accel_downloader::base_system::context::{Config, MAX_WORKERS, MIN_WORKERS};
use gh_accel_downloader::base_system::history::DownloadHistory;
use gh_accel_downloader::base_system::logging::{LogOptions, LogSystem};
use gh_accel_downloader::base_system::mirror::{self, MirrorRoute};
use gh_accel_downloader::download::{
    CancelToken, DownloadOutcome, DownloadRequest, Downloader, EngineOptions, format_size,
};
use gh_accel_downloader::ui::cli::CliRenderer;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "gh-accel-downloader")]
#[command(about = "Multi-segment GitHub file downloader with mirror acceleration")]
struct Cli {
    /// 要下载的文件地址
    url: Option<String>,

    /// 保存目录（默认取配置 save_path，为空时为当前目录）
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// 分段线程数 (1-16)
    #[arg(short, long)]
    threads: Option<usize>,

    /// 镜像前缀或已知镜像名（ghfast.top / gh-proxy.net）
    #[arg(long)]
    mirror: Option<String>,

    /// 不使用镜像，直接访问原地址
    #[arg(long, default_value_t = false, conflicts_with = "mirror")]
    direct: bool,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml、logs 与下载历史）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 显示最近的下载历史后退出
    #[arg(long, default_value_t = false)]
    history: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("gh-accel-downloader v{VERSION}");
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref();
    let log = init_logging(cli.debug, data_dir)?;

    let loaded = load_or_create_with_base::<Config>(data_dir).map_err(|e| anyhow!(e))?;
    if loaded.created {
        info!(target: "startup", "已生成默认配置: {}", loaded.path.display());
    }
    let config = loaded.config;

    let history_path = match data_dir {
        Some(dir) => dir.join(&config.history_file),
        None => PathBuf::from(&config.history_file),
    };
    let mut history = DownloadHistory::load(history_path, config.history_limit);

    if cli.history {
        print_history(&history);
        return Ok(());
    }

    let Some(url) = cli.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        bail!("missing URL; run with --help for usage");
    };

    let result = run_download(&cli, &config, url, &mut history);
    log.safe_exit();
    result
}

fn run_download(
    cli: &Cli,
    config: &Config,
    url: &str,
    history: &mut DownloadHistory,
) -> Result<()> {
    let prefix = if cli.direct {
        String::new()
    } else {
        cli.mirror
            .as_deref()
            .map(mirror::resolve_prefix)
            .unwrap_or_else(|| config.mirror_prefix.clone())
    };
    let route = mirror::route(url, &prefix);
    if matches!(route, MirrorRoute::Unsupported(_)) {
        warn!(target: "mirror", "非 GitHub 地址，直接下载: {url}");
    }

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| config.default_save_dir());
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("create output dir {}", output_dir.display()))?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let destination = output_dir.join(mirror::file_name_from_url(url, now));

    let workers = cli
        .threads
        .map(|t| t.clamp(MIN_WORKERS, MAX_WORKERS))
        .unwrap_or_else(|| config.clamped_workers());

    let request = DownloadRequest::new(route.url(), destination.clone(), workers)?;
    let downloader = Downloader::new(EngineOptions::from(config))?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.request_stop();
    })
    .context("install Ctrl-C handler")?;

    info!(target: "startup", "当前版本: v{VERSION}");
    let mut renderer = CliRenderer::new(!cli.debug);
    let outcome = downloader.run(&request, &cancel, &mut |event| renderer.handle(event));

    match outcome {
        DownloadOutcome::Completed(report) => {
            println!("已保存到 {}", destination.display());
            if let Err(err) = history.record(url, report.total_size) {
                warn!(target: "history", "写入下载历史失败: {err}");
            }
            Ok(())
        }
        DownloadOutcome::Failed(err) => Err(anyhow!(err).context("download failed")),
        DownloadOutcome::Cancelled => bail!("download cancelled"),
    }
}

fn print_history(history: &DownloadHistory) {
    if history.entries().is_empty() {
        println!("暂无下载记录");
        return;
    }
    println!("===== 下载历史 =====");
    for (i, entry) in history.entries().iter().rev().enumerate() {
        println!(
            "{}. [{}] {} ({})",
            i + 1,
            entry.time,
            entry.url,
            format_size(entry.size)
        );
    }
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: false,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
