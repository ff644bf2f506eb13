//! 把下载事件渲染为终端进度条与带时间戳的日志行。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::download::{DownloadEvent, LogLevel, format_size};

pub struct CliRenderer {
    bar: ProgressBar,
    quiet_logs: bool,
}

impl CliRenderer {
    pub fn new(quiet_logs: bool) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "[{elapsed_precise}] {wide_bar} {percent:>3}% {bytes}/{total_bytes} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        bar.set_style(style);
        Self { bar, quiet_logs }
    }

    pub fn handle(&mut self, event: DownloadEvent) {
        match event {
            DownloadEvent::Progress(sample) => {
                if self.bar.length() != Some(sample.total_bytes) {
                    self.bar.set_length(sample.total_bytes);
                }
                self.bar.set_position(sample.downloaded_bytes);
            }
            DownloadEvent::Speed(bytes_per_second) => {
                self.bar
                    .set_message(format!("{}/s", format_size(bytes_per_second as u64)));
            }
            DownloadEvent::Log { message, level } => {
                if self.quiet_logs && level == LogLevel::Info {
                    return;
                }
                self.bar.println(log_line(level, &message));
            }
            DownloadEvent::Finished { success, message } => {
                self.bar.finish_and_clear();
                if success {
                    println!("{message}");
                } else {
                    eprintln!("{message}");
                }
            }
        }
    }
}

fn log_line(level: LogLevel, message: &str) -> String {
    let stamp = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    format!("[{stamp}] [{level}] {message}")
}
