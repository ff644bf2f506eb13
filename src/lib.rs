//! GitHub 文件加速下载器。
//!
//! 代码结构（读代码入口）：
//! - `download`：分段下载引擎（探测、分段、并发下载、合并、进度与取消）
//! - `base_system`：配置/日志/镜像地址/下载历史等基础设施
//! - `ui`：命令行进度条渲染

pub mod base_system;
pub mod download;
pub mod ui;
