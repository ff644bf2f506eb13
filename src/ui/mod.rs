//! 交互层：命令行进度条渲染。

pub mod cli;
