//! # neutronfit - 非弹性中子散射谱拟合工具
//!
//! 读取 S(Q,ω) 数据，对每个 Q 的能谱进行线形拟合，提取并拟合色散关系。
//!
//! ## 子命令
//! - `info`   - 数据文件概况
//! - `sample` - 生成合成样例数据
//! - `fit`    - 单谱拟合（最小二乘 / 贝叶斯）
//! - `batch`  - 全 Q 批量拟合、色散分析（支持目录批处理）
//! - `plot`   - S(Q,ω) 色图与 2×2 总览
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── parsers/   (数据读取)
//!   │     ├── sqw/       (拟合、色散、导出、绘图)
//!   │     ├── batch/     (并行批处理)
//!   │     └── models/    (数据模型)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod error;
mod models;
mod parsers;
mod sqw;
mod utils;

use clap::Parser;
use cli::Cli;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
