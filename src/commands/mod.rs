//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `parsers/`, `models/`, `sqw/`, `batch/`, `utils/`
//! - 子模块: info, sample, fit, batch, plot

pub mod batch;
pub mod fit;
pub mod info;
pub mod plot;
pub mod sample;

use crate::cli::Commands;
use crate::error::Result;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Info(args) => info::execute(args),
        Commands::Sample(args) => sample::execute(args),
        Commands::Fit(args) => fit::execute(args),
        Commands::Batch(args) => batch::execute(args),
        Commands::Plot(args) => plot::execute(args),
    }
}
