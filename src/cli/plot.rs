//! # plot 子命令 CLI 定义
//!
//! 绘制 S(Q,ω) 色图或 2×2 总览。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/plot.rs`

use super::batch::LawArg;
use super::fit::FitOptionArgs;

use clap::Args;
use std::path::PathBuf;

/// plot 子命令参数
#[derive(Args, Debug)]
pub struct PlotArgs {
    /// Input S(Q,ω) data file
    pub input: PathBuf,

    /// Output image (PNG or SVG by extension)
    #[arg(short, long, default_value = "sqw_map.png")]
    pub output: PathBuf,

    /// Q index marked on the color map
    #[arg(long)]
    pub q_index: Option<usize>,

    /// Fit all spectra and draw the 2×2 summary instead of the color map
    #[arg(long, default_value_t = false)]
    pub dashboard: bool,

    #[command(flatten)]
    pub fit: FitOptionArgs,

    /// Dispersion law drawn on the summary
    #[arg(long, value_enum, default_value = "linear")]
    pub law: LawArg,

    /// Number of parallel jobs for the summary fits (0 = auto)
    #[arg(short, long, default_value_t = 0, env = "NEUTRONFIT_JOBS")]
    pub jobs: usize,

    /// Figure width in pixels
    #[arg(long, default_value_t = 1200)]
    pub width: u32,

    /// Figure height in pixels
    #[arg(long, default_value_t = 900)]
    pub height: u32,
}
