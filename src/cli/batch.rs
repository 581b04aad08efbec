//! # batch 子命令 CLI 定义
//!
//! 对所有 Q 谱批量拟合并提取色散关系；输入为目录时逐文件处理。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 使用 `cli/fit.rs` 的共享拟合参数
//! - 参数传递给 `commands/batch.rs`

use super::fit::FitOptionArgs;
use crate::sqw::DispersionLaw;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// 色散律
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum LawArg {
    /// ω = c·Q + ω0
    #[default]
    Linear,
    /// ω = Δ + D·Q²
    Quadratic,
    /// Do not fit a dispersion law
    None,
}

impl std::fmt::Display for LawArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LawArg::Linear => write!(f, "linear"),
            LawArg::Quadratic => write!(f, "quadratic"),
            LawArg::None => write!(f, "none"),
        }
    }
}

impl LawArg {
    pub fn law(&self) -> Option<DispersionLaw> {
        match self {
            LawArg::Linear => Some(DispersionLaw::Linear),
            LawArg::Quadratic => Some(DispersionLaw::Quadratic),
            LawArg::None => None,
        }
    }
}

/// batch 子命令参数
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Input: data file, or directory containing data files
    pub input: PathBuf,

    /// Output: fit table (single file, default fit_results.csv) or directory
    /// (directory input, default <input>/fits)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub fit: FitOptionArgs,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value_t = 0, env = "NEUTRONFIT_JOBS")]
    pub jobs: usize,

    /// Dispersion law fitted to the peak centers
    #[arg(long, value_enum, default_value = "linear")]
    pub law: LawArg,

    /// Write the dispersion points to this CSV
    #[arg(long)]
    pub dispersion_csv: Option<PathBuf>,

    /// Save a 2×2 summary plot (PNG or SVG by extension)
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// Q index highlighted in the summary plot
    #[arg(long, default_value_t = 0)]
    pub q_index: usize,

    /// Number of rows shown in the result table (0 = all)
    #[arg(long, default_value_t = 20)]
    pub show: usize,

    // ─────────────────────────────────────────────────────────────
    // 多文件参数
    // ─────────────────────────────────────────────────────────────
    /// Glob pattern for input files (directory input, e.g. "*.csv,*.tsv")
    #[arg(long, default_value = "*.csv,*.tsv,*.txt,*.dat")]
    pub pattern: String,

    /// Recurse into subdirectories (directory input)
    #[arg(long, default_value_t = false)]
    pub recursive: bool,

    /// Overwrite existing output files
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}
