//! # info / sample 子命令 CLI 定义
//!
//! 查看数据文件概况、生成合成样例数据。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/info.rs`, `commands/sample.rs`

use clap::Args;
use std::path::PathBuf;

/// info 子命令参数
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Input S(Q,ω) data file
    pub input: PathBuf,

    /// Also list every Q value with its number of valid points
    #[arg(long, default_value_t = false)]
    pub spectra: bool,
}

/// sample 子命令参数
#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Output CSV file
    #[arg(short, long, default_value = "sample_data.csv")]
    pub output: PathBuf,

    /// Random seed for the noise
    #[arg(long, env = "NEUTRONFIT_SEED")]
    pub seed: Option<u64>,

    /// Number of Q points
    #[arg(long, default_value_t = 50)]
    pub n_q: usize,

    /// Number of ω points
    #[arg(long, default_value_t = 200)]
    pub n_omega: usize,

    /// Sound velocity c of the linear dispersion ω0 = c·Q
    #[arg(long, default_value_t = 2.0)]
    pub velocity: f64,

    /// Standard deviation of the Gaussian noise
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Overwrite an existing output file
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,
}
