//! # fit 子命令 CLI 定义
//!
//! 拟合单条 S(ω) 谱，并定义拟合相关的共享参数。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs`, `cli/batch.rs`, `cli/plot.rs` 使用
//! - 参数传递给 `commands/fit.rs`

use crate::models::FitMethod;
use crate::sqw::{FitOptions, LineShape, LmOptions, McmcOptions};

use clap::{Args, ValueEnum};
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

// ─────────────────────────────────────────────────────────────
// 共享枚举
// ─────────────────────────────────────────────────────────────

/// 线形模型
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum ModelArg {
    /// Single Lorentzian peak plus constant background
    #[default]
    Lorentzian,
    /// Two Lorentzian peaks plus constant background
    DoubleLorentzian,
    /// Single Gaussian peak plus constant background
    Gaussian,
}

impl std::fmt::Display for ModelArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelArg::Lorentzian => write!(f, "lorentzian"),
            ModelArg::DoubleLorentzian => write!(f, "double-lorentzian"),
            ModelArg::Gaussian => write!(f, "gaussian"),
        }
    }
}

impl From<ModelArg> for LineShape {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Lorentzian => LineShape::Lorentzian,
            ModelArg::DoubleLorentzian => LineShape::DoubleLorentzian,
            ModelArg::Gaussian => LineShape::Gaussian,
        }
    }
}

/// 拟合方法
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum MethodArg {
    /// Bounded Levenberg–Marquardt least squares
    #[default]
    Lsq,
    /// Least squares followed by Metropolis–Hastings posterior sampling
    Bayes,
}

impl std::fmt::Display for MethodArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodArg::Lsq => write!(f, "lsq"),
            MethodArg::Bayes => write!(f, "bayes"),
        }
    }
}

impl From<MethodArg> for FitMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Lsq => FitMethod::LeastSquares,
            MethodArg::Bayes => FitMethod::Bayesian,
        }
    }
}

/// 解析范围参数（如 "-5:5"、"0.5:2.5"）
pub fn parse_range(input: &str) -> Result<(f64, f64), String> {
    static RANGE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RANGE
        .get_or_init(|| {
            Regex::new(r"^\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*:\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*$").ok()
        })
        .as_ref()
        .ok_or_else(|| "range pattern unavailable".to_string())?;

    let caps = re
        .captures(input)
        .ok_or_else(|| format!("Invalid range '{}'. Expected 'min:max', e.g. -5:5", input))?;

    let min: f64 = caps[1]
        .parse()
        .map_err(|_| format!("Invalid lower bound in '{}'", input))?;
    let max: f64 = caps[2]
        .parse()
        .map_err(|_| format!("Invalid upper bound in '{}'", input))?;

    if max <= min {
        return Err(format!("Invalid range '{}' (min must be below max)", input));
    }

    Ok((min, max))
}

// ─────────────────────────────────────────────────────────────
// 共享拟合参数
// ─────────────────────────────────────────────────────────────

/// fit / batch / plot 共用的拟合参数
#[derive(Args, Debug, Clone)]
pub struct FitOptionArgs {
    /// Line shape model
    #[arg(short, long, value_enum, default_value = "lorentzian")]
    pub model: ModelArg,

    /// Fitting method
    #[arg(long, value_enum, default_value = "lsq")]
    pub method: MethodArg,

    /// Maximum number of model evaluations for least squares
    #[arg(long, default_value_t = 5000)]
    pub max_evaluations: usize,

    /// Posterior samples kept after burn-in (bayes only)
    #[arg(long, default_value_t = 20000)]
    pub samples: usize,

    /// Burn-in steps discarded before sampling (bayes only)
    #[arg(long, default_value_t = 5000)]
    pub burn_in: usize,

    /// Random seed for posterior sampling
    #[arg(long, env = "NEUTRONFIT_SEED")]
    pub seed: Option<u64>,

    /// Only fit points with ω inside this window (e.g. "-5:5")
    #[arg(long, value_parser = parse_range, allow_hyphen_values = true)]
    pub omega_range: Option<(f64, f64)>,
}

impl FitOptionArgs {
    pub fn shape(&self) -> LineShape {
        self.model.into()
    }

    pub fn to_options(&self) -> FitOptions {
        FitOptions {
            method: self.method.into(),
            lm: LmOptions {
                max_evaluations: self.max_evaluations,
                ..LmOptions::default()
            },
            mcmc: McmcOptions {
                n_samples: self.samples,
                burn_in: self.burn_in,
                seed: self.seed,
                ..McmcOptions::default()
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────
// fit 子命令
// ─────────────────────────────────────────────────────────────

/// fit 子命令参数
#[derive(Args, Debug)]
pub struct FitArgs {
    /// Input S(Q,ω) data file (.csv, .tsv, .txt, .dat)
    pub input: PathBuf,

    /// Index of the Q spectrum to fit
    #[arg(long, conflicts_with = "q")]
    pub q_index: Option<usize>,

    /// Fit the spectrum nearest to this Q value (Å⁻¹)
    #[arg(long)]
    pub q: Option<f64>,

    #[command(flatten)]
    pub fit: FitOptionArgs,

    /// Initial amplitude
    #[arg(long, default_value_t = 5.0)]
    pub amplitude: f64,

    /// Initial peak center (meV)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub center: f64,

    /// Initial peak width (meV)
    #[arg(long, default_value_t = 1.0)]
    pub width: f64,

    /// Initial constant background
    #[arg(long, default_value_t = 0.1, allow_hyphen_values = true)]
    pub background: f64,

    /// Estimate initial parameters from the data instead
    #[arg(long, default_value_t = false)]
    pub auto_guess: bool,

    /// Save a plot of the fit (PNG or SVG by extension)
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// Figure width in pixels
    #[arg(long, default_value_t = 1000)]
    pub plot_width: u32,

    /// Figure height in pixels
    #[arg(long, default_value_t = 700)]
    pub plot_height: u32,
}
