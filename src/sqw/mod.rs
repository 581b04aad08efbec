//! # S(Q,ω) 谱拟合模块
//!
//! 提供中子散射谱的线形拟合、后验采样、色散分析与图表生成。
//!
//! ## 子模块
//! - `lineshape`: 线形模型（Lorentzian / Double Lorentzian / Gaussian）
//! - `optimizer`: 带边界的 Levenberg–Marquardt 加权最小二乘
//! - `mcmc`: Metropolis–Hastings 后验采样
//! - `fit`: 单谱拟合入口
//! - `dispersion`: 峰位提取与色散律拟合
//! - `sample`: 合成样例数据
//! - `export`: 结果导出
//! - `plot`: 图表生成
//!
//! ## 依赖关系
//! - 被 `commands/` 与 `batch/spectra.rs` 使用
//! - 使用 `models/dataset.rs`, `models/fit.rs`

pub mod dispersion;
pub mod export;
pub mod fit;
pub mod lineshape;
pub mod mcmc;
pub mod optimizer;
pub mod plot;
pub mod sample;

pub use dispersion::DispersionLaw;
pub use fit::{fit_spectrum, fit_spectrum_auto, FitOptions};
pub use lineshape::{InitialGuess, LineShape};
pub use mcmc::McmcOptions;
pub use optimizer::LmOptions;
