//! # 拟合结果数据模型
//!
//! 存储单条谱的拟合参数、误差与拟合优度。
//!
//! ## 依赖关系
//! - 被 `sqw/fit.rs` 生成
//! - 被 `sqw/dispersion.rs`, `sqw/export.rs`, `sqw/plot.rs`, `commands/` 使用

use crate::sqw::LineShape;

use serde::Serialize;

/// 拟合方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FitMethod {
    /// 加权最小二乘（Levenberg–Marquardt）
    LeastSquares,
    /// 贝叶斯后验采样（Metropolis–Hastings）
    Bayesian,
}

impl std::fmt::Display for FitMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitMethod::LeastSquares => write!(f, "least-squares"),
            FitMethod::Bayesian => write!(f, "bayesian"),
        }
    }
}

/// 单条谱的拟合结果
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Q 索引
    pub q_index: usize,
    /// Q 值
    pub q: f64,
    /// 线型
    pub shape: LineShape,
    /// 拟合方法
    pub method: FitMethod,
    /// 参数值（贝叶斯为后验均值）
    pub params: Vec<f64>,
    /// 参数误差（贝叶斯为后验标准差）
    pub errors: Vec<f64>,
    /// χ²
    pub chi2: f64,
    /// χ² / 自由度
    pub reduced_chi2: f64,
    /// 参与拟合的数据点数
    pub n_points: usize,
    /// 自由度 n − m
    pub n_free: usize,
    /// 模型评估次数
    pub evaluations: usize,
    /// 优化器是否收敛
    pub converged: bool,
    /// MCMC 接受率（仅贝叶斯）
    pub acceptance_rate: Option<f64>,
}

impl FitResult {
    /// 按名称查找参数值及误差
    pub fn param(&self, name: &str) -> Option<(f64, f64)> {
        let idx = self
            .shape
            .param_names()
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))?;
        Some((self.params[idx], self.errors[idx]))
    }

    /// 第一个峰的中心及误差
    pub fn center(&self) -> (f64, f64) {
        let (_, c, _) = self.shape.peak_indices(0);
        (self.params[c], self.errors[c])
    }

    /// 第一个峰的宽度及误差
    pub fn width(&self) -> (f64, f64) {
        let (_, _, w) = self.shape.peak_indices(0);
        (self.params[w], self.errors[w])
    }

    /// 第一个峰的振幅及误差
    pub fn amplitude(&self) -> (f64, f64) {
        let (a, _, _) = self.shape.peak_indices(0);
        (self.params[a], self.errors[a])
    }

    /// 在 x 处计算拟合曲线
    pub fn evaluate(&self, x: f64) -> f64 {
        self.shape.evaluate(x, &self.params)
    }
}
