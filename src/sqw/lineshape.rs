//! # 谱线线型模型
//!
//! 定义拟合用的物理线型函数：单 Lorentzian、双 Lorentzian 与 Gaussian。
//!
//! ## 参数顺序
//! - Lorentzian: `[A, x0, γ, C]`，γ 为半高全宽
//! - Double Lorentzian: `[A1, x01, γ1, A2, x02, γ2, C]`
//! - Gaussian: `[A, x0, σ, C]`
//!
//! ## 依赖关系
//! - 被 `sqw/optimizer.rs`, `sqw/mcmc.rs`, `sqw/dispersion.rs` 使用
//! - 使用 `models/dataset.rs` 的 ValidPoints

use crate::models::ValidPoints;
use crate::sqw::optimizer::Bounds;

use serde::Serialize;
use std::f64::consts::PI;

/// 中心位置的默认约束 (meV)
const CENTER_BOUND: f64 = 10.0;
/// 宽度下限 (meV)
const WIDTH_MIN: f64 = 0.1;
/// 宽度上限 (meV)
const WIDTH_MAX: f64 = 5.0;

/// 线型模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineShape {
    Lorentzian,
    DoubleLorentzian,
    Gaussian,
}

impl std::fmt::Display for LineShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineShape::Lorentzian => write!(f, "Lorentzian"),
            LineShape::DoubleLorentzian => write!(f, "Double Lorentzian"),
            LineShape::Gaussian => write!(f, "Gaussian"),
        }
    }
}

/// 用户给定的初始参数（四个基本量）
#[derive(Debug, Clone, Copy)]
pub struct InitialGuess {
    pub amplitude: f64,
    pub center: f64,
    pub width: f64,
    pub background: f64,
}

impl Default for InitialGuess {
    fn default() -> Self {
        Self {
            amplitude: 5.0,
            center: 0.0,
            width: 1.0,
            background: 0.1,
        }
    }
}

/// 单个 Lorentzian 峰（不含背景）
pub fn lorentzian(x: f64, amplitude: f64, center: f64, gamma: f64) -> f64 {
    let half = gamma / 2.0;
    let dx = x - center;
    amplitude * half * half / (dx * dx + half * half)
}

/// 单个 Gaussian 峰（不含背景）
pub fn gaussian(x: f64, amplitude: f64, center: f64, sigma: f64) -> f64 {
    let dx = x - center;
    amplitude * (-dx * dx / (2.0 * sigma * sigma)).exp()
}

impl LineShape {
    /// 参数个数
    pub fn n_params(&self) -> usize {
        self.param_names().len()
    }

    /// 参数名称（导出列名与表格使用）
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            LineShape::Lorentzian | LineShape::Gaussian => {
                &["Amplitude", "Center", "Width", "Background"]
            }
            LineShape::DoubleLorentzian => &[
                "Amplitude1",
                "Center1",
                "Width1",
                "Amplitude2",
                "Center2",
                "Width2",
                "Background",
            ],
        }
    }

    /// 计算模型值
    pub fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        match self {
            LineShape::Lorentzian => lorentzian(x, p[0], p[1], p[2]) + p[3],
            LineShape::DoubleLorentzian => {
                lorentzian(x, p[0], p[1], p[2]) + lorentzian(x, p[3], p[4], p[5]) + p[6]
            }
            LineShape::Gaussian => gaussian(x, p[0], p[1], p[2]) + p[3],
        }
    }

    /// 默认参数约束
    ///
    /// 振幅与背景非负，中心在 ±10 meV 内，宽度在 [0.1, 5] meV 内。
    pub fn default_bounds(&self) -> Bounds {
        let peak_lower = [0.0, -CENTER_BOUND, WIDTH_MIN];
        let peak_upper = [f64::INFINITY, CENTER_BOUND, WIDTH_MAX];

        let n_peaks = self.n_peaks();
        let mut lower = Vec::with_capacity(self.n_params());
        let mut upper = Vec::with_capacity(self.n_params());
        for _ in 0..n_peaks {
            lower.extend_from_slice(&peak_lower);
            upper.extend_from_slice(&peak_upper);
        }
        lower.push(0.0);
        upper.push(f64::INFINITY);

        Bounds { lower, upper }
    }

    /// 峰的个数
    pub fn n_peaks(&self) -> usize {
        match self {
            LineShape::DoubleLorentzian => 2,
            _ => 1,
        }
    }

    /// 由用户初始值展开为完整参数向量
    ///
    /// 双 Lorentzian 使用对称猜测：第二个峰在 `-x0`，振幅减半。
    pub fn initial_guess(&self, guess: &InitialGuess) -> Vec<f64> {
        let InitialGuess {
            amplitude,
            center,
            width,
            background,
        } = *guess;

        match self {
            LineShape::Lorentzian | LineShape::Gaussian => {
                vec![amplitude, center, width, background]
            }
            LineShape::DoubleLorentzian => vec![
                amplitude,
                center,
                width,
                amplitude / 2.0,
                -center,
                width,
                background,
            ],
        }
    }

    /// 批量拟合的自动初始值
    ///
    /// A = max S, C = min S, x0 = argmax 处的 ω, 宽度 = 1.0；结果夹在默认约束内。
    pub fn auto_guess(&self, points: &ValidPoints) -> Option<Vec<f64>> {
        let (idx_max, &y_max) = points
            .y
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
        let y_min = points.y.iter().copied().fold(f64::INFINITY, f64::min);

        let guess = InitialGuess {
            amplitude: y_max,
            center: points.x[idx_max],
            width: 1.0,
            background: y_min,
        };

        let mut p0 = self.initial_guess(&guess);
        self.default_bounds().clamp(&mut p0);
        Some(p0)
    }

    /// 第 `peak` 个峰的振幅、中心、宽度参数索引
    pub fn peak_indices(&self, peak: usize) -> (usize, usize, usize) {
        let base = 3 * peak;
        (base, base + 1, base + 2)
    }

    /// 第一个峰的半高全宽
    pub fn fwhm(&self, p: &[f64]) -> f64 {
        match self {
            LineShape::Lorentzian | LineShape::DoubleLorentzian => p[2],
            LineShape::Gaussian => 2.0 * (2.0 * 2.0_f64.ln()).sqrt() * p[2],
        }
    }

    /// 第一个峰的积分强度（不含背景）
    pub fn integrated_intensity(&self, p: &[f64]) -> f64 {
        match self {
            LineShape::Lorentzian | LineShape::DoubleLorentzian => p[0] * PI * p[2] / 2.0,
            LineShape::Gaussian => p[0] * p[2] * (2.0 * PI).sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lorentzian_peak_value() {
        let p = [5.0, 1.0, 0.5, 0.2];
        let peak = LineShape::Lorentzian.evaluate(1.0, &p);
        assert!((peak - 5.2).abs() < 1e-12);

        // 半高处
        let half = LineShape::Lorentzian.evaluate(1.25, &p);
        assert!((half - (2.5 + 0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian_fwhm() {
        let sigma = 0.8;
        let p = [1.0, 0.0, sigma, 0.0];
        let fwhm = LineShape::Gaussian.fwhm(&p);
        let at_half = LineShape::Gaussian.evaluate(fwhm / 2.0, &p);
        assert!((at_half - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_double_lorentzian_guess_is_symmetric() {
        let guess = InitialGuess {
            amplitude: 4.0,
            center: 2.0,
            width: 1.0,
            background: 0.1,
        };
        let p0 = LineShape::DoubleLorentzian.initial_guess(&guess);
        assert_eq!(p0, vec![4.0, 2.0, 1.0, 2.0, -2.0, 1.0, 0.1]);
        assert_eq!(p0.len(), LineShape::DoubleLorentzian.n_params());
    }

    #[test]
    fn test_default_bounds_shape() {
        let b = LineShape::DoubleLorentzian.default_bounds();
        assert_eq!(b.lower.len(), 7);
        assert_eq!(b.lower[2], 0.1);
        assert_eq!(b.upper[5], 5.0);
        assert!(b.upper[6].is_infinite());
    }

    #[test]
    fn test_auto_guess_uses_peak_position() {
        let points = ValidPoints {
            x: vec![-1.0, 0.0, 1.0, 2.0],
            y: vec![0.2, 0.5, 3.0, 0.4],
            sigma: vec![0.1; 4],
        };
        let p0 = LineShape::Lorentzian.auto_guess(&points).unwrap();
        assert_eq!(p0, vec![3.0, 1.0, 1.0, 0.2]);
    }

    #[test]
    fn test_auto_guess_is_clamped() {
        let points = ValidPoints {
            x: vec![-20.0, 0.0],
            y: vec![3.0, -1.0],
            sigma: vec![0.1; 2],
        };
        let p0 = LineShape::Gaussian.auto_guess(&points).unwrap();
        assert_eq!(p0[1], -10.0);
        assert_eq!(p0[3], 0.0);
    }

    #[test]
    fn test_integrated_intensity_lorentzian() {
        // 数值积分对照
        let p = [2.0, 0.0, 0.4, 0.0];
        let step = 0.001;
        let numeric: f64 = (-200_000..200_000)
            .map(|i| lorentzian(i as f64 * step, p[0], p[1], p[2]) * step)
            .sum();
        let analytic = LineShape::Lorentzian.integrated_intensity(&p);
        assert!((numeric - analytic).abs() / analytic < 1e-2);
    }
}
