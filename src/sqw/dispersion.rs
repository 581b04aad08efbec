//! # 色散关系提取
//!
//! 从批量拟合结果中提取峰位 E(Q)，并用加权线性最小二乘拟合色散律。
//!
//! ## 色散律
//! - Linear: ω = c·Q + ω0（声学型）
//! - Quadratic: ω = Δ + D·Q²（铁磁自旋波型，Δ 为能隙，D 为自旋波刚度）
//!
//! 两者对系数都是线性的：行按 √w 缩放后用 SVD 求解，w = 1/σ²。
//! 系数误差取 `(XᵀWX)⁻¹` 对角线，自由度大于零时按 χ²_red 缩放。
//!
//! ## 依赖关系
//! - 被 `commands/batch.rs` 调用
//! - 使用 `models/fit.rs` 的 FitResult
//! - 使用 `nalgebra` SVD

use crate::error::{NeutronError, Result};
use crate::models::FitResult;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

/// 色散点
#[derive(Debug, Clone, Serialize)]
pub struct DispersionPoint {
    pub q_index: usize,
    pub q: f64,
    pub energy: f64,
    pub energy_error: f64,
    pub width: f64,
    pub width_error: f64,
    pub amplitude: f64,
    pub amplitude_error: f64,
}

/// 按 Q 升序提取成功拟合的峰位
pub fn extract(results: &[Option<FitResult>]) -> Vec<DispersionPoint> {
    let mut points: Vec<DispersionPoint> = results
        .iter()
        .flatten()
        .map(|r| {
            let (energy, energy_error) = r.center();
            let (width, width_error) = r.width();
            let (amplitude, amplitude_error) = r.amplitude();
            DispersionPoint {
                q_index: r.q_index,
                q: r.q,
                energy,
                energy_error,
                width,
                width_error,
                amplitude,
                amplitude_error,
            }
        })
        .collect();

    points.sort_by(|a, b| a.q.partial_cmp(&b.q).unwrap_or(std::cmp::Ordering::Equal));
    points
}

/// 色散律
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispersionLaw {
    Linear,
    Quadratic,
}

impl std::fmt::Display for DispersionLaw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispersionLaw::Linear => write!(f, "ω = c·Q + ω0"),
            DispersionLaw::Quadratic => write!(f, "ω = Δ + D·Q²"),
        }
    }
}

impl DispersionLaw {
    pub fn coefficient_names(&self) -> &'static [&'static str] {
        match self {
            DispersionLaw::Linear => &["c (meV·Å)", "ω0 (meV)"],
            DispersionLaw::Quadratic => &["Δ (meV)", "D (meV·Å²)"],
        }
    }

    pub fn n_coefficients(&self) -> usize {
        self.coefficient_names().len()
    }

    /// 设计矩阵的一行
    fn basis(&self, q: f64) -> [f64; 2] {
        match self {
            DispersionLaw::Linear => [q, 1.0],
            DispersionLaw::Quadratic => [1.0, q * q],
        }
    }

    pub fn evaluate(&self, q: f64, coefficients: &[f64]) -> f64 {
        let row = self.basis(q);
        row[0] * coefficients[0] + row[1] * coefficients[1]
    }
}

/// 色散律拟合结果
#[derive(Debug, Clone)]
pub struct DispersionFit {
    pub law: DispersionLaw,
    pub coefficients: Vec<f64>,
    pub errors: Vec<f64>,
    pub chi2: f64,
    pub reduced_chi2: f64,
    pub n_points: usize,
}

impl DispersionFit {
    pub fn predict(&self, q: f64) -> f64 {
        self.law.evaluate(q, &self.coefficients)
    }
}

/// SVD 最小二乘；逐步放宽容差以容忍近奇异矩阵
fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// 加权线性拟合色散律
pub fn fit_law(points: &[DispersionPoint], law: DispersionLaw) -> Result<DispersionFit> {
    let usable: Vec<&DispersionPoint> = points
        .iter()
        .filter(|p| p.q.is_finite() && p.energy.is_finite())
        .collect();

    let k = law.n_coefficients();
    if usable.len() < k {
        return Err(NeutronError::InsufficientData {
            found: usable.len(),
            required: k,
        });
    }

    let n = usable.len();
    let mut x = DMatrix::zeros(n, k);
    let mut y = DVector::zeros(n);

    for (i, p) in usable.iter().enumerate() {
        let w = if p.energy_error.is_finite() && p.energy_error > 0.0 {
            1.0 / (p.energy_error * p.energy_error)
        } else {
            1.0
        };
        let sw = w.sqrt();
        let row = law.basis(p.q);
        for j in 0..k {
            x[(i, j)] = row[j] * sw;
        }
        y[i] = p.energy * sw;
    }

    let beta = solve_least_squares(&x, &y).ok_or_else(|| {
        NeutronError::FitFailed("dispersion design matrix is singular".to_string())
    })?;

    let resid = &y - &x * &beta;
    let chi2 = resid.dot(&resid);
    let dof = n.saturating_sub(k);
    let reduced_chi2 = if dof > 0 { chi2 / dof as f64 } else { 0.0 };

    let errors = match (x.transpose() * &x).try_inverse() {
        Some(inv) => {
            let scale = if dof > 0 { reduced_chi2 } else { 1.0 };
            (0..k)
                .map(|j| (inv[(j, j)] * scale).max(0.0).sqrt())
                .collect()
        }
        None => vec![0.0; k],
    };

    Ok(DispersionFit {
        law,
        coefficients: beta.iter().copied().collect(),
        errors,
        chi2,
        reduced_chi2,
        n_points: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FitMethod;
    use crate::sqw::LineShape;

    fn point(q: f64, energy: f64, err: f64) -> DispersionPoint {
        DispersionPoint {
            q_index: 0,
            q,
            energy,
            energy_error: err,
            width: 0.5,
            width_error: 0.01,
            amplitude: 5.0,
            amplitude_error: 0.1,
        }
    }

    #[test]
    fn test_linear_law_exact() {
        let points: Vec<_> = (1..=10)
            .map(|i| {
                let q = 0.3 * i as f64;
                point(q, 2.0 * q + 0.1, 0.05)
            })
            .collect();

        let fit = fit_law(&points, DispersionLaw::Linear).unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-9);
        assert!((fit.coefficients[1] - 0.1).abs() < 1e-9);
        assert!((fit.predict(1.0) - 2.1).abs() < 1e-9);
    }

    #[test]
    fn test_quadratic_law_with_scatter() {
        let points: Vec<_> = (0..12)
            .map(|i| {
                let q = 0.2 * i as f64;
                let wiggle = if i % 2 == 0 { 0.01 } else { -0.01 };
                point(q, 0.5 + 3.0 * q * q + wiggle, 0.02)
            })
            .collect();

        let fit = fit_law(&points, DispersionLaw::Quadratic).unwrap();
        assert!((fit.coefficients[0] - 0.5).abs() < 0.02);
        assert!((fit.coefficients[1] - 3.0).abs() < 0.02);
        assert!(fit.errors.iter().all(|e| *e > 0.0));
        assert_eq!(fit.n_points, 12);
    }

    #[test]
    fn test_zero_error_gets_unit_weight() {
        let points = vec![point(1.0, 2.0, 0.0), point(2.0, 4.0, 0.0), point(3.0, 6.0, 0.0)];
        let fit = fit_law(&points, DispersionLaw::Linear).unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_points() {
        let points = vec![point(1.0, 2.0, 0.1)];
        assert!(fit_law(&points, DispersionLaw::Linear).is_err());
    }

    #[test]
    fn test_extract_skips_failed_and_sorts() {
        let make = |q_index: usize, q: f64, center: f64| FitResult {
            q_index,
            q,
            shape: LineShape::Lorentzian,
            method: FitMethod::LeastSquares,
            params: vec![5.0, center, 0.6, 0.1],
            errors: vec![0.1, 0.02, 0.03, 0.01],
            chi2: 1.0,
            reduced_chi2: 1.0,
            n_points: 10,
            n_free: 6,
            evaluations: 20,
            converged: true,
            acceptance_rate: None,
        };
        let results = vec![Some(make(0, 2.0, 4.0)), None, Some(make(2, 1.0, 2.0))];

        let points = extract(&results);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].q, 1.0);
        assert_eq!(points[0].q_index, 2);
        assert_eq!(points[1].energy, 4.0);
        assert_eq!(points[1].energy_error, 0.02);
    }
}
