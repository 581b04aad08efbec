//! # 带约束的 Levenberg–Marquardt 加权最小二乘
//!
//! 最小化 χ² = Σ ((y − f(x; p)) / σ)²。
//!
//! ## 算法概述
//! 1. 初值夹入约束盒
//! 2. 前向差分计算加权 Jacobian
//! 3. 求解 (JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr
//! 4. 步长投影回约束盒；χ² 下降则接受并缩小 λ，否则放大 λ
//! 5. χ² 相对变化或步长低于容差时收敛
//!
//! 协方差取 `(JᵀJ)⁻¹ · χ²/max(n − m, 1)`（相对误差约定，与 scipy `curve_fit` 默认一致）。
//!
//! ## 依赖关系
//! - 被 `sqw/fit.rs` 调用
//! - 使用 `nalgebra` 进行线性代数运算

use crate::error::{NeutronError, Result};
use crate::models::ValidPoints;

use nalgebra::{DMatrix, DVector};

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;

/// 参数约束盒
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    /// 检查维度与上下限顺序
    pub fn validate(&self, n_params: usize) -> Result<()> {
        if self.lower.len() != n_params || self.upper.len() != n_params {
            return Err(NeutronError::InvalidBounds(format!(
                "expected {} lower/upper values, got {}/{}",
                n_params,
                self.lower.len(),
                self.upper.len()
            )));
        }

        for (i, (lo, hi)) in self.lower.iter().zip(self.upper.iter()).enumerate() {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(NeutronError::InvalidBounds(format!(
                    "parameter {}: lower {} > upper {}",
                    i, lo, hi
                )));
            }
        }

        Ok(())
    }

    /// 将参数夹入约束盒
    pub fn clamp(&self, p: &mut [f64]) {
        for ((v, lo), hi) in p.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = v.clamp(*lo, *hi);
        }
    }

    pub fn contains(&self, p: &[f64]) -> bool {
        p.iter()
            .zip(&self.lower)
            .zip(&self.upper)
            .all(|((v, lo), hi)| *v >= *lo && *v <= *hi)
    }
}

/// 优化器选项
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    /// 最大函数评估次数（以整条谱计）
    pub max_evaluations: usize,
    /// χ² 相对变化与步长的收敛容差
    pub tolerance: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 5000,
            tolerance: 1e-10,
        }
    }
}

/// 优化结果
#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: Vec<f64>,
    /// 参数协方差（奇异时为 None）
    pub covariance: Option<DMatrix<f64>>,
    pub chi2: f64,
    pub evaluations: usize,
    pub converged: bool,
}

impl LmSolution {
    /// 协方差对角线开方；奇异时为零
    pub fn errors(&self) -> Vec<f64> {
        match &self.covariance {
            Some(cov) => (0..self.params.len())
                .map(|i| {
                    let v = cov[(i, i)];
                    if v.is_finite() && v > 0.0 {
                        v.sqrt()
                    } else {
                        0.0
                    }
                })
                .collect(),
            None => vec![0.0; self.params.len()],
        }
    }
}

/// 计算 χ²
pub fn chi_square<F>(model: &F, points: &ValidPoints, p: &[f64]) -> f64
where
    F: Fn(f64, &[f64]) -> f64,
{
    points
        .x
        .iter()
        .zip(&points.y)
        .zip(&points.sigma)
        .map(|((&x, &y), &s)| {
            let r = (y - model(x, p)) / s;
            r * r
        })
        .sum()
}

/// 加权残差向量 r_i = (y_i − f_i) / σ_i
fn residuals<F>(model: &F, points: &ValidPoints, p: &[f64]) -> DVector<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    DVector::from_iterator(
        points.len(),
        points
            .x
            .iter()
            .zip(&points.y)
            .zip(&points.sigma)
            .map(|((&x, &y), &s)| (y - model(x, p)) / s),
    )
}

/// 前向差分加权 Jacobian J_ij = ∂f(x_i)/∂p_j / σ_i
///
/// 参数贴近上限时改用后向差分，保证评估点在约束盒内。
fn jacobian<F>(model: &F, points: &ValidPoints, p: &[f64], bounds: &Bounds) -> DMatrix<f64>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = points.len();
    let m = p.len();
    let mut jac = DMatrix::zeros(n, m);
    let base: Vec<f64> = points.x.iter().map(|&x| model(x, p)).collect();

    let mut shifted = p.to_vec();
    for j in 0..m {
        let mut h = f64::EPSILON.sqrt() * p[j].abs().max(1.0);
        if p[j] + h > bounds.upper[j] {
            h = -h;
        }
        shifted[j] = p[j] + h;

        for i in 0..n {
            let f = model(points.x[i], &shifted);
            jac[(i, j)] = (f - base[i]) / h / points.sigma[i];
        }

        shifted[j] = p[j];
    }

    jac
}

/// 求解阻尼正规方程
fn solve_damped(jtj: &DMatrix<f64>, jtr: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let mut a = jtj.clone();
    for i in 0..a.nrows() {
        a[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
    }

    if let Some(chol) = a.clone().cholesky() {
        return Some(chol.solve(jtr));
    }
    a.lu().solve(jtr)
}

/// 带约束的 Levenberg–Marquardt
pub fn levenberg_marquardt<F>(
    model: F,
    points: &ValidPoints,
    p0: &[f64],
    bounds: &Bounds,
    options: &LmOptions,
) -> Result<LmSolution>
where
    F: Fn(f64, &[f64]) -> f64,
{
    bounds.validate(p0.len())?;

    let mut p = p0.to_vec();
    bounds.clamp(&mut p);

    let mut chi2 = chi_square(&model, points, &p);
    if !chi2.is_finite() {
        return Err(NeutronError::FitFailed(
            "model is not finite at the initial parameters".to_string(),
        ));
    }

    let m = p.len();
    let mut evaluations = 1;
    let mut lambda = LAMBDA_INIT;
    let mut converged = false;

    'outer: while evaluations < options.max_evaluations {
        let jac = jacobian(&model, points, &p, bounds);
        evaluations += m;

        let r = residuals(&model, points, &p);
        let jt = jac.transpose();
        let jtj = &jt * &jac;
        let jtr = &jt * r;

        loop {
            if evaluations >= options.max_evaluations {
                break 'outer;
            }

            let delta = match solve_damped(&jtj, &jtr, lambda) {
                Some(d) => d,
                None => {
                    lambda *= 10.0;
                    if lambda > LAMBDA_MAX {
                        converged = true;
                        break 'outer;
                    }
                    continue;
                }
            };

            let mut trial: Vec<f64> = p.iter().zip(delta.iter()).map(|(a, d)| a + d).collect();
            bounds.clamp(&mut trial);

            let trial_chi2 = chi_square(&model, points, &trial);
            evaluations += 1;

            if trial_chi2.is_finite() && trial_chi2 < chi2 {
                let step: f64 = trial
                    .iter()
                    .zip(&p)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                let scale: f64 = p.iter().map(|v| v * v).sum::<f64>().sqrt();
                let rel_change = (chi2 - trial_chi2) / chi2.max(f64::MIN_POSITIVE);

                p = trial;
                chi2 = trial_chi2;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);

                if rel_change < options.tolerance
                    || step < options.tolerance * (scale + options.tolerance)
                {
                    converged = true;
                    break 'outer;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // 无法继续下降：已处于（约束）极小值
                converged = true;
                break 'outer;
            }
        }
    }

    if p.iter().any(|v| !v.is_finite()) {
        return Err(NeutronError::FitFailed(
            "optimizer produced non-finite parameters".to_string(),
        ));
    }

    let covariance = covariance(&model, points, &p, bounds, chi2);

    Ok(LmSolution {
        params: p,
        covariance,
        chi2,
        evaluations,
        converged,
    })
}

/// 协方差 (JᵀJ)⁻¹ · χ²/max(n − m, 1)
fn covariance<F>(
    model: &F,
    points: &ValidPoints,
    p: &[f64],
    bounds: &Bounds,
    chi2: f64,
) -> Option<DMatrix<f64>>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let jac = jacobian(model, points, p, bounds);
    let jtj = jac.transpose() * &jac;
    let inv = jtj.try_inverse()?;

    let dof = points.len().saturating_sub(p.len());
    scale_covariance(inv, chi2, dof)
}

/// 按 χ²_red 缩放；与拟合结果的 χ²_red 约定一致
fn scale_covariance(inv: DMatrix<f64>, chi2: f64, dof: usize) -> Option<DMatrix<f64>> {
    let cov = inv * (chi2 / dof.max(1) as f64);
    if cov.iter().all(|v| v.is_finite()) {
        Some(cov)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqw::LineShape;

    fn synthetic(shape: LineShape, p: &[f64], wiggle: f64) -> ValidPoints {
        let x: Vec<f64> = (0..121).map(|i| -6.0 + 0.1 * i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                shape.evaluate(x, p) + sign * wiggle
            })
            .collect();
        let n = x.len();
        ValidPoints {
            x,
            y,
            sigma: vec![0.1; n],
        }
    }

    #[test]
    fn test_recovers_lorentzian() {
        let truth = [5.0, 1.2, 0.8, 0.3];
        let points = synthetic(LineShape::Lorentzian, &truth, 0.0);
        let shape = LineShape::Lorentzian;

        let sol = levenberg_marquardt(
            |x, p| shape.evaluate(x, p),
            &points,
            &[4.0, 1.0, 1.0, 0.1],
            &shape.default_bounds(),
            &LmOptions::default(),
        )
        .unwrap();

        for (fit, want) in sol.params.iter().zip(truth.iter()) {
            assert!((fit - want).abs() < 1e-5, "{:?}", sol.params);
        }
        assert!(sol.chi2 < 1e-8);
    }

    #[test]
    fn test_errors_positive_with_noise() {
        let truth = [3.0, -0.5, 0.6, 0.2];
        let points = synthetic(LineShape::Gaussian, &truth, 0.05);
        let shape = LineShape::Gaussian;

        let sol = levenberg_marquardt(
            |x, p| shape.evaluate(x, p),
            &points,
            &[2.0, 0.0, 1.0, 0.1],
            &shape.default_bounds(),
            &LmOptions::default(),
        )
        .unwrap();

        let errors = sol.errors();
        assert!(errors.iter().all(|e| e.is_finite() && *e > 0.0));
        assert!((sol.params[1] + 0.5).abs() < 0.05);
    }

    #[test]
    fn test_respects_bounds() {
        let truth = [5.0, 3.0, 0.8, 0.3];
        let points = synthetic(LineShape::Lorentzian, &truth, 0.0);
        let shape = LineShape::Lorentzian;
        let mut bounds = shape.default_bounds();
        bounds.upper[1] = 2.0;

        let sol = levenberg_marquardt(
            |x, p| shape.evaluate(x, p),
            &points,
            &[4.0, 1.5, 1.0, 0.1],
            &bounds,
            &LmOptions::default(),
        )
        .unwrap();

        assert!(bounds.contains(&sol.params));
        assert!(sol.params[1] <= 2.0);
    }

    #[test]
    fn test_invalid_bounds() {
        let bounds = Bounds {
            lower: vec![1.0, 0.0],
            upper: vec![0.0, 1.0],
        };
        assert!(bounds.validate(2).is_err());
        assert!(bounds.validate(3).is_err());
        let open = Bounds {
            lower: vec![f64::NEG_INFINITY; 2],
            upper: vec![f64::INFINITY; 2],
        };
        assert!(open.validate(2).is_ok());
    }

    #[test]
    fn test_evaluation_cap() {
        let truth = [5.0, 1.2, 0.8, 0.3];
        let points = synthetic(LineShape::Lorentzian, &truth, 0.0);
        let shape = LineShape::Lorentzian;
        let options = LmOptions {
            max_evaluations: 10,
            tolerance: 1e-14,
        };

        let sol = levenberg_marquardt(
            |x, p| shape.evaluate(x, p),
            &points,
            &[1.0, -2.0, 3.0, 0.0],
            &shape.default_bounds(),
            &options,
        )
        .unwrap();

        assert!(sol.evaluations <= 10 + shape.n_params());
    }

    #[test]
    fn test_zero_dof_scales_by_chi2() {
        let inv = DMatrix::identity(2, 2);
        let cov = scale_covariance(inv.clone(), 4.0, 0).unwrap();
        assert_eq!(cov[(0, 0)], 4.0);
        let cov = scale_covariance(inv, 4.0, 8).unwrap();
        assert_eq!(cov[(1, 1)], 0.5);
    }

    #[test]
    fn test_singular_matrix_gives_zero_errors() {
        // 峰远在数据窗口之外，峰参数对 χ² 无影响
        let shape = LineShape::Gaussian;
        let x: Vec<f64> = (0..21).map(|i| 0.1 * i as f64).collect();
        let y: Vec<f64> = (0..21)
            .map(|i| if i % 2 == 0 { 0.12 } else { 0.08 })
            .collect();
        let points = ValidPoints {
            sigma: vec![0.05; x.len()],
            x,
            y,
        };

        let sol = levenberg_marquardt(
            |x, p| shape.evaluate(x, p),
            &points,
            &[1.0, 9.0, 0.5, 0.5],
            &shape.default_bounds(),
            &LmOptions::default(),
        )
        .unwrap();

        assert!(sol.covariance.is_none());
        assert_eq!(sol.errors(), vec![0.0; 4]);
        assert!(sol.converged);
        assert!((sol.params[3] - 0.1).abs() < 0.01);
    }
}
