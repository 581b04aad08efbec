//! # 单谱拟合
//!
//! 对一条 S(ω) 谱执行掩码、约束最小二乘拟合，并可选地进行贝叶斯后验采样。
//!
//! ## 流程
//! 1. 剔除 ω/S 非有限值及 σ ≤ 0 的点
//! 2. 有效点少于 4 个时报错
//! 3. Levenberg–Marquardt 求最优解与协方差
//! 4. `Bayesian` 方法：以最优解为起点进行 MCMC，报告后验均值与标准差
//!
//! ## 依赖关系
//! - 被 `commands/fit.rs` 与 `batch/spectra.rs` 调用
//! - 使用 `sqw/optimizer.rs`, `sqw/mcmc.rs`, `sqw/lineshape.rs`

use crate::error::{NeutronError, Result};
use crate::models::{FitMethod, FitResult, Spectrum};
use crate::sqw::lineshape::LineShape;
use crate::sqw::mcmc::{sample_posterior, McmcOptions};
use crate::sqw::optimizer::{chi_square, levenberg_marquardt, Bounds, LmOptions};

/// 拟合所需的最少有效点数
pub const MIN_POINTS: usize = 4;

/// 拟合选项
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub method: FitMethod,
    pub lm: LmOptions,
    pub mcmc: McmcOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            method: FitMethod::LeastSquares,
            lm: LmOptions::default(),
            mcmc: McmcOptions::default(),
        }
    }
}

/// 拟合单条谱
pub fn fit_spectrum(
    spectrum: &Spectrum,
    shape: LineShape,
    p0: &[f64],
    bounds: &Bounds,
    options: &FitOptions,
) -> Result<FitResult> {
    let m = shape.n_params();
    if p0.len() != m {
        return Err(NeutronError::InvalidArgument(format!(
            "{} model expects {} initial parameters, got {}",
            shape,
            m,
            p0.len()
        )));
    }
    bounds.validate(m)?;

    let points = spectrum.valid_points();
    if points.len() < MIN_POINTS {
        return Err(NeutronError::InsufficientData {
            found: points.len(),
            required: MIN_POINTS,
        });
    }

    let model = |x: f64, p: &[f64]| shape.evaluate(x, p);
    let lsq = levenberg_marquardt(model, &points, p0, bounds, &options.lm)?;

    let n_points = points.len();
    let n_free = n_points.saturating_sub(m);

    let (params, errors, chi2, acceptance_rate) = match options.method {
        FitMethod::LeastSquares => {
            let errors = lsq.errors();
            (lsq.params, errors, lsq.chi2, None)
        }
        FitMethod::Bayesian => {
            // 去掉 χ²_red 缩放，使提议宽度与似然的绝对 σ 一致
            let lsq_red = lsq.chi2 / n_free.max(1) as f64;
            let shrink = if lsq_red.is_finite() && lsq_red > 0.0 {
                lsq_red.sqrt()
            } else {
                1.0
            };
            let scales: Vec<f64> = lsq.errors().iter().map(|e| e / shrink).collect();
            let posterior =
                sample_posterior(model, &points, &lsq.params, &scales, bounds, &options.mcmc)?;
            let chi2 = chi_square(&model, &points, &posterior.mean);
            (
                posterior.mean,
                posterior.std,
                chi2,
                Some(posterior.acceptance_rate),
            )
        }
    };

    if params.iter().chain(errors.iter()).any(|v| !v.is_finite()) {
        return Err(NeutronError::FitFailed(format!(
            "non-finite parameters at Q = {:.4}",
            spectrum.q
        )));
    }

    Ok(FitResult {
        q_index: spectrum.q_index,
        q: spectrum.q,
        shape,
        method: options.method,
        params,
        errors,
        chi2,
        reduced_chi2: chi2 / n_free.max(1) as f64,
        n_points,
        n_free,
        evaluations: lsq.evaluations,
        converged: lsq.converged,
        acceptance_rate,
    })
}

/// 使用自动初始值与默认约束拟合（批量模式）
pub fn fit_spectrum_auto(
    spectrum: &Spectrum,
    shape: LineShape,
    options: &FitOptions,
) -> Result<FitResult> {
    let points = spectrum.valid_points();
    if points.len() < MIN_POINTS {
        return Err(NeutronError::InsufficientData {
            found: points.len(),
            required: MIN_POINTS,
        });
    }

    let p0 = shape
        .auto_guess(&points)
        .ok_or_else(|| NeutronError::FitFailed("cannot estimate initial parameters".into()))?;

    fit_spectrum(spectrum, shape, &p0, &shape.default_bounds(), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqw::InitialGuess;

    fn spectrum_from(shape: LineShape, truth: &[f64]) -> Spectrum {
        let omega: Vec<f64> = (0..201).map(|i| -5.0 + 0.05 * i as f64).collect();
        let intensity: Vec<f64> = omega
            .iter()
            .enumerate()
            .map(|(i, &w)| shape.evaluate(w, truth) + if i % 2 == 0 { 0.02 } else { -0.02 })
            .collect();
        let errors = vec![0.05; omega.len()];
        Spectrum {
            q_index: 3,
            q: 1.5,
            omega,
            intensity,
            errors,
        }
    }

    #[test]
    fn test_fit_lorentzian_with_user_guess() {
        let shape = LineShape::Lorentzian;
        let truth = [5.0, 3.0, 0.8, 0.1];
        let spectrum = spectrum_from(shape, &truth);
        let guess = InitialGuess {
            center: 2.5,
            ..InitialGuess::default()
        };
        let p0 = shape.initial_guess(&guess);

        let result = fit_spectrum(
            &spectrum,
            shape,
            &p0,
            &shape.default_bounds(),
            &FitOptions::default(),
        )
        .unwrap();

        assert_eq!(result.q_index, 3);
        assert!((result.center().0 - 3.0).abs() < 0.01);
        assert!((result.width().0 - 0.8).abs() < 0.02);
        assert_eq!(result.n_points, 201);
        assert_eq!(result.n_free, 197);
        assert!(result.reduced_chi2 < 1.0);
    }

    #[test]
    fn test_fit_auto_double_lorentzian() {
        let shape = LineShape::DoubleLorentzian;
        let truth = [5.0, 2.0, 0.6, 1.0, -2.0, 0.6, 0.1];
        let spectrum = spectrum_from(shape, &truth);

        let result = fit_spectrum_auto(&spectrum, shape, &FitOptions::default()).unwrap();

        assert!((result.params[1] - 2.0).abs() < 0.02);
        assert!((result.params[4] + 2.0).abs() < 0.05);
    }

    #[test]
    fn test_insufficient_points() {
        let spectrum = Spectrum {
            q_index: 0,
            q: 1.0,
            omega: vec![0.0, 1.0, 2.0, 3.0, 4.0],
            intensity: vec![1.0, 2.0, f64::NAN, 1.0, 0.5],
            errors: vec![0.1, 0.1, 0.1, 0.0, 0.1],
        };
        let result = fit_spectrum_auto(&spectrum, LineShape::Lorentzian, &FitOptions::default());
        assert!(matches!(
            result,
            Err(NeutronError::InsufficientData { found: 3, .. })
        ));
    }

    #[test]
    fn test_wrong_parameter_count() {
        let shape = LineShape::Gaussian;
        let spectrum = spectrum_from(shape, &[1.0, 0.0, 1.0, 0.0]);
        let result = fit_spectrum(
            &spectrum,
            shape,
            &[1.0, 0.0],
            &shape.default_bounds(),
            &FitOptions::default(),
        );
        assert!(matches!(result, Err(NeutronError::InvalidArgument(_))));
    }

    #[test]
    fn test_bayesian_fit_reports_acceptance() {
        let shape = LineShape::Gaussian;
        let truth = [2.0, -1.0, 0.7, 0.2];
        let spectrum = spectrum_from(shape, &truth);
        let options = FitOptions {
            method: FitMethod::Bayesian,
            mcmc: McmcOptions {
                n_samples: 4_000,
                burn_in: 1_000,
                seed: Some(5),
                step_scale: 1.0,
            },
            ..FitOptions::default()
        };

        let result = fit_spectrum_auto(&spectrum, shape, &options).unwrap();
        assert_eq!(result.method, FitMethod::Bayesian);
        assert!(result.acceptance_rate.unwrap() > 0.0);
        assert!((result.center().0 + 1.0).abs() < 0.05);
        assert!(result.errors.iter().all(|e| *e > 0.0));
    }

    #[test]
    fn test_bayesian_fit_with_underestimated_errors() {
        // σ 比实际噪声小 5 倍，χ²_red 约为 25
        let shape = LineShape::Lorentzian;
        let truth = [4.0, 1.0, 0.8, 0.2];
        let omega: Vec<f64> = (0..161).map(|i| -4.0 + 0.05 * i as f64).collect();
        let intensity: Vec<f64> = omega
            .iter()
            .enumerate()
            .map(|(i, &w)| shape.evaluate(w, &truth) + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let spectrum = Spectrum {
            q_index: 0,
            q: 1.0,
            errors: vec![0.02; omega.len()],
            omega,
            intensity,
        };
        let options = FitOptions {
            method: FitMethod::Bayesian,
            mcmc: McmcOptions {
                n_samples: 4_000,
                burn_in: 1_000,
                seed: Some(9),
                step_scale: 1.0,
            },
            ..FitOptions::default()
        };

        let result = fit_spectrum_auto(&spectrum, shape, &options).unwrap();
        assert!(result.reduced_chi2 > 10.0);
        let rate = result.acceptance_rate.unwrap();
        assert!(rate > 0.05 && rate < 0.9, "acceptance {}", rate);
        assert!(result.errors.iter().all(|e| *e > 0.0));
        assert!((result.center().0 - 1.0).abs() < 0.05);
    }
}
