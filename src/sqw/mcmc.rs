//! # 贝叶斯后验采样（Metropolis–Hastings）
//!
//! 在约束盒内取均匀先验（无穷边界即为非正常平坦先验），似然为 `exp(−χ²/2)`。
//! 随机游走从最小二乘最优解出发，提议宽度取自最小二乘误差（按 √χ²_red 还原为绝对 σ 尺度）。
//! 预热阶段每 100 步按窗口接受率调节步长，目标约 0.25；预热结束后步长固定。
//!
//! ## 依赖关系
//! - 被 `sqw/fit.rs` 调用
//! - 使用 `rand` / `rand_distr` 生成提议步长

use crate::error::{NeutronError, Result};
use crate::models::ValidPoints;
use crate::sqw::optimizer::{chi_square, Bounds};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

/// 预热期步长调节窗口
const ADAPT_WINDOW: usize = 100;
/// 目标接受率
const TARGET_ACCEPTANCE: f64 = 0.25;

/// MCMC 选项
#[derive(Debug, Clone, Copy)]
pub struct McmcOptions {
    /// 保留的后验样本数（不含 burn-in）
    pub n_samples: usize,
    /// 丢弃的预热步数
    pub burn_in: usize,
    /// 随机种子（None 时取系统熵）
    pub seed: Option<u64>,
    /// 提议宽度缩放因子
    pub step_scale: f64,
}

impl Default for McmcOptions {
    fn default() -> Self {
        Self {
            n_samples: 20_000,
            burn_in: 5_000,
            seed: None,
            step_scale: 1.0,
        }
    }
}

/// 后验统计量
#[derive(Debug, Clone)]
pub struct Posterior {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub acceptance_rate: f64,
}

/// 参数维度的提议宽度；无效时回退到 1% |p| 或 1e-3
fn proposal_widths(start: &[f64], scales: &[f64], step_scale: f64) -> Vec<f64> {
    let d = start.len().max(1) as f64;
    let factor = step_scale * 2.38 / d.sqrt();

    start
        .iter()
        .zip(scales.iter().chain(std::iter::repeat(&0.0)))
        .map(|(p, s)| {
            let width = if s.is_finite() && *s > 0.0 {
                *s
            } else if p.abs() > 0.0 {
                0.01 * p.abs()
            } else {
                1e-3
            };
            width * factor
        })
        .collect()
}

/// Metropolis–Hastings 随机游走采样
pub fn sample_posterior<F>(
    model: F,
    points: &ValidPoints,
    start: &[f64],
    scales: &[f64],
    bounds: &Bounds,
    options: &McmcOptions,
) -> Result<Posterior>
where
    F: Fn(f64, &[f64]) -> f64,
{
    if options.n_samples == 0 {
        return Err(NeutronError::InvalidArgument(
            "MCMC sample count must be > 0".to_string(),
        ));
    }
    bounds.validate(start.len())?;

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| NeutronError::Other(format!("Proposal distribution error: {e}")))?;

    let base = proposal_widths(start, scales, options.step_scale);
    let d = start.len();

    let mut current = start.to_vec();
    bounds.clamp(&mut current);
    let mut current_chi2 = chi_square(&model, points, &current);
    if !current_chi2.is_finite() {
        return Err(NeutronError::FitFailed(
            "posterior is not finite at the starting point".to_string(),
        ));
    }

    let total = options.burn_in + options.n_samples;
    let mut chains: Vec<Vec<f64>> = vec![Vec::with_capacity(options.n_samples); d];
    let mut accepted = 0usize;
    let mut window_accepted = 0usize;
    let mut scale = 1.0;
    let mut proposal = vec![0.0; d];

    for step in 0..total {
        for j in 0..d {
            proposal[j] = current[j] + scale * base[j] * normal.sample(&mut rng);
        }

        // 先验为零：直接拒绝
        if bounds.contains(&proposal) {
            let proposal_chi2 = chi_square(&model, points, &proposal);
            let log_ratio = -0.5 * (proposal_chi2 - current_chi2);

            if proposal_chi2.is_finite() && rng.gen::<f64>().ln() < log_ratio {
                current.copy_from_slice(&proposal);
                current_chi2 = proposal_chi2;
                if step >= options.burn_in {
                    accepted += 1;
                } else {
                    window_accepted += 1;
                }
            }
        }

        if step < options.burn_in {
            if (step + 1) % ADAPT_WINDOW == 0 {
                let rate = window_accepted as f64 / ADAPT_WINDOW as f64;
                scale = adapt_scale(scale, rate);
                window_accepted = 0;
            }
        } else {
            for j in 0..d {
                chains[j].push(current[j]);
            }
        }
    }

    if accepted == 0 {
        return Err(NeutronError::FitFailed(
            "MCMC chain accepted no proposals".to_string(),
        ));
    }

    let n = options.n_samples as f64;
    let mut mean = Vec::with_capacity(d);
    let mut std = Vec::with_capacity(d);

    for chain in &chains {
        let m = chain.iter().sum::<f64>() / n;
        let var = if chain.len() > 1 {
            chain.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        mean.push(m);
        std.push(var.sqrt());
    }

    Ok(Posterior {
        mean,
        std,
        acceptance_rate: accepted as f64 / n,
    })
}

/// 按窗口接受率放缩步长
fn adapt_scale(scale: f64, rate: f64) -> f64 {
    (scale * (2.0 * (rate - TARGET_ACCEPTANCE)).exp()).clamp(1e-4, 1e4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqw::optimizer::{levenberg_marquardt, LmOptions};
    use crate::sqw::LineShape;

    fn noisy_lorentzian() -> ValidPoints {
        let shape = LineShape::Lorentzian;
        let truth = [4.0, 0.8, 1.0, 0.2];
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 0.1).unwrap();

        let x: Vec<f64> = (0..81).map(|i| -4.0 + 0.1 * i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&x| shape.evaluate(x, &truth) + normal.sample(&mut rng))
            .collect();
        ValidPoints {
            sigma: vec![0.1; x.len()],
            x,
            y,
        }
    }

    #[test]
    fn test_posterior_agrees_with_least_squares() {
        let shape = LineShape::Lorentzian;
        let points = noisy_lorentzian();
        let bounds = shape.default_bounds();
        let model = |x: f64, p: &[f64]| shape.evaluate(x, p);

        let lsq = levenberg_marquardt(
            model,
            &points,
            &[3.0, 0.5, 1.2, 0.1],
            &bounds,
            &LmOptions::default(),
        )
        .unwrap();
        let errors = lsq.errors();

        let options = McmcOptions {
            n_samples: 20_000,
            burn_in: 2_000,
            seed: Some(42),
            step_scale: 1.0,
        };
        let post =
            sample_posterior(model, &points, &lsq.params, &errors, &bounds, &options).unwrap();

        for j in 0..4 {
            assert!(
                (post.mean[j] - lsq.params[j]).abs() < 3.0 * errors[j],
                "param {}: {} vs {}",
                j,
                post.mean[j],
                lsq.params[j]
            );
            assert!(post.std[j] > 0.3 * errors[j] && post.std[j] < 3.0 * errors[j]);
        }
        assert!(post.acceptance_rate > 0.05 && post.acceptance_rate < 0.95);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let shape = LineShape::Gaussian;
        let points = noisy_lorentzian();
        let bounds = shape.default_bounds();
        let options = McmcOptions {
            n_samples: 500,
            burn_in: 100,
            seed: Some(3),
            step_scale: 1.0,
        };
        let start = [4.0, 0.8, 0.5, 0.2];
        let scales = [0.1, 0.01, 0.01, 0.01];

        let a = sample_posterior(
            |x, p| shape.evaluate(x, p),
            &points,
            &start,
            &scales,
            &bounds,
            &options,
        )
        .unwrap();
        let b = sample_posterior(
            |x, p| shape.evaluate(x, p),
            &points,
            &start,
            &scales,
            &bounds,
            &options,
        )
        .unwrap();

        assert_eq!(a.mean, b.mean);
        assert_eq!(a.acceptance_rate, b.acceptance_rate);
    }

    #[test]
    fn test_samples_stay_in_bounds() {
        let shape = LineShape::Lorentzian;
        let points = noisy_lorentzian();
        let mut bounds = shape.default_bounds();
        bounds.upper[1] = 0.5;
        let options = McmcOptions {
            n_samples: 2_000,
            burn_in: 200,
            seed: Some(11),
            step_scale: 1.0,
        };

        let post = sample_posterior(
            |x, p| shape.evaluate(x, p),
            &points,
            &[4.0, 0.5, 1.0, 0.2],
            &[0.1, 0.05, 0.05, 0.01],
            &bounds,
            &options,
        )
        .unwrap();

        assert!(post.mean[1] <= 0.5);
        assert!(bounds.contains(&post.mean));
    }

    #[test]
    fn test_zero_samples_rejected() {
        let shape = LineShape::Lorentzian;
        let points = noisy_lorentzian();
        let options = McmcOptions {
            n_samples: 0,
            ..McmcOptions::default()
        };
        let result = sample_posterior(
            |x, p| shape.evaluate(x, p),
            &points,
            &[4.0, 0.8, 1.0, 0.2],
            &[0.1; 4],
            &shape.default_bounds(),
            &options,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_adapt_scale_moves_toward_target() {
        assert!(adapt_scale(1.0, 0.0) < 1.0);
        assert!(adapt_scale(1.0, 0.9) > 1.0);
        assert!((adapt_scale(1.0, TARGET_ACCEPTANCE) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_burn_in_recovers_from_oversized_steps() {
        let shape = LineShape::Lorentzian;
        let points = noisy_lorentzian();
        let options = McmcOptions {
            n_samples: 5_000,
            burn_in: 3_000,
            seed: Some(21),
            step_scale: 20.0,
        };

        let post = sample_posterior(
            |x, p| shape.evaluate(x, p),
            &points,
            &[4.0, 0.8, 1.0, 0.2],
            &[0.1, 0.02, 0.03, 0.01],
            &shape.default_bounds(),
            &options,
        )
        .unwrap();

        assert!(post.acceptance_rate > 0.05, "{}", post.acceptance_rate);
        assert!(post.std.iter().all(|s| *s > 0.0));
    }

    #[test]
    fn test_stuck_chain_is_an_error() {
        let shape = LineShape::Lorentzian;
        let points = noisy_lorentzian();
        let options = McmcOptions {
            n_samples: 50,
            burn_in: 0,
            seed: Some(1),
            step_scale: 1e6,
        };

        let result = sample_posterior(
            |x, p| shape.evaluate(x, p),
            &points,
            &[4.0, 0.8, 1.0, 0.2],
            &[0.1; 4],
            &shape.default_bounds(),
            &options,
        );
        assert!(matches!(result, Err(NeutronError::FitFailed(_))));
    }
}
