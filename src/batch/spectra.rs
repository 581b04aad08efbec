//! # 全 Q 批量拟合
//!
//! 对数据集中每个 Q 的谱并行拟合，单个失败不中断整体。
//!
//! ## 依赖关系
//! - 被 `commands/batch.rs`, `commands/plot.rs` 调用
//! - 使用 `sqw/fit.rs` 的 fit_spectrum_auto
//! - 使用 `batch/runner.rs` 构建线程池，`utils/progress.rs` 显示进度

use crate::batch::runner::build_pool;
use crate::error::Result;
use crate::models::{FitResult, SqwData};
use crate::sqw::{fit_spectrum_auto, FitOptions, LineShape};
use crate::utils::progress;

use indicatif::ProgressBar;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 批量拟合配置
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub shape: LineShape,
    pub options: FitOptions,
    /// 仅使用该 ω 窗口内的点
    pub omega_range: Option<(f64, f64)>,
    pub jobs: usize,
    pub show_progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            shape: LineShape::Lorentzian,
            options: FitOptions::default(),
            omega_range: None,
            jobs: 0,
            show_progress: true,
        }
    }
}

/// 批量拟合结果：按 Q 索引排列
#[derive(Debug, Default)]
pub struct BatchFit {
    pub results: Vec<Option<FitResult>>,
    /// (Q 索引, 错误信息)
    pub failures: Vec<(usize, String)>,
}

impl BatchFit {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// 成功拟合的迭代器
    pub fn fits(&self) -> impl Iterator<Item = &FitResult> {
        self.results.iter().flatten()
    }
}

/// 拟合全部 Q 谱
pub fn fit_all(data: &SqwData, config: &BatchConfig) -> Result<BatchFit> {
    let n_q = data.n_q();
    let pb = if config.show_progress {
        progress::create_progress_bar(n_q as u64, "Fitting spectra")
    } else {
        ProgressBar::hidden()
    };
    let success_count = AtomicUsize::new(0);
    let failed_count = AtomicUsize::new(0);

    let pool = build_pool(config.jobs)?;

    let outcomes: Vec<std::result::Result<FitResult, String>> = pool.install(|| {
        (0..n_q)
            .into_par_iter()
            .map(|i| {
                let outcome = fit_one(data, config, i).map_err(|e| e.to_string());
                if outcome.is_ok() {
                    success_count.fetch_add(1, Ordering::Relaxed);
                } else {
                    failed_count.fetch_add(1, Ordering::Relaxed);
                }
                pb.set_message(status_message(
                    success_count.load(Ordering::Relaxed),
                    failed_count.load(Ordering::Relaxed),
                ));
                pb.inc(1);
                outcome
            })
            .collect()
    });

    pb.finish_and_clear();

    let mut batch = BatchFit::default();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(fit) => batch.results.push(Some(fit)),
            Err(msg) => {
                batch.results.push(None);
                batch.failures.push((i, msg));
            }
        }
    }

    Ok(batch)
}

fn status_message(ok: usize, failed: usize) -> String {
    format!("Fitting spectra: ok {} / failed {}", ok, failed)
}

fn fit_one(data: &SqwData, config: &BatchConfig, index: usize) -> Result<FitResult> {
    let mut spectrum = data.spectrum(index)?;
    if let Some((lo, hi)) = config.omega_range {
        spectrum = spectrum.restrict(lo, hi);
    }

    // 每条谱独立种子，结果与线程调度无关
    let mut options = config.options;
    options.mcmc.seed = options.mcmc.seed.map(|s| s.wrapping_add(index as u64));

    fit_spectrum_auto(&spectrum, config.shape, &options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FitMethod;
    use crate::sqw::sample::{create_sample_data, SampleSpec};
    use crate::sqw::McmcOptions;
    use nalgebra::DMatrix;

    fn quiet(jobs: usize) -> BatchConfig {
        BatchConfig {
            jobs,
            show_progress: false,
            ..BatchConfig::default()
        }
    }

    #[test]
    fn test_fit_all_sample_data() {
        let spec = SampleSpec {
            n_q: 8,
            ..SampleSpec::default()
        };
        let data = create_sample_data(&spec, Some(5)).unwrap();
        let batch = fit_all(&data, &quiet(2)).unwrap();

        assert_eq!(batch.total(), 8);
        assert_eq!(batch.successful(), 8);
        assert!(batch.failures.is_empty());

        for fit in batch.fits() {
            let expected = 2.0 * fit.q;
            assert!((fit.center().0 - expected).abs() < 0.3, "Q = {}", fit.q);
        }
    }

    #[test]
    fn test_failures_do_not_abort() {
        let q = vec![0.5, 1.0];
        let omega: Vec<f64> = (0..20).map(|j| -2.0 + 0.2 * j as f64).collect();
        let mut intensity = DMatrix::from_fn(2, 20, |_, j| {
            let w = omega[j];
            5.0 * 0.25 / ((w - 0.5).powi(2) + 0.25) + 0.1
        });
        // 第二条谱全部无效
        for j in 0..20 {
            intensity[(1, j)] = f64::NAN;
        }
        let data = SqwData::new("partial", q, omega.clone(), intensity, None).unwrap();

        let batch = fit_all(&data, &quiet(1)).unwrap();
        assert_eq!(batch.total(), 2);
        assert_eq!(batch.successful(), 1);
        assert!(batch.results[1].is_none());
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].0, 1);
    }

    #[test]
    fn test_omega_window_limits_points() {
        let spec = SampleSpec {
            n_q: 3,
            ..SampleSpec::default()
        };
        let data = create_sample_data(&spec, Some(6)).unwrap();
        let config = BatchConfig {
            omega_range: Some((0.0, 5.0)),
            ..quiet(1)
        };
        let batch = fit_all(&data, &config).unwrap();
        for fit in batch.fits() {
            assert!(fit.n_points <= 100);
        }
    }

    #[test]
    fn test_status_message_keeps_prefix() {
        let msg = status_message(3, 1);
        assert!(msg.starts_with("Fitting spectra"));
        assert!(msg.contains("ok 3 / failed 1"));
    }

    #[test]
    fn test_seeded_bayesian_independent_of_jobs() {
        let spec = SampleSpec {
            n_q: 6,
            ..SampleSpec::default()
        };
        let data = create_sample_data(&spec, Some(9)).unwrap();
        let mut options = FitOptions {
            method: FitMethod::Bayesian,
            mcmc: McmcOptions {
                n_samples: 1_000,
                burn_in: 300,
                seed: Some(9),
                step_scale: 1.0,
            },
            ..FitOptions::default()
        };
        options.lm.max_evaluations = 2_000;

        let serial = fit_all(&data, &BatchConfig { options, ..quiet(1) }).unwrap();
        let parallel = fit_all(&data, &BatchConfig { options, ..quiet(4) }).unwrap();

        assert_eq!(serial.total(), parallel.total());
        for (a, b) in serial.results.iter().zip(&parallel.results) {
            match (a, b) {
                (Some(a), Some(b)) => {
                    assert_eq!(a.params, b.params);
                    assert_eq!(a.errors, b.errors);
                    assert_eq!(a.acceptance_rate, b.acceptance_rate);
                }
                (None, None) => {}
                _ => panic!("outcome differs between job counts"),
            }
        }
    }
}
