//! # 合成 S(Q,ω) 样例数据
//!
//! 生成带线性色散的模拟谱，用于演示和测试拟合流程。
//!
//! ## 模型
//! - Q = linspace(0.1, 3.0, 50) Å⁻¹，ω = linspace(−5, 5, 200) meV
//! - Stokes 峰：5·L(ω; 2Q, 0.5 + 0.1Q)
//! - anti-Stokes 峰：0.5·L(ω; −2Q, 0.6)
//! - 背景：0.1·exp(−ω²/10)
//! - 噪声：𝒩(0, 0.05)，结果取绝对值
//! - 误差：0.1·√(S + 0.01)
//!
//! ## 依赖关系
//! - 被 `commands/sample.rs` 调用
//! - 使用 `rand` / `rand_distr` 生成噪声

use crate::error::{NeutronError, Result};
use crate::models::SqwData;
use crate::sqw::lineshape::lorentzian;

use nalgebra::DMatrix;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

/// 样例数据的网格与物理参数
#[derive(Debug, Clone, Copy)]
pub struct SampleSpec {
    pub q_min: f64,
    pub q_max: f64,
    pub n_q: usize,
    pub omega_min: f64,
    pub omega_max: f64,
    pub n_omega: usize,
    /// 声速 c：ω0 = c·Q
    pub velocity: f64,
    pub noise: f64,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            q_min: 0.1,
            q_max: 3.0,
            n_q: 50,
            omega_min: -5.0,
            omega_max: 5.0,
            n_omega: 200,
            velocity: 2.0,
            noise: 0.05,
        }
    }
}

/// 等间距网格（含端点）
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// 生成样例数据
pub fn create_sample_data(spec: &SampleSpec, seed: Option<u64>) -> Result<SqwData> {
    if spec.n_q == 0 || spec.n_omega == 0 {
        return Err(NeutronError::InvalidArgument(
            "Sample grid must have at least one Q and one ω point".to_string(),
        ));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let normal = Normal::new(0.0, spec.noise)
        .map_err(|e| NeutronError::Other(format!("Noise distribution error: {e}")))?;

    let q = linspace(spec.q_min, spec.q_max, spec.n_q);
    let omega = linspace(spec.omega_min, spec.omega_max, spec.n_omega);

    let mut intensity = DMatrix::zeros(q.len(), omega.len());
    for (i, &q_val) in q.iter().enumerate() {
        let omega0 = spec.velocity * q_val;
        let gamma = 0.5 + 0.1 * q_val;

        for (j, &w) in omega.iter().enumerate() {
            let stokes = lorentzian(w, 5.0, omega0, gamma);
            let anti_stokes = lorentzian(w, 0.5, -omega0, 0.6);
            let background = 0.1 * (-w * w / 10.0).exp();
            let value = stokes + anti_stokes + background + normal.sample(&mut rng);
            intensity[(i, j)] = value.abs();
        }
    }

    let errors = intensity.map(|s| 0.1 * (s + 0.01).sqrt());

    SqwData::new("Sample Data", q, omega, intensity, Some(errors))
}
