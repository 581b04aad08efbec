//! # S(Q,ω) 数据模型
//!
//! 定义非弹性中子散射数据集：Q 轴、ω 轴、强度矩阵与误差矩阵。
//!
//! ## 约定
//! - 强度矩阵按 `Q × ω` 存储（行 = Q，列 = ω）
//! - 误差矩阵与强度矩阵形状一致
//! - 未提供误差时使用 `sqrt(|S| + 0.01)`
//!
//! ## 依赖关系
//! - 被 `parsers/`, `sqw/`, `batch/` 和 `commands/` 使用
//! - 使用 `nalgebra` 存储矩阵

use crate::error::{NeutronError, Result};

use nalgebra::DMatrix;

/// 缺省误差中的偏移量，避免零强度处误差为零
const DEFAULT_ERROR_OFFSET: f64 = 0.01;

/// S(Q,ω) 数据集
#[derive(Debug, Clone)]
pub struct SqwData {
    /// 数据来源名称（文件名或 "Sample Data"）
    pub name: String,
    /// 动量转移 Q (Å⁻¹)
    pub q: Vec<f64>,
    /// 能量转移 ω (meV)
    pub omega: Vec<f64>,
    /// 强度矩阵 S[Q][ω]
    pub intensity: DMatrix<f64>,
    /// 误差矩阵 σ[Q][ω]
    pub errors: DMatrix<f64>,
}

impl SqwData {
    /// 创建数据集并校验形状
    ///
    /// 强度矩阵若为 `ω × Q` 则自动转置（误差矩阵随之转置）。
    pub fn new(
        name: impl Into<String>,
        q: Vec<f64>,
        omega: Vec<f64>,
        intensity: DMatrix<f64>,
        errors: Option<DMatrix<f64>>,
    ) -> Result<Self> {
        let (rows, cols) = intensity.shape();
        let n_q = q.len();
        let n_omega = omega.len();

        let transposed = if rows == n_q && cols == n_omega {
            false
        } else if rows == n_omega && cols == n_q {
            true
        } else {
            return Err(NeutronError::ShapeMismatch {
                rows,
                cols,
                n_q,
                n_omega,
            });
        };

        let intensity = if transposed {
            intensity.transpose()
        } else {
            intensity
        };

        let errors = match errors {
            Some(e) if transposed && e.shape() == (rows, cols) => e.transpose(),
            Some(e) => e,
            None => intensity.map(|s| (s.abs() + DEFAULT_ERROR_OFFSET).sqrt()),
        };

        if errors.shape() != intensity.shape() {
            return Err(NeutronError::InvalidArgument(format!(
                "Error matrix shape {:?} does not match intensity shape {:?}",
                errors.shape(),
                intensity.shape()
            )));
        }

        Ok(Self {
            name: name.into(),
            q,
            omega,
            intensity,
            errors,
        })
    }

    /// Q 点数量
    pub fn n_q(&self) -> usize {
        self.q.len()
    }

    /// ω 点数量
    pub fn n_omega(&self) -> usize {
        self.omega.len()
    }

    /// 矩阵形状 (n_q, n_omega)
    pub fn shape(&self) -> (usize, usize) {
        self.intensity.shape()
    }

    /// Q 范围（首、末值）
    pub fn q_range(&self) -> Option<(f64, f64)> {
        Some((*self.q.first()?, *self.q.last()?))
    }

    /// ω 范围（首、末值）
    pub fn omega_range(&self) -> Option<(f64, f64)> {
        Some((*self.omega.first()?, *self.omega.last()?))
    }

    /// 最接近给定 Q 值的索引
    pub fn nearest_q_index(&self, value: f64) -> Option<usize> {
        self.q
            .iter()
            .enumerate()
            .filter(|(_, q)| q.is_finite())
            .min_by(|(_, a), (_, b)| {
                (*a - value)
                    .abs()
                    .partial_cmp(&(*b - value).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
    }

    /// 取出第 `index` 个 Q 处的谱
    pub fn spectrum(&self, index: usize) -> Result<Spectrum> {
        if index >= self.n_q() {
            return Err(NeutronError::InvalidArgument(format!(
                "Q index {} out of range (0..{})",
                index,
                self.n_q()
            )));
        }

        Ok(Spectrum {
            q_index: index,
            q: self.q[index],
            omega: self.omega.clone(),
            intensity: self.intensity.row(index).iter().copied().collect(),
            errors: self.errors.row(index).iter().copied().collect(),
        })
    }

    /// 强度的有限值范围（用于色图归一化）
    pub fn intensity_range(&self) -> Option<(f64, f64)> {
        let mut iter = self.intensity.iter().copied().filter(|v| v.is_finite());
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

/// 单个 Q 处的一维谱
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// 在数据集中的 Q 索引
    pub q_index: usize,
    /// Q 值
    pub q: f64,
    /// 能量转移
    pub omega: Vec<f64>,
    /// 强度
    pub intensity: Vec<f64>,
    /// 误差
    pub errors: Vec<f64>,
}

/// 经过掩码筛选后的有效数据点
#[derive(Debug, Clone, Default)]
pub struct ValidPoints {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub sigma: Vec<f64>,
}

impl ValidPoints {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

impl Spectrum {
    /// 有效点：ω、S 有限且 σ 有限且大于零
    pub fn valid_points(&self) -> ValidPoints {
        let mut points = ValidPoints::default();

        for ((&x, &y), &s) in self
            .omega
            .iter()
            .zip(self.intensity.iter())
            .zip(self.errors.iter())
        {
            if x.is_finite() && y.is_finite() && s.is_finite() && s > 0.0 {
                points.x.push(x);
                points.y.push(y);
                points.sigma.push(s);
            }
        }

        points
    }

    /// 截取 ω ∈ [lo, hi] 的部分
    pub fn restrict(&self, lo: f64, hi: f64) -> Spectrum {
        let keep: Vec<usize> = (0..self.omega.len())
            .filter(|&j| self.omega[j] >= lo && self.omega[j] <= hi)
            .collect();

        Spectrum {
            q_index: self.q_index,
            q: self.q,
            omega: keep.iter().map(|&j| self.omega[j]).collect(),
            intensity: keep.iter().map(|&j| self.intensity[j]).collect(),
            errors: keep.iter().map(|&j| self.errors[j]).collect(),
        }
    }
}
