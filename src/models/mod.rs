//! # 数据模型模块
//!
//! 定义 S(Q,ω) 数据集与拟合结果的统一数据模型。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `sqw/`, `batch/` 和 `commands/` 使用
//! - 子模块: dataset, fit

pub mod dataset;
pub mod fit;

pub use dataset::{SqwData, Spectrum, ValidPoints};
pub use fit::{FitMethod, FitResult};
