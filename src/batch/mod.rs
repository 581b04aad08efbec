//! # 批量处理模块
//!
//! 提供全 Q 批量拟合与多文件批量处理能力。
//!
//! ## 功能
//! - 并行拟合数据集的每条谱
//! - 收集匹配的数据文件
//! - 并行处理多个文件
//! - 进度反馈与统计
//!
//! ## 依赖关系
//! - 被 `commands/batch.rs`, `commands/plot.rs` 使用
//! - 使用 `rayon` 进行并行处理
//! - 使用 `indicatif` 显示进度

pub mod collector;
pub mod runner;
pub mod spectra;

pub use collector::FileCollector;
pub use runner::{BatchRunner, ProcessResult};
pub use spectra::{fit_all, BatchConfig, BatchFit};
