//! # 统一错误处理模块
//!
//! 定义 neutronfit 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// neutronfit 统一错误类型
#[derive(Error, Debug)]
pub enum NeutronError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // ─────────────────────────────────────────────────────────────
    // 数据形状错误
    // ─────────────────────────────────────────────────────────────
    #[error("Data shape mismatch: S(Q,ω) is {rows}x{cols}, but Q has {n_q} and ω has {n_omega} points")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        n_q: usize,
        n_omega: usize,
    },

    // ─────────────────────────────────────────────────────────────
    // 拟合错误
    // ─────────────────────────────────────────────────────────────
    #[error("Not enough valid data points for fitting: {found} (need at least {required})")]
    InsufficientData { found: usize, required: usize },

    #[error("Fit failed: {0}")]
    FitFailed(String),

    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("No valid fit results to export")]
    NoResults,

    // ─────────────────────────────────────────────────────────────
    // 参数错误
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ─────────────────────────────────────────────────────────────
    // CSV 错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, NeutronError>;
