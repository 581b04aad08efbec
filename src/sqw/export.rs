//! # 拟合结果导出
//!
//! 导出拟合参数表与色散点到 CSV。
//!
//! ## 支持格式
//! - 参数表：`Q, <参数>, <参数>_error, ..., chi2_red`，每个成功拟合一行
//! - 色散表：Q、峰位、宽度、振幅及误差，可附带色散律预测值
//!
//! ## 依赖关系
//! - 被 `commands/fit.rs`, `commands/batch.rs` 调用
//! - 使用 `csv` 库写入 CSV 文件，`serde` 序列化色散行

use crate::error::{NeutronError, Result};
use crate::models::FitResult;
use crate::sqw::dispersion::{DispersionFit, DispersionPoint};

use serde::Serialize;
use std::path::Path;

/// 导出拟合参数表
pub fn write_fit_results(path: &Path, results: &[Option<FitResult>]) -> Result<usize> {
    let valid: Vec<&FitResult> = results.iter().flatten().collect();
    let first = valid.first().ok_or(NeutronError::NoResults)?;
    let names = first.shape.param_names();

    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["Q".to_string()];
    for name in names {
        header.push(name.to_string());
        header.push(format!("{}_error", name));
    }
    header.push("chi2_red".to_string());
    wtr.write_record(&header)?;

    for r in &valid {
        let mut row = vec![format!("{:.6}", r.q)];
        for i in 0..names.len() {
            row.push(format_value(r.params.get(i).copied()));
            row.push(format_value(r.errors.get(i).copied()));
        }
        row.push(format!("{:.6}", r.reduced_chi2));
        wtr.write_record(&row)?;
    }

    wtr.flush().map_err(|e| NeutronError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(valid.len())
}

fn format_value(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.6}", v),
        None => "NaN".to_string(),
    }
}

/// 色散表的一行
#[derive(Serialize)]
struct DispersionRow {
    q: f64,
    energy: f64,
    energy_error: f64,
    width: f64,
    width_error: f64,
    amplitude: f64,
    amplitude_error: f64,
    energy_law: Option<f64>,
}

/// 导出色散点
pub fn write_dispersion(
    path: &Path,
    points: &[DispersionPoint],
    law_fit: Option<&DispersionFit>,
) -> Result<()> {
    if points.is_empty() {
        return Err(NeutronError::NoResults);
    }

    let mut wtr = csv::Writer::from_path(path)?;

    for p in points {
        wtr.serialize(DispersionRow {
            q: p.q,
            energy: p.energy,
            energy_error: p.energy_error,
            width: p.width,
            width_error: p.width_error,
            amplitude: p.amplitude,
            amplitude_error: p.amplitude_error,
            energy_law: law_fit.map(|f| f.predict(p.q)),
        })?;
    }

    wtr.flush().map_err(|e| NeutronError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}
