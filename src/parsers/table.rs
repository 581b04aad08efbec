//! # 长格式 S(Q,ω) 表格解析器
//!
//! 每行一个 (Q, ω) 点的 CSV/TSV 表格，列名按别名表匹配。
//!
//! ## 列名匹配
//! 1. 精确匹配（忽略大小写），按别名表顺序
//! 2. 子串匹配（仅多字符别名），跳过已被占用的列
//!
//! | 角色 | 别名 |
//! |------|------|
//! | Q    | q, Q, momentum, momentum_transfer, x, qx |
//! | ω    | omega, energy, Energy, E, y, energy_transfer |
//! | S    | S_data, data, intensity, counts, signal, z |
//! | σ    | errors, S_errors, error, variance, sigma（可选） |
//!
//! 名称含 `variance` 的误差列取平方根。网格由去重排序后的 Q、ω 构成，缺失格点为 NaN。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 调用
//! - 使用 `csv` 读写表格
//! - 使用 `models/dataset.rs` 的 SqwData

use crate::error::{NeutronError, Result};
use crate::models::SqwData;

use nalgebra::DMatrix;
use std::path::Path;

const Q_ALIASES: &[&str] = &["q", "Q", "momentum", "momentum_transfer", "x", "qx"];
const OMEGA_ALIASES: &[&str] = &["omega", "energy", "Energy", "E", "y", "energy_transfer"];
const DATA_ALIASES: &[&str] = &["S_data", "data", "intensity", "counts", "signal", "z"];
const ERROR_ALIASES: &[&str] = &["errors", "S_errors", "error", "variance", "sigma"];

/// 列索引
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    q: usize,
    omega: usize,
    data: usize,
    error: Option<usize>,
}

/// 按别名查找列
fn find_column(headers: &[String], aliases: &[&str], taken: &[usize]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        headers
            .iter()
            .enumerate()
            .find(|(i, h)| !taken.contains(i) && h.eq_ignore_ascii_case(alias))
            .map(|(i, _)| i)
    })
}

/// 子串匹配（单字符别名过于宽泛，跳过）
fn find_column_fuzzy(headers: &[String], aliases: &[&str], taken: &[usize]) -> Option<usize> {
    for (i, header) in headers.iter().enumerate() {
        if taken.contains(&i) {
            continue;
        }
        let lower = header.to_lowercase();
        if aliases
            .iter()
            .filter(|a| a.len() > 1)
            .any(|a| lower.contains(&a.to_lowercase()))
        {
            return Some(i);
        }
    }

    None
}

/// 解析表头得到各角色列
fn resolve_columns(headers: &[String]) -> std::result::Result<Columns, String> {
    let roles: [(&str, &[&str]); 4] = [
        ("Q", Q_ALIASES),
        ("omega", OMEGA_ALIASES),
        ("S(Q,omega)", DATA_ALIASES),
        ("error", ERROR_ALIASES),
    ];

    let mut found: [Option<usize>; 4] = [None; 4];
    let mut taken: Vec<usize> = Vec::new();

    // 先精确匹配全部角色，再子串匹配
    for (slot, (_, aliases)) in roles.iter().enumerate() {
        if let Some(idx) = find_column(headers, aliases, &taken) {
            found[slot] = Some(idx);
            taken.push(idx);
        }
    }
    for (slot, (_, aliases)) in roles.iter().enumerate() {
        if found[slot].is_none() {
            if let Some(idx) = find_column_fuzzy(headers, aliases, &taken) {
                found[slot] = Some(idx);
                taken.push(idx);
            }
        }
    }

    let require = |slot: usize| {
        found[slot].ok_or_else(|| {
            format!(
                "missing {} column (accepted names: {})",
                roles[slot].0,
                roles[slot].1.join(", ")
            )
        })
    };

    Ok(Columns {
        q: require(0)?,
        omega: require(1)?,
        data: require(2)?,
        error: found[3],
    })
}

/// 排序去重
fn unique_sorted(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v.dedup_by(|a, b| (*a - *b).abs() <= 1e-12 * a.abs().max(1.0));
    v
}

/// 在排序网格中定位
fn grid_index(grid: &[f64], value: f64) -> Option<usize> {
    let idx = grid.partition_point(|g| *g < value - 1e-12 * value.abs().max(1.0));
    grid.get(idx)
        .filter(|g| (**g - value).abs() <= 1e-12 * value.abs().max(1.0))
        .map(|_| idx)
}

/// 根据首行推断分隔符
fn sniff_delimiter(path: &Path, content: &str) -> u8 {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    if ext == "tsv" {
        return b'\t';
    }

    let header = content
        .lines()
        .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .unwrap_or("");
    [b',', b'\t', b';']
        .into_iter()
        .find(|d| header.contains(*d as char))
        .unwrap_or(b',')
}

/// 解析长格式表格内容
pub fn parse_table_content(content: &str, name: &str, delimiter: u8) -> Result<SqwData> {
    let parse_err = |reason: String| NeutronError::ParseError {
        format: "table".to_string(),
        path: name.to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let cols = resolve_columns(&headers).map_err(parse_err)?;
    let is_variance = cols
        .error
        .map(|i| headers[i].to_lowercase().contains("variance"))
        .unwrap_or(false);

    let mut rows: Vec<(f64, f64, f64, Option<f64>)> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |idx: usize| -> Result<f64> {
            let raw = record.get(idx).unwrap_or("");
            if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
                return Ok(f64::NAN);
            }
            raw.parse::<f64>().map_err(|_| {
                parse_err(format!("row {}: cannot parse '{}' as a number", line + 2, raw))
            })
        };

        let error = match cols.error {
            Some(idx) => {
                let e = field(idx)?;
                Some(if is_variance { e.abs().sqrt() } else { e })
            }
            None => None,
        };
        rows.push((field(cols.q)?, field(cols.omega)?, field(cols.data)?, error));
    }

    if rows.is_empty() {
        return Err(parse_err("table has no data rows".to_string()));
    }

    let q = unique_sorted(&rows.iter().map(|r| r.0).collect::<Vec<_>>());
    let omega = unique_sorted(&rows.iter().map(|r| r.1).collect::<Vec<_>>());
    if q.is_empty() || omega.is_empty() {
        return Err(parse_err("no finite Q or ω values".to_string()));
    }

    let mut intensity = DMatrix::from_element(q.len(), omega.len(), f64::NAN);
    let mut errors = cols
        .error
        .map(|_| DMatrix::from_element(q.len(), omega.len(), f64::NAN));

    for (q_val, w_val, s, e) in rows {
        let (Some(i), Some(j)) = (grid_index(&q, q_val), grid_index(&omega, w_val)) else {
            continue;
        };
        intensity[(i, j)] = s;
        if let (Some(m), Some(e)) = (errors.as_mut(), e) {
            m[(i, j)] = e;
        }
    }

    SqwData::new(name, q, omega, intensity, errors)
}

/// 读取长格式表格文件
pub fn parse_table_file(path: &Path) -> Result<SqwData> {
    let content = std::fs::read_to_string(path).map_err(|e| NeutronError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    parse_table_content(&content, &name, sniff_delimiter(path, &content))
}

/// 写出长格式 CSV（`q,omega,S_data,S_errors`），可被 `parse_table_file` 读回
pub fn write_table_csv(data: &SqwData, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(["q", "omega", "S_data", "S_errors"])?;

    for (i, q) in data.q.iter().enumerate() {
        for (j, w) in data.omega.iter().enumerate() {
            // `{}` 输出最短可精确读回的十进制表示
            wtr.write_record(&[
                q.to_string(),
                w.to_string(),
                data.intensity[(i, j)].to_string(),
                data.errors[(i, j)].to_string(),
            ])?;
        }
    }

    wtr.flush().map_err(|e| NeutronError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_exact_columns() {
        let cols = resolve_columns(&headers(&["omega", "Q", "S_errors", "S_data"])).unwrap();
        assert_eq!(
            cols,
            Columns {
                q: 1,
                omega: 0,
                data: 3,
                error: Some(2)
            }
        );
    }

    #[test]
    fn test_resolve_fuzzy_columns() {
        let cols = resolve_columns(&headers(&[
            "Momentum (1/A)",
            "Energy_meV",
            "Intensity_norm",
            "Error_bar",
        ]))
        .unwrap();
        assert_eq!(cols.q, 0);
        assert_eq!(cols.omega, 1);
        assert_eq!(cols.data, 2);
        assert_eq!(cols.error, Some(3));
    }

    #[test]
    fn test_missing_data_column() {
        let err = resolve_columns(&headers(&["q", "omega"])).unwrap_err();
        assert!(err.contains("S(Q,omega)"));
    }

    #[test]
    fn test_parse_unsorted_table_with_gap() {
        let content = "\
# comment line
q,omega,intensity
1.0,0.5,3.0
0.5,0.5,1.0
0.5,-0.5,2.0
";
        let data = parse_table_content(content, "t.csv", b',').unwrap();
        assert_eq!(data.q, vec![0.5, 1.0]);
        assert_eq!(data.omega, vec![-0.5, 0.5]);
        assert_eq!(data.intensity[(0, 0)], 2.0);
        assert_eq!(data.intensity[(1, 1)], 3.0);
        assert!(data.intensity[(1, 0)].is_nan());
        // 缺省误差 sqrt(|S| + 0.01)
        assert!((data.errors[(0, 1)] - 1.01_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_variance_column_is_square_rooted() {
        let content = "q\tE\tcounts\tvariance\n1.0\t0.0\t10.0\t4.0\n";
        let data = parse_table_content(content, "v.tsv", b'\t').unwrap();
        assert_eq!(data.errors[(0, 0)], 2.0);
    }

    #[test]
    fn test_bad_number_reports_row() {
        let content = "q,omega,S_data\n1.0,abc,2.0\n";
        let err = parse_table_content(content, "bad.csv", b',').unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_write_then_read_back() {
        let dir = std::env::temp_dir().join("neutronfit_table_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("grid.csv");

        let intensity = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.2e-12]);
        let mut errors = DMatrix::from_element(2, 2, 0.25);
        errors[(1, 1)] = 1.0 / 3.0e9;
        let data =
            SqwData::new("grid", vec![0.1, 0.2], vec![-1.0, 1.0], intensity, Some(errors)).unwrap();

        write_table_csv(&data, &path).unwrap();
        let back = parse_table_file(&path).unwrap();

        assert_eq!(back.name, "grid.csv");
        assert_eq!(back.shape(), (2, 2));
        assert_eq!(back.intensity[(1, 0)], 3.0);
        assert_eq!(back.errors[(0, 1)], 0.25);
        // 小量不被截断为零
        assert_eq!(back.intensity[(1, 1)], 4.2e-12);
        assert_eq!(back.errors[(1, 1)], 1.0 / 3.0e9);

        std::fs::remove_file(&path).ok();
    }
}
