//! # 解析器模块
//!
//! 读取 S(Q,ω) 数据文件。
//!
//! ## 依赖关系
//! - 被 `commands/` 模块使用
//! - 使用 `models/` 数据模型
//! - 子模块: table

pub mod table;

use crate::error::{NeutronError, Result};
use crate::models::SqwData;
use std::path::Path;

/// 从文件路径推断格式并解析
pub fn load_dataset(path: &Path) -> Result<SqwData> {
    if !path.is_file() {
        return Err(NeutronError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" | "tsv" | "txt" | "dat" => table::parse_table_file(path),
        "nxs" | "h5" | "hdf5" | "nx5" => Err(NeutronError::UnsupportedFormat(format!(
            "{} (NeXus/HDF5 containers are not read directly; export the S(Q,ω) grid to CSV with columns q, omega, S_data, S_errors)",
            path.display()
        ))),
        _ => Err(NeutronError::UnsupportedFormat(format!(
            "Cannot determine format for: {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let result = load_dataset(Path::new("/nonexistent/data.csv"));
        assert!(matches!(result, Err(NeutronError::FileNotFound { .. })));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = std::env::temp_dir().join("neutronfit_parsers_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("data.nxs");
        std::fs::write(&path, b"not really hdf5").unwrap();

        let result = load_dataset(&path);
        assert!(matches!(result, Err(NeutronError::UnsupportedFormat(_))));

        std::fs::remove_file(&path).ok();
    }
}
