//! # info 命令实现
//!
//! 打印 S(Q,ω) 数据文件的网格与范围。
//!
//! ## 依赖关系
//! - 使用 `cli/data.rs` 定义的参数
//! - 使用 `parsers/` 读取数据
//! - 使用 `utils/output.rs`

use crate::cli::data::InfoArgs;
use crate::error::Result;
use crate::models::SqwData;
use crate::parsers;
use crate::utils::output;

use tabled::{Table, Tabled};

/// 执行 info 命令
pub fn execute(args: InfoArgs) -> Result<()> {
    output::print_header("S(Q,ω) Data Summary");

    let data = parsers::load_dataset(&args.input)?;
    print_summary(&args.input.display().to_string(), &data);

    if args.spectra {
        print_spectra(&data);
    }

    Ok(())
}

/// 有效点数：S 有限且 σ > 0
fn count_valid(data: &SqwData) -> usize {
    data.intensity
        .iter()
        .zip(data.errors.iter())
        .filter(|(s, e)| s.is_finite() && e.is_finite() && **e > 0.0)
        .count()
}

fn format_range(range: Option<(f64, f64)>, unit: &str) -> String {
    match range {
        Some((lo, hi)) => format!("{:.4} to {:.4} {}", lo, hi, unit),
        None => "-".to_string(),
    }
}

fn print_summary(path: &str, data: &SqwData) {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Property")]
        key: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let (n_q, n_omega) = data.shape();
    let total = n_q * n_omega;

    let rows = vec![
        Row {
            key: "File",
            value: path.to_string(),
        },
        Row {
            key: "Name",
            value: data.name.clone(),
        },
        Row {
            key: "Shape (Q × ω)",
            value: format!("{} × {}", n_q, n_omega),
        },
        Row {
            key: "Q range",
            value: format_range(data.q_range(), "Å⁻¹"),
        },
        Row {
            key: "ω range",
            value: format_range(data.omega_range(), "meV"),
        },
        Row {
            key: "Intensity range",
            value: format_range(data.intensity_range(), ""),
        },
        Row {
            key: "Valid points",
            value: format!("{} / {}", count_valid(data), total),
        },
    ];

    println!("{}", Table::new(&rows));
}

fn print_spectra(data: &SqwData) {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Index")]
        index: usize,
        #[tabled(rename = "Q (Å⁻¹)")]
        q: String,
        #[tabled(rename = "Valid points")]
        valid: usize,
    }

    let rows: Vec<Row> = (0..data.n_q())
        .filter_map(|i| data.spectrum(i).ok())
        .map(|s| Row {
            index: s.q_index,
            q: format!("{:.4}", s.q),
            valid: s.valid_points().len(),
        })
        .collect();

    output::print_header("Spectra");
    println!("{}", Table::new(&rows));
}
