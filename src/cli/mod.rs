//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `info`: 数据文件概况
//! - `sample`: 生成合成样例数据
//! - `fit`: 拟合单条谱
//! - `batch`: 批量拟合与色散分析
//! - `plot`: 色图 / 总览图
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: data, fit, batch, plot

pub mod batch;
pub mod data;
pub mod fit;
pub mod plot;

use clap::{Parser, Subcommand};

/// neutronfit - 非弹性中子散射谱拟合工具
#[derive(Parser)]
#[command(name = "neutronfit")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Fit inelastic neutron scattering spectra S(Q,ω) and extract dispersion relations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Show the grid and ranges of an S(Q,ω) data file
    Info(data::InfoArgs),

    /// Write a synthetic S(Q,ω) data set with a linear dispersion
    Sample(data::SampleArgs),

    /// Fit one Q spectrum and print the parameters
    Fit(fit::FitArgs),

    /// Fit every Q spectrum and extract the dispersion relation
    Batch(batch::BatchArgs),

    /// Draw the S(Q,ω) color map or a 2×2 summary
    Plot(plot::PlotArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fit_with_negative_range() {
        let cli = Cli::try_parse_from([
            "neutronfit",
            "fit",
            "data.csv",
            "--q",
            "1.2",
            "--model",
            "double-lorentzian",
            "--omega-range",
            "-5:5",
            "--center",
            "-1.5",
        ])
        .unwrap();

        match cli.command {
            Commands::Fit(args) => {
                assert_eq!(args.fit.omega_range, Some((-5.0, 5.0)));
                assert_eq!(args.fit.model, fit::ModelArg::DoubleLorentzian);
                assert_eq!(args.center, -1.5);
                assert_eq!(args.q, Some(1.2));
            }
            _ => panic!("expected fit"),
        }
    }

    #[test]
    fn test_q_and_index_conflict() {
        let result = Cli::try_parse_from(["neutronfit", "fit", "d.csv", "--q", "1", "--q-index", "2"]);
        assert!(result.is_err());
    }
}
