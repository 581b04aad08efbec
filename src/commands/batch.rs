//! # batch 命令实现
//!
//! 对全部 Q 谱批量拟合，提取色散关系并拟合色散律。
//!
//! ## 功能
//! - 单文件模式：拟合表、色散表、色散律、2×2 总览图
//! - 目录模式：逐文件并行拟合，输出 `<stem>_fits.csv`
//! - 失败汇总（最多显示 10 条）
//!
//! ## 依赖关系
//! - 使用 `cli/batch.rs` 定义的 BatchArgs
//! - 使用 `batch/` 模块进行批量处理
//! - 使用 `sqw/` 模块进行拟合、色散分析、导出与绘图
//! - 使用 `parsers/` 读取数据

use crate::batch::{fit_all, BatchConfig, BatchFit, BatchRunner, FileCollector, ProcessResult};
use crate::cli::batch::BatchArgs;
use crate::error::{NeutronError, Result};
use crate::parsers;
use crate::sqw::dispersion::{self, DispersionFit, DispersionPoint};
use crate::sqw::{export, plot};
use crate::utils::output;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{Table, Tabled};

/// 执行 batch 命令
pub fn execute(args: BatchArgs) -> Result<()> {
    output::print_header("Batch Spectrum Fitting");

    if args.input.is_file() {
        execute_single_file(&args)
    } else if args.input.is_dir() {
        execute_directory(&args)
    } else {
        Err(NeutronError::FileNotFound {
            path: args.input.display().to_string(),
        })
    }
}

fn batch_config(args: &BatchArgs, show_progress: bool) -> BatchConfig {
    BatchConfig {
        shape: args.fit.shape(),
        options: args.fit.to_options(),
        omega_range: args.fit.omega_range,
        jobs: args.jobs,
        show_progress,
    }
}

// ─────────────────────────────────────────────────────────────
// 单文件模式
// ─────────────────────────────────────────────────────────────

fn execute_single_file(args: &BatchArgs) -> Result<()> {
    let data = parsers::load_dataset(&args.input)?;
    let config = batch_config(args, true);

    output::print_info(&format!(
        "Loaded '{}': {} Q × {} ω",
        data.name,
        data.n_q(),
        data.n_omega()
    ));
    output::print_info(&format!(
        "Model: {}, method: {}",
        config.shape, config.options.method
    ));

    let batch = fit_all(&data, &config)?;

    output::print_separator();
    output::print_success(&format!(
        "Fitted {}/{} spectra",
        batch.successful(),
        batch.total()
    ));
    let failures: Vec<(String, String)> = batch
        .failures
        .iter()
        .map(|(i, e)| (format!("Q[{}] = {:.4}", i, data.q[*i]), e.clone()))
        .collect();
    output::print_failures(&failures);

    if batch.successful() == 0 {
        return Err(NeutronError::NoResults);
    }

    print_result_table(&batch, args.show);

    let output_file = single_output(args.output.as_deref());
    let written = export::write_fit_results(&output_file, &batch.results)?;
    output::print_written(
        &format!("{} fits", written),
        &output_file.display().to_string(),
    );

    let points = dispersion::extract(&batch.results);
    let law_fit = fit_dispersion_law(&points, args);

    if let Some(path) = &args.dispersion_csv {
        export::write_dispersion(path, &points, law_fit.as_ref())?;
        output::print_written("Dispersion", &path.display().to_string());
    }

    if let Some(path) = &args.plot {
        let q_index = args.q_index.min(data.n_q().saturating_sub(1));
        let fit = batch.results.get(q_index).and_then(|r| r.as_ref());
        plot::render_dashboard(path, &data, q_index, fit, &points, law_fit.as_ref(), (1400, 1000))?;
        output::print_written("Summary plot", &path.display().to_string());
    }

    output::print_done("Batch fitting complete");
    Ok(())
}

/// 拟合色散律；失败只提示，不中断
fn fit_dispersion_law(points: &[DispersionPoint], args: &BatchArgs) -> Option<DispersionFit> {
    let law = args.law.law()?;

    match dispersion::fit_law(points, law) {
        Ok(fit) => {
            print_law(&fit);
            Some(fit)
        }
        Err(e) => {
            output::print_warning(&format!("Dispersion fit ({}) skipped: {}", law, e));
            None
        }
    }
}

fn print_result_table(batch: &BatchFit, show: usize) {
    #[derive(Tabled)]
    struct FitRow {
        #[tabled(rename = "Q (Å⁻¹)")]
        q: String,
        #[tabled(rename = "Center (meV)")]
        center: String,
        #[tabled(rename = "Width (meV)")]
        width: String,
        #[tabled(rename = "Amplitude")]
        amplitude: String,
        #[tabled(rename = "χ²_red")]
        chi2: String,
    }

    let limit = if show == 0 { usize::MAX } else { show };
    let pm = |(v, e): (f64, f64)| format!("{:.4} ± {:.4}", v, e);

    let rows: Vec<FitRow> = batch
        .fits()
        .take(limit)
        .map(|f| FitRow {
            q: format!("{:.4}", f.q),
            center: pm(f.center()),
            width: pm(f.width()),
            amplitude: pm(f.amplitude()),
            chi2: format!("{:.3}", f.reduced_chi2),
        })
        .collect();

    output::print_header(&format!("Fit Results ({} of {})", rows.len(), batch.successful()));
    println!("{}", Table::new(&rows));
}

fn print_law(fit: &DispersionFit) {
    #[derive(Tabled)]
    struct CoefRow {
        #[tabled(rename = "Coefficient")]
        name: &'static str,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Error")]
        error: String,
    }

    let rows: Vec<CoefRow> = fit
        .law
        .coefficient_names()
        .iter()
        .zip(&fit.coefficients)
        .zip(&fit.errors)
        .map(|((name, v), e)| CoefRow {
            name: *name,
            value: format!("{:.6}", v),
            error: format!("± {:.6}", e),
        })
        .collect();

    output::print_header(&format!("Dispersion Law: {}", fit.law));
    println!("{}", Table::new(&rows));
    output::print_info(&format!(
        "χ² = {:.4}, χ²_red = {:.4} over {} points",
        fit.chi2, fit.reduced_chi2, fit.n_points
    ));
}

// ─────────────────────────────────────────────────────────────
// 目录模式
// ─────────────────────────────────────────────────────────────

/// 目录模式的共享配置
struct DirectoryConfig {
    output_dir: PathBuf,
    fit: BatchConfig,
    overwrite: bool,
}

fn execute_directory(args: &BatchArgs) -> Result<()> {
    output::print_info(&format!("Batch mode: directory '{}'", args.input.display()));

    let output_dir = directory_output(&args.input, args.output.as_deref());

    let mut files = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)
        .recursive(args.recursive)
        .collect();
    files.retain(|f| !f.starts_with(&output_dir));

    if files.is_empty() {
        output::print_warning(&format!(
            "No matching files found with pattern '{}'",
            args.pattern
        ));
        return Ok(());
    }

    output::print_info(&format!("Found {} data files", files.len()));

    fs::create_dir_all(&output_dir).map_err(|e| NeutronError::FileWriteError {
        path: output_dir.display().to_string(),
        source: e,
    })?;
    output::print_info(&format!("Output directory: {}", output_dir.display()));

    let runner = BatchRunner::new(args.jobs);
    output::print_info(&format!("Using {} parallel jobs", runner.jobs()));

    // 文件级并行，文件内串行拟合
    let config = Arc::new(DirectoryConfig {
        output_dir,
        fit: BatchConfig {
            jobs: 1,
            ..batch_config(args, false)
        },
        overwrite: args.overwrite,
    });

    let result = runner.run(files, |file| process_file(file, &config))?;

    output::print_separator();
    output::print_success(&format!(
        "Batch complete: {} files ({} success, {} skipped, {} failed)",
        result.total(),
        result.success,
        result.skipped,
        result.failed
    ));
    output::print_failures(&result.failures);

    Ok(())
}

/// 单文件模式的拟合表路径
fn single_output(output: Option<&Path>) -> PathBuf {
    output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("fit_results.csv"))
}

/// 目录模式的输出目录，默认 `<input>/fits`
fn directory_output(input: &Path, output: Option<&Path>) -> PathBuf {
    output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.join("fits"))
}

/// `<stem>_fits.csv`
fn output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    output_dir.join(format!("{}_fits.csv", stem))
}

fn process_file(input: &PathBuf, config: &Arc<DirectoryConfig>) -> ProcessResult {
    let output_file = output_path(input, &config.output_dir);

    if output_file.exists() && !config.overwrite {
        return ProcessResult::Skipped(format!(
            "Output exists, skipping: {}",
            output_file.display()
        ));
    }

    match fit_file(input, &output_file, &config.fit) {
        Ok((ok, total)) => ProcessResult::Success(format!(
            "{} -> {} ({}/{} spectra)",
            input.display(),
            output_file.display(),
            ok,
            total
        )),
        Err(e) => ProcessResult::Failed(input.display().to_string(), e.to_string()),
    }
}

fn fit_file(input: &Path, output: &Path, config: &BatchConfig) -> Result<(usize, usize)> {
    let data = parsers::load_dataset(input)?;
    let batch = fit_all(&data, config)?;
    export::write_fit_results(output, &batch.results)?;
    Ok((batch.successful(), batch.total()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::table::write_table_csv;
    use crate::sqw::sample::{create_sample_data, SampleSpec};

    #[test]
    fn test_output_path() {
        let out = output_path(Path::new("/data/run_12.csv"), Path::new("/out"));
        assert_eq!(out, PathBuf::from("/out/run_12_fits.csv"));
    }

    #[test]
    fn test_output_defaults_per_mode() {
        let input = Path::new("/data/runs");
        assert_eq!(single_output(None), PathBuf::from("fit_results.csv"));
        assert_eq!(directory_output(input, None), PathBuf::from("/data/runs/fits"));

        // 显式给出的文件名在目录模式下原样作为输出目录
        let explicit = Path::new("fit_results.csv");
        assert_eq!(directory_output(input, Some(explicit)), explicit.to_path_buf());
        assert_eq!(single_output(Some(explicit)), explicit.to_path_buf());
    }

    #[test]
    fn test_process_file_writes_and_skips() {
        let dir = std::env::temp_dir().join("neutronfit_batch_cmd_test");
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("run.csv");

        let spec = SampleSpec {
            n_q: 4,
            n_omega: 80,
            ..SampleSpec::default()
        };
        let data = create_sample_data(&spec, Some(3)).unwrap();
        write_table_csv(&data, &input).unwrap();

        let out_dir = dir.join("fits");
        fs::create_dir_all(&out_dir).unwrap();
        let expected = out_dir.join("run_fits.csv");
        fs::remove_file(&expected).ok();

        let config = Arc::new(DirectoryConfig {
            output_dir: out_dir,
            fit: BatchConfig {
                jobs: 1,
                show_progress: false,
                ..BatchConfig::default()
            },
            overwrite: false,
        });

        assert!(matches!(process_file(&input, &config), ProcessResult::Success(_)));
        assert!(expected.exists());
        assert!(matches!(process_file(&input, &config), ProcessResult::Skipped(_)));

        let missing = dir.join("missing.csv");
        assert!(matches!(
            process_file(&missing, &config),
            ProcessResult::Failed(_, _)
        ));
    }
}
