//! # fit 命令实现
//!
//! 拟合单条 S(ω) 谱并打印参数表。
//!
//! ## 功能
//! - 按索引或最近 Q 值选择谱
//! - 可选 ω 窗口
//! - 用户初始值或自动初始值
//! - 最小二乘或贝叶斯拟合
//! - 可选输出拟合图 (PNG/SVG)
//!
//! ## 依赖关系
//! - 使用 `cli/fit.rs` 定义的 FitArgs
//! - 使用 `parsers/`, `sqw/`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use crate::cli::fit::FitArgs;
use crate::error::{NeutronError, Result};
use crate::models::{FitMethod, FitResult, SqwData};
use crate::parsers;
use crate::sqw::{fit_spectrum, plot, InitialGuess};
use crate::utils::{output, progress};

use tabled::{Table, Tabled};

/// 执行 fit 命令
pub fn execute(args: FitArgs) -> Result<()> {
    output::print_header("Single Spectrum Fit");

    let data = parsers::load_dataset(&args.input)?;
    output::print_info(&format!(
        "Loaded '{}': {} Q × {} ω",
        data.name,
        data.n_q(),
        data.n_omega()
    ));

    let index = select_index(&data, args.q_index, args.q)?;
    let mut spectrum = data.spectrum(index)?;
    if let Some((lo, hi)) = args.fit.omega_range {
        spectrum = spectrum.restrict(lo, hi);
        output::print_info(&format!("ω window: {:.3} to {:.3} meV", lo, hi));
    }

    let shape = args.fit.shape();
    let options = args.fit.to_options();
    output::print_info(&format!(
        "Q[{}] = {:.4} Å⁻¹, model: {}, method: {}",
        index, spectrum.q, shape, options.method
    ));

    let p0 = if args.auto_guess {
        shape
            .auto_guess(&spectrum.valid_points())
            .ok_or_else(|| NeutronError::FitFailed("no valid points to estimate from".into()))?
    } else {
        shape.initial_guess(&InitialGuess {
            amplitude: args.amplitude,
            center: args.center,
            width: args.width,
            background: args.background,
        })
    };

    let spinner = match options.method {
        FitMethod::Bayesian => Some(progress::create_spinner(&format!(
            "Sampling posterior ({} + {} steps)...",
            options.mcmc.burn_in, options.mcmc.n_samples
        ))),
        FitMethod::LeastSquares => None,
    };

    let result = fit_spectrum(&spectrum, shape, &p0, &shape.default_bounds(), &options);

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let fit = result?;

    print_parameters(&fit);
    print_statistics(&fit);

    if !fit.converged {
        output::print_warning("Optimizer stopped before converging (evaluation limit reached)");
    }

    if let Some(path) = &args.plot {
        plot::render_spectrum(path, &spectrum, Some(&fit), (args.plot_width, args.plot_height))?;
        output::print_written("Fit plot", &path.display().to_string());
    }

    output::print_done("Fit complete");
    Ok(())
}

/// 选择谱：显式索引优先，其次最近 Q，默认第 0 条
fn select_index(data: &SqwData, q_index: Option<usize>, q: Option<f64>) -> Result<usize> {
    match (q_index, q) {
        (Some(i), _) if i >= data.n_q() => Err(NeutronError::InvalidArgument(format!(
            "Q index {} out of range (0..{})",
            i,
            data.n_q()
        ))),
        (Some(i), _) => Ok(i),
        (None, Some(value)) => data.nearest_q_index(value).ok_or_else(|| {
            NeutronError::InvalidArgument(format!("No Q value near {}", value))
        }),
        (None, None) if data.n_q() == 0 => Err(NeutronError::InsufficientData {
            found: 0,
            required: 1,
        }),
        (None, None) => Ok(0),
    }
}

fn print_parameters(fit: &FitResult) {
    #[derive(Tabled)]
    struct ParamRow {
        #[tabled(rename = "Parameter")]
        name: &'static str,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Error")]
        error: String,
    }

    let rows: Vec<ParamRow> = fit
        .shape
        .param_names()
        .iter()
        .filter_map(|name| {
            let (v, e) = fit.param(name)?;
            Some(ParamRow {
                name: *name,
                value: format!("{:.6}", v),
                error: format!("± {:.6}", e),
            })
        })
        .collect();

    output::print_header(&format!("{} Parameters at Q = {:.4} Å⁻¹", fit.shape, fit.q));
    println!("{}", Table::new(&rows));
}

fn print_statistics(fit: &FitResult) {
    #[derive(Tabled)]
    struct StatRow {
        #[tabled(rename = "Statistic")]
        key: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let mut rows = vec![
        StatRow {
            key: "Method",
            value: fit.method.to_string(),
        },
        StatRow {
            key: "χ²",
            value: format!("{:.4}", fit.chi2),
        },
        StatRow {
            key: "χ²_red",
            value: format!("{:.4}", fit.reduced_chi2),
        },
        StatRow {
            key: "Points / dof",
            value: format!("{} / {}", fit.n_points, fit.n_free),
        },
        StatRow {
            key: "Evaluations",
            value: fit.evaluations.to_string(),
        },
        StatRow {
            key: "FWHM (peak 1)",
            value: format!("{:.4} meV", fit.shape.fwhm(&fit.params)),
        },
        StatRow {
            key: "Integrated intensity (peak 1)",
            value: format!("{:.4}", fit.shape.integrated_intensity(&fit.params)),
        },
    ];

    if let Some(rate) = fit.acceptance_rate {
        rows.push(StatRow {
            key: "Acceptance rate",
            value: format!("{:.1}%", rate * 100.0),
        });
    }

    println!();
    println!("{}", Table::new(&rows));
}
