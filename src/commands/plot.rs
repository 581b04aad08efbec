//! # plot 命令实现
//!
//! 绘制 S(Q,ω) 色图，或在拟合全部谱后绘制 2×2 总览。
//!
//! ## 依赖关系
//! - 使用 `cli/plot.rs` 定义的 PlotArgs
//! - 使用 `batch/spectra.rs` 拟合全部谱
//! - 使用 `sqw/plot.rs`, `sqw/dispersion.rs`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use crate::batch::{fit_all, BatchConfig};
use crate::cli::plot::PlotArgs;
use crate::error::{NeutronError, Result};
use crate::parsers;
use crate::sqw::{dispersion, plot};
use crate::utils::{output, progress};

/// 执行 plot 命令
pub fn execute(args: PlotArgs) -> Result<()> {
    output::print_header("S(Q,ω) Plot");

    let data = parsers::load_dataset(&args.input)?;
    output::print_info(&format!(
        "Loaded '{}': {} Q × {} ω",
        data.name,
        data.n_q(),
        data.n_omega()
    ));

    if let Some(i) = args.q_index {
        if i >= data.n_q() {
            return Err(NeutronError::InvalidArgument(format!(
                "Q index {} out of range (0..{})",
                i,
                data.n_q()
            )));
        }
    }

    let size = (args.width, args.height);

    if !args.dashboard {
        let spinner = progress::create_spinner("Rendering color map...");
        let result = plot::render_color_map(&args.output, &data, args.q_index, size);
        spinner.finish_and_clear();
        result?;
        output::print_written("Color map", &args.output.display().to_string());
        return Ok(());
    }

    let config = BatchConfig {
        shape: args.fit.shape(),
        options: args.fit.to_options(),
        omega_range: args.fit.omega_range,
        jobs: args.jobs,
        show_progress: true,
    };
    let batch = fit_all(&data, &config)?;
    output::print_info(&format!(
        "Fitted {}/{} spectra",
        batch.successful(),
        batch.total()
    ));

    let points = dispersion::extract(&batch.results);
    let law_fit = args
        .law
        .law()
        .and_then(|law| match dispersion::fit_law(&points, law) {
            Ok(fit) => Some(fit),
            Err(e) => {
                output::print_warning(&format!("Dispersion fit ({}) skipped: {}", law, e));
                None
            }
        });

    let q_index = args.q_index.unwrap_or(0);
    let fit = batch.results.get(q_index).and_then(|r| r.as_ref());

    let spinner = progress::create_spinner("Rendering summary...");
    let result = plot::render_dashboard(
        &args.output,
        &data,
        q_index,
        fit,
        &points,
        law_fit.as_ref(),
        size,
    );
    spinner.finish_and_clear();
    result?;

    output::print_written("Summary plot", &args.output.display().to_string());
    Ok(())
}
