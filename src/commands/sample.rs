//! # sample 命令实现
//!
//! 生成合成 S(Q,ω) 数据并写出为长表 CSV。
//!
//! ## 依赖关系
//! - 使用 `cli/data.rs` 定义的参数
//! - 使用 `sqw/sample.rs` 生成数据，`parsers/table.rs` 写出
//! - 使用 `utils/output.rs`

use crate::cli::data::SampleArgs;
use crate::error::Result;
use crate::parsers::table::write_table_csv;
use crate::sqw::sample::{create_sample_data, SampleSpec};
use crate::utils::output;

/// 执行 sample 命令
pub fn execute(args: SampleArgs) -> Result<()> {
    output::print_header("Synthetic S(Q,ω) Data");

    if args.output.exists() && !args.overwrite {
        output::print_skip(&format!(
            "Output exists, use --overwrite to replace: {}",
            args.output.display()
        ));
        return Ok(());
    }

    let spec = SampleSpec {
        n_q: args.n_q,
        n_omega: args.n_omega,
        velocity: args.velocity,
        noise: args.noise,
        ..SampleSpec::default()
    };

    output::print_info(&format!(
        "Grid: {} Q × {} ω, dispersion ω0 = {:.2}·Q, noise σ = {:.3}",
        spec.n_q, spec.n_omega, spec.velocity, spec.noise
    ));
    if let Some(seed) = args.seed {
        output::print_info(&format!("Seed: {}", seed));
    }

    let data = create_sample_data(&spec, args.seed)?;
    write_table_csv(&data, &args.output)?;

    output::print_written(
        &format!("{} points", data.n_q() * data.n_omega()),
        &args.output.display().to_string(),
    );
    Ok(())
}
