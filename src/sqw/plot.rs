//! # S(Q,ω) 图表生成
//!
//! 使用 `plotters` 库生成色图、单谱拟合图、色散关系图与参数趋势图。
//!
//! ## 功能
//! - 2D 色图 S(Q,ω)，当前 Q 以红色虚线标出
//! - 单谱数据点（误差棒）与拟合曲线、参数文本
//! - 色散关系 E(Q) 与色散律曲线
//! - 振幅、宽度随 Q 的变化
//! - 2×2 总览面板
//! - 按扩展名选择 PNG 或 SVG
//!
//! ## 依赖关系
//! - 被 `commands/fit.rs`, `commands/batch.rs`, `commands/plot.rs` 调用
//! - 使用 `models/` 的 SqwData, Spectrum, FitResult
//! - 使用 `sqw/dispersion.rs` 的 DispersionPoint, DispersionFit

use crate::error::{NeutronError, Result};
use crate::models::{FitResult, Spectrum, SqwData};
use crate::sqw::dispersion::{DispersionFit, DispersionPoint};

use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

const TITLE_SIZE: u32 = 22;
const LABEL_SIZE: u32 = 16;
const INFO_SIZE: u32 = 14;
const FIT_CURVE_POINTS: usize = 500;

/// viridis 色表锚点
const VIRIDIS: [(f64, (u8, u8, u8)); 5] = [
    (0.00, (68, 1, 84)),
    (0.25, (59, 82, 139)),
    (0.50, (33, 145, 140)),
    (0.75, (94, 201, 98)),
    (1.00, (253, 231, 37)),
];

fn plot_err<E: std::fmt::Debug>(e: E) -> NeutronError {
    NeutronError::Other(format!("Plotting failed: {:?}", e))
}

/// 是否按 SVG 输出
fn is_svg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("svg"))
        .unwrap_or(false)
}

/// viridis 线性插值，t ∈ [0, 1]
pub fn viridis(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    for pair in VIRIDIS.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let f = (t - t0) / (t1 - t0);
            let lerp = |a: u8, b: u8| (a as f64 + f * (b as f64 - a as f64)).round() as u8;
            return RGBColor(lerp(c0.0, c1.0), lerp(c0.1, c1.1), lerp(c0.2, c1.2));
        }
    }
    let (_, c) = VIRIDIS[VIRIDIS.len() - 1];
    RGBColor(c.0, c.1, c.2)
}

/// 网格中心 → 格子边界
fn cell_edges(centers: &[f64]) -> Vec<f64> {
    match centers.len() {
        0 => Vec::new(),
        1 => vec![centers[0] - 0.5, centers[0] + 0.5],
        n => {
            let mut edges = Vec::with_capacity(n + 1);
            edges.push(centers[0] - (centers[1] - centers[0]) / 2.0);
            for w in centers.windows(2) {
                edges.push((w[0] + w[1]) / 2.0);
            }
            edges.push(centers[n - 1] + (centers[n - 1] - centers[n - 2]) / 2.0);
            edges
        }
    }
}

/// 带 5% 余量的范围；退化时展开 ±1
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < 1e-12 {
        return (lo - 1.0, hi + 1.0);
    }
    let margin = (hi - lo) * 0.05;
    (lo - margin, hi + margin)
}

// ─────────────────────────────────────────────────────────────
// 面板绘制
// ─────────────────────────────────────────────────────────────

/// 绘制 S(Q,ω) 色图
pub fn draw_color_map<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    data: &SqwData,
    highlight: Option<usize>,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    if data.n_q() < 2 || data.n_omega() < 2 {
        let (w, h) = area.dim_in_pixel();
        area.draw_text(
            "Insufficient data for 2D plot",
            &("sans-serif", TITLE_SIZE).into_font().color(&BLACK),
            (w as i32 / 2 - 140, h as i32 / 2),
        )
        .map_err(plot_err)?;
        return Ok(());
    }

    let (lo, hi) = data.intensity_range().unwrap_or((0.0, 1.0));
    let span = if hi > lo { hi - lo } else { 1.0 };

    let (w, _) = area.dim_in_pixel();
    let (map_area, bar_area) = area.split_horizontally((w as i32 - 90).max(1));

    let w_edges = cell_edges(&data.omega);
    let q_edges = cell_edges(&data.q);
    let x_range = w_edges[0].min(w_edges[w_edges.len() - 1])..w_edges[0].max(w_edges[w_edges.len() - 1]);
    let y_range = q_edges[0].min(q_edges[q_edges.len() - 1])..q_edges[0].max(q_edges[q_edges.len() - 1]);

    let mut chart = ChartBuilder::on(&map_area)
        .caption("2D Color Map - S(Q,ω)", ("sans-serif", TITLE_SIZE).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(x_range.clone(), y_range.clone())
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("ω (meV)")
        .y_desc("Q (Å⁻¹)")
        .x_label_style(("sans-serif", LABEL_SIZE))
        .y_label_style(("sans-serif", LABEL_SIZE))
        .axis_desc_style(("sans-serif", LABEL_SIZE + 2))
        .draw()
        .map_err(plot_err)?;

    let cells = (0..data.n_q()).flat_map(|i| (0..data.n_omega()).map(move |j| (i, j)));
    chart
        .draw_series(cells.filter_map(|(i, j)| {
            let s = data.intensity[(i, j)];
            if !s.is_finite() {
                return None;
            }
            let color = viridis((s - lo) / span);
            Some(Rectangle::new(
                [(w_edges[j], q_edges[i]), (w_edges[j + 1], q_edges[i + 1])],
                color.filled(),
            ))
        }))
        .map_err(plot_err)?;

    // 当前 Q 的红色虚线
    if let Some(idx) = highlight.filter(|i| *i < data.n_q()) {
        let q = data.q[idx];
        let n_dashes = 40;
        let dash = (x_range.end - x_range.start) / (2 * n_dashes) as f64;
        chart
            .draw_series((0..n_dashes).map(|k| {
                let x0 = x_range.start + 2.0 * k as f64 * dash;
                PathElement::new(vec![(x0, q), (x0 + dash, q)], RED.stroke_width(2))
            }))
            .map_err(plot_err)?;
    }

    // 色标
    let mut bar = ChartBuilder::on(&bar_area)
        .margin_top(45)
        .margin_bottom(50)
        .margin_right(5)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..1.0, lo..(lo + span))
        .map_err(plot_err)?;

    bar.configure_mesh()
        .disable_mesh()
        .x_labels(0)
        .y_label_style(("sans-serif", LABEL_SIZE - 2))
        .draw()
        .map_err(plot_err)?;

    let steps = 100;
    bar.draw_series((0..steps).map(|k| {
        let t0 = k as f64 / steps as f64;
        let t1 = (k + 1) as f64 / steps as f64;
        Rectangle::new(
            [(0.0, lo + t0 * span), (1.0, lo + t1 * span)],
            viridis((t0 + t1) / 2.0).filled(),
        )
    }))
    .map_err(plot_err)?;

    Ok(())
}

/// 绘制单谱与可选拟合曲线
pub fn draw_spectrum<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    spectrum: &Spectrum,
    fit: Option<&FitResult>,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let points = spectrum.valid_points();
    let x_range = padded_range(points.x.iter().copied());
    let y_range = padded_range(
        points
            .y
            .iter()
            .zip(&points.sigma)
            .flat_map(|(y, s)| [y - s, y + s]),
    );

    let title = match fit {
        Some(_) => format!("Fit at Q = {:.3} Å⁻¹", spectrum.q),
        None => format!("Spectrum at Q = {:.3} Å⁻¹", spectrum.q),
    };

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", TITLE_SIZE).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("ω (meV)")
        .y_desc("S(ω)")
        .x_label_style(("sans-serif", LABEL_SIZE))
        .y_label_style(("sans-serif", LABEL_SIZE))
        .axis_desc_style(("sans-serif", LABEL_SIZE + 2))
        .draw()
        .map_err(plot_err)?;

    let data_color = RGBColor(0, 102, 204);
    chart
        .draw_series(
            points
                .x
                .iter()
                .zip(&points.y)
                .zip(&points.sigma)
                .map(|((&x, &y), &s)| {
                    ErrorBar::new_vertical(x, y - s, y, y + s, data_color.mix(0.7).stroke_width(1), 4)
                }),
        )
        .map_err(plot_err)?;

    chart
        .draw_series(
            points
                .x
                .iter()
                .zip(&points.y)
                .map(|(&x, &y)| Circle::new((x, y), 3, data_color.mix(0.7).filled())),
        )
        .map_err(plot_err)?
        .label("Data")
        .legend(move |(x, y)| Circle::new((x + 10, y), 3, data_color.filled()));

    if let Some(fit) = fit.filter(|_| !points.is_empty()) {
        let x_min = points.x.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = points.x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let step = (x_max - x_min) / (FIT_CURVE_POINTS - 1) as f64;

        chart
            .draw_series(LineSeries::new(
                (0..FIT_CURVE_POINTS).map(|i| {
                    let x = x_min + step * i as f64;
                    (x, fit.evaluate(x))
                }),
                RED.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(format!("{} Fit", fit.shape))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));

        let mut lines = vec![format!("Model: {}", fit.shape)];
        for ((name, v), e) in fit
            .shape
            .param_names()
            .iter()
            .zip(&fit.params)
            .zip(&fit.errors)
        {
            lines.push(format!("{}: {:.3} ± {:.3}", name, v, e));
        }
        lines.push(format!("χ²_red: {:.3}", fit.reduced_chi2));

        let style = ("sans-serif", INFO_SIZE).into_font().color(&BLACK);
        for (i, line) in lines.iter().enumerate() {
            area.draw_text(line, &style, (75, 45 + i as i32 * (INFO_SIZE as i32 + 3)))
                .map_err(plot_err)?;
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    Ok(())
}

/// 绘制色散关系
pub fn draw_dispersion<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    points: &[DispersionPoint],
    law_fit: Option<&DispersionFit>,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let x_range = padded_range(points.iter().map(|p| p.q));
    let y_range = padded_range(
        points
            .iter()
            .flat_map(|p| [p.energy - p.energy_error, p.energy + p.energy_error]),
    );

    let mut chart = ChartBuilder::on(area)
        .caption("Dispersion Relation", ("sans-serif", TITLE_SIZE).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Q (Å⁻¹)")
        .y_desc("Peak Center (meV)")
        .x_label_style(("sans-serif", LABEL_SIZE))
        .y_label_style(("sans-serif", LABEL_SIZE))
        .axis_desc_style(("sans-serif", LABEL_SIZE + 2))
        .draw()
        .map_err(plot_err)?;

    if points.is_empty() {
        return Ok(());
    }

    let color = RGBColor(0, 102, 204);
    chart
        .draw_series(points.iter().map(|p| {
            ErrorBar::new_vertical(
                p.q,
                p.energy - p.energy_error,
                p.energy,
                p.energy + p.energy_error,
                color.stroke_width(1),
                5,
            )
        }))
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            points.iter().map(|p| (p.q, p.energy)),
            color.stroke_width(2),
        ))
        .map_err(plot_err)?;

    chart
        .draw_series(points.iter().map(|p| Circle::new((p.q, p.energy), 3, color.filled())))
        .map_err(plot_err)?
        .label("Peak center")
        .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));

    if let Some(law) = law_fit {
        let steps = 200;
        let dq = (x_range.1 - x_range.0) / steps as f64;
        let green = RGBColor(0, 150, 70);
        chart
            .draw_series(LineSeries::new(
                (0..=steps).map(|i| {
                    let q = x_range.0 + dq * i as f64;
                    (q, law.predict(q))
                }),
                green.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(law.law.to_string())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], green.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    Ok(())
}

/// 绘制振幅、宽度随 Q 的变化
pub fn draw_trends<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    points: &[DispersionPoint],
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let x_range = padded_range(points.iter().map(|p| p.q));
    let y_range = padded_range(points.iter().flat_map(|p| {
        [
            p.amplitude - p.amplitude_error,
            p.amplitude + p.amplitude_error,
            p.width - p.width_error,
            p.width + p.width_error,
        ]
    }));

    let mut chart = ChartBuilder::on(area)
        .caption("Parameter Trends", ("sans-serif", TITLE_SIZE).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Q (Å⁻¹)")
        .y_desc("Parameter Value")
        .x_label_style(("sans-serif", LABEL_SIZE))
        .y_label_style(("sans-serif", LABEL_SIZE))
        .axis_desc_style(("sans-serif", LABEL_SIZE + 2))
        .draw()
        .map_err(plot_err)?;

    if points.is_empty() {
        return Ok(());
    }

    let series: [(&str, RGBColor, fn(&DispersionPoint) -> (f64, f64)); 2] = [
        ("Amplitude", RGBColor(0, 102, 204), |p| (p.amplitude, p.amplitude_error)),
        ("Width", RGBColor(220, 90, 0), |p| (p.width, p.width_error)),
    ];

    for (label, color, get) in series {
        chart
            .draw_series(points.iter().map(|p| {
                let (v, e) = get(p);
                ErrorBar::new_vertical(p.q, v - e, v, v + e, color.stroke_width(1), 5)
            }))
            .map_err(plot_err)?;

        chart
            .draw_series(LineSeries::new(
                points.iter().map(|p| (p.q, get(p).0)),
                color.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    Ok(())
}

/// 2×2 总览：色图、当前谱、色散、参数趋势
pub fn draw_dashboard<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    data: &SqwData,
    q_index: usize,
    fit: Option<&FitResult>,
    points: &[DispersionPoint],
    law_fit: Option<&DispersionFit>,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(plot_err)?;
    let panels = root.split_evenly((2, 2));

    draw_color_map(&panels[0], data, Some(q_index))?;
    let spectrum = data.spectrum(q_index)?;
    draw_spectrum(&panels[1], &spectrum, fit)?;
    draw_dispersion(&panels[2], points, law_fit)?;
    draw_trends(&panels[3], points)?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────
// 文件输出
// ─────────────────────────────────────────────────────────────

/// 输出 S(Q,ω) 色图
pub fn render_color_map(
    path: &Path,
    data: &SqwData,
    highlight: Option<usize>,
    size: (u32, u32),
) -> Result<()> {
    if is_svg(path) {
        let root = SVGBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;
        draw_color_map(&root, data, highlight)?;
        root.present().map_err(plot_err)?;
    } else {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;
        draw_color_map(&root, data, highlight)?;
        root.present().map_err(plot_err)?;
    }
    Ok(())
}

/// 输出单谱拟合图
pub fn render_spectrum(
    path: &Path,
    spectrum: &Spectrum,
    fit: Option<&FitResult>,
    size: (u32, u32),
) -> Result<()> {
    if is_svg(path) {
        let root = SVGBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;
        draw_spectrum(&root, spectrum, fit)?;
        root.present().map_err(plot_err)?;
    } else {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;
        draw_spectrum(&root, spectrum, fit)?;
        root.present().map_err(plot_err)?;
    }
    Ok(())
}

/// 输出 2×2 总览
pub fn render_dashboard(
    path: &Path,
    data: &SqwData,
    q_index: usize,
    fit: Option<&FitResult>,
    points: &[DispersionPoint],
    law_fit: Option<&DispersionFit>,
    size: (u32, u32),
) -> Result<()> {
    if is_svg(path) {
        let root = SVGBackend::new(path, size).into_drawing_area();
        draw_dashboard(&root, data, q_index, fit, points, law_fit)?;
        root.present().map_err(plot_err)?;
    } else {
        let root = BitMapBackend::new(path, size).into_drawing_area();
        draw_dashboard(&root, data, q_index, fit, points, law_fit)?;
        root.present().map_err(plot_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viridis_endpoints() {
        assert_eq!(viridis(0.0), RGBColor(68, 1, 84));
        assert_eq!(viridis(1.0), RGBColor(253, 231, 37));
        assert_eq!(viridis(2.0), RGBColor(253, 231, 37));
        assert_eq!(viridis(f64::NAN), RGBColor(68, 1, 84));
    }

    #[test]
    fn test_cell_edges() {
        assert_eq!(cell_edges(&[0.0, 1.0, 2.0]), vec![-0.5, 0.5, 1.5, 2.5]);
        assert_eq!(cell_edges(&[3.0]), vec![2.5, 3.5]);
        assert!(cell_edges(&[]).is_empty());
    }

    #[test]
    fn test_padded_range() {
        let (lo, hi) = padded_range([0.0, 10.0].into_iter());
        assert!((lo + 0.5).abs() < 1e-12);
        assert!((hi - 10.5).abs() < 1e-12);
        assert_eq!(padded_range([2.0, 2.0].into_iter()), (1.0, 3.0));
        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.0));
    }

    #[test]
    fn test_svg_extension_detection() {
        assert!(is_svg(Path::new("out.SVG")));
        assert!(!is_svg(Path::new("out.png")));
        assert!(!is_svg(Path::new("out")));
    }
}
