use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use resvg::{tiny_skia, usvg};

use crate::{models::MetricFilter, table::SeriesTable, ReportError, Result};

pub const DEFAULT_TITLE: &str = "CPU utilization";
pub const DEFAULT_X_LABEL: &str = "time";
pub const DEFAULT_Y_LABEL: &str = "utilization";
pub const DEFAULT_CHART_FILE: &str = "cpu_util.png";

const CPU_METRIC_TYPE: &str = "compute.googleapis.com/instance/cpu/utilization";

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 190.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 70.0;
const TICKS: usize = 5;

// matplotlib's default cycle
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            x_label: DEFAULT_X_LABEL.to_string(),
            y_label: DEFAULT_Y_LABEL.to_string(),
            file_name: DEFAULT_CHART_FILE.to_string(),
            width: 1000,
            height: 600,
        }
    }
}

impl ChartOptions {
    /// Labels derived from the filter's `metric.type`, CPU utilization otherwise.
    pub fn for_filter(filter: &MetricFilter) -> Self {
        match filter.metric_type() {
            Some(metric_type) if metric_type != CPU_METRIC_TYPE => {
                let leaf = metric_type.rsplit('/').next().unwrap_or(metric_type);
                Self {
                    title: metric_type.to_string(),
                    y_label: leaf.to_string(),
                    file_name: format!("{}.png", leaf),
                    ..Self::default()
                }
            }
            _ => Self::default(),
        }
    }
}

struct Scale {
    t0: i64,
    t1: i64,
    v0: f64,
    v1: f64,
    plot_w: f64,
    plot_h: f64,
}

impl Scale {
    fn new(table: &SeriesTable, options: &ChartOptions) -> Self {
        let (t0, t1) = match table.time_range() {
            Some((a, b)) if a < b => (a.timestamp_millis(), b.timestamp_millis()),
            Some((a, _)) => (a.timestamp_millis() - 30_000, a.timestamp_millis() + 30_000),
            None => {
                let now = Utc::now().timestamp_millis();
                (now - 3_600_000, now)
            }
        };
        let (v0, v1) = match table.value_range() {
            Some((lo, hi)) if lo < hi => {
                let pad = (hi - lo) * 0.05;
                (lo - pad, hi + pad)
            }
            Some((v, _)) => {
                let pad = if v == 0.0 { 1.0 } else { v.abs() * 0.1 };
                (v - pad, v + pad)
            }
            None => (0.0, 1.0),
        };
        Self {
            t0,
            t1,
            v0,
            v1,
            plot_w: options.width as f64 - MARGIN_LEFT - MARGIN_RIGHT,
            plot_h: options.height as f64 - MARGIN_TOP - MARGIN_BOTTOM,
        }
    }

    fn x(&self, at: DateTime<Utc>) -> f64 {
        let frac = (at.timestamp_millis() - self.t0) as f64 / (self.t1 - self.t0) as f64;
        MARGIN_LEFT + frac * self.plot_w
    }

    fn y(&self, value: f64) -> f64 {
        let frac = (value - self.v0) / (self.v1 - self.v0);
        MARGIN_TOP + (1.0 - frac) * self.plot_h
    }
}

/// Line chart of every column against time, as SVG markup.
pub fn build_svg(table: &SeriesTable, options: &ChartOptions) -> String {
    let scale = Scale::new(table, options);
    let (w, h) = (options.width as f64, options.height as f64);
    let bottom = MARGIN_TOP + scale.plot_h;
    let right = MARGIN_LEFT + scale.plot_w;
    let mut svg = String::new();

    let _ = writeln!(
        svg,
        "<svg xmlns='http://www.w3.org/2000/svg' width='{w}' height='{h}' viewBox='0 0 {w} {h}' font-family='sans-serif'>"
    );
    let _ = writeln!(svg, "  <rect width='{w}' height='{h}' fill='#ffffff'/>");
    let _ = writeln!(
        svg,
        "  <text x='{:.1}' y='32' font-size='20' text-anchor='middle'>{}</text>",
        MARGIN_LEFT + scale.plot_w / 2.0,
        escape_xml(&options.title)
    );

    // Grid and tick labels
    let span = Duration::milliseconds(scale.t1 - scale.t0);
    let time_format = if span > Duration::days(1) { "%m-%d %H:%M" } else { "%H:%M" };
    for i in 0..=TICKS {
        let frac = i as f64 / TICKS as f64;

        let value = scale.v0 + frac * (scale.v1 - scale.v0);
        let y = scale.y(value);
        let _ = writeln!(
            svg,
            "  <line x1='{MARGIN_LEFT}' y1='{y:.1}' x2='{right:.1}' y2='{y:.1}' stroke='#e0e0e0'/>"
        );
        let _ = writeln!(
            svg,
            "  <text x='{:.1}' y='{:.1}' font-size='12' text-anchor='end'>{}</text>",
            MARGIN_LEFT - 8.0,
            y + 4.0,
            format_value(value)
        );

        let millis = scale.t0 + ((scale.t1 - scale.t0) as f64 * frac) as i64;
        if let Some(at) = DateTime::<Utc>::from_timestamp_millis(millis) {
            let x = scale.x(at);
            let _ = writeln!(
                svg,
                "  <text x='{x:.1}' y='{:.1}' font-size='12' text-anchor='middle'>{}</text>",
                bottom + 20.0,
                at.format(time_format)
            );
        }
    }

    // Axes
    let _ = writeln!(
        svg,
        "  <path d='M{MARGIN_LEFT},{MARGIN_TOP} L{MARGIN_LEFT},{bottom:.1} L{right:.1},{bottom:.1}' fill='none' stroke='#333333'/>"
    );
    let _ = writeln!(
        svg,
        "  <text x='{:.1}' y='{:.1}' font-size='14' text-anchor='middle'>{}</text>",
        MARGIN_LEFT + scale.plot_w / 2.0,
        h - 20.0,
        escape_xml(&options.x_label)
    );
    let _ = writeln!(
        svg,
        "  <text x='20' y='{0:.1}' font-size='14' text-anchor='middle' transform='rotate(-90 20 {0:.1})'>{1}</text>",
        MARGIN_TOP + scale.plot_h / 2.0,
        escape_xml(&options.y_label)
    );

    // Series and legend
    for (i, key) in table.columns().iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        // Non-finite cells stay in the CSV but have no position on the chart.
        let points: Vec<_> = table
            .column_values(key)
            .into_iter()
            .filter(|(_, value)| value.is_finite())
            .collect();

        match points.as_slice() {
            [] => {}
            [(at, value)] => {
                let _ = writeln!(
                    svg,
                    "  <circle cx='{:.1}' cy='{:.1}' r='3' fill='{color}'/>",
                    scale.x(*at),
                    scale.y(*value)
                );
            }
            _ => {
                let coords = points
                    .iter()
                    .map(|(at, value)| format!("{:.1},{:.1}", scale.x(*at), scale.y(*value)))
                    .collect::<Vec<_>>()
                    .join(" ");
                let _ = writeln!(
                    svg,
                    "  <polyline points='{coords}' fill='none' stroke='{color}' stroke-width='1.8' stroke-linejoin='round'/>"
                );
            }
        }

        let ly = MARGIN_TOP + 10.0 + i as f64 * 20.0;
        let lx = right + 16.0;
        let _ = writeln!(
            svg,
            "  <line x1='{lx:.1}' y1='{ly:.1}' x2='{:.1}' y2='{ly:.1}' stroke='{color}' stroke-width='3'/>",
            lx + 20.0
        );
        let _ = writeln!(
            svg,
            "  <text x='{:.1}' y='{:.1}' font-size='12'>{}</text>",
            lx + 26.0,
            ly + 4.0,
            escape_xml(key)
        );
    }

    svg.push_str("</svg>\n");
    svg
}

/// Rasterizes the chart to PNG bytes.
pub fn render_png(table: &SeriesTable, options: &ChartOptions) -> Result<Vec<u8>> {
    let svg = build_svg(table, options);
    svg_to_png(&svg, options.width, options.height)
}

fn svg_to_png(svg: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let mut opt = usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_data(svg.as_bytes(), &opt)
        .map_err(|e| ReportError::Render(format!("SVG parse failed: {}", e)))?;

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ReportError::Render("pixmap allocation failed".to_string()))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.write_header()?.write_image_data(pixmap.data())?;
    }
    Ok(out)
}

fn format_value(value: f64) -> String {
    if value.abs() >= 1000.0 {
        format!("{:.0}", value)
    } else if value.abs() >= 10.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.3}", value)
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
        .replace('"', "&quot;")
}
