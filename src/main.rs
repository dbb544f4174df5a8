use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::{debug, error, info, Level};

use cloud_metrics_report::{
    config::MonitoringConfig,
    fetcher::{Fetcher, GrpcBackend},
    logging, metrics,
    models::{lookback_minutes, MetricFilter, QueryWindow, DEFAULT_FILTER, DEFAULT_LOOKBACK_MINUTES},
    pipeline::Pipeline,
    report::{ChartOptions, Reporter, DEFAULT_OUT_DIR},
    reshape::{LabelsKey, Reshaper, DEFAULT_KEY_FALLBACK},
    Result,
};

/// Fetch cloud monitoring time series and write a CSV table and chart
#[derive(Parser, Debug)]
#[command(name = "cloud-metrics-report")]
#[command(about = "Export a window of cloud monitoring time series to CSV and PNG")]
struct Args {
    /// Output directory, created if absent
    #[arg(long, default_value = DEFAULT_OUT_DIR)]
    out_dir: PathBuf,

    /// Window start (RFC 3339); defaults to end minus the lookback
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Window end (RFC 3339); defaults to now
    #[arg(long)]
    end: Option<DateTime<Utc>>,

    /// Lookback used when no start is given
    #[arg(long, default_value_t = DEFAULT_LOOKBACK_MINUTES)]
    lookback_minutes: i64,

    /// Time series filter; repeat to fetch several metrics concurrently
    #[arg(long = "filter", default_value = DEFAULT_FILTER)]
    filters: Vec<String>,

    /// Label(s) naming each column; defaults to instance_name
    #[arg(long = "group-by")]
    group_by: Vec<String>,

    /// Chart title; defaults from the first filter's metric type
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    x_label: Option<String>,

    #[arg(long)]
    y_label: Option<String>,

    /// Chart file name inside the output directory
    #[arg(long)]
    chart_file: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Emit logs as JSON
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init_logger(args.log_level, args.json_logs) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Report failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // Configuration problems are reported before any network call.
    let config = MonitoringConfig::from_env()?;
    let filters = args
        .filters
        .iter()
        .map(MetricFilter::new)
        .collect::<Result<Vec<_>>>()?;
    let lookback = lookback_minutes(args.lookback_minutes)?;
    let window = QueryWindow::resolve(args.start, args.end, lookback, Utc::now())?;

    let mut chart = filters
        .first()
        .map(ChartOptions::for_filter)
        .unwrap_or_default();
    if let Some(title) = args.title {
        chart.title = title;
    }
    if let Some(x_label) = args.x_label {
        chart.x_label = x_label;
    }
    if let Some(y_label) = args.y_label {
        chart.y_label = y_label;
    }
    if let Some(chart_file) = args.chart_file {
        chart.file_name = chart_file;
    }

    let reshaper = if args.group_by.is_empty() {
        Reshaper::default()
    } else {
        Reshaper::new(LabelsKey::new(args.group_by, DEFAULT_KEY_FALLBACK))
    };

    info!(
        project = %config.project_id,
        out_dir = %args.out_dir.display(),
        start = %window.start(),
        end = %window.end(),
        filters = filters.len(),
        "Starting cloud-metrics-report"
    );

    let reporter = Reporter::new(args.out_dir, chart);
    let backend = GrpcBackend::connect(&config)?;
    let pipeline = Pipeline::new(Fetcher::new(config, backend), reshaper, reporter);
    pipeline.run(&filters, &window).await?;

    debug!("Run metrics:\n{}", metrics::render_text());
    Ok(())
}
