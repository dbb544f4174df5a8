//! Output artifacts for a reshaped table.
//!
//! All artifacts are rendered in memory first and then written through a
//! temporary sibling that is renamed into place, so a failed run never
//! leaves a truncated file at a final path.

pub mod chart;
pub mod csv;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::{metrics, table::MetricAggregate, table::SeriesTable, ReportError, Result};

pub use chart::ChartOptions;

pub const DEFAULT_OUT_DIR: &str = "results/metrics";
pub const CSV_FILE: &str = "metrics.csv";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub csv: PathBuf,
    pub chart: PathBuf,
    pub summary: PathBuf,
}

#[derive(Debug, Serialize)]
struct ColumnSummary<'a> {
    key: &'a str,
    #[serde(flatten)]
    aggregate: Option<MetricAggregate>,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    title: &'a str,
    rows: usize,
    start: Option<String>,
    end: Option<String>,
    columns: Vec<ColumnSummary<'a>>,
}

pub struct Reporter {
    out_dir: PathBuf,
    chart: ChartOptions,
}

impl Reporter {
    pub fn new(out_dir: impl Into<PathBuf>, chart: ChartOptions) -> Self {
        Self {
            out_dir: out_dir.into(),
            chart,
        }
    }

    pub fn paths(&self) -> ReportPaths {
        ReportPaths {
            csv: self.out_dir.join(CSV_FILE),
            chart: self.out_dir.join(&self.chart.file_name),
            summary: self.out_dir.join(SUMMARY_FILE),
        }
    }

    /// Creates the output directory. Fails if the path exists and is not a directory.
    pub fn prepare(&self) -> Result<()> {
        if self.out_dir.exists() && !self.out_dir.is_dir() {
            return Err(ReportError::io(
                &self.out_dir,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "output path exists and is not a directory",
                ),
            ));
        }
        fs::create_dir_all(&self.out_dir).map_err(|e| ReportError::io(&self.out_dir, e))?;
        debug!(out_dir = %self.out_dir.display(), "Output directory ready");
        Ok(())
    }

    pub fn export(&self, table: &SeriesTable) -> Result<PathBuf> {
        let path = self.paths().csv;
        write_atomic(&path, csv::build_csv(table).as_bytes())?;
        Ok(path)
    }

    pub fn render(&self, table: &SeriesTable) -> Result<PathBuf> {
        let path = self.paths().chart;
        write_atomic(&path, &chart::render_png(table, &self.chart)?)?;
        Ok(path)
    }

    pub fn write_summary(&self, table: &SeriesTable) -> Result<PathBuf> {
        let path = self.paths().summary;
        write_atomic(&path, &self.summary_json(table)?)?;
        Ok(path)
    }

    /// Renders every artifact before writing any of them. Expects `prepare` to have run.
    pub fn write_all(&self, table: &SeriesTable) -> Result<ReportPaths> {
        let csv = csv::build_csv(table);
        let png = chart::render_png(table, &self.chart)?;
        let summary = self.summary_json(table)?;

        let paths = self.paths();
        write_atomic(&paths.csv, csv.as_bytes())?;
        write_atomic(&paths.chart, &png)?;
        write_atomic(&paths.summary, &summary)?;

        info!(
            csv = %paths.csv.display(),
            chart = %paths.chart.display(),
            summary = %paths.summary.display(),
            "Report written"
        );
        Ok(paths)
    }

    fn summary_json(&self, table: &SeriesTable) -> Result<Vec<u8>> {
        let summaries = table.summary();
        let range = table.time_range();
        let summary = Summary {
            title: &self.chart.title,
            rows: table.row_count(),
            start: range.map(|(start, _)| start.to_rfc3339()),
            end: range.map(|(_, end)| end.to_rfc3339()),
            columns: summaries
                .iter()
                .map(|(key, aggregate)| ColumnSummary {
                    key,
                    aggregate: aggregate.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&summary)?)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(ReportError::io(&tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(ReportError::io(path, e));
    }

    metrics::record_file_written();
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn table() -> SeriesTable {
        let mut table = SeriesTable::new();
        table.insert(Utc.timestamp_opt(60, 0).unwrap(), "a", 10.0);
        table.insert(Utc.timestamp_opt(120, 0).unwrap(), "a", 20.0);
        table.insert(Utc.timestamp_opt(60, 0).unwrap(), "b", 5.0);
        table
    }

    #[test]
    fn writes_all_artifacts_into_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results").join("metrics");
        let reporter = Reporter::new(&out, ChartOptions::default());
        reporter.prepare().unwrap();

        let paths = reporter.write_all(&table()).unwrap();

        assert_eq!(paths.chart, out.join("cpu_util.png"));
        assert_eq!(paths.csv, out.join("metrics.csv"));
        assert!(paths.chart.is_file());
        let csv = fs::read_to_string(&paths.csv).unwrap();
        assert!(csv.starts_with("time,a,b\n"));

        let summary: serde_json::Value =
            serde_json::from_slice(&fs::read(&paths.summary).unwrap()).unwrap();
        assert_eq!(summary["rows"], 2);
        assert_eq!(summary["columns"][0]["key"], "a");
        assert_eq!(summary["columns"][0]["average"], 15.0);
        assert_eq!(summary["columns"][1]["count"], 1);

        let leftovers: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn prepare_rejects_file_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("metrics");
        fs::write(&out, b"not a directory").unwrap();

        let reporter = Reporter::new(&out, ChartOptions::default());
        let err = reporter.prepare().unwrap_err();

        assert!(matches!(err, ReportError::Io { .. }));
        assert_eq!(fs::read(&out).unwrap(), b"not a directory");
    }

    #[test]
    fn write_all_without_directory_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("missing");
        let reporter = Reporter::new(&out, ChartOptions::default());

        let err = reporter.write_all(&table()).unwrap_err();

        assert!(matches!(err, ReportError::Io { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn individual_writers_use_configured_names() {
        let dir = tempfile::tempdir().unwrap();
        let options = ChartOptions {
            file_name: "memory.png".into(),
            ..ChartOptions::default()
        };
        let reporter = Reporter::new(dir.path(), options);
        reporter.prepare().unwrap();

        assert_eq!(reporter.export(&table()).unwrap(), dir.path().join(CSV_FILE));
        assert_eq!(reporter.render(&table()).unwrap(), dir.path().join("memory.png"));
        assert_eq!(
            reporter.write_summary(&table()).unwrap(),
            dir.path().join(SUMMARY_FILE)
        );
    }
}
