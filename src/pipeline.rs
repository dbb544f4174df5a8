use tracing::info;

use crate::{
    fetcher::{Fetcher, MetricBackend},
    models::{MetricFilter, QueryWindow},
    report::{ReportPaths, Reporter},
    reshape::Reshaper,
    ReportError, Result,
};

/// One report run: prepare output, fetch, reshape, write.
pub struct Pipeline<B> {
    pub fetcher: Fetcher<B>,
    pub reshaper: Reshaper,
    pub reporter: Reporter,
}

impl<B: MetricBackend> Pipeline<B> {
    pub fn new(fetcher: Fetcher<B>, reshaper: Reshaper, reporter: Reporter) -> Self {
        Self {
            fetcher,
            reshaper,
            reporter,
        }
    }

    pub async fn run(&self, filters: &[MetricFilter], window: &QueryWindow) -> Result<ReportPaths> {
        if filters.is_empty() {
            return Err(ReportError::Configuration(
                "at least one metric filter is required".to_string(),
            ));
        }

        // An unusable output directory must fail before any network call.
        self.reporter.prepare()?;

        let series = self.fetcher.fetch_all(filters, window).await?;
        let table = self.reshaper.reshape(&series);
        info!(
            series = series.len(),
            columns = table.columns().len(),
            rows = table.row_count(),
            "Built series table"
        );

        self.reporter.write_all(&table)
    }
}
