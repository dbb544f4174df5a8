use tracing::{debug, warn};

use crate::{
    metrics,
    models::{PointValue, RawPoint, RawSeries, Sample},
    table::SeriesTable,
};

pub const DEFAULT_KEY_LABEL: &str = "instance_name";
pub const DEFAULT_KEY_FALLBACK: &str = "instance";

/// Maps a series to its column name.
pub trait KeySelector: Send + Sync {
    fn key(&self, series: &RawSeries) -> String;
}

impl<F> KeySelector for F
where
    F: Fn(&RawSeries) -> String + Send + Sync,
{
    fn key(&self, series: &RawSeries) -> String {
        self(series)
    }
}

/// Column named after a single label, with a fixed fallback.
#[derive(Debug, Clone)]
pub struct LabelKey {
    label: String,
    fallback: String,
}

impl LabelKey {
    pub fn new(label: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            fallback: fallback.into(),
        }
    }
}

impl Default for LabelKey {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_LABEL, DEFAULT_KEY_FALLBACK)
    }
}

impl KeySelector for LabelKey {
    fn key(&self, series: &RawSeries) -> String {
        series
            .labels
            .get(&self.label)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Column named after a combination of labels, e.g. `zone=us-east1-b,instance_name=vm-1`.
///
/// Metric labels are consulted before resource labels. Missing labels are skipped;
/// if none are present the fallback is used.
#[derive(Debug, Clone)]
pub struct LabelsKey {
    labels: Vec<String>,
    fallback: String,
}

impl LabelsKey {
    pub fn new(labels: Vec<String>, fallback: impl Into<String>) -> Self {
        Self {
            labels,
            fallback: fallback.into(),
        }
    }
}

impl KeySelector for LabelsKey {
    fn key(&self, series: &RawSeries) -> String {
        let parts: Vec<String> = self
            .labels
            .iter()
            .filter_map(|name| series.label(name).map(|value| format!("{}={}", name, value)))
            .collect();
        if parts.is_empty() {
            self.fallback.clone()
        } else {
            parts.join(",")
        }
    }
}

/// Sample for a point, using whichever encoding the backend populated.
///
/// Zero is a value like any other; only points with no numeric encoding are dropped.
pub fn normalize(point: &RawPoint) -> Option<Sample> {
    let value = match point.value? {
        PointValue::Double(v) => v,
        PointValue::Int64(v) => v as f64,
    };
    Some(Sample {
        timestamp: point.end_time,
        value,
    })
}

pub fn series_samples(series: &RawSeries) -> Vec<Sample> {
    series.points.iter().filter_map(normalize).collect()
}

pub struct Reshaper {
    selector: Box<dyn KeySelector>,
}

impl Default for Reshaper {
    fn default() -> Self {
        Self::new(LabelKey::default())
    }
}

impl Reshaper {
    pub fn new(selector: impl KeySelector + 'static) -> Self {
        Self {
            selector: Box::new(selector),
        }
    }

    pub fn key_for(&self, series: &RawSeries) -> String {
        self.selector.key(series)
    }

    /// Folds series into one table. Columns follow input order.
    pub fn reshape(&self, series: &[RawSeries]) -> SeriesTable {
        let mut table = SeriesTable::new();
        let mut retained = 0;
        let mut dropped = 0;

        for s in series {
            let key = self.selector.key(s);
            table.ensure_column(&key);

            let samples = series_samples(s);
            dropped += s.points.len() - samples.len();
            retained += samples.len();

            for sample in samples {
                if !table.insert(sample.timestamp, &key, sample.value) {
                    warn!(
                        key = %key,
                        timestamp = %sample.timestamp,
                        "Duplicate sample for column, keeping first value"
                    );
                }
            }
        }

        metrics::record_points(retained, dropped);
        debug!(
            columns = table.columns().len(),
            rows = table.row_count(),
            retained,
            dropped,
            "Reshaped time series"
        );
        table
    }
}
