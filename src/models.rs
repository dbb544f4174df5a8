use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{ReportError, Result};

/// Lookback applied when no explicit start is given.
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 60;

pub const DEFAULT_FILTER: &str = r#"metric.type="compute.googleapis.com/instance/cpu/utilization""#;

/// Lookback duration for a minute count, rejecting values chrono cannot represent.
pub fn lookback_minutes(minutes: i64) -> Result<Duration> {
    Duration::try_minutes(minutes).ok_or_else(|| {
        ReportError::Configuration(format!("lookback of {} minutes is out of range", minutes))
    })
}

/// Bounded query interval. `start < end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl QueryWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(ReportError::InvalidWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Builds the window from optional overrides.
    ///
    /// `end` falls back to `now`, `start` to `end - lookback`.
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        lookback: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let end = end.unwrap_or(now);
        let start = match start {
            Some(start) => start,
            None => end.checked_sub_signed(lookback).ok_or_else(|| {
                ReportError::Configuration(format!(
                    "lookback of {} minutes reaches past the earliest representable time",
                    lookback.num_minutes()
                ))
            })?,
        };
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Opaque series selector handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricFilter(String);

impl MetricFilter {
    pub fn new(expr: impl Into<String>) -> Result<Self> {
        let expr = expr.into();
        if expr.trim().is_empty() {
            return Err(ReportError::Configuration(
                "metric filter must not be empty".to_string(),
            ));
        }
        Ok(Self(expr))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value of a `metric.type="..."` clause, if the filter has one.
    pub fn metric_type(&self) -> Option<&str> {
        let rest = &self.0[self.0.find("metric.type")? + "metric.type".len()..];
        let rest = rest.trim_start().strip_prefix('=')?.trim_start();
        let rest = rest.strip_prefix('"')?;
        rest.find('"').map(|end| &rest[..end])
    }
}

impl Default for MetricFilter {
    fn default() -> Self {
        Self(DEFAULT_FILTER.to_string())
    }
}

impl fmt::Display for MetricFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric encoding of a point. Exactly one is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointValue {
    Double(f64),
    Int64(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub end_time: DateTime<Utc>,
    /// `None` when the backend sent a non-numeric encoding.
    pub value: Option<PointValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub metric_type: String,
    pub resource_type: String,
    pub labels: HashMap<String, String>,
    pub resource_labels: HashMap<String, String>,
    pub points: Vec<RawPoint>,
}

impl RawSeries {
    /// Metric label first, then resource label.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .get(name)
            .or_else(|| self.resource_labels.get(name))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn window_defaults_to_last_hour() {
        let now = at(1_700_000_000);
        let window =
            QueryWindow::resolve(None, None, Duration::minutes(DEFAULT_LOOKBACK_MINUTES), now)
                .unwrap();
        assert_eq!(window.end(), now);
        assert_eq!(window.start(), now - Duration::minutes(60));
    }

    #[test]
    fn window_honors_explicit_bounds() {
        let window = QueryWindow::resolve(
            Some(at(100)),
            Some(at(200)),
            Duration::minutes(60),
            at(1_000_000),
        )
        .unwrap();
        assert_eq!(window.start(), at(100));
        assert_eq!(window.end(), at(200));
    }

    #[test]
    fn window_start_only_ends_now() {
        let window =
            QueryWindow::resolve(Some(at(100)), None, Duration::minutes(60), at(500)).unwrap();
        assert_eq!(window.start(), at(100));
        assert_eq!(window.end(), at(500));
    }

    #[test]
    fn oversized_lookback_is_an_error() {
        let lookback = lookback_minutes(144_000_000_000).unwrap();
        let err = QueryWindow::resolve(None, None, lookback, at(1_700_000_000)).unwrap_err();
        assert!(matches!(err, ReportError::Configuration(_)));

        assert!(matches!(
            lookback_minutes(i64::MAX),
            Err(ReportError::Configuration(_))
        ));
    }

    #[test]
    fn window_rejects_inverted_bounds() {
        assert!(QueryWindow::new(at(200), at(100)).is_err());
        assert!(QueryWindow::new(at(100), at(100)).is_err());
    }

    #[test]
    fn filter_rejects_blank() {
        assert!(MetricFilter::new("   ").is_err());
    }

    #[test]
    fn filter_extracts_metric_type() {
        let filter = MetricFilter::default();
        assert_eq!(
            filter.metric_type(),
            Some("compute.googleapis.com/instance/cpu/utilization")
        );

        let filter = MetricFilter::new(r#"resource.type = "gce_instance""#).unwrap();
        assert_eq!(filter.metric_type(), None);
    }

    #[test]
    fn label_prefers_metric_labels() {
        let mut series = RawSeries::default();
        series.resource_labels.insert("zone".into(), "us-east1-b".into());
        series.labels.insert("zone".into(), "override".into());
        series.resource_labels.insert("instance_id".into(), "42".into());
        assert_eq!(series.label("zone"), Some("override"));
        assert_eq!(series.label("instance_id"), Some("42"));
        assert_eq!(series.label("missing"), None);
    }
}
