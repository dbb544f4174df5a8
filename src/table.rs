use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time-aligned table: one column per series key, one row per timestamp.
///
/// Columns keep first-insertion order; rows are chronological. Cells a
/// series never reported stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesTable {
    columns: Vec<String>,
    rows: BTreeMap<DateTime<Utc>, Vec<Option<f64>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub count: u64,
    pub sum: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricAggregate {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut aggregate = MetricAggregate {
            count: 0,
            sum: 0.0,
            average: 0.0,
            min: f64::MAX,
            max: f64::MIN,
        };
        for value in values {
            aggregate.count += 1;
            aggregate.sum += value;
            aggregate.min = aggregate.min.min(value);
            aggregate.max = aggregate.max.max(value);
        }
        if aggregate.count == 0 {
            return None;
        }
        aggregate.average = aggregate.sum / aggregate.count as f64;
        Some(aggregate)
    }
}

impl SeriesTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `key`, adding an empty column if it is new.
    pub fn ensure_column(&mut self, key: &str) -> usize {
        if let Some(idx) = self.column_index(key) {
            return idx;
        }
        self.columns.push(key.to_string());
        for cells in self.rows.values_mut() {
            cells.push(None);
        }
        self.columns.len() - 1
    }

    /// Sets a cell unless it already holds a value. Returns `false` on collision.
    pub fn insert(&mut self, timestamp: DateTime<Utc>, key: &str, value: f64) -> bool {
        let idx = self.ensure_column(key);
        let width = self.columns.len();
        let cells = self
            .rows
            .entry(timestamp)
            .or_insert_with(|| vec![None; width]);
        match cells[idx] {
            Some(_) => false,
            None => {
                cells[idx] = Some(value);
                true
            }
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == key)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &DateTime<Utc>> + '_ {
        self.rows.keys()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&DateTime<Utc>, &[Option<f64>])> + '_ {
        self.rows.iter().map(|(ts, cells)| (ts, cells.as_slice()))
    }

    pub fn get(&self, timestamp: &DateTime<Utc>, key: &str) -> Option<f64> {
        let idx = self.column_index(key)?;
        self.rows.get(timestamp)?[idx]
    }

    /// Set cells of one column, in time order.
    pub fn column_values(&self, key: &str) -> Vec<(DateTime<Utc>, f64)> {
        let Some(idx) = self.column_index(key) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|(ts, cells)| cells[idx].map(|v| (*ts, v)))
            .collect()
    }

    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = *self.rows.keys().next()?;
        let last = *self.rows.keys().next_back()?;
        Some((first, last))
    }

    /// Min and max over finite cells.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let aggregate = MetricAggregate::from_values(
            self.rows
                .values()
                .flat_map(|cells| cells.iter().flatten().copied())
                .filter(|v| v.is_finite()),
        )?;
        Some((aggregate.min, aggregate.max))
    }

    pub fn summary(&self) -> Vec<(String, Option<MetricAggregate>)> {
        self.columns
            .iter()
            .map(|key| {
                let values = self.column_values(key).into_iter().map(|(_, v)| v);
                (key.clone(), MetricAggregate::from_values(values))
            })
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
