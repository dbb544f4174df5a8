use chrono::SecondsFormat;

use crate::table::SeriesTable;

pub const TIME_COLUMN: &str = "time";

/// Flat CSV: `time` index column, then one column per series key.
pub fn build_csv(table: &SeriesTable) -> String {
    let mut csv = String::new();

    let header = std::iter::once(TIME_COLUMN.to_string())
        .chain(table.columns().iter().map(|key| escape_csv(key)))
        .collect::<Vec<_>>()
        .join(",");
    csv.push_str(&header);
    csv.push('\n');

    for (timestamp, cells) in table.rows() {
        let line = std::iter::once(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .chain(cells.iter().map(|cell| match cell {
                Some(value) => value.to_string(),
                None => String::new(),
            }))
            .collect::<Vec<_>>()
            .join(",");
        csv.push_str(&line);
        csv.push('\n');
    }

    csv
}

fn escape_csv(value: &str) -> String {
    let needs_quotes = value.contains([',', '"', '\n', '\r']);
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
