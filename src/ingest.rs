//! CSV ingestion
//!
//! Parses an uploaded CSV into [`RawStation`]s in file row order. Rows are
//! never re-sorted: file order is traverse order.

use crate::station::RawStation;
use crate::{Error, Result};
use csv::{ReaderBuilder, StringRecord, Trim};

/// Names of the columns holding coordinates and the measured value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Easting column
    pub x_column: String,
    /// Northing column
    pub y_column: String,
    /// Measured value column
    pub value_column: String,
}

impl ColumnMapping {
    /// Create a column mapping
    #[must_use]
    pub fn new(
        x_column: impl Into<String>,
        y_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        Self {
            x_column: x_column.into(),
            y_column: y_column.into(),
            value_column: value_column.into(),
        }
    }
}

struct ColumnIndices {
    x: usize,
    y: usize,
    value: usize,
}

impl ColumnIndices {
    fn resolve(headers: &StringRecord, mapping: &ColumnMapping) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let missing: Vec<&str> = [
            mapping.x_column.as_str(),
            mapping.y_column.as_str(),
            mapping.value_column.as_str(),
        ]
        .into_iter()
        .filter(|name| find(name).is_none())
        .collect();

        match (
            find(&mapping.x_column),
            find(&mapping.y_column),
            find(&mapping.value_column),
        ) {
            (Some(x), Some(y), Some(value)) => Ok(Self { x, y, value }),
            _ => Err(Error::Validation(format!(
                "missing required columns: {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Parse raw CSV bytes into stations.
///
/// # Errors
///
/// - `Error::Validation` if a mapped column is absent from the header
/// - `Error::Data` if the input is not UTF-8 CSV, a coordinate or value cell
///   cannot be parsed as a finite number, or there are no data rows
pub fn ingest(bytes: &[u8], mapping: &ColumnMapping) -> Result<Vec<RawStation>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| Error::Data(format!("unreadable CSV header: {e}")))?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Err(Error::Data("CSV is empty".to_string()));
    }
    let columns = ColumnIndices::resolve(&headers, mapping)?;

    let mut stations = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| Error::Data(format!("unreadable CSV row {row}: {e}")))?;

        let x = parse_coordinate(record.get(columns.x), row, &mapping.x_column)?;
        let y = parse_coordinate(record.get(columns.y), row, &mapping.y_column)?;
        let value = parse_value(record.get(columns.value), row)?;

        stations.push(RawStation::new(x, y, value));
    }

    if stations.is_empty() {
        return Err(Error::Data("CSV contains no data rows".to_string()));
    }

    tracing::debug!(
        rows = stations.len(),
        measured = stations.iter().filter(|s| s.value.is_some()).count(),
        "CSV ingested"
    );
    Ok(stations)
}

fn parse_coordinate(cell: Option<&str>, row: usize, column: &str) -> Result<f64> {
    let cell = cell.unwrap_or_default();
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Error::Data(format!(
            "invalid coordinate {cell:?} in column {column} at row {row}"
        ))),
    }
}

fn parse_value(cell: Option<&str>, row: usize) -> Result<Option<f64>> {
    match cell {
        None | Some("") => Ok(None),
        Some(cell) => match cell.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(Error::Data(format!("invalid value {cell:?} at row {row}"))),
        },
    }
}
