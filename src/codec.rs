//! Artifact encoding
//!
//! CSV writers for every stage artifact and the parser for prediction
//! bodies returned by the inference collaborator.
//!
//! | Artifact | Columns |
//! |---|---|
//! | `geometry/traverse.csv` | `x,y,distance_along,value,is_measured,generated` |
//! | `split/train.csv` | `distance_along,value` |
//! | `split/predict.csv` | `distance_along` |
//! | `output/final.csv` | `x,y,distance_along,value,is_measured` |

use crate::merge::{PredictionContract, Predictions};
use crate::split::TrainingSample;
use crate::station::{CompletedStation, Traverse};
use crate::{Error, Result};
use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct TraverseRow {
    x: f64,
    y: f64,
    distance_along: f64,
    value: Option<f64>,
    is_measured: bool,
    generated: bool,
}

#[derive(Serialize)]
struct QueryRow {
    distance_along: f64,
}

fn write_rows<T: Serialize>(rows: impl IntoIterator<Item = T>) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| Error::Storage(format!("CSV encode failed: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Storage(format!("CSV flush failed: {e}")))
}

/// Encode the frozen traverse.
///
/// # Errors
///
/// Returns `Error::Storage` if encoding fails.
pub fn traverse_csv(traverse: &Traverse) -> Result<Vec<u8>> {
    write_rows(traverse.stations().iter().map(|s| TraverseRow {
        x: s.x(),
        y: s.y(),
        distance_along: s.distance_along(),
        value: s.value(),
        is_measured: s.is_measured(),
        generated: s.generated(),
    }))
}

/// Encode training pairs.
///
/// # Errors
///
/// Returns `Error::Storage` if encoding fails.
pub fn train_csv(samples: &[TrainingSample]) -> Result<Vec<u8>> {
    write_rows(samples)
}

/// Encode query distances.
///
/// # Errors
///
/// Returns `Error::Storage` if encoding fails.
pub fn predict_csv(queries: &[f64]) -> Result<Vec<u8>> {
    write_rows(queries.iter().map(|&distance_along| QueryRow { distance_along }))
}

/// Encode the final deliverable.
///
/// # Errors
///
/// Returns `Error::Storage` if encoding fails.
pub fn final_csv(stations: &[CompletedStation]) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct FinalRow {
        x: f64,
        y: f64,
        distance_along: f64,
        value: f64,
        is_measured: bool,
    }

    write_rows(stations.iter().map(|s| FinalRow {
        x: s.x,
        y: s.y,
        distance_along: s.distance_along,
        value: s.value,
        is_measured: s.is_measured,
    }))
}

/// Encode predictions in the form [`parse_predictions`] reads back.
///
/// # Errors
///
/// Returns `Error::Storage` if encoding fails.
pub fn predictions_csv(predictions: &Predictions) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct Positional {
        value: f64,
    }
    #[derive(Serialize)]
    struct Keyed {
        distance_along: f64,
        value: f64,
    }

    match predictions {
        Predictions::Positional(values) => {
            write_rows(values.iter().map(|&value| Positional { value }))
        }
        Predictions::ByDistance(pairs) => write_rows(
            pairs
                .iter()
                .map(|&(distance_along, value)| Keyed { distance_along, value }),
        ),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyedEntry {
    Pair([f64; 2]),
    Object { distance_along: f64, value: f64 },
}

impl KeyedEntry {
    fn into_pair(self) -> (f64, f64) {
        match self {
            Self::Pair([d, v]) | Self::Object { distance_along: d, value: v } => (d, v),
        }
    }
}

/// Parse a prediction body.
///
/// Positional bodies are a JSON array of numbers, or one number per line
/// (first CSV field; a leading non-numeric line is a header). Distance-keyed
/// bodies are a JSON array of `[distance, value]` pairs or
/// `{"distance_along", "value"}` objects, or a CSV with a `distance_along`
/// column whose value is the first other column.
///
/// # Errors
///
/// Returns `Error::Inference` if the body is not UTF-8 or cannot be parsed.
pub fn parse_predictions(body: &[u8], contract: PredictionContract) -> Result<Predictions> {
    let text = std::str::from_utf8(body)
        .map_err(|e| Error::Inference(format!("prediction body is not UTF-8: {e}")))?
        .trim();

    match contract {
        PredictionContract::Positional => parse_positional(text).map(Predictions::Positional),
        PredictionContract::DistanceKeyed => parse_keyed(text).map(Predictions::ByDistance),
    }
}

fn parse_positional(text: &str) -> Result<Vec<f64>> {
    if text.starts_with('[') {
        return serde_json::from_str(text)
            .map_err(|e| Error::Inference(format!("malformed JSON predictions: {e}")));
    }

    let mut values = Vec::new();
    for (i, line) in text.lines().map(str::trim).enumerate() {
        if line.is_empty() {
            continue;
        }
        let field = line.split(',').next().unwrap_or_default().trim();
        match field.parse::<f64>() {
            Ok(v) => values.push(v),
            Err(_) if values.is_empty() && i == 0 => {}
            Err(_) => {
                return Err(Error::Inference(format!(
                    "invalid prediction {field:?} on line {}",
                    i + 1
                )));
            }
        }
    }
    Ok(values)
}

fn parse_keyed(text: &str) -> Result<Vec<(f64, f64)>> {
    if text.starts_with('[') {
        let entries: Vec<KeyedEntry> = serde_json::from_str(text)
            .map_err(|e| Error::Inference(format!("malformed JSON predictions: {e}")))?;
        return Ok(entries.into_iter().map(KeyedEntry::into_pair).collect());
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| Error::Inference(format!("unreadable prediction header: {e}")))?
        .clone();
    let distance_idx = headers
        .iter()
        .position(|h| h == "distance_along")
        .ok_or_else(|| Error::Inference("predictions lack a distance_along column".to_string()))?;
    let value_idx = (0..headers.len())
        .find(|&i| i != distance_idx)
        .ok_or_else(|| Error::Inference("predictions lack a value column".to_string()))?;

    let mut pairs = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| Error::Inference(format!("unreadable prediction row: {e}")))?;
        let cell = |idx: usize| -> Result<f64> {
            let raw = record.get(idx).unwrap_or_default();
            raw.parse::<f64>().map_err(|_| {
                Error::Inference(format!("invalid number {raw:?} in prediction row {}", i + 1))
            })
        };
        pairs.push((cell(distance_idx)?, cell(value_idx)?));
    }
    Ok(pairs)
}
