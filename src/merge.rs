//! Prediction merge
//!
//! Recombines inference output with the frozen traverse:
//!
//! - measured stations keep their value verbatim
//! - unmeasured stations take the prediction for their position
//! - predictions outside the observed distance range are clamped to the
//!   value at the nearest end of that range
//!
//! The prediction count must equal the predict-set size. A mismatch is a
//! hard error, never a silent drop.

use crate::geometry::DISTANCE_TOLERANCE;
use crate::split::split;
use crate::station::{CompletedStation, StationRecord, Traverse};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the inference collaborator addresses its predictions. Fixed per
/// deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionContract {
    /// One value per query, in submission order
    #[default]
    Positional,
    /// `(distance_along, value)` pairs, matched by distance
    DistanceKeyed,
}

impl PredictionContract {
    /// Contract name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Positional => "positional",
            Self::DistanceKeyed => "distance",
        }
    }
}

impl fmt::Display for PredictionContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionContract {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positional" => Ok(Self::Positional),
            "distance" | "distance_keyed" => Ok(Self::DistanceKeyed),
            other => Err(Error::Validation(format!(
                "unknown prediction contract {other:?} (expected positional or distance)"
            ))),
        }
    }
}

/// Values returned by the inference collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    /// One value per query, in submission order
    Positional(Vec<f64>),
    /// `(distance_along, value)` pairs
    ByDistance(Vec<(f64, f64)>),
}

impl Predictions {
    /// No predictions, for a traverse with nothing to predict
    #[must_use]
    pub const fn empty(contract: PredictionContract) -> Self {
        match contract {
            PredictionContract::Positional => Self::Positional(Vec::new()),
            PredictionContract::DistanceKeyed => Self::ByDistance(Vec::new()),
        }
    }

    /// Number of predicted values
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::ByDistance(pairs) => pairs.len(),
        }
    }

    /// Whether there are no predictions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contract this payload follows
    #[must_use]
    pub const fn contract(&self) -> PredictionContract {
        match self {
            Self::Positional(_) => PredictionContract::Positional,
            Self::ByDistance(_) => PredictionContract::DistanceKeyed,
        }
    }
}

/// Observed distance range and the values at its ends.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TrainDomain {
    min_distance: f64,
    min_value: f64,
    max_distance: f64,
    max_value: f64,
}

impl TrainDomain {
    /// First station wins on ties at either end.
    fn from_train(train: &[&StationRecord]) -> Option<Self> {
        let mut domain: Option<Self> = None;
        for station in train {
            let (d, Some(v)) = (station.distance_along(), station.value()) else {
                continue;
            };
            match domain.as_mut() {
                None => {
                    domain = Some(Self {
                        min_distance: d,
                        min_value: v,
                        max_distance: d,
                        max_value: v,
                    });
                }
                Some(dom) => {
                    if d < dom.min_distance {
                        dom.min_distance = d;
                        dom.min_value = v;
                    }
                    if d > dom.max_distance {
                        dom.max_distance = d;
                        dom.max_value = v;
                    }
                }
            }
        }
        domain
    }

    fn clamp(&self, distance: f64, predicted: f64) -> f64 {
        if distance < self.min_distance {
            self.min_value
        } else if distance > self.max_distance {
            self.max_value
        } else {
            predicted
        }
    }
}

/// Distance-keyed predictions sorted for tolerance lookup. Each pair
/// answers exactly one query.
struct DistanceIndex {
    pairs: Vec<(f64, f64)>,
    used: Vec<bool>,
}

impl DistanceIndex {
    fn new(pairs: &[(f64, f64)]) -> Self {
        let mut pairs = pairs.to_vec();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let used = vec![false; pairs.len()];
        Self { pairs, used }
    }

    /// First unused pair within tolerance of `distance`, marked used.
    fn take(&mut self, distance: f64) -> Option<f64> {
        let start = self
            .pairs
            .partition_point(|(d, _)| *d < distance - DISTANCE_TOLERANCE);
        let offset = self.pairs[start..]
            .iter()
            .zip(&self.used[start..])
            .take_while(|((d, _), _)| *d <= distance + DISTANCE_TOLERANCE)
            .position(|(_, used)| !used)?;
        let i = start + offset;
        self.used[i] = true;
        Some(self.pairs[i].1)
    }

    /// Distances of pairs no query consumed
    fn unused(&self) -> Vec<f64> {
        self.pairs
            .iter()
            .zip(&self.used)
            .filter(|(_, used)| !**used)
            .map(|((d, _), _)| *d)
            .collect()
    }
}

/// Merge predictions into the traverse, producing a fully valued sequence
/// in traverse order.
///
/// # Errors
///
/// Returns `Error::Merge` if the payload does not follow `contract`, the
/// prediction count differs from the number of unmeasured stations, a
/// distance-keyed prediction is missing, or a merged value is not finite.
/// Returns `Error::Data` if the traverse has no measured station.
pub fn merge(
    traverse: &Traverse,
    predictions: &Predictions,
    contract: PredictionContract,
) -> Result<Vec<CompletedStation>> {
    if predictions.contract() != contract {
        return Err(Error::Merge(format!(
            "expected {contract} predictions, received {}",
            predictions.contract()
        )));
    }

    let partition = split(traverse)?;
    let expected = partition.predict().len();
    if predictions.len() != expected {
        return Err(Error::Merge(format!(
            "prediction count mismatch: expected {expected}, received {}",
            predictions.len()
        )));
    }

    let domain = TrainDomain::from_train(partition.train())
        .ok_or_else(|| Error::Data("no training data".to_string()))?;

    let mut positional = match predictions {
        Predictions::Positional(values) => Some(values.iter()),
        Predictions::ByDistance(_) => None,
    };
    let mut index = match predictions {
        Predictions::ByDistance(pairs) => Some(DistanceIndex::new(pairs)),
        Predictions::Positional(_) => None,
    };

    let mut clamped = 0usize;
    let mut merged = Vec::with_capacity(traverse.len());
    for station in traverse.stations() {
        let d = station.distance_along();
        if let Some(value) = station.value() {
            merged.push(CompletedStation {
                x: station.x(),
                y: station.y(),
                distance_along: d,
                value,
                is_measured: true,
            });
            continue;
        }

        let raw = match (positional.as_mut(), index.as_mut()) {
            (Some(values), _) => values.next().copied(),
            (None, Some(index)) => index.take(d),
            (None, None) => None,
        }
        .ok_or_else(|| Error::Merge(format!("missing prediction for distance {d}")))?;

        let value = domain.clamp(d, raw);
        if value.to_bits() != raw.to_bits() {
            clamped += 1;
        }
        if !value.is_finite() {
            return Err(Error::Merge(format!(
                "non-finite prediction {value} for distance {d}"
            )));
        }

        merged.push(CompletedStation {
            x: station.x(),
            y: station.y(),
            distance_along: d,
            value,
            is_measured: false,
        });
    }

    if let Some(index) = &index {
        let unused = index.unused();
        if !unused.is_empty() {
            return Err(Error::Merge(format!(
                "unused predictions remain at distances {unused:?}"
            )));
        }
    }

    tracing::debug!(
        stations = merged.len(),
        predicted = expected,
        clamped,
        "predictions merged"
    );
    Ok(merged)
}
