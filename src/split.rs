//! Train / predict partition of a frozen traverse

use crate::station::{StationRecord, Traverse};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A measured station as submitted to the inference collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Position along the traverse
    pub distance_along: f64,
    /// Observed value
    pub value: f64,
}

/// Disjoint partition of a traverse, each side in traverse order.
#[derive(Debug, Clone)]
pub struct StationSplit<'a> {
    train: Vec<&'a StationRecord>,
    predict: Vec<&'a StationRecord>,
}

impl<'a> StationSplit<'a> {
    /// Measured stations
    #[must_use]
    pub fn train(&self) -> &[&'a StationRecord] {
        &self.train
    }

    /// Unmeasured stations
    #[must_use]
    pub fn predict(&self) -> &[&'a StationRecord] {
        &self.predict
    }

    /// Whether there is nothing left to predict
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.predict.is_empty()
    }

    /// Training pairs for the inference collaborator
    #[must_use]
    pub fn training_samples(&self) -> Vec<TrainingSample> {
        self.train
            .iter()
            .filter_map(|s| {
                s.value().map(|value| TrainingSample {
                    distance_along: s.distance_along(),
                    value,
                })
            })
            .collect()
    }

    /// Query distances for the inference collaborator
    #[must_use]
    pub fn query_distances(&self) -> Vec<f64> {
        self.predict.iter().map(|s| s.distance_along()).collect()
    }
}

/// Partition a traverse into measured (train) and unmeasured (predict)
/// stations.
///
/// An empty predict side is not an error: the traverse is already complete.
///
/// # Errors
///
/// Returns `Error::Data` if no station is measured.
pub fn split(traverse: &Traverse) -> Result<StationSplit<'_>> {
    let (train, predict): (Vec<&StationRecord>, Vec<&StationRecord>) =
        traverse.stations().iter().partition(|s| s.is_measured());

    if train.is_empty() {
        return Err(Error::Data("no training data".to_string()));
    }

    tracing::debug!(train = train.len(), predict = predict.len(), "traverse split");
    Ok(StationSplit { train, predict })
}
