//! Inference collaborator interface
//!
//! The regression itself lives outside this crate. The pipeline hands the
//! collaborator the training pairs, the query distances and the storage keys
//! of the matching artifacts, and gets back either the predictions directly
//! or the key where they will appear later.

use crate::merge::Predictions;
use crate::split::TrainingSample;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// One inference call for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Owning job
    pub job_id: String,
    /// Measured `(distance_along, value)` pairs
    pub train: Vec<TrainingSample>,
    /// Distances to predict, in traverse order
    pub queries: Vec<f64>,
    /// Storage key of `train.csv`
    pub train_key: String,
    /// Storage key of `predict.csv`
    pub predict_key: String,
    /// Storage key an asynchronous collaborator must write its output to
    pub output_key: String,
}

/// What the collaborator returned.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceReply {
    /// Synchronous call: predictions in hand
    Ready(Predictions),
    /// Asynchronous call: predictions will appear under `output_key`
    Pending {
        /// Key to poll for
        output_key: String,
    },
}

/// External regression service.
///
/// Implementations must return exactly one prediction per query, either in
/// query order or keyed by distance, as fixed by the deployment's
/// [`PredictionContract`](crate::merge::PredictionContract).
pub trait InferenceClient: Send + Sync {
    /// Submit one job's training set and queries.
    fn infer(
        &self,
        request: &InferenceRequest,
    ) -> impl Future<Output = Result<InferenceReply>> + Send;
}
