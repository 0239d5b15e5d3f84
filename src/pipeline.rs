//! Pipeline orchestrator
//!
//! Drives one job through its stages, strictly in order:
//!
//! ```text
//! ingest ──> geometry ──> split ──> inference ──> merge ──> publish
//! ```
//!
//! Any stage error aborts the rest, marks the job `Failed` with
//! `"<kind>: <message>"`, and is returned to the caller. Nothing is retried.
//! The final artifact is only served for `Completed` jobs.
//!
//! # Example
//!
//! ```rust,no_run
//! use trueno_traverse::inference::{InferenceClient, InferenceReply, InferenceRequest};
//! use trueno_traverse::merge::Predictions;
//! use trueno_traverse::storage::MemoryBlobStore;
//! use trueno_traverse::{JobRequest, Pipeline, PipelineConfig};
//!
//! struct Flat;
//!
//! impl InferenceClient for Flat {
//!     async fn infer(&self, request: &InferenceRequest) -> trueno_traverse::Result<InferenceReply> {
//!         Ok(InferenceReply::Ready(Predictions::Positional(vec![0.0; request.queries.len()])))
//!     }
//! }
//!
//! # async fn example() -> trueno_traverse::Result<()> {
//! let pipeline = Pipeline::new(MemoryBlobStore::new(), Flat, PipelineConfig::new());
//! let request = JobRequest::new("sparse", "x", "y", "tmi", Some(10.0))?;
//! let job = pipeline.submit(&request, b"x,y,tmi\n0,0,1\n50,0,2\n".to_vec()).await?;
//! let csv = pipeline.result_csv(job.job_id()).await?;
//! # Ok(())
//! # }
//! ```

use crate::codec;
use crate::config::PipelineConfig;
use crate::geometry::{build_explicit_geometry, build_sparse_geometry};
use crate::inference::{InferenceClient, InferenceReply, InferenceRequest};
use crate::ingest::ingest;
use crate::job::{Job, JobRequest, JobStatus, JobStatusView, Scenario};
use crate::merge::{merge, Predictions};
use crate::split::split;
use crate::storage::{BlobStore, JobKeys, JobStore};
use crate::{Error, Result};
use tokio::time::Instant;
use tracing::Instrument;

/// Station counts of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunSummary {
    stations: usize,
    measured: usize,
    predicted: usize,
}

/// Job orchestrator with injected storage and inference collaborators.
#[derive(Debug)]
pub struct Pipeline<S: BlobStore, I: InferenceClient> {
    store: S,
    inference: I,
    config: PipelineConfig,
}

impl<S: BlobStore, I: InferenceClient> Pipeline<S, I> {
    /// Create a pipeline
    #[must_use]
    pub const fn new(store: S, inference: I, config: PipelineConfig) -> Self {
        Self {
            store,
            inference,
            config,
        }
    }

    /// Blob store (for inspection/testing)
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Inference collaborator
    #[must_use]
    pub const fn inference(&self) -> &I {
        &self.inference
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn jobs(&self) -> JobStore<'_, S> {
        JobStore::new(&self.store, self.config.key_prefix())
    }

    fn keys(&self, job_id: &str) -> JobKeys {
        JobKeys::new(self.config.key_prefix(), job_id)
    }

    /// Create a job for a validated request and run it to a terminal status.
    ///
    /// Returns the completed job record.
    ///
    /// # Errors
    ///
    /// Returns the first stage error; the job record is `Failed` by then.
    pub async fn submit(&self, request: &JobRequest, csv: Vec<u8>) -> Result<Job> {
        let job = Job::new(Job::generate_id(), request);
        self.run(job, request, csv).await
    }

    /// Run an already-created job record to a terminal status.
    ///
    /// `job` must be in `Created` status and built from `request`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTransition` or `Error::Validation` without
    /// touching the store if `job` is not a fresh record for `request`.
    /// Otherwise returns the first stage error; the job record is `Failed`
    /// by then.
    pub async fn run(&self, job: Job, request: &JobRequest, csv: Vec<u8>) -> Result<Job> {
        check_fresh(&job, request)?;
        let span = tracing::info_span!("job", job_id = %job.job_id(), scenario = %request.scenario());
        self.drive(job, request, csv).instrument(span).await
    }

    async fn drive(&self, mut job: Job, request: &JobRequest, csv: Vec<u8>) -> Result<Job> {
        let jobs = self.jobs();
        jobs.save(&job).await?;

        match self.advance(&mut job, request, csv).await {
            Ok(summary) => {
                tracing::info!(
                    stations = summary.stations,
                    measured = summary.measured,
                    predicted = summary.predicted,
                    "job completed"
                );
                Ok(job)
            }
            Err(err) => {
                tracing::warn!(kind = %err.kind(), error = %err, "job failed");
                if job.fail(err.job_message()).is_ok() {
                    if let Err(save_err) = jobs.save(&job).await {
                        tracing::warn!(error = %save_err, "could not persist failed status");
                    }
                }
                Err(err)
            }
        }
    }

    /// Created -> Running -> Completed. On error `job` is left in its last
    /// persisted non-terminal status.
    async fn advance(
        &self,
        job: &mut Job,
        request: &JobRequest,
        csv: Vec<u8>,
    ) -> Result<RunSummary> {
        self.start(job).await?;
        let summary = self.execute(job.job_id(), request, csv).await?;

        let mut completed = job.clone();
        completed.complete()?;
        self.jobs().save(&completed).await?;
        *job = completed;
        Ok(summary)
    }

    async fn start(&self, job: &mut Job) -> Result<()> {
        job.start()?;
        self.jobs().save(job).await?;
        tracing::info!("job started");
        Ok(())
    }

    async fn execute(&self, job_id: &str, request: &JobRequest, csv: Vec<u8>) -> Result<RunSummary> {
        let keys = self.keys(job_id);
        let contract = self.config.contract();

        self.store.put(&keys.upload(), csv.clone()).await?;
        let raw = ingest(&csv, request.columns())?;
        tracing::info!(stage = "ingest", rows = raw.len(), "stage complete");

        let traverse = match request.scenario() {
            Scenario::Explicit => build_explicit_geometry(&raw)?,
            Scenario::Sparse => {
                let spacing = request.spacing().ok_or_else(|| {
                    Error::Validation("station_spacing is required for sparse scenario".to_string())
                })?;
                build_sparse_geometry(&raw, spacing)?
            }
        };
        self.store
            .put(&keys.geometry(), codec::traverse_csv(&traverse)?)
            .await?;
        tracing::info!(
            stage = "geometry",
            stations = traverse.len(),
            total_length = traverse.total_length(),
            "stage complete"
        );

        let partition = split(&traverse)?;
        let (measured, predicted) = (partition.train().len(), partition.predict().len());
        tracing::info!(stage = "split", measured, predicted, "stage complete");

        let predictions = if partition.is_complete() {
            tracing::info!(stage = "inference", "nothing to predict, skipping");
            Predictions::empty(contract)
        } else {
            let inference_request = InferenceRequest {
                job_id: job_id.to_string(),
                train: partition.training_samples(),
                queries: partition.query_distances(),
                train_key: keys.train(),
                predict_key: keys.predict(),
                output_key: keys.predictions(),
            };
            self.store
                .put(&inference_request.train_key, codec::train_csv(&inference_request.train)?)
                .await?;
            self.store
                .put(&inference_request.predict_key, codec::predict_csv(&inference_request.queries)?)
                .await?;
            self.predict(&inference_request).await?
        };

        let merged = merge(&traverse, &predictions, contract)?;
        tracing::info!(stage = "merge", stations = merged.len(), "stage complete");

        self.store.put(&keys.output(), codec::final_csv(&merged)?).await?;
        tracing::info!(stage = "publish", key = %keys.output(), "stage complete");

        Ok(RunSummary {
            stations: merged.len(),
            measured,
            predicted,
        })
    }

    /// Call the collaborator and obtain one prediction set, waiting for the
    /// output object if the call is asynchronous.
    async fn predict(&self, request: &InferenceRequest) -> Result<Predictions> {
        let reply = self.inference.infer(request).await.map_err(|e| match e {
            Error::Inference(_) | Error::Timeout { .. } => e,
            other => Error::Inference(other.to_string()),
        })?;

        let predictions = match reply {
            InferenceReply::Ready(predictions) => {
                self.store
                    .put(&request.output_key, codec::predictions_csv(&predictions)?)
                    .await?;
                predictions
            }
            InferenceReply::Pending { output_key } => {
                if output_key != request.output_key {
                    return Err(Error::Inference(format!(
                        "collaborator announced {output_key}, expected {}",
                        request.output_key
                    )));
                }
                tracing::info!(key = %output_key, "waiting for asynchronous predictions");
                self.wait_for_object(&output_key).await?;
                let body = self.store.get(&output_key).await?.ok_or_else(|| {
                    Error::Inference(format!("prediction object {output_key} disappeared"))
                })?;
                codec::parse_predictions(&body, self.config.contract())?
            }
        };

        if predictions.is_empty() && !request.queries.is_empty() {
            return Err(Error::Inference(
                "collaborator returned no predictions".to_string(),
            ));
        }
        tracing::info!(stage = "inference", predictions = predictions.len(), "stage complete");
        Ok(predictions)
    }

    /// Poll the store for `key` every `poll_interval` until it exists or
    /// `inference_timeout` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` once the bound is exceeded, or the store's
    /// error if an existence check fails.
    pub async fn wait_for_object(&self, key: &str) -> Result<()> {
        let started = Instant::now();
        let timeout = self.config.inference_timeout();
        let interval = self.config.poll_interval();

        loop {
            if self.store.exists(key).await? {
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(Error::Timeout {
                    key: key.to_string(),
                    waited_secs: waited.as_secs_f64(),
                });
            }
            tracing::debug!(key, waited_ms = waited.as_millis(), "object not ready");
            tokio::time::sleep(interval.min(timeout - waited)).await;
        }
    }

    /// Current status of a job.
    ///
    /// # Errors
    ///
    /// Returns `Error::JobNotFound` for an unknown id.
    pub async fn status(&self, job_id: &str) -> Result<JobStatusView> {
        Ok(self.jobs().load(job_id).await?.view())
    }

    /// Final CSV of a completed job.
    ///
    /// # Errors
    ///
    /// Returns `Error::JobNotFound` for an unknown id,
    /// `Error::ResultUnavailable` unless the job is `Completed`, or
    /// `Error::Storage` if the artifact is missing.
    pub async fn result_csv(&self, job_id: &str) -> Result<Vec<u8>> {
        let job = self.jobs().load(job_id).await?;
        if job.status() != JobStatus::Completed {
            return Err(Error::ResultUnavailable {
                job_id: job_id.to_string(),
                status: job.status().to_string(),
            });
        }
        let key = self.keys(job_id).output();
        self.store
            .get(&key)
            .await?
            .ok_or_else(|| Error::Storage(format!("missing artifact {key}")))
    }

    /// Every stored artifact key of a job.
    ///
    /// # Errors
    ///
    /// Returns the store's error if listing fails.
    pub async fn artifacts(&self, job_id: &str) -> Result<Vec<String>> {
        self.store.list_prefix(self.keys(job_id).root()).await
    }
}

fn check_fresh(job: &Job, request: &JobRequest) -> Result<()> {
    if job.status() != JobStatus::Created {
        return Err(Error::InvalidTransition {
            from: job.status().to_string(),
            to: JobStatus::Running.to_string(),
        });
    }
    if job.scenario() != request.scenario() || job.spacing() != request.spacing() {
        return Err(Error::Validation(format!(
            "job {} was created for a different request",
            job.job_id()
        )));
    }
    Ok(())
}
