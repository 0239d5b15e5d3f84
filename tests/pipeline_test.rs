//! End-to-end tests for the job orchestrator
//!
//! Every test drives the real pipeline against an in-memory (or on-disk)
//! blob store and a fake inference collaborator.

use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trueno_traverse::inference::{InferenceClient, InferenceReply, InferenceRequest};
use trueno_traverse::merge::{PredictionContract, Predictions};
use trueno_traverse::storage::{BlobStore, FsBlobStore, MemoryBlobStore};
use trueno_traverse::{
    Error, ErrorKind, Job, JobRequest, JobStatus, Pipeline, PipelineConfig, Result,
};

// ============================================================================
// Fake collaborators
// ============================================================================

fn oracle(distance: f64) -> f64 {
    2.0f64.mul_add(distance, 1.0)
}

/// Answers synchronously with `2d + 1` in the configured contract
#[derive(Debug, Default)]
struct Oracle {
    keyed: bool,
    calls: Mutex<Vec<InferenceRequest>>,
}

impl Oracle {
    fn keyed() -> Self {
        Self {
            keyed: true,
            calls: Mutex::default(),
        }
    }

    fn calls(&self) -> Vec<InferenceRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl InferenceClient for Oracle {
    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceReply> {
        self.calls.lock().unwrap().push(request.clone());
        let predictions = if self.keyed {
            // Reverse order: keyed merge must not depend on it
            Predictions::ByDistance(request.queries.iter().rev().map(|&d| (d, oracle(d))).collect())
        } else {
            Predictions::Positional(request.queries.iter().map(|&d| oracle(d)).collect())
        };
        Ok(InferenceReply::Ready(predictions))
    }
}

/// Writes its predictions to the store after a delay and returns at once
#[derive(Debug)]
struct Deferred {
    store: Arc<MemoryBlobStore>,
    delay: Option<Duration>,
}

impl InferenceClient for Deferred {
    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceReply> {
        if let Some(delay) = self.delay {
            let store = Arc::clone(&self.store);
            let key = request.output_key.clone();
            let body: String = std::iter::once("prediction".to_string())
                .chain(request.queries.iter().map(|&d| oracle(d).to_string()))
                .collect::<Vec<_>>()
                .join("\n");
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                store.put(&key, body.into_bytes()).await.unwrap();
            });
        }
        Ok(InferenceReply::Pending {
            output_key: request.output_key.clone(),
        })
    }
}

/// Always fails
#[derive(Debug)]
struct Broken;

impl InferenceClient for Broken {
    async fn infer(&self, _request: &InferenceRequest) -> Result<InferenceReply> {
        Err(Error::Inference("model endpoint returned 503".to_string()))
    }
}

/// Returns one prediction too many
#[derive(Debug)]
struct OffByOne;

impl InferenceClient for OffByOne {
    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceReply> {
        Ok(InferenceReply::Ready(Predictions::Positional(vec![
            0.0;
            request.queries.len() + 1
        ])))
    }
}

/// Announces a key outside the job's namespace
#[derive(Debug)]
struct Misdirected {
    foreign_key: String,
}

impl InferenceClient for Misdirected {
    async fn infer(&self, _request: &InferenceRequest) -> Result<InferenceReply> {
        Ok(InferenceReply::Pending {
            output_key: self.foreign_key.clone(),
        })
    }
}

/// Memory store that refuses to persist a completed job record
#[derive(Debug, Default)]
struct NoCompletedRecords {
    inner: MemoryBlobStore,
}

impl BlobStore for NoCompletedRecords {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let completed = bytes.windows(11).any(|w| w == b"\"completed\"");
        if key.ends_with("metadata/job.json") && completed {
            return Err(Error::Storage("metadata bucket unavailable".to_string()));
        }
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list_prefix(prefix).await
    }
}

#[derive(Debug, Deserialize)]
struct FinalRow {
    x: f64,
    y: f64,
    distance_along: f64,
    value: f64,
    is_measured: bool,
}

fn read_final(bytes: &[u8]) -> Vec<FinalRow> {
    csv::Reader::from_reader(bytes)
        .deserialize()
        .collect::<std::result::Result<_, _>>()
        .unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("trueno_traverse=debug")
        .with_test_writer()
        .try_init();
}

fn fast_config() -> PipelineConfig {
    PipelineConfig::new()
        .with_poll_interval(Duration::from_millis(5))
        .with_inference_timeout(Duration::from_millis(50))
}

const SPARSE_CSV: &[u8] = b"x,y,tmi\n0,0,100.0\n30,40,150.0\n";
const EXPLICIT_CSV: &[u8] = b"x,y,tmi\n0,0,1.0\n3,4,\n6,8,3.0\n";

fn sparse_request() -> JobRequest {
    JobRequest::new("sparse", "x", "y", "tmi", Some(10.0)).unwrap()
}

fn explicit_request() -> JobRequest {
    JobRequest::new("explicit", "x", "y", "tmi", None).unwrap()
}

// ============================================================================
// Successful runs
// ============================================================================

#[tokio::test]
async fn test_sparse_job_completes() {
    init_tracing();
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());

    let job = pipeline.submit(&sparse_request(), SPARSE_CSV.to_vec()).await.unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
    assert!(job.started_at().is_some());
    assert!(job.ended_at().is_some());

    let rows = read_final(&pipeline.result_csv(job.job_id()).await.unwrap());
    let distances: Vec<f64> = rows.iter().map(|r| r.distance_along).collect();
    assert_eq!(distances, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);

    assert!(rows[0].is_measured);
    assert_eq!(rows[0].value, 100.0);
    assert!(rows[5].is_measured);
    assert_eq!(rows[5].value, 150.0);
    assert_eq!((rows[5].x, rows[5].y), (30.0, 40.0));
    for row in &rows[1..5] {
        assert!(!row.is_measured);
        assert_eq!(row.value, oracle(row.distance_along));
    }
}

#[tokio::test]
async fn test_inference_receives_split_in_traverse_order() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());
    let job = pipeline.submit(&sparse_request(), SPARSE_CSV.to_vec()).await.unwrap();

    let calls = pipeline.inference().calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.job_id, job.job_id());
    assert_eq!(call.queries, vec![10.0, 20.0, 30.0, 40.0]);
    assert_eq!(call.train.len(), 2);
    assert_eq!(call.train[1].distance_along, 50.0);
    assert_eq!(call.train[1].value, 150.0);
    assert!(call.output_key.ends_with("inference/predictions.csv"));
}

#[tokio::test]
async fn test_artifacts_written_per_stage() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());
    let job = pipeline.submit(&sparse_request(), SPARSE_CSV.to_vec()).await.unwrap();

    let root = format!("jobs/{}/", job.job_id());
    let artifacts = pipeline.artifacts(job.job_id()).await.unwrap();
    let suffixes: Vec<&str> = artifacts
        .iter()
        .map(|k| k.strip_prefix(&root).unwrap())
        .collect();
    assert_eq!(
        suffixes,
        vec![
            "geometry/traverse.csv",
            "inference/predictions.csv",
            "input/uploaded.csv",
            "metadata/job.json",
            "output/final.csv",
            "split/predict.csv",
            "split/train.csv",
        ]
    );

    let upload = pipeline
        .store()
        .get(&format!("{root}input/uploaded.csv"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(upload, SPARSE_CSV);

    let predict = pipeline
        .store()
        .get(&format!("{root}split/predict.csv"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        String::from_utf8(predict).unwrap(),
        "distance_along\n10.0\n20.0\n30.0\n40.0\n"
    );
}

#[tokio::test]
async fn test_explicit_job_clamps_leading_prediction() {
    let csv = b"x,y,tmi\n0,0,\n3,4,7.0\n6,8,9.0\n";
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());
    let job = pipeline.submit(&explicit_request(), csv.to_vec()).await.unwrap();

    let rows = read_final(&pipeline.result_csv(job.job_id()).await.unwrap());
    assert_eq!(rows.len(), 3);
    assert!(!rows[0].is_measured);
    // Oracle says 1.0 at d=0; clamped to the first measured value
    assert_eq!(rows[0].value, 7.0);
    assert_eq!(rows[1].value, 7.0);
    assert_eq!(rows[2].value, 9.0);
}

#[tokio::test]
async fn test_explicit_job_interior_gap() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());
    let job = pipeline.submit(&explicit_request(), EXPLICIT_CSV.to_vec()).await.unwrap();

    let rows = read_final(&pipeline.result_csv(job.job_id()).await.unwrap());
    let distances: Vec<f64> = rows.iter().map(|r| r.distance_along).collect();
    assert_eq!(distances, vec![0.0, 5.0, 10.0]);
    assert_eq!(rows[1].value, oracle(5.0));
    assert!(!rows[1].is_measured);
}

#[tokio::test]
async fn test_keyed_contract() {
    let config = PipelineConfig::new().with_contract(PredictionContract::DistanceKeyed);
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::keyed(), config);
    let job = pipeline.submit(&sparse_request(), SPARSE_CSV.to_vec()).await.unwrap();

    let rows = read_final(&pipeline.result_csv(job.job_id()).await.unwrap());
    for row in rows.iter().filter(|r| !r.is_measured) {
        assert_eq!(row.value, oracle(row.distance_along));
    }
}

#[tokio::test]
async fn test_fully_measured_skips_inference() {
    let csv = b"x,y,tmi\n0,0,1.0\n1,0,2.0\n";
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());
    let job = pipeline.submit(&explicit_request(), csv.to_vec()).await.unwrap();

    assert_eq!(job.status(), JobStatus::Completed);
    assert!(pipeline.inference().calls().is_empty());
    let rows = read_final(&pipeline.result_csv(job.job_id()).await.unwrap());
    assert!(rows.iter().all(|r| r.is_measured));
}

#[tokio::test]
async fn test_asynchronous_predictions_are_polled() {
    init_tracing();
    let store = Arc::new(MemoryBlobStore::new());
    let client = Deferred {
        store: Arc::clone(&store),
        delay: Some(Duration::from_millis(20)),
    };
    let config = fast_config().with_inference_timeout(Duration::from_secs(5));
    let pipeline = Pipeline::new(Arc::clone(&store), client, config);

    let job = pipeline.submit(&sparse_request(), SPARSE_CSV.to_vec()).await.unwrap();
    let rows = read_final(&pipeline.result_csv(job.job_id()).await.unwrap());
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[2].value, oracle(20.0));
}

#[tokio::test]
async fn test_custom_key_prefix() {
    let config = PipelineConfig::new().with_key_prefix("tenant-a/jobs");
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), config);
    let job = pipeline.submit(&sparse_request(), SPARSE_CSV.to_vec()).await.unwrap();

    let artifacts = pipeline.artifacts(job.job_id()).await.unwrap();
    assert!(!artifacts.is_empty());
    assert!(artifacts.iter().all(|k| k.starts_with("tenant-a/jobs/")));
}

// ============================================================================
// Failures
// ============================================================================

async fn run_to_failure<S: BlobStore, I: InferenceClient>(
    pipeline: &Pipeline<S, I>,
    request: &JobRequest,
    csv: &[u8],
) -> (Job, Error) {
    let job = Job::new(Job::generate_id(), request);
    let err = pipeline
        .run(job.clone(), request, csv.to_vec())
        .await
        .unwrap_err();
    (job, err)
}

#[tokio::test]
async fn test_inference_timeout_fails_job() {
    init_tracing();
    let store = Arc::new(MemoryBlobStore::new());
    let client = Deferred {
        store: Arc::clone(&store),
        delay: None,
    };
    let pipeline = Pipeline::new(Arc::clone(&store), client, fast_config());

    let (job, err) = run_to_failure(&pipeline, &sparse_request(), SPARSE_CSV).await;
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let status = pipeline.status(job.job_id()).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.message.unwrap().starts_with("TimeoutError"));
    assert!(matches!(
        pipeline.result_csv(job.job_id()).await,
        Err(Error::ResultUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_wait_for_object_bounds() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Broken, fast_config());
    pipeline.store().put("ready", b"1".to_vec()).await.unwrap();

    pipeline.wait_for_object("ready").await.unwrap();

    let started = std::time::Instant::now();
    let err = pipeline.wait_for_object("never").await.unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(50));
    match err {
        Error::Timeout { key, waited_secs } => {
            assert_eq!(key, "never");
            assert!(waited_secs >= 0.05);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_inference_error_fails_job() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Broken, PipelineConfig::new());
    let (job, err) = run_to_failure(&pipeline, &sparse_request(), SPARSE_CSV).await;

    assert_eq!(err.kind(), ErrorKind::Inference);
    let status = pipeline.status(job.job_id()).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(
        status.message.as_deref(),
        Some("InferenceError: Inference failed: model endpoint returned 503")
    );
}

#[tokio::test]
async fn test_prediction_count_mismatch_fails_job() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), OffByOne, PipelineConfig::new());
    let (job, err) = run_to_failure(&pipeline, &sparse_request(), SPARSE_CSV).await;

    assert_eq!(err.kind(), ErrorKind::Merge);
    let status = pipeline.status(job.job_id()).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.message.unwrap().starts_with("MergeError"));

    let output = format!("jobs/{}/output/final.csv", job.job_id());
    assert!(!pipeline.store().exists(&output).await.unwrap());
}

#[tokio::test]
async fn test_bad_csv_fails_job() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());
    let (job, err) =
        run_to_failure(&pipeline, &explicit_request(), b"x,y,tmi\n0,abc,1\n").await;

    assert_eq!(err.kind(), ErrorKind::Data);
    let status = pipeline.status(job.job_id()).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.message.unwrap().starts_with("DataError"));

    // The raw upload is kept for inspection
    let upload = format!("jobs/{}/input/uploaded.csv", job.job_id());
    assert!(pipeline.store().exists(&upload).await.unwrap());
    assert!(pipeline.inference().calls().is_empty());
}

#[tokio::test]
async fn test_missing_column_fails_job() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());
    let (_, err) = run_to_failure(&pipeline, &explicit_request(), b"x,y,mag\n0,0,1\n").await;
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_sparse_single_anchor_is_geometry_error() {
    let csv = b"x,y,tmi\n0,0,100.0\n30,40,\n";
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());
    let (job, err) = run_to_failure(&pipeline, &sparse_request(), csv).await;

    assert_eq!(err.kind(), ErrorKind::Geometry);
    let status = pipeline.status(job.job_id()).await.unwrap();
    assert!(status.message.unwrap().starts_with("GeometryError"));
}

#[tokio::test]
async fn test_no_measured_station_is_data_error() {
    let csv = b"x,y,tmi\n0,0,\n1,1,\n";
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());
    let (_, err) = run_to_failure(&pipeline, &explicit_request(), csv).await;
    assert_eq!(err.kind(), ErrorKind::Data);
}

#[tokio::test]
async fn test_foreign_output_key_fails_job() {
    let store = Arc::new(MemoryBlobStore::new());
    let other = Pipeline::new(Arc::clone(&store), Oracle::default(), PipelineConfig::new());
    let finished = other.submit(&sparse_request(), SPARSE_CSV.to_vec()).await.unwrap();

    let client = Misdirected {
        foreign_key: format!("jobs/{}/output/final.csv", finished.job_id()),
    };
    let pipeline = Pipeline::new(Arc::clone(&store), client, fast_config());
    let (job, err) = run_to_failure(&pipeline, &sparse_request(), SPARSE_CSV).await;

    assert_eq!(err.kind(), ErrorKind::Inference);
    let status = pipeline.status(job.job_id()).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.message.unwrap().contains(finished.job_id()));
}

#[tokio::test]
async fn test_completion_save_failure_marks_job_failed() {
    let pipeline = Pipeline::new(
        NoCompletedRecords::default(),
        Oracle::default(),
        PipelineConfig::new(),
    );
    let (job, err) = run_to_failure(&pipeline, &sparse_request(), SPARSE_CSV).await;

    assert!(matches!(err, Error::Storage(_)));
    let status = pipeline.status(job.job_id()).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.message.unwrap().starts_with("InternalError"));
    assert!(matches!(
        pipeline.result_csv(job.job_id()).await,
        Err(Error::ResultUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_run_rejects_stale_or_mismatched_job() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Oracle::default(), PipelineConfig::new());

    let mut done = Job::new(Job::generate_id(), &sparse_request());
    done.fail("DataError: earlier attempt").unwrap();
    let err = pipeline
        .run(done.clone(), &sparse_request(), SPARSE_CSV.to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let fresh = Job::new(Job::generate_id(), &sparse_request());
    let err = pipeline
        .run(fresh.clone(), &explicit_request(), EXPLICIT_CSV.to_vec())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    // Neither record was written
    for id in [done.job_id(), fresh.job_id()] {
        assert!(matches!(pipeline.status(id).await, Err(Error::JobNotFound(_))));
    }
    assert!(pipeline.store().is_empty());
}

#[test]
fn test_invalid_request_never_creates_job() {
    let err = JobRequest::new("sparse", "x", "y", "tmi", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = JobRequest::new("explicit", "x", "y", "tmi", Some(10.0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = JobRequest::new("dense", "x", "y", "tmi", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_unknown_job() {
    let pipeline = Pipeline::new(MemoryBlobStore::new(), Broken, PipelineConfig::new());
    assert!(matches!(
        pipeline.status("job-missing").await,
        Err(Error::JobNotFound(_))
    ));
    assert!(matches!(
        pipeline.result_csv("job-missing").await,
        Err(Error::JobNotFound(_))
    ));
}

// ============================================================================
// Storage backends and concurrency
// ============================================================================

#[tokio::test]
async fn test_filesystem_store() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        FsBlobStore::new(dir.path()),
        Oracle::default(),
        PipelineConfig::new(),
    );

    let job = pipeline.submit(&sparse_request(), SPARSE_CSV.to_vec()).await.unwrap();
    let on_disk = dir
        .path()
        .join("jobs")
        .join(job.job_id())
        .join("output")
        .join("final.csv");
    assert!(on_disk.exists());

    let bytes = tokio::fs::read(&on_disk).await.unwrap();
    assert_eq!(bytes, pipeline.result_csv(job.job_id()).await.unwrap());
    assert_eq!(
        pipeline.status(job.job_id()).await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_jobs_are_isolated() {
    let pipeline = Arc::new(Pipeline::new(
        MemoryBlobStore::new(),
        Oracle::default(),
        PipelineConfig::new(),
    ));

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            let far = f64::from(i + 1).mul_add(10.0, 5.0);
            let csv = format!("x,y,tmi\n0,0,{i}\n{far},0,{i}\n");
            let job = pipeline
                .submit(&sparse_request(), csv.into_bytes())
                .await
                .unwrap();
            (job, far)
        }));
    }

    for handle in handles {
        let (job, far) = handle.await.unwrap();
        let whole = (far / 10.0).floor() as usize;
        let rows = read_final(&pipeline.result_csv(job.job_id()).await.unwrap());
        assert_eq!(rows.last().unwrap().distance_along, far);
        // Grid every 10 m plus the off-grid endpoint
        assert_eq!(rows.len(), whole + 2);
    }
    assert_eq!(pipeline.inference().calls().len(), 8);
}
