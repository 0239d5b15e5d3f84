//! Job records - one per uploaded traverse
//!
//! ```text
//! Created ──> Running ──> Completed
//!    │           │
//!    └───────────┴──> Failed
//! ```
//!
//! Completed and Failed are terminal.

use crate::ingest::ColumnMapping;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Geometry scenario requested at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Uploaded stations used as-is
    Explicit,
    /// Measured stations densified onto a uniform grid
    Sparse,
}

impl Scenario {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Sparse => "sparse",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(Self::Explicit),
            "sparse" => Ok(Self::Sparse),
            other => Err(Error::Validation(format!(
                "unknown scenario {other:?} (expected explicit or sparse)"
            ))),
        }
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job record exists, no stage has run.
    Created,
    /// Pipeline stages are executing.
    Running,
    /// Final artifact published.
    Completed,
    /// A stage failed; no final artifact.
    Failed,
}

impl JobStatus {
    /// Whether no further transition is allowed
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated ingress parameters.
///
/// `spacing` is present exactly when the scenario is sparse.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    scenario: Scenario,
    columns: ColumnMapping,
    spacing: Option<f64>,
}

impl JobRequest {
    /// Validate ingress parameters.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the scenario is unknown, a column name
    /// is blank, two columns share a name, or the spacing does not pair with
    /// the scenario (required and `> 0` for sparse, absent for explicit).
    pub fn new(
        scenario: &str,
        x_column: &str,
        y_column: &str,
        value_column: &str,
        spacing: Option<f64>,
    ) -> Result<Self> {
        let scenario: Scenario = scenario.parse()?;

        let columns = [x_column.trim(), y_column.trim(), value_column.trim()];
        if let Some(blank) = ["x_column", "y_column", "value_column"]
            .iter()
            .zip(columns)
            .find_map(|(name, col)| col.is_empty().then_some(name))
        {
            return Err(Error::Validation(format!("{blank} must not be empty")));
        }
        if columns[0] == columns[1] || columns[0] == columns[2] || columns[1] == columns[2] {
            return Err(Error::Validation(format!(
                "column mapping must name three distinct columns, got {columns:?}"
            )));
        }

        match (scenario, spacing) {
            (Scenario::Sparse, None) => {
                return Err(Error::Validation(
                    "station_spacing is required for sparse scenario".to_string(),
                ));
            }
            (Scenario::Sparse, Some(s)) if !s.is_finite() || s <= 0.0 => {
                return Err(Error::Validation(format!(
                    "station_spacing must be a positive number, got {s}"
                )));
            }
            (Scenario::Explicit, Some(_)) => {
                return Err(Error::Validation(
                    "station_spacing is not allowed for explicit scenario".to_string(),
                ));
            }
            _ => {}
        }

        Ok(Self {
            scenario,
            columns: ColumnMapping::new(columns[0], columns[1], columns[2]),
            spacing,
        })
    }

    /// Geometry scenario
    #[must_use]
    pub const fn scenario(&self) -> Scenario {
        self.scenario
    }

    /// Column mapping
    #[must_use]
    pub const fn columns(&self) -> &ColumnMapping {
        &self.columns
    }

    /// Station spacing (sparse only)
    #[must_use]
    pub const fn spacing(&self) -> Option<f64> {
        self.spacing
    }
}

/// Persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    job_id: String,
    status: JobStatus,
    scenario: Scenario,
    spacing: Option<f64>,
    message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a job record in Created status for a validated request.
    #[must_use]
    pub fn new(job_id: impl Into<String>, request: &JobRequest) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            status: JobStatus::Created,
            scenario: request.scenario(),
            spacing: request.spacing(),
            message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
        }
    }

    /// Fresh job id: `job-` followed by 12 hex digits.
    #[must_use]
    pub fn generate_id() -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("job-{}", &id[..12])
    }

    /// Get the job ID.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Get the scenario.
    #[must_use]
    pub const fn scenario(&self) -> Scenario {
        self.scenario
    }

    /// Get the station spacing (sparse only).
    #[must_use]
    pub const fn spacing(&self) -> Option<f64> {
        self.spacing
    }

    /// Failure message, if the job failed.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Creation timestamp
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification timestamp
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// When the pipeline started, if it has.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the job reached a terminal status, if it has.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Created -> Running.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTransition` from any other status.
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(self.updated_at);
        Ok(())
    }

    /// Running -> Completed.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTransition` from any other status.
    pub fn complete(&mut self) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.ended_at = Some(self.updated_at);
        Ok(())
    }

    /// Created | Running -> Failed, recording why.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTransition` if the job is already terminal.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.message = Some(message.into());
        self.ended_at = Some(self.updated_at);
        Ok(())
    }

    fn transition(&mut self, to: JobStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, to),
            (JobStatus::Created, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Created | JobStatus::Running, JobStatus::Failed)
        );
        if !allowed {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Caller-facing status view
    #[must_use]
    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.job_id.clone(),
            status: self.status,
            message: self.message.clone(),
        }
    }
}

/// Answer to a job status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    /// Job identifier
    pub job_id: String,
    /// Current status
    pub status: JobStatus,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
