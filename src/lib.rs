//! # Trueno-Traverse: Survey Traverse Gap Filling
//!
//! Turns one uploaded CSV - a single survey traverse of ordered stations with
//! planar coordinates and an optional measured value - into a complete
//! station sequence where every station has a value. Measured values are
//! kept verbatim; missing ones come from an external regression service.
//!
//! ## Pipeline
//!
//! ```text
//! ingest ──> geometry ──> split ──> (inference) ──> merge ──> final.csv
//! ```
//!
//! - **ingest**: CSV rows in file order, typed and validated
//! - **geometry**: cumulative distance along the traverse; optional uniform
//!   densification that keeps every measured station bit-identical
//! - **split**: measured (train) vs unmeasured (predict), in traverse order
//! - **merge**: count-checked recombination with clamped extrapolation
//!
//! Storage and inference are injected collaborators ([`storage::BlobStore`],
//! [`inference::InferenceClient`]).
//!
//! ## Example Usage
//!
//! ```rust
//! use trueno_traverse::geometry::build_sparse_geometry;
//! use trueno_traverse::ingest::{ingest, ColumnMapping};
//!
//! let csv = b"x,y,tmi\n0,0,100.0\n30,40,150.0\n";
//! let stations = ingest(csv, &ColumnMapping::new("x", "y", "tmi"))?;
//!
//! // 50 m traverse densified every 10 m
//! let traverse = build_sparse_geometry(&stations, 10.0)?;
//! assert_eq!(traverse.len(), 6);
//! assert_eq!(traverse.measured_count(), 2);
//! # Ok::<(), trueno_traverse::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod codec;
pub mod config;
pub mod error;
pub mod geometry;
pub mod inference;
pub mod ingest;
pub mod job;
pub mod merge;
pub mod pipeline;
pub mod split;
pub mod station;
pub mod storage;

pub use config::PipelineConfig;
pub use error::{Error, ErrorKind, Result};
pub use job::{Job, JobRequest, JobStatus, JobStatusView, Scenario};
pub use pipeline::Pipeline;
