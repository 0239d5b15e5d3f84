//! Station records and the frozen traverse
//!
//! ```text
//! RawStation (ingest) ──> StationRecord (geometry) ──> Traverse (frozen)
//!                                                          │
//!                                                          └──> CompletedStation (merge)
//! ```

use crate::{Error, Result};

/// One parsed CSV row, in file order. No derived geometry yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawStation {
    /// Easting
    pub x: f64,
    /// Northing
    pub y: f64,
    /// Observed value, if the row carried one
    pub value: Option<f64>,
}

impl RawStation {
    /// Create a raw station
    #[must_use]
    pub const fn new(x: f64, y: f64, value: Option<f64>) -> Self {
        Self { x, y, value }
    }
}

/// A station on the traverse with its derived distance.
///
/// `is_measured` is always equal to `value.is_some()`; the constructors
/// refuse to build anything else.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationRecord {
    x: f64,
    y: f64,
    distance_along: f64,
    value: Option<f64>,
    is_measured: bool,
    generated: bool,
}

impl StationRecord {
    /// Build a station from loose parts, rejecting an inconsistent
    /// `is_measured` / `value` pairing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Data` if `is_measured != value.is_some()` or if a
    /// measured station is marked as generated.
    pub fn try_new(
        x: f64,
        y: f64,
        distance_along: f64,
        value: Option<f64>,
        is_measured: bool,
        generated: bool,
    ) -> Result<Self> {
        match (is_measured, value) {
            (true, None) => Err(Error::Data(format!(
                "station at distance {distance_along} is measured but has no value"
            ))),
            (false, Some(v)) => Err(Error::Data(format!(
                "station at distance {distance_along} is unmeasured but carries value {v}"
            ))),
            (true, Some(_)) if generated => Err(Error::Data(format!(
                "station at distance {distance_along} is measured but marked generated"
            ))),
            _ => Ok(Self {
                x,
                y,
                distance_along,
                value,
                is_measured,
                generated,
            }),
        }
    }

    /// A measured station taken verbatim from the upload.
    #[must_use]
    pub const fn measured(x: f64, y: f64, distance_along: f64, value: f64) -> Self {
        Self {
            x,
            y,
            distance_along,
            value: Some(value),
            is_measured: true,
            generated: false,
        }
    }

    /// An unmeasured station. `generated` marks synthetic grid stations.
    #[must_use]
    pub const fn unmeasured(x: f64, y: f64, distance_along: f64, generated: bool) -> Self {
        Self {
            x,
            y,
            distance_along,
            value: None,
            is_measured: false,
            generated,
        }
    }

    /// Build from a raw station and its distance; measured iff it has a value.
    #[must_use]
    pub const fn from_raw(raw: &RawStation, distance_along: f64) -> Self {
        match raw.value {
            Some(v) => Self::measured(raw.x, raw.y, distance_along, v),
            None => Self::unmeasured(raw.x, raw.y, distance_along, false),
        }
    }

    /// Easting
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.x
    }

    /// Northing
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.y
    }

    /// Cumulative path length from the first station
    #[must_use]
    pub const fn distance_along(&self) -> f64 {
        self.distance_along
    }

    /// Measured value
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        self.value
    }

    /// Whether the station carries an observed value
    #[must_use]
    pub const fn is_measured(&self) -> bool {
        self.is_measured
    }

    /// Whether the station was synthesized on the sparse grid
    #[must_use]
    pub const fn generated(&self) -> bool {
        self.generated
    }
}

/// Ordered station sequence with frozen geometry.
///
/// Once built, the traverse hands out shared references only.
#[derive(Debug, Clone, PartialEq)]
pub struct Traverse {
    stations: Vec<StationRecord>,
}

impl Traverse {
    /// Freeze a station sequence, checking the distance invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::Geometry` if the sequence is empty, the first distance
    /// is not `0`, any distance is non-finite, or distances decrease.
    pub fn freeze(stations: Vec<StationRecord>) -> Result<Self> {
        let Some(first) = stations.first() else {
            return Err(Error::Geometry("traverse has no stations".to_string()));
        };
        if first.distance_along != 0.0 {
            return Err(Error::Geometry(format!(
                "first station must sit at distance 0, found {}",
                first.distance_along
            )));
        }
        for (i, pair) in stations.windows(2).enumerate() {
            let (a, b) = (pair[0].distance_along, pair[1].distance_along);
            if !b.is_finite() {
                return Err(Error::Geometry(format!(
                    "station {} has non-finite distance",
                    i + 1
                )));
            }
            if b < a {
                return Err(Error::Geometry(format!(
                    "distance decreases at station {}: {a} -> {b}",
                    i + 1
                )));
            }
        }
        Ok(Self { stations })
    }

    /// Stations in traverse order
    #[must_use]
    pub fn stations(&self) -> &[StationRecord] {
        &self.stations
    }

    /// Number of stations
    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Always false for a frozen traverse; kept for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Total path length
    #[must_use]
    pub fn total_length(&self) -> f64 {
        self.stations.last().map_or(0.0, StationRecord::distance_along)
    }

    /// Number of measured stations
    #[must_use]
    pub fn measured_count(&self) -> usize {
        self.stations.iter().filter(|s| s.is_measured).count()
    }
}

/// A station in the final deliverable: every station carries a value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedStation {
    /// Easting
    pub x: f64,
    /// Northing
    pub y: f64,
    /// Cumulative path length
    pub distance_along: f64,
    /// Measured value, or the (clamped) prediction
    pub value: f64,
    /// Whether `value` was observed rather than predicted
    pub is_measured: bool,
}
