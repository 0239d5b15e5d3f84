//! Traverse geometry
//!
//! Derives the canonical one-dimensional position of every station
//! (cumulative Euclidean path length in upload order) and, for the sparse
//! scenario, densifies the traverse onto a uniform grid.
//!
//! ## Sparse densification
//!
//! ```text
//! anchors:   A0────────A1──────────────A2──────A3
//! grid:      g0   g1   g2   g3   g4   g5   g6  gL
//! output:    A0   g1   A1   g3   g4   A2   g6  A3
//! ```
//!
//! Anchors (measured stations) are emitted verbatim. A grid target within
//! [`DISTANCE_TOLERANCE`] of an anchor is represented by that anchor; every
//! other target is interpolated on its bracketing segment. One forward walk
//! over anchors and targets, O(n + m).

use crate::station::{RawStation, StationRecord, Traverse};
use crate::{Error, Result};

/// Two distances closer than this are the same position on the traverse.
pub const DISTANCE_TOLERANCE: f64 = 1e-6;

/// Cumulative distance along the traverse for each station, in input order.
///
/// The first station sits at `0`. Never reorders.
#[must_use]
pub fn compute_distance_along(stations: &[RawStation]) -> Vec<f64> {
    let mut distances = Vec::with_capacity(stations.len());
    let mut total = 0.0;
    for (i, station) in stations.iter().enumerate() {
        if i > 0 {
            let prev = &stations[i - 1];
            total += (station.x - prev.x).hypot(station.y - prev.y);
        }
        distances.push(total);
    }
    distances
}

/// Explicit scenario: stations used as uploaded, only distance is derived.
///
/// # Errors
///
/// Returns `Error::Geometry` if `stations` is empty.
pub fn build_explicit_geometry(stations: &[RawStation]) -> Result<Traverse> {
    let distances = compute_distance_along(stations);
    let records = stations
        .iter()
        .zip(&distances)
        .map(|(raw, &d)| StationRecord::from_raw(raw, d))
        .collect();
    Traverse::freeze(records)
}

/// Uniform target grid `0, s, 2s, ...` below `total_length`, always closed
/// by `total_length` itself.
///
/// Targets are computed as `i * spacing` so long traverses do not drift. A
/// multiple of `spacing` within [`DISTANCE_TOLERANCE`] of the end collapses
/// into the endpoint.
///
/// # Errors
///
/// Returns `Error::Geometry` if `spacing` is not a positive finite number or
/// `total_length` is negative or non-finite.
#[allow(clippy::cast_precision_loss)]
pub fn target_grid(total_length: f64, spacing: f64) -> Result<Vec<f64>> {
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(Error::Geometry(format!(
            "station spacing must be positive, got {spacing}"
        )));
    }
    if !total_length.is_finite() || total_length < 0.0 {
        return Err(Error::Geometry(format!(
            "invalid traverse length {total_length}"
        )));
    }

    let mut grid = Vec::new();
    let mut i: u64 = 0;
    loop {
        let d = i as f64 * spacing;
        if d >= total_length - DISTANCE_TOLERANCE {
            break;
        }
        grid.push(d);
        i += 1;
    }
    grid.push(total_length);
    Ok(grid)
}

/// Sparse scenario: densify the measured stations onto a uniform grid.
///
/// Only stations carrying a value act as anchors; rows without a value are
/// skipped. Every anchor reappears bit-identical in the output.
///
/// # Errors
///
/// Returns `Error::Geometry` if fewer than two anchors remain or `spacing`
/// is not a positive finite number.
pub fn build_sparse_geometry(stations: &[RawStation], spacing: f64) -> Result<Traverse> {
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(Error::Geometry(format!(
            "station spacing must be positive, got {spacing}"
        )));
    }

    let anchors: Vec<RawStation> = stations
        .iter()
        .filter(|s| s.value.is_some())
        .copied()
        .collect();
    let skipped = stations.len() - anchors.len();
    if skipped > 0 {
        tracing::warn!(skipped, "sparse geometry ignores rows without a value");
    }
    if anchors.len() < 2 {
        return Err(Error::Geometry(format!(
            "sparse geometry needs at least two measured stations, found {}",
            anchors.len()
        )));
    }

    let distances = compute_distance_along(&anchors);
    let total_length = distances[distances.len() - 1];
    let grid = target_grid(total_length, spacing)?;

    let records = densify(&anchors, &distances, &grid);
    tracing::debug!(
        anchors = anchors.len(),
        targets = grid.len(),
        stations = records.len(),
        total_length,
        "sparse geometry built"
    );
    Traverse::freeze(records)
}

/// Forward merge walk over anchors and grid targets (both non-decreasing).
fn densify(anchors: &[RawStation], distances: &[f64], grid: &[f64]) -> Vec<StationRecord> {
    let mut records = Vec::with_capacity(anchors.len() + grid.len());
    let mut next = 0;

    let emit_anchor = |records: &mut Vec<StationRecord>, i: usize| {
        records.push(StationRecord::from_raw(&anchors[i], distances[i]));
    };

    for &d in grid {
        while next < anchors.len() && distances[next] < d - DISTANCE_TOLERANCE {
            emit_anchor(&mut records, next);
            next += 1;
        }

        // The target coincides with the next anchor; the anchor stands in for it.
        if next >= anchors.len() || (distances[next] - d).abs() <= DISTANCE_TOLERANCE {
            continue;
        }

        // distances[next - 1] < d < distances[next]; next >= 1 because the
        // first anchor sits at 0 and every target is >= 0.
        let (p0, p1) = (&anchors[next - 1], &anchors[next]);
        let (d0, d1) = (distances[next - 1], distances[next]);
        let t = if d1 == d0 { 0.0 } else { (d - d0) / (d1 - d0) };
        let x = t.mul_add(p1.x - p0.x, p0.x);
        let y = t.mul_add(p1.y - p0.y, p0.y);
        records.push(StationRecord::unmeasured(x, y, d, true));
    }

    while next < anchors.len() {
        emit_anchor(&mut records, next);
        next += 1;
    }
    records
}
