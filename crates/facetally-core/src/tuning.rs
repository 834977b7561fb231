//! Thresholds that drive enrollment consolidation and matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distance from the pooled centroid beyond which a capture is an outlier.
pub const OUTLIER_DISTANCE: f64 = 0.65;
/// Captures closer than this to an already kept capture are duplicates.
pub const DUPLICATE_DISTANCE: f64 = 0.015;
/// Maximum number of captures retained in a profile.
pub const MAX_CAPTURES: usize = 12;
/// Average centroid distance at which the consistency score reaches zero.
pub const CONSISTENCY_SCALE: f64 = 0.8;
/// A query must be strictly closer than this to be accepted as a match.
pub const MATCH_THRESHOLD: f64 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TuningError {
    #[error("{field} must be a positive number, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("max_captures must be at least 1")]
    NoCaptureRoom,
}

/// Engine thresholds. `Default` yields the production values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tuning {
    pub outlier_distance: f64,
    pub duplicate_distance: f64,
    pub max_captures: usize,
    pub consistency_scale: f64,
    pub match_threshold: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            outlier_distance: OUTLIER_DISTANCE,
            duplicate_distance: DUPLICATE_DISTANCE,
            max_captures: MAX_CAPTURES,
            consistency_scale: CONSISTENCY_SCALE,
            match_threshold: MATCH_THRESHOLD,
        }
    }
}

impl Tuning {
    /// Check that every threshold is usable. Reports the first offending field.
    pub fn validate(&self) -> Result<(), TuningError> {
        let distances = [
            ("outlier_distance", self.outlier_distance),
            ("duplicate_distance", self.duplicate_distance),
            ("consistency_scale", self.consistency_scale),
            ("match_threshold", self.match_threshold),
        ];
        for (field, value) in distances {
            if !value.is_finite() || value <= 0.0 {
                return Err(TuningError::NotPositive { field, value });
            }
        }
        if self.max_captures == 0 {
            return Err(TuningError::NoCaptureRoom);
        }
        Ok(())
    }
}
