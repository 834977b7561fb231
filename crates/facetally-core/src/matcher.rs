//! Recognition matcher — nearest enrolled employee under a distance threshold.

use crate::error::FaceDataError;
use crate::profile::{comparison_vectors_within, prepare_query_descriptor};
use crate::tuning::Tuning;
use crate::vector::euclidean_distance;
use serde_json::Value;

/// An employee record the matcher can read a stored face profile from.
pub trait EnrolledFace {
    /// The stored face blob, exactly as last persisted.
    fn face_data(&self) -> Option<&Value>;

    /// Inactive employees are never matched.
    fn is_active(&self) -> bool {
        true
    }
}

/// The best match for a query.
#[derive(Debug)]
pub struct FaceMatch<'a, E> {
    pub employee: &'a E,
    pub distance: f64,
}

impl<E> FaceMatch<'_, E> {
    /// `1 - distance`. Monotonic in distance, not a calibrated probability.
    pub fn confidence(&self) -> f64 {
        1.0 - self.distance
    }
}

impl<E> Clone for FaceMatch<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for FaceMatch<'_, E> {}

/// Strategy for comparing a prepared query against a snapshot of employees.
pub trait Matcher {
    fn best_match<'a, E: EnrolledFace>(
        &self,
        query: &[f64],
        employees: &'a [E],
    ) -> Option<FaceMatch<'a, E>>;
}

/// Euclidean nearest-neighbour matcher over every stored capture and centroid.
///
/// Scans the full snapshot; ties go to the employee seen first.
#[derive(Debug, Clone)]
pub struct EuclideanMatcher {
    threshold: f64,
    duplicate_distance: f64,
}

impl EuclideanMatcher {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            threshold: tuning.match_threshold,
            duplicate_distance: tuning.duplicate_distance,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(&Tuning::default())
    }
}

impl Matcher for EuclideanMatcher {
    fn best_match<'a, E: EnrolledFace>(
        &self,
        query: &[f64],
        employees: &'a [E],
    ) -> Option<FaceMatch<'a, E>> {
        let mut best: Option<FaceMatch<'a, E>> = None;
        let mut best_distance = f64::INFINITY;

        for (index, employee) in employees.iter().enumerate() {
            if !employee.is_active() {
                continue;
            }
            let candidates =
                comparison_vectors_within(employee.face_data(), self.duplicate_distance);
            if candidates.is_empty() {
                tracing::trace!(index, "employee has no usable face data");
                continue;
            }

            let distance = candidates
                .iter()
                .map(|candidate| euclidean_distance(query, candidate))
                .fold(f64::INFINITY, f64::min);

            if distance < self.threshold && distance < best_distance {
                best_distance = distance;
                best = Some(FaceMatch { employee, distance });
            }
        }

        match &best {
            Some(found) => tracing::debug!(distance = found.distance, "face matched"),
            None => tracing::debug!(
                employees = employees.len(),
                threshold = self.threshold,
                "no face within threshold"
            ),
        }
        best
    }
}

/// Best match for an already prepared query, with production thresholds.
pub fn find_best_match<'a, E: EnrolledFace>(
    query: &[f64],
    employees: &'a [E],
) -> Option<FaceMatch<'a, E>> {
    EuclideanMatcher::default().best_match(query, employees)
}

/// Validate a raw query descriptor, then match it. Malformed queries fail
/// before any employee is examined.
pub fn match_descriptor<'a, E: EnrolledFace, M: Matcher>(
    matcher: &M,
    raw_query: &Value,
    employees: &'a [E],
) -> Result<Option<FaceMatch<'a, E>>, FaceDataError> {
    let query = prepare_query_descriptor(raw_query)?;
    Ok(matcher.best_match(&query, employees))
}
