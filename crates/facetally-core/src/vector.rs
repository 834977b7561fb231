//! Vector utilities — distance, normalization, centroid and input coercion.
//!
//! All functions are pure. Results that end up in stored profiles are
//! rounded to [`VECTOR_PRECISION`] decimal digits so a profile serializes
//! to the same JSON on every platform.

use crate::error::FaceDataError;
use serde_json::Value;

/// Decimal digits kept for normalized and averaged components.
pub const VECTOR_PRECISION: u32 = 8;

/// Round `value` to `digits` decimal places (half away from zero).
///
/// Values too large to scale have no fractional digits and are returned as is.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

/// L2 magnitude of a vector.
pub fn magnitude(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Euclidean distance between two vectors.
///
/// Returns `f64::INFINITY` when the lengths differ, so a malformed vector
/// can never win a nearest-neighbour comparison.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Scale a vector to unit length, rounding each component.
///
/// A zero or non-finite magnitude leaves the vector untouched.
pub fn normalize(v: &[f64]) -> Vec<f64> {
    let norm = magnitude(v);
    if norm == 0.0 || !norm.is_finite() {
        return v.to_vec();
    }
    v.iter()
        .map(|x| round_to(x / norm, VECTOR_PRECISION))
        .collect()
}

/// Convert an untrusted JSON value into a vector of finite numbers.
///
/// Only arrays are accepted. Elements may be JSON numbers or numeric
/// strings; any other element, or any value that is not finite, rejects
/// the whole input rather than yielding a partial vector.
pub fn coerce_number_array(input: &Value) -> Option<Vec<f64>> {
    let items = input.as_array()?;
    items.iter().map(coerce_number).collect()
}

/// Convert one untrusted JSON number or numeric string into a finite `f64`.
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Componentwise mean of equal-length vectors, rounded.
pub fn centroid<V: AsRef<[f64]>>(vectors: &[V]) -> Result<Vec<f64>, FaceDataError> {
    let first = vectors.first().ok_or(FaceDataError::EmptyCentroidInput)?;
    let dim = first.as_ref().len();

    let count = vectors.len() as f64;
    let mut mean = vec![0.0f64; dim];
    for v in vectors {
        let v = v.as_ref();
        if v.len() != dim {
            return Err(FaceDataError::LengthMismatch {
                expected: dim,
                actual: v.len(),
            });
        }
        // Divide before summing: the mean of finite values must stay finite.
        for (acc, x) in mean.iter_mut().zip(v) {
            *acc += x / count;
        }
    }

    Ok(mean
        .into_iter()
        .map(|m| round_to(m, VECTOR_PRECISION))
        .collect())
}
