//! Face profile engine.
//!
//! Turns raw capture submissions plus an optional stored profile into a new
//! consolidated [`FaceProfile`], and pulls comparison vectors back out of a
//! stored profile for recognition.
//!
//! Consolidation pipeline, applied to existing + new captures:
//! normalize → outlier rejection → deduplication → history trimming →
//! centroid and consistency scoring.

use crate::clock::{Clock, SystemClock};
use crate::error::FaceDataError;
use crate::stored::{extract_entries, StoredProfileFormat};
use crate::tuning::Tuning;
use crate::types::{
    parse_timestamp, Capture, FaceProfile, ProfileStats, DESCRIPTOR_LENGTH, PROFILE_VERSION,
};
use crate::vector::{
    centroid, coerce_number, coerce_number_array, euclidean_distance, normalize, round_to,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Decimal digits kept for the consistency score.
const CONSISTENCY_PRECISION: u32 = 4;

/// Parse one submitted capture: a bare vector or an object with `vector`.
pub(crate) fn parse_entry(entry: &Value) -> Result<Capture, String> {
    let (raw_vector, score, captured_at) = match entry {
        Value::Array(_) => (entry, None, None),
        Value::Object(map) => {
            let vector = map
                .get("vector")
                .ok_or_else(|| "object is missing a vector field".to_string())?;
            let score = map
                .get("score")
                .and_then(coerce_number)
                .and_then(Capture::clamp_score);
            let captured_at = map.get("capturedAt").and_then(parse_timestamp);
            (vector, score, captured_at)
        }
        _ => return Err("expected an array of numbers or an object with a vector field".into()),
    };

    let vector = coerce_number_array(raw_vector)
        .ok_or_else(|| "vector must be an array of finite numbers".to_string())?;
    if vector.len() != DESCRIPTOR_LENGTH {
        return Err(format!(
            "expected {DESCRIPTOR_LENGTH} values, got {}",
            vector.len()
        ));
    }

    Ok(Capture {
        vector,
        score,
        captured_at,
    })
}

/// Validate a capture submission. All-or-nothing: the first bad element
/// fails the whole batch with its index.
pub(crate) fn parse_descriptors(raw: &Value) -> Result<Vec<Capture>, FaceDataError> {
    let entries = match raw.as_array() {
        Some(entries) if !entries.is_empty() => entries,
        _ => return Err(FaceDataError::MissingDescriptors),
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            parse_entry(entry).map_err(|reason| FaceDataError::InvalidDescriptor { index, reason })
        })
        .collect()
}

/// Give unstamped captures `now + i` milliseconds so a batch keeps its order.
fn stamp_captures(captures: &mut [Capture], now: DateTime<Utc>) {
    for (i, capture) in captures.iter_mut().enumerate() {
        if capture.captured_at.is_none() {
            capture.captured_at = Some(now + Duration::milliseconds(i as i64));
        }
    }
}

/// Builds and updates face profiles.
#[derive(Debug, Clone)]
pub struct ProfileEngine<C = SystemClock> {
    tuning: Tuning,
    clock: C,
}

impl ProfileEngine<SystemClock> {
    pub fn new(tuning: Tuning) -> Self {
        Self::with_clock(tuning, SystemClock)
    }
}

impl Default for ProfileEngine<SystemClock> {
    fn default() -> Self {
        Self::new(Tuning::default())
    }
}

impl<C: Clock> ProfileEngine<C> {
    pub fn with_clock(tuning: Tuning, clock: C) -> Self {
        Self { tuning, clock }
    }

    /// Merge a raw capture submission into the stored profile (if any) and
    /// return the replacement profile.
    ///
    /// At least one new capture is required on every call.
    pub fn build(
        &self,
        raw_descriptors: &Value,
        existing: Option<&Value>,
    ) -> Result<FaceProfile, FaceDataError> {
        let mut pooled = extract_entries(existing);
        let mut incoming = parse_descriptors(raw_descriptors)?;

        let now = self.clock.now();
        stamp_captures(&mut incoming, now);

        tracing::debug!(
            existing = pooled.len(),
            incoming = incoming.len(),
            "building face profile"
        );

        pooled.append(&mut incoming);
        self.consolidate(pooled, now)
    }

    fn consolidate(
        &self,
        pooled: Vec<Capture>,
        now: DateTime<Utc>,
    ) -> Result<FaceProfile, FaceDataError> {
        let normalized: Vec<Capture> = pooled
            .into_iter()
            .map(|capture| Capture {
                vector: normalize(&capture.vector),
                ..capture
            })
            .filter(|capture| capture.vector.len() == DESCRIPTOR_LENGTH)
            .collect();
        if normalized.is_empty() {
            return Err(FaceDataError::NoUsableCaptures);
        }

        let inliers = self.reject_outliers(normalized)?;
        let mut retained = self.deduplicate(inliers);
        self.trim_history(&mut retained);

        if retained.is_empty() {
            return Err(FaceDataError::NoUsableCaptures);
        }

        // Second centroid: over retained captures only, unlike the one used for
        // outlier rejection.
        let vectors: Vec<&[f64]> = retained.iter().map(|c| c.vector.as_slice()).collect();
        let center = centroid(&vectors)?;

        let consistency_score = if retained.len() == 1 {
            1.0
        } else {
            let avg = vectors
                .iter()
                .map(|v| euclidean_distance(v, &center))
                .sum::<f64>()
                / vectors.len() as f64;
            round_to(
                (1.0 - avg / self.tuning.consistency_scale).clamp(0.0, 1.0),
                CONSISTENCY_PRECISION,
            )
        };

        retained.sort_by_key(|c| c.captured_at);

        let last_updated = retained
            .iter()
            .filter_map(|c| c.captured_at)
            .max()
            .unwrap_or(now);

        tracing::debug!(
            captures = retained.len(),
            consistency_score,
            "face profile consolidated"
        );

        Ok(FaceProfile {
            version: PROFILE_VERSION,
            centroid: center,
            stats: ProfileStats {
                capture_count: retained.len(),
                descriptor_length: DESCRIPTOR_LENGTH,
                consistency_score,
                last_updated,
            },
            captures: retained,
        })
    }

    /// Drop captures far from the centroid of the whole pool. Needs more than
    /// two captures, and never empties the pool.
    fn reject_outliers(&self, pool: Vec<Capture>) -> Result<Vec<Capture>, FaceDataError> {
        if pool.len() <= 2 {
            return Ok(pool);
        }

        let vectors: Vec<&[f64]> = pool.iter().map(|c| c.vector.as_slice()).collect();
        let pool_center = centroid(&vectors)?;

        let keep: Vec<bool> = vectors
            .iter()
            .map(|v| euclidean_distance(v, &pool_center) <= self.tuning.outlier_distance)
            .collect();

        let kept = keep.iter().filter(|&&k| k).count();
        if kept == 0 {
            tracing::debug!(
                pool = pool.len(),
                "every capture is an outlier; keeping the full pool"
            );
            return Ok(pool);
        }
        if kept < pool.len() {
            tracing::debug!(rejected = pool.len() - kept, "rejected outlier captures");
        }

        Ok(pool
            .into_iter()
            .zip(keep)
            .filter_map(|(capture, keep)| keep.then_some(capture))
            .collect())
    }

    /// Keep a capture only if it is farther than the duplicate distance from
    /// every capture already kept.
    fn deduplicate(&self, captures: Vec<Capture>) -> Vec<Capture> {
        let mut kept: Vec<Capture> = Vec::with_capacity(captures.len());
        for capture in captures {
            let distinct = kept.iter().all(|k| {
                euclidean_distance(&k.vector, &capture.vector) > self.tuning.duplicate_distance
            });
            if distinct {
                kept.push(capture);
            } else {
                tracing::debug!(captured_at = ?capture.captured_at, "dropped near-duplicate capture");
            }
        }
        kept
    }

    /// Keep only the newest `max_captures` captures.
    fn trim_history(&self, captures: &mut Vec<Capture>) {
        let max = self.tuning.max_captures;
        if captures.len() <= max {
            return;
        }
        // Captures without a timestamp sort first and rotate out first.
        captures.sort_by_key(|c| c.captured_at);
        let excess = captures.len() - max;
        captures.drain(..excess);
        tracing::debug!(dropped = excess, "rotated out oldest captures");
    }

    /// Candidate vectors for matching against a stored profile: every
    /// capture (normalized) plus the stored centroid, without near-duplicates.
    pub fn comparison_vectors(&self, stored: Option<&Value>) -> Vec<Vec<f64>> {
        comparison_vectors_within(stored, self.tuning.duplicate_distance)
    }
}

pub(crate) fn comparison_vectors_within(
    stored: Option<&Value>,
    duplicate_distance: f64,
) -> Vec<Vec<f64>> {
    let format = StoredProfileFormat::parse(stored);
    let stored_centroid = format.centroid().map(<[f64]>::to_vec);

    let candidates = format
        .into_captures()
        .into_iter()
        .map(|capture| normalize(&capture.vector))
        .filter(|v| v.len() == DESCRIPTOR_LENGTH)
        .chain(stored_centroid);

    let mut unique: Vec<Vec<f64>> = Vec::new();
    for candidate in candidates {
        if unique
            .iter()
            .all(|u| euclidean_distance(u, &candidate) >= duplicate_distance)
        {
            unique.push(candidate);
        }
    }
    unique
}

/// Build or update a profile with production thresholds and the system clock.
pub fn build_face_profile(
    raw_descriptors: &Value,
    existing: Option<&Value>,
) -> Result<FaceProfile, FaceDataError> {
    ProfileEngine::default().build(raw_descriptors, existing)
}

/// Candidate vectors for a stored profile with production thresholds.
pub fn comparison_vectors(stored: Option<&Value>) -> Vec<Vec<f64>> {
    comparison_vectors_within(stored, Tuning::default().duplicate_distance)
}

/// Validate and normalize a live recognition query.
pub fn prepare_query_descriptor(raw: &Value) -> Result<Vec<f64>, FaceDataError> {
    match coerce_number_array(raw) {
        Some(vector) if vector.len() == DESCRIPTOR_LENGTH => Ok(normalize(&vector)),
        _ => Err(FaceDataError::InvalidQuery),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::types::format_timestamp;
    use crate::vector::magnitude;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 3, 9, 0, 0).unwrap()
    }

    fn engine_at(now: DateTime<Utc>) -> ProfileEngine<FixedClock> {
        ProfileEngine::with_clock(Tuning::default(), FixedClock(now))
    }

    fn unit(axis: usize) -> Vec<f64> {
        let mut v = vec![0.0; DESCRIPTOR_LENGTH];
        v[axis] = 1.0;
        v
    }

    /// Mostly along axis 0, nudged towards `axis`. Variants with different
    /// axes are ~0.14 apart after normalization.
    fn variant(axis: usize) -> Vec<f64> {
        let mut v = unit(0);
        v[axis] += 0.1;
        v
    }

    fn approx_eq(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-12)
    }

    #[test]
    fn test_single_capture_profile() {
        let raw: Vec<f64> = variant(3).iter().map(|x| x * 7.5).collect();
        let profile = engine_at(t0()).build(&json!([raw]), None).unwrap();

        assert_eq!(profile.version, 1);
        assert_eq!(profile.captures.len(), 1);
        assert_eq!(profile.stats.capture_count, 1);
        assert_eq!(profile.stats.descriptor_length, 128);
        assert_eq!(profile.stats.consistency_score, 1.0);
        assert_eq!(profile.stats.last_updated, t0());
        assert!(approx_eq(&profile.centroid, &normalize(&raw)));
        assert!((magnitude(&profile.captures[0].vector) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_batch_stamps_are_strictly_increasing() {
        let profile = engine_at(t0())
            .build(&json!([variant(1), variant(2), variant(3)]), None)
            .unwrap();
        let stamps: Vec<_> = profile.captures.iter().map(|c| c.captured_at.unwrap()).collect();
        assert_eq!(
            stamps,
            vec![
                t0(),
                t0() + Duration::milliseconds(1),
                t0() + Duration::milliseconds(2)
            ]
        );
        assert_eq!(profile.stats.last_updated, t0() + Duration::milliseconds(2));
    }

    #[test]
    fn test_supplied_metadata_is_kept() {
        let raw = json!([{
            "vector": variant(1),
            "score": 1.4,
            "capturedAt": "2026-01-15T12:00:00.250Z"
        }]);
        let profile = engine_at(t0()).build(&raw, None).unwrap();
        let capture = &profile.captures[0];
        assert_eq!(capture.score, Some(1.0));
        assert_eq!(
            format_timestamp(&capture.captured_at.unwrap()),
            "2026-01-15T12:00:00.250Z"
        );
        assert_eq!(profile.stats.last_updated, capture.captured_at.unwrap());
    }

    #[test]
    fn test_trims_to_twelve_newest() {
        // Submitted newest-first so trimming has to sort.
        let raw: Vec<Value> = (1..=15)
            .rev()
            .map(|k| {
                let at = t0() + Duration::minutes(k as i64);
                json!({"vector": variant(k), "capturedAt": format_timestamp(&at)})
            })
            .collect();
        let profile = engine_at(t0()).build(&Value::Array(raw), None).unwrap();

        assert_eq!(profile.captures.len(), 12);
        assert_eq!(profile.stats.capture_count, 12);
        let minutes: Vec<i64> = profile
            .captures
            .iter()
            .map(|c| (c.captured_at.unwrap() - t0()).num_minutes())
            .collect();
        assert_eq!(minutes, (4..=15).collect::<Vec<i64>>());
        assert_eq!(profile.stats.last_updated, t0() + Duration::minutes(15));
    }

    #[test]
    fn test_near_duplicates_collapse() {
        let mut nudged = variant(1);
        nudged[7] += 1e-4;
        let profile = engine_at(t0())
            .build(&json!([variant(1), nudged]), None)
            .unwrap();
        assert_eq!(profile.captures.len(), 1);
        assert_eq!(profile.captures[0].captured_at, Some(t0()));
        assert_eq!(profile.stats.consistency_score, 1.0);
    }

    #[test]
    fn test_outlier_rejected() {
        let raw = json!([variant(1), variant(2), variant(3), unit(100)]);
        let profile = engine_at(t0()).build(&raw, None).unwrap();

        assert_eq!(profile.captures.len(), 3);
        assert!(profile.captures.iter().all(|c| c.vector[100] == 0.0));
        assert!(profile.stats.consistency_score > 0.8);
    }

    #[test]
    fn test_all_outliers_keeps_everything() {
        // Three orthogonal vectors are each ~0.816 from their centroid.
        let raw = json!([unit(0), unit(1), unit(2)]);
        let profile = engine_at(t0()).build(&raw, None).unwrap();

        assert_eq!(profile.captures.len(), 3);
        let third = round_to(1.0 / 3.0, 8);
        assert_eq!(&profile.centroid[..3], &[third, third, third]);
    }

    #[test]
    fn test_two_captures_skip_outlier_rejection() {
        let profile = engine_at(t0())
            .build(&json!([unit(0), unit(1)]), None)
            .unwrap();

        assert_eq!(profile.captures.len(), 2);
        // Each sits sqrt(0.5) from the centroid: 1 - 0.70710678 / 0.8.
        assert_eq!(profile.stats.consistency_score, 0.1161);
    }

    #[test]
    fn test_merge_with_existing_profile() {
        let first = engine_at(t0())
            .build(&json!([variant(1), variant(2)]), None)
            .unwrap();
        let stored = serde_json::to_value(&first).unwrap();

        let later = t0() + Duration::hours(1);
        let merged = engine_at(later)
            .build(&json!([variant(3)]), Some(&stored))
            .unwrap();

        assert_eq!(merged.captures.len(), 3);
        assert!(approx_eq(&merged.captures[0].vector, &first.captures[0].vector));
        assert!(approx_eq(&merged.captures[1].vector, &first.captures[1].vector));
        assert_eq!(merged.captures[2].captured_at, Some(later));
        assert_eq!(merged.stats.last_updated, later);
    }

    #[test]
    fn test_merge_rotates_out_oldest_history() {
        let raw: Vec<Value> = (1..=12).map(|k| json!(variant(k))).collect();
        let first = engine_at(t0()).build(&Value::Array(raw), None).unwrap();
        assert_eq!(first.captures.len(), 12);
        let stored = serde_json::to_value(&first).unwrap();

        let later = t0() + Duration::days(1);
        let merged = engine_at(later)
            .build(&json!([variant(20), variant(21), variant(22)]), Some(&stored))
            .unwrap();

        assert_eq!(merged.captures.len(), 12);
        assert!(approx_eq(&merged.captures[0].vector, &first.captures[3].vector));
        assert_eq!(merged.captures[11].captured_at, Some(later + Duration::milliseconds(2)));
    }

    #[test]
    fn test_merge_from_centroid_only_record() {
        let stored = json!({"centroid": normalize(&variant(1))});
        let profile = engine_at(t0())
            .build(&json!([variant(2)]), Some(&stored))
            .unwrap();
        assert_eq!(profile.captures.len(), 2);
        // The synthesized capture has no timestamp and sorts first.
        assert_eq!(profile.captures[0].captured_at, None);
        assert_eq!(profile.stats.last_updated, t0());
    }

    #[test]
    fn test_stored_profile_round_trip() {
        let profile = engine_at(t0())
            .build(&json!([variant(1), variant(2)]), None)
            .unwrap();
        let stored = serde_json::to_value(&profile).unwrap();
        let decoded: FaceProfile = serde_json::from_value(stored.clone()).unwrap();
        assert_eq!(decoded, profile);

        // Re-submitting with no new captures is refused.
        assert_matches!(
            engine_at(t0()).build(&json!([]), Some(&stored)),
            Err(FaceDataError::MissingDescriptors)
        );
    }

    #[test]
    fn test_missing_or_non_array_descriptors() {
        let engine = engine_at(t0());
        assert_matches!(engine.build(&json!([]), None), Err(FaceDataError::MissingDescriptors));
        assert_matches!(engine.build(&Value::Null, None), Err(FaceDataError::MissingDescriptors));
        assert_matches!(
            engine.build(&json!({"vector": unit(0)}), None),
            Err(FaceDataError::MissingDescriptors)
        );
    }

    #[test]
    fn test_wrong_length_names_index() {
        let short = vec![0.5; 127];
        let err = engine_at(t0())
            .build(&json!([variant(1), variant(2), short]), None)
            .unwrap_err();
        assert_matches!(err, FaceDataError::InvalidDescriptor { index: 2, .. });
        assert!(err.to_string().contains("index 2"));
        assert!(err.to_string().contains("got 127"));
    }

    #[test]
    fn test_unparseable_shapes_name_index() {
        let engine = engine_at(t0());
        assert_matches!(
            engine.build(&json!(["nope"]), None),
            Err(FaceDataError::InvalidDescriptor { index: 0, .. })
        );
        assert_matches!(
            engine.build(&json!([variant(1), {"score": 0.9}]), None),
            Err(FaceDataError::InvalidDescriptor { index: 1, .. })
        );
        let mut bad = variant(1);
        bad.pop();
        let mut raw = json!(bad);
        raw.as_array_mut().unwrap().push(json!("x"));
        assert_matches!(
            engine.build(&json!([raw]), None),
            Err(FaceDataError::InvalidDescriptor { index: 0, .. })
        );
    }

    #[test]
    fn test_numeric_string_score_is_coerced() {
        let raw = json!([
            {"vector": variant(1), "score": " 0.9 "},
            {"vector": variant(2), "score": "7"},
            {"vector": variant(3), "score": "high"}
        ]);
        let profile = engine_at(t0()).build(&raw, None).unwrap();
        let scores: Vec<Option<f64>> = profile.captures.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![Some(0.9), Some(1.0), None]);
    }

    #[test]
    fn test_huge_components_keep_finite_centroid() {
        let profile = engine_at(t0())
            .build(&json!([vec![1e301; DESCRIPTOR_LENGTH]]), None)
            .unwrap();
        assert!(profile.centroid.iter().all(|x| x.is_finite()));

        let stored = serde_json::to_value(&profile).unwrap();
        let format = StoredProfileFormat::parse(Some(&stored));
        assert_eq!(format.centroid(), Some(profile.centroid.as_slice()));
    }

    #[test]
    fn test_all_zero_capture_survives() {
        let profile = engine_at(t0())
            .build(&json!([vec![0.0; DESCRIPTOR_LENGTH]]), None)
            .unwrap();
        assert_eq!(profile.centroid, vec![0.0; DESCRIPTOR_LENGTH]);
    }

    #[test]
    fn test_custom_tuning_caps_history() {
        let tuning = Tuning {
            max_captures: 2,
            ..Tuning::default()
        };
        let engine = ProfileEngine::with_clock(tuning, FixedClock(t0()));
        let profile = engine
            .build(&json!([variant(1), variant(2), variant(3)]), None)
            .unwrap();
        assert_eq!(profile.captures.len(), 2);
        assert_eq!(profile.captures[0].captured_at, Some(t0() + Duration::milliseconds(1)));
    }

    #[test]
    fn test_prepare_query_descriptor() {
        let raw: Vec<f64> = variant(4).iter().map(|x| x * 3.0).collect();
        let query = prepare_query_descriptor(&json!(raw)).unwrap();
        assert_eq!(query, normalize(&raw));

        assert_matches!(
            prepare_query_descriptor(&json!([1.0, 2.0])),
            Err(FaceDataError::InvalidQuery)
        );
        assert_matches!(
            prepare_query_descriptor(&json!({"vector": raw})),
            Err(FaceDataError::InvalidQuery)
        );
        assert_eq!(
            prepare_query_descriptor(&Value::Null).unwrap_err().to_string(),
            "invalid face descriptor"
        );
    }

    #[test]
    fn test_comparison_vectors_include_centroid() {
        let profile = engine_at(t0())
            .build(&json!([variant(1), variant(2)]), None)
            .unwrap();
        let stored = serde_json::to_value(&profile).unwrap();
        let vectors = comparison_vectors(Some(&stored));

        // Two captures ~0.14 apart, centroid ~0.07 from each.
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[2], profile.centroid);
    }

    #[test]
    fn test_comparison_vectors_dedupe_single_capture() {
        let profile = engine_at(t0()).build(&json!([unit(9)]), None).unwrap();
        let stored = serde_json::to_value(&profile).unwrap();
        assert_eq!(comparison_vectors(Some(&stored)), vec![unit(9)]);
    }

    #[test]
    fn test_comparison_vectors_legacy_formats() {
        assert!(comparison_vectors(None).is_empty());
        assert!(comparison_vectors(Some(&json!({"foo": 1}))).is_empty());

        let legacy = json!([unit(1), unit(2)]);
        assert_eq!(comparison_vectors(Some(&legacy)), vec![unit(1), unit(2)]);

        let centroid_only = json!({"centroid": unit(3)});
        assert_eq!(comparison_vectors(Some(&centroid_only)), vec![unit(3)]);
    }
}
