//! Stored profile compatibility.
//!
//! Employee records carry whatever JSON the engine returned when they were
//! last enrolled, and older records predate the versioned profile format.
//! Everything that knows about those shapes lives here; the rest of the
//! engine only sees canonical [`Capture`]s.

use crate::profile::{parse_descriptors, parse_entry};
use crate::types::{Capture, DESCRIPTOR_LENGTH};
use crate::vector::coerce_number_array;
use serde_json::Value;

/// The shapes a stored face blob can take.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredProfileFormat {
    /// Nothing stored, or nothing recognisable.
    Empty,
    /// Bare array of descriptors or `{vector, score?, capturedAt?}` objects.
    LegacyArray(Vec<Capture>),
    /// Object holding only a `centroid`.
    LegacyCentroid(Vec<f64>),
    /// Object with a `captures` array, normally a versioned profile.
    Versioned {
        captures: Vec<Capture>,
        centroid: Option<Vec<f64>>,
    },
}

impl StoredProfileFormat {
    /// Classify a stored blob. Never fails: unusable data is treated as
    /// "no history" because it comes from our own storage, not from a user.
    pub fn parse(stored: Option<&Value>) -> Self {
        match stored {
            None | Some(Value::Null) => Self::Empty,
            Some(raw @ Value::Array(_)) => match parse_descriptors(raw) {
                Ok(captures) => Self::LegacyArray(captures),
                Err(err) => {
                    tracing::debug!(error = %err, "ignoring unusable legacy descriptor array");
                    Self::Empty
                }
            },
            Some(Value::Object(map)) => {
                let centroid = map
                    .get("centroid")
                    .and_then(coerce_number_array)
                    .filter(|c| c.len() == DESCRIPTOR_LENGTH);

                match map.get("captures").and_then(Value::as_array) {
                    Some(entries) => {
                        let captures = entries
                            .iter()
                            .enumerate()
                            .filter_map(|(index, entry)| match parse_entry(entry) {
                                Ok(capture) => Some(capture),
                                Err(reason) => {
                                    tracing::debug!(index, %reason, "skipping stored capture");
                                    None
                                }
                            })
                            .collect();
                        Self::Versioned { captures, centroid }
                    }
                    None => match centroid {
                        Some(centroid) => Self::LegacyCentroid(centroid),
                        None => Self::Empty,
                    },
                }
            }
            Some(_) => Self::Empty,
        }
    }

    /// Short name of the detected format.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::LegacyArray(_) => "legacy-array",
            Self::LegacyCentroid(_) => "legacy-centroid",
            Self::Versioned { .. } => "versioned",
        }
    }

    /// Stored centroid, if the blob carries a valid one.
    pub fn centroid(&self) -> Option<&[f64]> {
        match self {
            Self::LegacyCentroid(centroid) => Some(centroid),
            Self::Versioned { centroid, .. } => centroid.as_deref(),
            Self::Empty | Self::LegacyArray(_) => None,
        }
    }

    /// Canonical capture list. A centroid-only record becomes one capture.
    pub fn into_captures(self) -> Vec<Capture> {
        match self {
            Self::Empty => Vec::new(),
            Self::LegacyArray(captures) | Self::Versioned { captures, .. } => captures,
            Self::LegacyCentroid(centroid) => vec![Capture::new(centroid)],
        }
    }
}

/// Existing enrollment entries from a stored blob (empty when there are none).
pub fn extract_entries(stored: Option<&Value>) -> Vec<Capture> {
    StoredProfileFormat::parse(stored).into_captures()
}
