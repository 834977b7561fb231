//! facetally-core — Face profile consolidation and recognition matching.
//!
//! Merges raw 128-dimensional face descriptor captures into a durable
//! per-employee profile (outlier rejection, deduplication, history trimming,
//! centroid and consistency scoring), and finds the nearest enrolled
//! employee for a live descriptor. Pure and synchronous; storage and
//! transport belong to the caller.

pub mod clock;
pub mod error;
pub mod matcher;
pub mod profile;
pub mod stored;
pub mod tuning;
pub mod types;
pub mod vector;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::FaceDataError;
pub use matcher::{
    find_best_match, match_descriptor, EnrolledFace, EuclideanMatcher, FaceMatch, Matcher,
};
pub use profile::{build_face_profile, comparison_vectors, prepare_query_descriptor, ProfileEngine};
pub use stored::{extract_entries, StoredProfileFormat};
pub use tuning::{Tuning, TuningError};
pub use types::{Capture, FaceProfile, ProfileStats, DESCRIPTOR_LENGTH, PROFILE_VERSION};
