use thiserror::Error;

/// Validation failure for face descriptor input.
///
/// Every variant is caller-recoverable: nothing is written on failure, so the
/// caller can resubmit corrected input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FaceDataError {
    #[error("face descriptors are required: expected a non-empty array of captures")]
    MissingDescriptors,
    #[error("invalid face descriptor at index {index}: {reason}")]
    InvalidDescriptor { index: usize, reason: String },
    #[error("no usable face captures remain after processing")]
    NoUsableCaptures,
    #[error("cannot compute a centroid over an empty vector list")]
    EmptyCentroidInput,
    #[error("vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid face descriptor")]
    InvalidQuery,
}

impl FaceDataError {
    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        400
    }
}
