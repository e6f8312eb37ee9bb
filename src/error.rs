//! Core error types shared by every batch-geometry and scoring operation.

use thiserror::Error;

/// Errors returned by tensor, centroid, similarity, loss, and EER operations.
///
/// Every error is reported to the immediate caller. No operation substitutes a
/// default loss or EER value on failure.
#[derive(Debug, Error)]
pub enum Ge2eError {
    /// Tensor rank or dimension mismatch.
    #[error("shape error: {reason}")]
    Shape { reason: String },

    /// Non-positive counts, empty threshold grids, too few speakers or utterances.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The external embedding producer failed or returned a malformed tensor.
    #[error("encoder failed: {reason}")]
    Encoder { reason: String },

    /// Error raised by the tensor backend.
    #[error("tensor backend error: {0}")]
    Backend(#[from] candle_core::Error),

    /// A metrics sink or checkpointer failed to write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A metric record could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Ge2eError {
    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Self::Shape {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Returns `true` for the shape-mismatch class of errors.
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. })
    }

    /// Returns `true` for the invalid-input class of errors.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}

/// Convenience result type for core operations.
pub type Ge2eResult<T> = Result<T, Ge2eError>;
