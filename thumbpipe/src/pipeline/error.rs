//! Error taxonomy for the thumbnail pipeline.
//!
//! Every terminal outcome is a value. A failure in any stage ends the task
//! and the same `ThumbnailError` is delivered to every subscriber, so the
//! type is `Clone`.

use crate::pipeline::codec::Bitmap;
use std::sync::Arc;
use thiserror::Error;

/// Why a thumbnail request produced no bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThumbnailError {
    /// The source returned no bytes
    #[error("source unavailable")]
    SourceUnavailable,

    /// Encoded bytes could not be decoded into a bitmap
    #[error("decode failed")]
    DecodeFailure,

    /// The original could not be decoded and resized
    #[error("downsample failed")]
    DownsampleFailure,

    /// The downsampled bitmap could not be encoded
    #[error("encode failed")]
    EncodeFailure,

    /// The subscriber cancelled before a result was delivered
    #[error("cancelled")]
    Cancelled,
}

impl ThumbnailError {
    /// True for the cancellation outcome, which is not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Outcome delivered to each subscriber.
pub type ThumbnailResult = Result<Arc<Bitmap>, ThumbnailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ThumbnailError::SourceUnavailable.to_string(), "source unavailable");
        assert_eq!(ThumbnailError::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_is_cancelled() {
        assert!(ThumbnailError::Cancelled.is_cancelled());
        assert!(!ThumbnailError::EncodeFailure.is_cancelled());
    }
}
