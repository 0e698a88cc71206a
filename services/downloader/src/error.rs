//! Error types for the per-map pipeline.
//!
//! Every fault raised while processing one map ends up as a [`MapError`],
//! which the scheduler logs and counts before moving on to the next map.

use iiif_common::IiifError;
use thiserror::Error;

/// A network fault fetching a document or tile.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Connection { url: String, message: String },

    #[error("invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },
}

impl TransferError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Status { status, .. } => *status == 429 || *status >= 500,
            TransferError::Connection { .. } => true,
            TransferError::Decode { .. } => false,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            TransferError::Status { url, .. }
            | TransferError::Connection { url, .. }
            | TransferError::Decode { url, .. } => url,
        }
    }
}

/// A georeference annotation that could not be read.
#[derive(Debug, Error)]
#[error("invalid annotation: {0}")]
pub struct AnnotationError(pub String);

/// Why one map was skipped or failed.
#[derive(Debug, Error)]
pub enum MapError {
    /// The image has no tile pyramid to copy.
    #[error("image has no tile information: {0}")]
    UnsupportedImage(String),

    /// The source URL does not identify a single map.
    #[error("not a single map URL: {0}")]
    MalformedSourceReference(String),

    #[error(transparent)]
    TransferFailure(#[from] TransferError),

    #[error("unexpected failure: {0}")]
    UnexpectedFailure(String),
}

impl MapError {
    /// Short label for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            MapError::UnsupportedImage(_) => "unsupported_image",
            MapError::MalformedSourceReference(_) => "malformed_source_reference",
            MapError::TransferFailure(_) => "transfer_failure",
            MapError::UnexpectedFailure(_) => "unexpected_failure",
        }
    }

    /// Skips are expected outcomes for the input; everything else is a failure.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            MapError::UnsupportedImage(_) | MapError::MalformedSourceReference(_)
        )
    }
}

impl From<IiifError> for MapError {
    fn from(err: IiifError) -> Self {
        match err {
            IiifError::UnsupportedImage(id) => MapError::UnsupportedImage(id),
            other => MapError::UnexpectedFailure(other.to_string()),
        }
    }
}

impl From<AnnotationError> for MapError {
    fn from(err: AnnotationError) -> Self {
        MapError::UnexpectedFailure(err.to_string())
    }
}

impl From<std::io::Error> for MapError {
    fn from(err: std::io::Error) -> Self {
        MapError::UnexpectedFailure(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        MapError::UnexpectedFailure(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |status| TransferError::Status {
            url: "http://example.org".to_string(),
            status,
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!TransferError::Decode {
            url: String::new(),
            message: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_unsupported_image_conversion() {
        let err: MapError = IiifError::UnsupportedImage("https://example.org/img".to_string()).into();
        assert_eq!(err.kind(), "unsupported_image");
        assert!(err.is_skip());

        let err: MapError = IiifError::InvalidScaleFactor(3).into();
        assert_eq!(err.kind(), "unexpected_failure");
        assert!(!err.is_skip());
    }
}
