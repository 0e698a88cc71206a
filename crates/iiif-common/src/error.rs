//! Error types for descriptor parsing and pyramid planning.

use thiserror::Error;

/// Result type alias using IiifError.
pub type IiifResult<T> = Result<T, IiifError>;

/// Primary error type for the planning core.
#[derive(Debug, Error)]
pub enum IiifError {
    /// The image information document could not be interpreted.
    #[error("Invalid image descriptor: {0}")]
    InvalidDescriptor(String),

    /// The image declares no tile information, so there is no pyramid to copy.
    #[error("Image has no tile information: {0}")]
    UnsupportedImage(String),

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u64, height: u64 },

    #[error("Invalid scale factor {0}: must be a power of two")]
    InvalidScaleFactor(u64),

    #[error("Tile ({column}, {row}) is outside the level grid of {columns}x{rows}")]
    TileOutOfRange {
        column: u64,
        row: u64,
        columns: u64,
        rows: u64,
    },
}

impl IiifError {
    /// Whether the error means the image simply cannot be mirrored, as opposed
    /// to the document being broken.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, IiifError::UnsupportedImage(_))
    }
}

impl From<serde_json::Error> for IiifError {
    fn from(err: serde_json::Error) -> Self {
        IiifError::InvalidDescriptor(format!("JSON error: {}", err))
    }
}
