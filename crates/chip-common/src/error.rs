//! Error types for chipview services.

use thiserror::Error;

/// Result type alias using ChipError.
pub type ChipResult<T> = Result<T, ChipError>;

/// Primary error type for chip rendering and lookup operations.
///
/// The enum is `Clone` so the tile cache can hand one computation's failure
/// to every request waiting on the same render key.
#[derive(Debug, Clone, Error)]
pub enum ChipError {
    // === Request Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Data not downloaded: {0}")]
    MissingData(String),

    #[error("Invalid band selection: {0}")]
    InvalidSelection(String),

    // === Data Errors ===
    #[error("Failed to decode raster: {0}")]
    DecodeError(String),

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    RenderError(String),

    // === Lookup Errors ===
    #[error("Location index not loaded")]
    IndexUnavailable,

    // === Infrastructure Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChipError {
    /// Get the HTTP status code for this error.
    ///
    /// The request layer maps errors straight onto responses; `MissingData`
    /// keeps its own variant so the UI can say "not downloaded" rather than
    /// "does not exist" even though both map to 404.
    pub fn http_status_code(&self) -> u16 {
        match self {
            ChipError::InvalidSelection(_) => 400,

            ChipError::NotFound(_) | ChipError::MissingData(_) => 404,

            ChipError::IndexUnavailable => 503,

            _ => 500,
        }
    }

    /// True for errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        self.http_status_code() < 500
    }
}

// Conversion from common error types
impl From<std::io::Error> for ChipError {
    fn from(err: std::io::Error) -> Self {
        ChipError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ChipError {
    fn from(err: serde_json::Error) -> Self {
        ChipError::Internal(format!("JSON error: {}", err))
    }
}
