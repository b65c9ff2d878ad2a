use thiserror::Error;

/// Errors raised when a document cannot reasonably be processed.
///
/// Conditions a caller can recover from (unknown field name, empty field
/// name, an image payload that fails to decode during an update) surface as
/// `false`/`None` return values instead; see the per-method documentation.
#[derive(Error, Debug)]
pub enum FormError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Unsupported stream filter: {0}")]
    UnsupportedFilter(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Invalid page number: {0}")]
    InvalidPageNumber(u32),

    #[error("Appearance decode failure: {0}")]
    AppearanceDecodeFailure(String),
}

pub type Result<T> = std::result::Result<T, FormError>;
