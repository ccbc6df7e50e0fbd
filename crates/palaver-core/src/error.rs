use thiserror::Error;

/// Top-level error type for the Palaver workspace.
///
/// Subsystem crates define their own error types and implement
/// `From<PalaverError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PalaverError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A value is outside the bound its setter enforces.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },
}

impl From<toml::de::Error> for PalaverError {
    fn from(err: toml::de::Error) -> Self {
        PalaverError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PalaverError {
    fn from(err: toml::ser::Error) -> Self {
        PalaverError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PalaverError {
    fn from(err: serde_json::Error) -> Self {
        PalaverError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Palaver operations.
pub type Result<T> = std::result::Result<T, PalaverError>;
