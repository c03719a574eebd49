use thiserror::Error;

/// Top-level error type for the Cabin service.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for CabinError` so that `?` works across crate
/// boundaries (the binary and the API layer only deal with this type).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CabinError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Language model error: {0}")]
    LanguageModel(String),

    #[error("Calendar error: {0}")]
    Calendar(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for CabinError {
    fn from(err: toml::de::Error) -> Self {
        CabinError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CabinError {
    fn from(err: serde_json::Error) -> Self {
        CabinError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Cabin operations.
pub type Result<T> = std::result::Result<T, CabinError>;
