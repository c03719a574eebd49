//! Error types for retrieval collaborators.

use cabin_core::CabinError;

/// Errors from embedding, vector search, language-model streaming and ingestion.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("embedding timed out after {0}s")]
    EmbeddingTimeout(u64),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("language model error: {0}")]
    LanguageModel(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RetrievalError> for CabinError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::EmbeddingUnavailable(_) | RetrievalError::EmbeddingTimeout(_) => {
                CabinError::Embedding(err.to_string())
            }
            RetrievalError::VectorStore(_) => CabinError::VectorStore(err.to_string()),
            RetrievalError::NotConfigured(_) => CabinError::Config(err.to_string()),
            RetrievalError::Io(io) => CabinError::Io(io),
            RetrievalError::Serialization(e) => CabinError::Serialization(e.to_string()),
            RetrievalError::LanguageModel(_) | RetrievalError::Http(_) => {
                CabinError::LanguageModel(err.to_string())
            }
        }
    }
}
