//! Cabin retrieval crate - embeddings, vector search, streamed completions,
//! the retrieval-augmented answer pipeline, and knowledge ingestion.
//!
//! Every collaborator sits behind an async trait with a production adapter
//! and an in-process double used by tests and the `memory` backend.

pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod store;

pub use embedding::{EmbeddingService, MockEmbedding, SubprocessEmbedding};
pub use error::RetrievalError;
pub use ingest::{IngestResult, IngestSummary, Ingestor};
pub use llm::{LanguageModel, MockLanguageModel, NdjsonDecoder, OllamaClient, TokenStream};
pub use pipeline::{AnswerOutcome, RetrievalPipeline};
pub use prompt::PromptBuilder;
pub use store::{InMemoryVectorStore, SupabaseStore, VectorStore};
