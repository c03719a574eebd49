//! Retrieval-augmented answering.
//!
//! Embeds the user's message, looks up similar knowledge-base documents,
//! and relays a streamed completion grounded in them. Every path ends the
//! response stream with exactly one sentinel.

use std::sync::Arc;

use cabin_core::config::RetrievalConfig;
use cabin_core::{ResponseSink, RetrievedDocument};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingService;
use crate::llm::LanguageModel;
use crate::prompt::PromptBuilder;
use crate::store::VectorStore;

/// Sent when no document clears the similarity threshold.
pub const NO_DOCUMENTS_MESSAGE: &str = "🤖 I'm sorry, I couldn't find enough information to answer that. You may want to rephrase or ask something else.";

/// Sent when the embedding or search collaborator is unavailable.
pub const UNAVAILABLE_MESSAGE: &str =
    "⚠️ I'm having trouble reaching my knowledge base right now. Please try again in a moment.";

/// Sent when the completion stream cannot be started or breaks mid-flight.
pub const STREAM_FAILED_MESSAGE: &str = "⚠️ Stream failed.";

/// How an answer attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The completion was relayed; carries the number of fragments sent.
    Streamed { fragments: usize },
    NoDocuments,
    EmbeddingUnavailable,
    SearchFailed,
    ModelFailed,
    /// The caller went away while fragments were being relayed.
    ClientDisconnected,
}

/// Embed, search, prompt and relay.
#[derive(Clone)]
pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
    model: Arc<dyn LanguageModel>,
    prompt: PromptBuilder,
    match_threshold: f64,
    match_count: usize,
}

impl RetrievalPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
        model: Arc<dyn LanguageModel>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            model,
            prompt: PromptBuilder::new(config.assistant_name.clone(), config.max_context_chars),
            match_threshold: config.match_threshold,
            match_count: config.match_count,
        }
    }

    /// Answer `message` on `sink`, consuming it.
    pub async fn answer(&self, message: &str, mut sink: ResponseSink) -> AnswerOutcome {
        let embedding = match self.embedder.embed(message).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "Embedding failed");
                sink.reply(UNAVAILABLE_MESSAGE).await;
                return AnswerOutcome::EmbeddingUnavailable;
            }
        };

        let documents = match self
            .store
            .match_documents(&embedding, self.match_threshold, self.match_count)
            .await
        {
            Ok(documents) => self.qualifying(documents),
            Err(e) => {
                warn!(error = %e, "Vector search failed");
                sink.reply(UNAVAILABLE_MESSAGE).await;
                return AnswerOutcome::SearchFailed;
            }
        };

        if documents.is_empty() {
            info!("No documents above threshold");
            sink.reply(NO_DOCUMENTS_MESSAGE).await;
            return AnswerOutcome::NoDocuments;
        }
        debug!(documents = documents.len(), "Context documents selected");

        let prompt = self.prompt.build_prompt(&documents, message);
        let mut stream = match self.model.stream_generate(&prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Completion request failed");
                sink.reply(STREAM_FAILED_MESSAGE).await;
                return AnswerOutcome::ModelFailed;
            }
        };

        let mut fragments = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    if sink.send_token(fragment).await.is_err() {
                        info!(fragments, "Client disconnected, abandoning completion");
                        return AnswerOutcome::ClientDisconnected;
                    }
                    fragments += 1;
                }
                Err(e) => {
                    warn!(error = %e, fragments, "Completion stream broke");
                    sink.reply(STREAM_FAILED_MESSAGE).await;
                    return AnswerOutcome::ModelFailed;
                }
            }
        }

        sink.finish().await;
        info!(fragments, "Answer streamed");
        AnswerOutcome::Streamed { fragments }
    }

    /// Enforce threshold, ordering and count regardless of what the store returned.
    fn qualifying(&self, mut documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        documents.retain(|d| d.similarity >= self.match_threshold);
        documents.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        documents.truncate(self.match_count);
        documents
    }
}
