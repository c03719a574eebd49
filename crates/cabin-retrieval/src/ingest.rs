//! Knowledge-base ingestion.
//!
//! Text files are split into chunks, embedded, and upserted into the vector
//! store. Three layouts are recognised, tried in order:
//!
//! 1. `### Instruction:` / `### Response:` blocks separated by `---`
//! 2. FAQ pairs introduced by `Q:` and `A:` lines
//! 3. anything else, ingested as a single chunk
//!
//! Every chunk gets a stable upsert key `<file>-<index>`, so re-running
//! ingestion replaces documents instead of duplicating them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use cabin_core::{DocumentMetadata, KnowledgeDocument};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingService;
use crate::error::RetrievalError;
use crate::store::VectorStore;

static INSTRUCTION_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)### Instruction:\s*(.*?)\n+### Response:\s*(.*?)(?:---|\z)")
        .expect("valid regex")
});

static FAQ_QUESTION_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\nQ:").expect("valid regex"));

static FAQ_ANSWER_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\nA:").expect("valid regex"));

/// A piece of a knowledge file ready to be embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeChunk {
    /// Text passed to the embedding service.
    pub embed_text: String,
    /// Text stored as the document body and shown to the model.
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Parse `### Instruction:` / `### Response:` pairs. Pairs missing either
/// half are dropped.
pub fn parse_instruction_blocks(text: &str) -> Vec<(String, String)> {
    INSTRUCTION_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let instruction = caps.get(1)?.as_str().trim();
            let response = caps.get(2)?.as_str().trim();
            (!instruction.is_empty() && !response.is_empty())
                .then(|| (instruction.to_string(), response.to_string()))
        })
        .collect()
}

/// Parse `Q:` / `A:` pairs. Text before the first question is ignored.
pub fn parse_faq_pairs(text: &str) -> Vec<(String, String)> {
    let normalized = format!("\n{}", text.replace("\r\n", "\n"));
    FAQ_QUESTION_SPLIT
        .split(&normalized)
        .skip(1)
        .filter_map(|section| {
            let mut parts = FAQ_ANSWER_SPLIT.splitn(section, 2);
            let question = parts.next()?.trim();
            let answer = parts.next().map(str::trim).unwrap_or("");
            (!question.is_empty()).then(|| (question.to_string(), answer.to_string()))
        })
        .collect()
}

/// Split a knowledge file into chunks using the first layout that matches.
pub fn chunk_file(file_name: &str, text: &str) -> Vec<KnowledgeChunk> {
    let blocks = parse_instruction_blocks(text);
    if !blocks.is_empty() {
        return blocks
            .into_iter()
            .map(|(instruction, response)| KnowledgeChunk {
                embed_text: format!("Instruction: {instruction}\nResponse: {response}"),
                content: response,
                metadata: DocumentMetadata {
                    instruction: Some(instruction),
                    source: Some(file_name.to_string()),
                    category: None,
                },
            })
            .collect();
    }

    let pairs = parse_faq_pairs(text);
    if !pairs.is_empty() {
        return pairs
            .into_iter()
            .map(|(question, answer)| {
                let chunk = format!("Q: {question}\nA: {answer}");
                KnowledgeChunk {
                    embed_text: chunk.clone(),
                    content: chunk,
                    metadata: DocumentMetadata {
                        instruction: Some(question),
                        source: Some(file_name.to_string()),
                        category: Some("faq".to_string()),
                    },
                }
            })
            .collect();
    }

    let whole = text.trim();
    if whole.is_empty() {
        return Vec::new();
    }
    vec![KnowledgeChunk {
        embed_text: whole.to_string(),
        content: whole.to_string(),
        metadata: DocumentMetadata {
            source: Some(file_name.to_string()),
            ..Default::default()
        },
    }]
}

/// Result of ingesting a single chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IngestResult {
    /// The chunk was embedded and upserted under this key.
    Stored { source: String },
    /// The chunk was skipped.
    Skipped { source: String, reason: String },
}

/// Totals for an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub files: usize,
    pub stored: usize,
    pub skipped: usize,
}

impl IngestSummary {
    fn record(&mut self, result: &IngestResult) {
        match result {
            IngestResult::Stored { .. } => self.stored += 1,
            IngestResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Embeds knowledge files and writes them to a vector store.
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn EmbeddingService>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Ingest every `.txt` file directly inside `dir`, in name order.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestSummary, RetrievalError> {
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "txt") && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        info!(dir = %dir.display(), files = paths.len(), "Ingesting knowledge files");

        let mut summary = IngestSummary::default();
        for path in &paths {
            let file_summary = self.ingest_file(path).await?;
            summary.files += 1;
            summary.stored += file_summary.stored;
            summary.skipped += file_summary.skipped;
        }

        info!(
            files = summary.files,
            stored = summary.stored,
            skipped = summary.skipped,
            "Ingestion complete"
        );
        Ok(summary)
    }

    /// Ingest a single knowledge file.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestSummary, RetrievalError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let text = tokio::fs::read_to_string(path).await?;
        let chunks = chunk_file(&file_name, &text);
        debug!(file = %file_name, chunks = chunks.len(), "Parsed knowledge file");

        let mut summary = IngestSummary {
            files: 1,
            ..Default::default()
        };
        for (index, chunk) in chunks.into_iter().enumerate() {
            let source = format!("{file_name}-{index}");
            let result = self.ingest_chunk(source, chunk).await;
            summary.record(&result);
        }
        Ok(summary)
    }

    async fn ingest_chunk(&self, source: String, chunk: KnowledgeChunk) -> IngestResult {
        let embedding = match self.embedder.embed(&chunk.embed_text).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(source = %source, error = %e, "Skipping chunk: embedding failed");
                return IngestResult::Skipped {
                    source,
                    reason: e.to_string(),
                };
            }
        };

        let document = KnowledgeDocument {
            content: chunk.content,
            embedding,
            metadata: chunk.metadata,
            source: source.clone(),
        };
        match self.store.upsert(document).await {
            Ok(()) => {
                debug!(source = %source, "Upserted chunk");
                IngestResult::Stored { source }
            }
            Err(e) => {
                warn!(source = %source, error = %e, "Skipping chunk: upsert failed");
                IngestResult::Skipped {
                    source,
                    reason: e.to_string(),
                }
            }
        }
    }
}
