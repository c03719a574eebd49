//! Embedding service trait and implementations.
//!
//! - `SubprocessEmbedding` runs an external script (a sentence-transformer
//!   wrapper by default) that reads text on stdin and prints a JSON vector.
//!   This is the production embedding backend.
//! - `MockEmbedding` provides deterministic hash-based vectors for testing.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use cabin_core::config::EmbeddingConfig;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::RetrievalError;

/// Service for generating text embeddings.
///
/// Used for both ingestion (indexing) and answering (query).
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

// ---------------------------------------------------------------------------
// SubprocessEmbedding - external script over stdin/stdout
// ---------------------------------------------------------------------------

/// What the embedding script prints on stdout.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptOutput {
    Vector(Vec<f32>),
    Failure { error: String },
}

/// Embedding service that shells out to `<command> <script>` per request.
#[derive(Debug, Clone)]
pub struct SubprocessEmbedding {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl SubprocessEmbedding {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            config.command.clone(),
            vec![config.script.clone()],
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn run(&self, text: &str) -> Result<Vec<u8>, RetrievalError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            // Closing stdin signals end of input to the script.
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, stderr = %stderr.trim(), "Embedding script exited with failure");
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl EmbeddingService for SubprocessEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RetrievalError::EmbeddingUnavailable(
                "cannot embed empty text".to_string(),
            ));
        }

        let stdout = tokio::time::timeout(self.timeout, self.run(text))
            .await
            .map_err(|_| RetrievalError::EmbeddingTimeout(self.timeout.as_secs()))??;

        parse_script_output(&stdout)
    }
}

/// Interpret the script's stdout as a vector or a reported failure.
fn parse_script_output(stdout: &[u8]) -> Result<Vec<f32>, RetrievalError> {
    let stdout = String::from_utf8_lossy(stdout);
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(RetrievalError::EmbeddingUnavailable(
            "embedding script produced no output".to_string(),
        ));
    }

    match serde_json::from_str::<ScriptOutput>(trimmed) {
        Ok(ScriptOutput::Vector(vector)) if !vector.is_empty() => {
            debug!(dimensions = vector.len(), "Embedding generated");
            Ok(vector)
        }
        Ok(ScriptOutput::Vector(_)) => Err(RetrievalError::EmbeddingUnavailable(
            "embedding script returned an empty vector".to_string(),
        )),
        Ok(ScriptOutput::Failure { error }) => Err(RetrievalError::EmbeddingUnavailable(error)),
        Err(_) => {
            let preview: String = trimmed.chars().take(200).collect();
            Err(RetrievalError::EmbeddingUnavailable(format!(
                "unparseable script output: {preview}"
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors for testing
// ---------------------------------------------------------------------------

/// Mock embedding service that returns deterministic 384-dimensional vectors.
///
/// Identical inputs always produce identical (unit-length) outputs, so a
/// document embedded at ingestion matches itself exactly at query time.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding {
    unavailable: bool,
}

impl MockEmbedding {
    pub const DIMENSIONS: usize = 384;

    pub fn new() -> Self {
        Self { unavailable: false }
    }

    /// A mock that fails every request, as if the script were missing.
    pub fn unavailable() -> Self {
        Self { unavailable: true }
    }

    pub fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(Self::DIMENSIONS);
        for i in 0..Self::DIMENSIONS {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }
}

#[async_trait]
impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        if self.unavailable {
            return Err(RetrievalError::EmbeddingUnavailable(
                "mock embedding disabled".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(RetrievalError::EmbeddingUnavailable(
                "cannot embed empty text".to_string(),
            ));
        }
        Ok(Self::hash_to_vector(text.trim()))
    }
}
