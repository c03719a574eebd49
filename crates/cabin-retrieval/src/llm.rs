//! Streaming language-model client.
//!
//! `OllamaClient` posts a prompt to `/api/generate` with `stream: true` and
//! turns the newline-delimited JSON reply into a stream of text fragments.
//! `MockLanguageModel` replays canned fragments and records prompts.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cabin_core::config::LlmConfig;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RetrievalError;

/// Ordered stream of response fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, RetrievalError>> + Send>>;

/// A language model that streams its completion.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start a completion for `prompt`. Errors here mean the request could
    /// not be established; errors inside the stream are mid-flight failures.
    async fn stream_generate(&self, prompt: &str) -> Result<TokenStream, RetrievalError>;
}

// ---------------------------------------------------------------------------
// NDJSON decoding
// ---------------------------------------------------------------------------

/// One line of an Ollama streaming reply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Incremental newline-delimited JSON decoder.
///
/// Network chunks may split a line (or a multi-byte character) anywhere, so
/// bytes are buffered until a newline arrives. Lines that fail to parse are
/// skipped with a warning.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every chunk completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<GenerateChunk> {
        self.buffer.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(chunk) = Self::parse_line(&line) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Decode whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<GenerateChunk> {
        let rest = std::mem::take(&mut self.buffer);
        Self::parse_line(&rest)
    }

    fn parse_line(line: &[u8]) -> Option<GenerateChunk> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match serde_json::from_str::<GenerateChunk>(text) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                let preview: String = text.chars().take(120).collect();
                warn!(error = %e, line = %preview, "Skipping malformed stream line");
                None
            }
        }
    }
}

/// Turn a raw NDJSON byte stream into a stream of response fragments.
///
/// Ends after the first chunk flagged `done`, or when the byte stream ends.
pub fn decode_generate_stream<S, B, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    struct State<S> {
        bytes: Pin<Box<S>>,
        decoder: NdjsonDecoder,
        pending: VecDeque<Result<String, RetrievalError>>,
        finished: bool,
    }

    fn enqueue<S>(state: &mut State<S>, chunk: GenerateChunk) {
        if state.finished {
            return;
        }
        if let Some(error) = chunk.error {
            state.pending.push_back(Err(RetrievalError::LanguageModel(error)));
            state.finished = true;
            return;
        }
        if !chunk.response.is_empty() {
            state.pending.push_back(Ok(chunk.response));
        }
        if chunk.done {
            state.finished = true;
        }
    }

    let state = State {
        bytes: Box::pin(bytes),
        decoder: NdjsonDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let stream = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    for chunk in state.decoder.push(bytes.as_ref()) {
                        enqueue(&mut state, chunk);
                    }
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(RetrievalError::LanguageModel(format!("stream error: {e}"))));
                    state.finished = true;
                }
                None => {
                    if let Some(chunk) = state.decoder.finish() {
                        enqueue(&mut state, chunk);
                    }
                    state.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}

// ---------------------------------------------------------------------------
// OllamaClient
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        // Only the connection is bounded: completions stream for as long as
        // the model keeps generating.
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, RetrievalError> {
        Self::new(
            config.base_url.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn stream_generate(&self, prompt: &str) -> Result<TokenStream, RetrievalError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };
        debug!(model = %self.model, prompt_chars = prompt.len(), "Starting completion");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RetrievalError::LanguageModel(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::LanguageModel(format!("{status}: {body}")));
        }

        Ok(decode_generate_stream(response.bytes_stream()))
    }
}

// ---------------------------------------------------------------------------
// MockLanguageModel
// ---------------------------------------------------------------------------

/// Canned language model for tests.
#[derive(Debug, Clone, Default)]
pub struct MockLanguageModel {
    fragments: Vec<String>,
    fail: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockLanguageModel {
    /// Stream the given fragments for every prompt.
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            fail: false,
            prompts: Arc::default(),
        }
    }

    /// A model whose requests never get established.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn stream_generate(&self, prompt: &str) -> Result<TokenStream, RetrievalError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail {
            return Err(RetrievalError::LanguageModel("connection refused".to_string()));
        }
        let items: Vec<Result<String, RetrievalError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}
