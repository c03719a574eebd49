use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CabinError, Result};

/// Top-level configuration for the Cabin chat service.
///
/// Loaded from `cabin.toml` (or `--config` / `CABIN_CONFIG`), then overlaid with the
/// environment variables listed in [`CabinConfig::apply_env`]. Each section
/// corresponds to one collaborator or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CabinConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

impl CabinConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// is out of range.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CabinConfig = toml::from_str(&content)?;
        config.booking.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Empty values are ignored so that a blank `.env` entry does not wipe a
    /// value from the config file.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("SUPABASE_URL") {
            self.vector_store.url = Some(url);
        }
        // Ingestion needs write access; prefer the service-role key when present.
        if let Some(key) = get("SUPABASE_SERVICE_ROLE_KEY").or_else(|| get("SUPABASE_ANON_KEY")) {
            self.vector_store.api_key = Some(key);
        }
        if let Some(id) = get("GOOGLE_CLIENT_ID") {
            self.calendar.client_id = Some(id);
        }
        if let Some(secret) = get("GOOGLE_CLIENT_SECRET") {
            self.calendar.client_secret = Some(secret);
        }
        if let Some(token) = get("GOOGLE_REFRESH_TOKEN") {
            self.calendar.refresh_token = Some(token);
        }
        if let Some(tz) = get("GOOGLE_TIMEZONE") {
            self.booking.time_zone = Some(tz);
        }
        if let Some(python) = get("PYTHON_PATH") {
            self.embedding.command = python;
        }
        if let Some(url) = get("OLLAMA_URL") {
            self.llm.base_url = url;
        }
        if let Some(port) = get("CABIN_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            cors_origins: Vec::new(),
        }
    }
}

/// How booking sessions are scoped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    /// One booking conversation for the whole service.
    #[default]
    Global,
    /// One booking conversation per caller-supplied session key.
    PerCaller,
}

/// Booking flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// Lifetime of a booking session after the start prompt.
    pub session_ttl_secs: u64,
    /// Length of a booked appointment.
    pub appointment_minutes: i64,
    /// IANA zone used for appointments, e.g. "America/Denver".
    pub time_zone: Option<String>,
    pub session_scope: SessionScope,
    /// Drop a non-sequitur reply that abandons a booking instead of answering it.
    pub drop_abandoned_message: bool,
}

/// Longest accepted booking session lifetime (one week).
pub const MAX_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted appointment (one week).
pub const MAX_APPOINTMENT_MINUTES: i64 = 7 * 24 * 60;

impl BookingConfig {
    /// Reject durations that are zero, negative, or beyond a week.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SESSION_TTL_SECS).contains(&self.session_ttl_secs) {
            return Err(CabinError::Config(format!(
                "booking.session_ttl_secs must be between 1 and {}, got {}",
                MAX_SESSION_TTL_SECS, self.session_ttl_secs
            )));
        }
        if !(1..=MAX_APPOINTMENT_MINUTES).contains(&self.appointment_minutes) {
            return Err(CabinError::Config(format!(
                "booking.appointment_minutes must be between 1 and {}, got {}",
                MAX_APPOINTMENT_MINUTES, self.appointment_minutes
            )));
        }
        Ok(())
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 300,
            appointment_minutes: 60,
            time_zone: None,
            session_scope: SessionScope::Global,
            drop_abandoned_message: false,
        }
    }
}

/// Retrieval-augmented answering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a document to be used as context.
    pub match_threshold: f64,
    /// Maximum number of documents used as context.
    pub match_count: usize,
    /// Upper bound on the assembled context block.
    pub max_context_chars: usize,
    /// Name the assistant introduces itself with in the system preamble.
    pub assistant_name: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            match_count: 7,
            max_context_chars: 12_000,
            assistant_name: "CozyCabin".to_string(),
        }
    }
}

/// Embedding subprocess settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Interpreter to run.
    pub command: String,
    /// Script that reads text on stdin and prints a JSON vector.
    pub script: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            command: "python".to_string(),
            script: "scripts/embed_text.py".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Which vector store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    #[default]
    Supabase,
    Memory,
}

/// Vector store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    /// Supabase project URL.
    pub url: Option<String>,
    /// Supabase API key.
    pub api_key: Option<String>,
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Timeout for establishing the completion request.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Google Calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub calendar_id: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            calendar_id: "primary".to_string(),
        }
    }
}
