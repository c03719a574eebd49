//! Cabin application binary - composition root.
//!
//! 1. Load `.env`, the TOML configuration, and CLI overrides
//! 2. Build the collaborators (embedding script, vector store, Ollama, calendar)
//! 3. Either ingest a knowledge directory or serve the chat API

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use cabin_api::state::AppState;
use cabin_calendar::{CalendarError, CalendarService, GoogleCalendar, UnconfiguredCalendar};
use cabin_chat::{ConversationOrchestrator, KeyedSessionStore, SessionStore, SingleSlotStore};
use cabin_core::config::{CalendarConfig, SessionScope, VectorBackend};
use cabin_core::{CabinConfig, CabinError};
use cabin_retrieval::{
    EmbeddingService, InMemoryVectorStore, Ingestor, OllamaClient, RetrievalPipeline,
    SubprocessEmbedding, SupabaseStore, VectorStore,
};

use cli::{CliArgs, Command};

fn build_store(config: &CabinConfig) -> Result<Arc<dyn VectorStore>, CabinError> {
    match config.vector_store.backend {
        VectorBackend::Supabase => Ok(Arc::new(SupabaseStore::from_config(&config.vector_store)?)),
        VectorBackend::Memory => {
            tracing::info!("Using in-memory vector store");
            Ok(Arc::new(InMemoryVectorStore::new()))
        }
    }
}

fn build_calendar(config: &CalendarConfig) -> Result<Arc<dyn CalendarService>, CabinError> {
    match GoogleCalendar::from_config(config) {
        Ok(calendar) => {
            tracing::info!(calendar_id = %config.calendar_id, "Google Calendar configured");
            Ok(Arc::new(calendar))
        }
        Err(CalendarError::NotConfigured(missing)) => {
            tracing::warn!(missing, "Calendar credentials missing; bookings will fail");
            Ok(Arc::new(UnconfiguredCalendar::new(missing)))
        }
        Err(e) => Err(e.into()),
    }
}

fn build_sessions(scope: SessionScope) -> Arc<dyn SessionStore> {
    match scope {
        SessionScope::Global => Arc::new(SingleSlotStore::new()),
        SessionScope::PerCaller => Arc::new(KeyedSessionStore::new()),
    }
}

async fn ingest(
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
    dir: &Path,
) -> Result<(), CabinError> {
    let summary = Ingestor::new(embedder, store).ingest_dir(dir).await?;
    tracing::info!(
        dir = %dir.display(),
        files = summary.files,
        stored = summary.stored,
        skipped = summary.skipped,
        "Ingestion complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // A missing .env is normal in production.
    let dotenv_path = dotenvy::dotenv().ok();

    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match CabinConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (CabinConfig::default(), Some(e)),
    };
    config.apply_env();
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // Tracing. RUST_LOG wins over --log-level and the config file.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting Cabin v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = dotenv_path {
        tracing::info!(path = %path.display(), "Environment loaded");
    }
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Configuration unavailable, using defaults"
        ),
    }

    // Collaborators.
    let embedder: Arc<dyn EmbeddingService> =
        Arc::new(SubprocessEmbedding::from_config(&config.embedding));
    let store = build_store(&config)?;

    match args.command() {
        Command::Ingest { dir } => {
            ingest(embedder, store, &dir).await?;
        }
        Command::Serve { knowledge_dir } => {
            if let Some(dir) = knowledge_dir {
                ingest(Arc::clone(&embedder), Arc::clone(&store), &dir).await?;
            }

            let model = Arc::new(OllamaClient::from_config(&config.llm)?);
            tracing::info!(url = %config.llm.base_url, model = %model.model(), "Language model configured");

            let pipeline = RetrievalPipeline::new(embedder, store, model, &config.retrieval);
            let orchestrator = ConversationOrchestrator::new(
                build_sessions(config.booking.session_scope),
                build_calendar(&config.calendar)?,
                pipeline,
                &config.booking,
            );

            let state = AppState::new(config, orchestrator);
            let config = Arc::clone(&state.config);
            cabin_api::start_server(&config, state).await?;
        }
    }

    Ok(())
}
