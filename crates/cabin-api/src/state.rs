//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use cabin_chat::ConversationOrchestrator;
use cabin_core::CabinConfig;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CabinConfig>,
    /// Entry point for chat messages.
    pub orchestrator: Arc<ConversationOrchestrator>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: CabinConfig, orchestrator: ConversationOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        }
    }
}
