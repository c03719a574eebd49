//! Route handler functions.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use cabin_chat::ConversationOrchestrator;
use cabin_core::stream::DEFAULT_CAPACITY;
use cabin_core::ResponseSink;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request and response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub message: Option<String>,
    /// Caller key for per-caller booking sessions.
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/chat - stream the reply to one message as SSE.
///
/// Frames are `data: {"token": "..."}`, terminated by `data: [DONE]`. The
/// orchestrator runs in its own task, so work that must finish (a calendar
/// call and the session reset after it) completes even if the client leaves.
pub async fn chat(
    State(state): State<AppState>,
    Query(params): Query<ChatParams>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>, ApiError> {
    let message = ConversationOrchestrator::validate(params.message.as_deref())?.to_string();
    let session_id = params.session_id.filter(|id| !id.trim().is_empty());

    let (sink, rx) = ResponseSink::channel(DEFAULT_CAPACITY);
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        match orchestrator.handle(&message, session_id.as_deref(), sink).await {
            Ok(outcome) => debug!(?outcome, "Chat request finished"),
            Err(e) => warn!(error = %e, "Chat request rejected"),
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_sse_data())));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
