//! Integration tests for the Cabin API.
//!
//! Each test builds its own router over mock collaborators and drives it
//! with `oneshot` requests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use cabin_api::create_router;
use cabin_api::error::ErrorBody;
use cabin_api::handlers::HealthResponse;
use cabin_api::state::AppState;
use cabin_calendar::MockCalendar;
use cabin_chat::orchestrator::{MISSING_DETAILS_PROMPT, START_BOOKING_PROMPT};
use cabin_chat::{ConversationOrchestrator, KeyedSessionStore, SessionStore, SingleSlotStore};
use cabin_core::{CabinConfig, DocumentMetadata, KnowledgeDocument};
use cabin_retrieval::pipeline::NO_DOCUMENTS_MESSAGE;
use cabin_retrieval::{
    InMemoryVectorStore, MockEmbedding, MockLanguageModel, RetrievalPipeline, VectorStore,
};

// =============================================================================
// Helpers
// =============================================================================

struct TestApp {
    state: AppState,
    calendar: MockCalendar,
    model: MockLanguageModel,
}

fn build(
    config: CabinConfig,
    sessions: Arc<dyn SessionStore>,
    store: Arc<InMemoryVectorStore>,
) -> TestApp {
    let calendar = MockCalendar::new();
    let model = MockLanguageModel::new(["Cabins ship ", "in six weeks."]);
    let pipeline = RetrievalPipeline::new(
        Arc::new(MockEmbedding::new()),
        store,
        Arc::new(model.clone()),
        &config.retrieval,
    );
    let orchestrator = ConversationOrchestrator::new(
        sessions,
        Arc::new(calendar.clone()),
        pipeline,
        &config.booking,
    )
    .with_zone(chrono_tz::Tz::UTC);
    TestApp {
        state: AppState::new(config, orchestrator),
        calendar,
        model,
    }
}

fn make_app() -> TestApp {
    build(
        CabinConfig::default(),
        Arc::new(SingleSlotStore::new()),
        Arc::new(InMemoryVectorStore::new()),
    )
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Percent-encode a query value (enough for the messages used here).
fn encode(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~' => c.to_string(),
            _ => {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect()
            }
        })
        .collect()
}

fn chat_uri(message: &str, session_id: Option<&str>) -> String {
    let mut uri = format!("/api/chat?message={}", encode(message));
    if let Some(id) = session_id {
        uri.push_str(&format!("&session_id={}", encode(id)));
    }
    uri
}

/// Send one chat message and return the SSE `data:` payloads.
async fn chat(app: &TestApp, message: &str, session_id: Option<&str>) -> Vec<String> {
    let resp = create_router(app.state.clone())
        .oneshot(get(&chat_uri(message, session_id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    text.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data:"))
        .map(|data| data.trim_start().to_string())
        .collect()
}

/// Token texts from SSE payloads, asserting the stream ends with `[DONE]`.
fn tokens(frames: &[String]) -> Vec<String> {
    assert_eq!(frames.last().map(String::as_str), Some("[DONE]"), "frames: {:?}", frames);
    assert_eq!(frames.iter().filter(|f| *f == "[DONE]").count(), 1);
    frames[..frames.len() - 1]
        .iter()
        .map(|f| {
            let v: Value = serde_json::from_str(f).unwrap();
            v["token"].as_str().unwrap().to_string()
        })
        .collect()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = make_app();
    let resp = create_router(app.state.clone())
        .oneshot(get("/health"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_missing_message_is_400() {
    let app = make_app();
    let resp = create_router(app.state.clone())
        .oneshot(get("/api/chat"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.error, "bad_request");
    assert_eq!(err.message, "Message is required");
    assert_eq!(app.model.call_count(), 0);
}

#[tokio::test]
async fn test_blank_message_is_400() {
    let app = make_app();
    let resp = create_router(app.state.clone())
        .oneshot(get("/api/chat?message=%20%20"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.model.call_count(), 0);
    assert_eq!(app.calendar.call_count(), 0);
}

// =============================================================================
// Retrieval
// =============================================================================

#[tokio::test]
async fn test_chat_without_documents() {
    let app = make_app();
    let frames = chat(&app, "How long does delivery take?", None).await;

    assert_eq!(tokens(&frames), vec![NO_DOCUMENTS_MESSAGE.to_string()]);
    assert_eq!(app.model.call_count(), 0);
}

#[tokio::test]
async fn test_chat_streams_model_fragments() {
    let question = "How long does delivery take?";
    let store = Arc::new(InMemoryVectorStore::new());
    store
        .upsert(KnowledgeDocument {
            content: "Delivery takes six weeks.".to_string(),
            embedding: MockEmbedding::hash_to_vector(question),
            metadata: DocumentMetadata {
                instruction: Some(question.to_string()),
                ..Default::default()
            },
            source: "faq.txt-0".to_string(),
        })
        .await
        .unwrap();
    let app = build(
        CabinConfig::default(),
        Arc::new(SingleSlotStore::new()),
        store,
    );

    let frames = chat(&app, question, None).await;

    assert_eq!(
        tokens(&frames),
        vec!["Cabins ship ".to_string(), "in six weeks.".to_string()]
    );
    assert_eq!(frames[0], r#"{"token":"Cabins ship "}"#);
    assert_eq!(app.model.call_count(), 1);
}

// =============================================================================
// Booking
// =============================================================================

#[tokio::test]
async fn test_booking_flow_over_http() {
    let app = make_app();

    let frames = chat(&app, "book a demo for me@x.com tomorrow at 3pm", None).await;
    assert_eq!(tokens(&frames), vec![START_BOOKING_PROMPT.to_string()]);
    assert_eq!(app.calendar.call_count(), 0);

    let frames = chat(&app, "me@x.com, Demo, tomorrow 3pm", None).await;
    let reply = tokens(&frames);
    assert_eq!(reply.len(), 1);
    assert!(reply[0].starts_with("✅ Event \"Demo\" booked for "));

    let events = app.calendar.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "Demo");
    assert_eq!(events[0].end - events[0].start, chrono::Duration::hours(1));

    // The session is closed, so the same reply is now an ordinary question.
    let frames = chat(&app, "me@x.com, Demo, tomorrow 3pm", None).await;
    assert_eq!(tokens(&frames), vec![NO_DOCUMENTS_MESSAGE.to_string()]);
    assert_eq!(app.calendar.call_count(), 1);
}

#[tokio::test]
async fn test_incomplete_booking_reply() {
    let app = make_app();
    chat(&app, "Schedule a tour", None).await;

    let frames = chat(&app, "me@x.com sounds good", None).await;
    assert_eq!(tokens(&frames), vec![MISSING_DETAILS_PROMPT.to_string()]);
    assert_eq!(app.calendar.call_count(), 0);
}

#[tokio::test]
async fn test_absurd_date_during_booking_gets_reply() {
    let app = make_app();
    chat(&app, "book a demo", None).await;

    let frames = chat(&app, "can we do it in 99999999999 weeks?", None).await;
    assert_eq!(tokens(&frames), vec![NO_DOCUMENTS_MESSAGE.to_string()]);

    chat(&app, "book a demo", None).await;
    let frames = chat(&app, "me@x.com, Demo, in 99999999999 days", None).await;
    assert_eq!(tokens(&frames), vec![MISSING_DETAILS_PROMPT.to_string()]);
    assert_eq!(app.calendar.call_count(), 0);
}

#[tokio::test]
async fn test_per_caller_sessions() {
    let app = build(
        CabinConfig::default(),
        Arc::new(KeyedSessionStore::new()),
        Arc::new(InMemoryVectorStore::new()),
    );

    chat(&app, "book a demo", Some("alice")).await;

    let frames = chat(&app, "me@x.com, Demo, tomorrow 3pm", Some("bob")).await;
    assert_eq!(tokens(&frames), vec![NO_DOCUMENTS_MESSAGE.to_string()]);
    assert_eq!(app.calendar.call_count(), 0);

    let frames = chat(&app, "me@x.com, Demo, tomorrow 3pm", Some("alice")).await;
    assert!(tokens(&frames)[0].starts_with("✅"));
    assert_eq!(app.calendar.call_count(), 1);
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let app = make_app();
    let resp = create_router(app.state.clone())
        .oneshot(
            Request::get("/health")
                .header("origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_cors_restricted_to_configured_origins() {
    let mut config = CabinConfig::default();
    config.server.cors_origins = vec!["https://cabins.example".to_string()];
    let app = build(
        config,
        Arc::new(SingleSlotStore::new()),
        Arc::new(InMemoryVectorStore::new()),
    );

    let resp = create_router(app.state.clone())
        .oneshot(
            Request::get("/health")
                .header("origin", "https://cabins.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "https://cabins.example"
    );

    let resp = create_router(app.state.clone())
        .oneshot(
            Request::get("/health")
                .header("origin", "https://elsewhere.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}
