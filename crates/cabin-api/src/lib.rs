//! Cabin API crate - axum HTTP server, the streaming chat endpoint, and
//! health checks.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
