//! Conversational layer for Cabin.
//!
//! Classifies each incoming message, keeps the booking session, extracts
//! booking details from natural language, and routes everything else to the
//! retrieval pipeline.

pub mod error;
pub mod extractor;
pub mod intent;
pub mod orchestrator;
pub mod session;
pub mod time_parser;

pub use error::ChatError;
pub use extractor::{extract, ExtractedFields};
pub use intent::{classify, Intent, SessionState};
pub use orchestrator::{ChatOutcome, ConversationOrchestrator};
pub use session::{BookingSession, KeyedSessionStore, SessionStore, SingleSlotStore};
