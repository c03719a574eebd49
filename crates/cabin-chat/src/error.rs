//! Error types for the conversation layer.

use cabin_calendar::CalendarError;
use cabin_core::CabinError;

/// Errors from the conversation orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message is required")]
    EmptyMessage,
    /// The requested wall-clock time does not exist in the booking zone.
    #[error("start time {0} does not exist in {1}")]
    NonexistentTime(String, String),
    /// The appointment would end outside the supported date range.
    #[error("appointment starting {0} ends out of range")]
    EndOutOfRange(String),
    #[error("calendar error: {0}")]
    Calendar(#[from] CalendarError),
}

impl From<ChatError> for CabinError {
    fn from(err: ChatError) -> Self {
        CabinError::Chat(err.to_string())
    }
}
