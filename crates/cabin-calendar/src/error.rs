//! Error types for the calendar collaborator.

use cabin_core::CabinError;

/// Errors from creating calendar events.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("calendar credential {0} is not configured")]
    NotConfigured(&'static str),
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("calendar API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid calendar URL: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<CalendarError> for CabinError {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::NotConfigured(_) => CabinError::Config(err.to_string()),
            _ => CabinError::Calendar(err.to_string()),
        }
    }
}
