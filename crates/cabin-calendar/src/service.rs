//! Calendar service trait, event types, and a recording mock.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

use crate::error::CalendarError;

/// An appointment to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    /// Invitee; receives the calendar invitation.
    pub attendee: Option<String>,
    pub time_zone: Tz,
}

/// An appointment the calendar accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEvent {
    pub id: String,
    /// Link to the event in the calendar's web UI.
    pub html_link: Option<String>,
}

/// Creates appointments on a calendar.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn create_event(&self, event: NewEvent) -> Result<CreatedEvent, CalendarError>;
}

/// Calendar double that records every request.
#[derive(Debug, Clone, Default)]
pub struct MockCalendar {
    events: Arc<Mutex<Vec<NewEvent>>>,
    fail: bool,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// A calendar that rejects every request.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Requests received so far, including rejected ones.
    pub fn events(&self) -> Vec<NewEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CalendarService for MockCalendar {
    async fn create_event(&self, event: NewEvent) -> Result<CreatedEvent, CalendarError> {
        let n = {
            let mut events = self
                .events
                .lock()
                .map_err(|e| CalendarError::Auth(format!("Lock poisoned: {}", e)))?;
            events.push(event);
            events.len()
        };
        if self.fail {
            return Err(CalendarError::Api {
                status: 401,
                message: "invalid_grant".to_string(),
            });
        }
        Ok(CreatedEvent {
            id: format!("mock-event-{n}"),
            html_link: Some(format!("https://calendar.google.com/calendar/event?eid=mock-{n}")),
        })
    }
}

/// Stand-in used when calendar credentials are missing. Every request fails
/// with the name of the first missing setting.
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredCalendar {
    missing: &'static str,
}

impl UnconfiguredCalendar {
    pub fn new(missing: &'static str) -> Self {
        Self { missing }
    }
}

#[async_trait]
impl CalendarService for UnconfiguredCalendar {
    async fn create_event(&self, event: NewEvent) -> Result<CreatedEvent, CalendarError> {
        tracing::warn!(title = %event.title, missing = self.missing, "Calendar not configured");
        Err(CalendarError::NotConfigured(self.missing))
    }
}
