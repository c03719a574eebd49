//! Cabin calendar crate - appointment creation behind the `CalendarService`
//! trait, a Google Calendar adapter, and time-zone resolution.

pub mod error;
pub mod google;
pub mod service;
pub mod timezone;

pub use error::CalendarError;
pub use google::GoogleCalendar;
pub use service::{CalendarService, CreatedEvent, MockCalendar, NewEvent, UnconfiguredCalendar};
pub use timezone::resolve_zone;
