//! Conversation orchestrator: the entry point for every chat message.
//!
//! Reads the booking session, classifies the message, and dispatches to the
//! booking flow (field extraction plus calendar) or to the retrieval
//! pipeline. Every path terminates the response stream.

use std::sync::Arc;

use cabin_calendar::{resolve_zone, CalendarService, CreatedEvent, NewEvent};
use cabin_core::config::BookingConfig;
use cabin_core::ResponseSink;
use cabin_retrieval::{AnswerOutcome, RetrievalPipeline};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::extractor;
use crate::intent::{self, Intent, SessionState};
use crate::session::SessionStore;

/// Sent when a booking session starts.
pub const START_BOOKING_PROMPT: &str = "I can help you create a calendar event! Please reply in this format (comma separated):\n`your-email@example.com, Event title, Oct 22 2025 9am`\n\nOr provide the details in a single sentence.";

/// Sent when a booking reply lacks an email or a start time.
pub const MISSING_DETAILS_PROMPT: &str = "Please include a valid **email** and a **date/time**. Example: `myemail@gmail.com, Demo, October 22 2025 9am`";

/// Sent when the calendar rejects or cannot be reached.
pub const BOOKING_FAILED_MESSAGE: &str =
    "⚠️ I couldn't create the event. Please check calendar credentials and try again.";

/// How a message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The booking prompt was sent and a session opened.
    BookingStarted,
    /// The reply lacked an email or a start time; the session stays open.
    DetailsRequested,
    Booked { event_id: String },
    BookingFailed,
    /// A non-sequitur closed the booking session and was not answered.
    Dropped,
    Answered(AnswerOutcome),
}

/// Routes messages between the booking flow and the retrieval pipeline.
pub struct ConversationOrchestrator {
    sessions: Arc<dyn SessionStore>,
    calendar: Arc<dyn CalendarService>,
    pipeline: RetrievalPipeline,
    booking: BookingConfig,
    zone: Tz,
}

impl ConversationOrchestrator {
    /// Create an orchestrator. The booking zone is resolved once, from the
    /// configured zone, then the host zone, then UTC.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        calendar: Arc<dyn CalendarService>,
        pipeline: RetrievalPipeline,
        booking: &BookingConfig,
    ) -> Self {
        let zone = resolve_zone(None, booking.time_zone.as_deref());
        info!(zone = %zone, scope = ?booking.session_scope, "Conversation orchestrator ready");
        Self {
            sessions,
            calendar,
            pipeline,
            booking: booking.clone(),
            zone,
        }
    }

    /// Override the booking zone.
    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    /// Reject a missing or blank message before any state is touched.
    pub fn validate(message: Option<&str>) -> Result<&str, ChatError> {
        match message {
            Some(m) if !m.trim().is_empty() => Ok(m),
            _ => Err(ChatError::EmptyMessage),
        }
    }

    /// Handle one message, streaming the reply into `sink`.
    ///
    /// `session_key` identifies the caller for stores that keep one session
    /// per caller. Only an invalid message is an error; collaborator failures
    /// are reported to the caller as stream text.
    pub async fn handle(
        &self,
        message: &str,
        session_key: Option<&str>,
        sink: ResponseSink,
    ) -> Result<ChatOutcome, ChatError> {
        self.handle_at(message, session_key, Utc::now(), sink).await
    }

    /// As [`handle`](Self::handle), at a fixed instant.
    pub async fn handle_at(
        &self,
        message: &str,
        session_key: Option<&str>,
        now: DateTime<Utc>,
        sink: ResponseSink,
    ) -> Result<ChatOutcome, ChatError> {
        let message = Self::validate(Some(message))?;
        let reference = now.with_timezone(&self.zone).naive_local();

        let state = self.sessions.get(session_key).state(now);
        let intent = intent::classify(message, state, reference);
        debug!(?state, ?intent, session = ?session_key, "Classified message");

        let outcome = match intent {
            Intent::StartBooking => self.start_booking(session_key, now, sink).await,
            Intent::ContinueBooking => {
                self.continue_booking(message, session_key, reference, sink)
                    .await
            }
            Intent::AbandonBooking => {
                self.sessions.reset(session_key);
                if state == SessionState::Active && self.booking.drop_abandoned_message {
                    info!("Booking abandoned; dropping message");
                    sink.finish().await;
                    ChatOutcome::Dropped
                } else {
                    info!(expired = state == SessionState::Expired, "Booking abandoned");
                    match intent::classify(message, SessionState::Idle, reference) {
                        Intent::StartBooking => self.start_booking(session_key, now, sink).await,
                        _ => ChatOutcome::Answered(self.pipeline.answer(message, sink).await),
                    }
                }
            }
            Intent::NormalChat => ChatOutcome::Answered(self.pipeline.answer(message, sink).await),
        };
        Ok(outcome)
    }

    async fn start_booking(
        &self,
        session_key: Option<&str>,
        now: DateTime<Utc>,
        sink: ResponseSink,
    ) -> ChatOutcome {
        let ttl = Duration::from_std(std::time::Duration::from_secs(self.booking.session_ttl_secs))
            .unwrap_or_else(|_| Duration::days(1));
        self.sessions.start(session_key, now, ttl);
        info!(ttl_secs = self.booking.session_ttl_secs, "Booking session started");
        sink.reply(START_BOOKING_PROMPT).await;
        ChatOutcome::BookingStarted
    }

    async fn continue_booking(
        &self,
        message: &str,
        session_key: Option<&str>,
        reference: NaiveDateTime,
        sink: ResponseSink,
    ) -> ChatOutcome {
        let fields = extractor::extract(message, reference);
        let (Some(email), Some(start)) = (fields.email.as_deref(), fields.start) else {
            debug!(
                has_email = fields.email.is_some(),
                has_start = fields.start.is_some(),
                "Booking details incomplete"
            );
            sink.reply(MISSING_DETAILS_PROMPT).await;
            return ChatOutcome::DetailsRequested;
        };
        let title = fields.title_or_default();

        let result = self.book(title, email, start).await;
        // The session closes whatever the calendar said.
        self.sessions.reset(session_key);

        match result {
            Ok((created, start)) => {
                info!(event_id = %created.id, "Appointment booked");
                sink.reply(booked_message(title, &start, email, &created))
                    .await;
                ChatOutcome::Booked {
                    event_id: created.id,
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to create calendar event");
                sink.reply(BOOKING_FAILED_MESSAGE).await;
                ChatOutcome::BookingFailed
            }
        }
    }

    async fn book(
        &self,
        title: &str,
        email: &str,
        start: NaiveDateTime,
    ) -> Result<(CreatedEvent, DateTime<Tz>), ChatError> {
        let start = localize(self.zone, start)?;
        let end = Duration::try_minutes(self.booking.appointment_minutes)
            .and_then(|length| start.checked_add_signed(length))
            .ok_or_else(|| ChatError::EndOutOfRange(start.to_rfc3339()))?;
        let created = self
            .calendar
            .create_event(NewEvent {
                title: title.to_string(),
                start,
                end,
                attendee: Some(email.to_string()),
                time_zone: self.zone,
            })
            .await?;
        Ok((created, start))
    }
}

/// Pin a wall-clock time to `zone`. Ambiguous times take the earlier
/// instant; times inside a DST gap move forward an hour.
fn localize(zone: Tz, local: NaiveDateTime) -> Result<DateTime<Tz>, ChatError> {
    zone.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            let shifted = local.checked_add_signed(Duration::hours(1))?;
            zone.from_local_datetime(&shifted).earliest()
        })
        .ok_or_else(|| ChatError::NonexistentTime(local.to_string(), zone.to_string()))
}

fn booked_message(title: &str, start: &DateTime<Tz>, email: &str, created: &CreatedEvent) -> String {
    let pretty = start.format("%-m/%-d/%Y, %-I:%M:%S %p");
    let mut message = format!(
        "✅ Event \"{}\" booked for {}. An invite has been sent to {}.",
        title, pretty, email
    );
    if let Some(link) = &created.html_link {
        message.push_str(&format!(" [View in Google Calendar]({})", link));
    }
    message
}
