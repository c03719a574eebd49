//! Booking intent classification.
//!
//! Decides, from a message and the state of the booking session, whether
//! the message starts a booking, continues one, abandons one, or is an
//! ordinary question. Each rule is a named predicate so it can be tested
//! and tuned on its own.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::time_parser;

static BOOKING_IMPERATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:please\s*)?(?:book|schedule|set\s?up|create|add)\b").unwrap()
});

static CONFIRMATION_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:check|confirm|did|are\s*you\s*sure|already|verify)\b").unwrap()
});

static RESTART_CUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:another|again|new|more)\b").unwrap());

static BOOKING_NOUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:book|schedule|set up|appointment)").unwrap());

/// Email-shaped token.
pub static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").unwrap());

/// Booking session state as seen by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    /// Active, but past its expiry.
    Expired,
}

/// What to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Ask for booking details and open a session.
    StartBooking,
    /// Treat the message as booking details.
    ContinueBooking,
    /// Close the session; the message is not booking details.
    AbandonBooking,
    /// Answer from the knowledge base.
    NormalChat,
}

/// Starts with an imperative booking verb, optionally after "please".
pub fn starts_with_booking_imperative(message: &str) -> bool {
    BOOKING_IMPERATIVE.is_match(message)
}

/// Asks about an existing booking rather than requesting a new one.
pub fn contains_confirmation_word(message: &str) -> bool {
    CONFIRMATION_WORD.is_match(message)
}

/// Signals that the user wants to go again ("another", "new", ...).
pub fn contains_restart_cue(message: &str) -> bool {
    RESTART_CUE.is_match(message)
}

/// Mentions booking at all. Substring match, so "booking" counts.
pub fn mentions_booking_noun(message: &str) -> bool {
    BOOKING_NOUN.is_match(message)
}

pub fn contains_email(message: &str) -> bool {
    EMAIL.is_match(message)
}

pub fn contains_date(message: &str, reference: NaiveDateTime) -> bool {
    time_parser::parse(message, reference).is_some()
}

/// Whether an idle session should start a booking for this message.
pub fn is_booking_request(message: &str) -> bool {
    let imperative = starts_with_booking_imperative(message) && !contains_confirmation_word(message);
    let restart = contains_restart_cue(message) && mentions_booking_noun(message);
    imperative || restart
}

/// Whether an active session should treat this message as booking details.
pub fn looks_like_booking_details(message: &str, reference: NaiveDateTime) -> bool {
    contains_email(message) || contains_date(message, reference)
}

/// Classify a message. `reference` is the current wall-clock time in the
/// booking zone, used to decide whether the message contains a date.
pub fn classify(message: &str, state: SessionState, reference: NaiveDateTime) -> Intent {
    match state {
        SessionState::Active if looks_like_booking_details(message, reference) => {
            Intent::ContinueBooking
        }
        SessionState::Active | SessionState::Expired => Intent::AbandonBooking,
        SessionState::Idle if is_booking_request(message) => Intent::StartBooking,
        SessionState::Idle => Intent::NormalChat,
    }
}
