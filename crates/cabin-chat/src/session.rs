//! Booking session storage.
//!
//! A booking session is opened when the assistant asks for booking details
//! and closed once a booking is attempted, abandoned, or expires. Expiry is
//! evaluated lazily when the next message arrives.
//!
//! `SingleSlotStore` keeps one session for the whole service: concurrent
//! callers share it and the last writer wins. `KeyedSessionStore` keeps one
//! session per caller key.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::intent::SessionState;

/// Whether a booking conversation is in progress, and until when.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingSession {
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl BookingSession {
    pub fn idle() -> Self {
        Self::default()
    }

    /// A session opened at `now`. An expiry past the end of chrono's range
    /// saturates at [`DateTime::<Utc>::MAX_UTC`].
    pub fn started(now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            active: true,
            expires_at: Some(expires_at),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Active and past its expiry. A missing expiry counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_none_or(|expires_at| now > expires_at)
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if !self.active {
            SessionState::Idle
        } else if self.is_expired(now) {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }
}

/// Where booking sessions live. Operations never fail.
///
/// `key` identifies the caller; stores that do not isolate callers ignore it.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: Option<&str>) -> BookingSession;
    fn start(&self, key: Option<&str>, now: DateTime<Utc>, ttl: Duration);
    fn reset(&self, key: Option<&str>);

    fn is_expired(&self, key: Option<&str>, now: DateTime<Utc>) -> bool {
        self.get(key).is_expired(now)
    }
}

/// A poisoned lock only means another request panicked mid-update; the
/// session value itself is always valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One session shared by every caller.
#[derive(Debug, Default)]
pub struct SingleSlotStore {
    slot: Mutex<BookingSession>,
}

impl SingleSlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for SingleSlotStore {
    fn get(&self, _key: Option<&str>) -> BookingSession {
        *lock(&self.slot)
    }

    fn start(&self, _key: Option<&str>, now: DateTime<Utc>, ttl: Duration) {
        *lock(&self.slot) = BookingSession::started(now, ttl);
    }

    fn reset(&self, _key: Option<&str>) {
        *lock(&self.slot) = BookingSession::idle();
    }
}

/// One session per caller key. Requests without a key share a global slot.
#[derive(Debug, Default)]
pub struct KeyedSessionStore {
    sessions: Mutex<HashMap<String, BookingSession>>,
    global: SingleSlotStore,
}

impl KeyedSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keyed sessions currently held.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for KeyedSessionStore {
    fn get(&self, key: Option<&str>) -> BookingSession {
        match key {
            Some(key) => lock(&self.sessions).get(key).copied().unwrap_or_default(),
            None => self.global.get(None),
        }
    }

    fn start(&self, key: Option<&str>, now: DateTime<Utc>, ttl: Duration) {
        match key {
            Some(key) => {
                let mut sessions = lock(&self.sessions);
                // Expired sessions are dead weight; drop them while we hold the lock.
                sessions.retain(|_, session| !session.is_expired(now));
                sessions.insert(key.to_string(), BookingSession::started(now, ttl));
            }
            None => self.global.start(None, now, ttl),
        }
    }

    fn reset(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                lock(&self.sessions).remove(key);
            }
            None => self.global.reset(None),
        }
    }
}
