//! Google Calendar adapter.
//!
//! Exchanges a long-lived OAuth refresh token for short-lived access tokens
//! and inserts events with `sendUpdates=all`, so attendees receive an
//! invitation email.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use cabin_core::config::CalendarConfig;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::CalendarError;
use crate::service::{CalendarService, CreatedEvent, NewEvent};

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "timeZone")]
    time_zone: String,
}

#[derive(Debug, Serialize)]
struct Attendee {
    email: String,
}

#[derive(Debug, Serialize)]
struct Reminders {
    #[serde(rename = "useDefault")]
    use_default: bool,
}

#[derive(Debug, Serialize)]
struct EventBody {
    summary: String,
    start: EventTime,
    end: EventTime,
    attendees: Vec<Attendee>,
    reminders: Reminders,
}

impl From<&NewEvent> for EventBody {
    fn from(event: &NewEvent) -> Self {
        let zone = event.time_zone.name().to_string();
        EventBody {
            summary: event.title.clone(),
            start: EventTime {
                date_time: event.start.to_rfc3339(),
                time_zone: zone.clone(),
            },
            end: EventTime {
                date_time: event.end.to_rfc3339(),
                time_zone: zone,
            },
            attendees: event
                .attendee
                .iter()
                .map(|email| Attendee {
                    email: email.clone(),
                })
                .collect(),
            reminders: Reminders { use_default: true },
        }
    }
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: String,
    #[serde(rename = "htmlLink", default)]
    html_link: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Google Calendar client authenticated with a refresh token.
pub struct GoogleCalendar {
    client: Client,
    client_id: String,
    client_secret: Secret<String>,
    refresh_token: Secret<String>,
    calendar_id: String,
    token_url: String,
    api_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for GoogleCalendar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCalendar")
            .field("client_id", &self.client_id)
            .field("calendar_id", &self.calendar_id)
            .finish_non_exhaustive()
    }
}

impl GoogleCalendar {
    pub fn from_config(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let client_id = config
            .client_id
            .clone()
            .ok_or(CalendarError::NotConfigured("GOOGLE_CLIENT_ID"))?;
        let client_secret = config
            .client_secret
            .clone()
            .ok_or(CalendarError::NotConfigured("GOOGLE_CLIENT_SECRET"))?;
        let refresh_token = config
            .refresh_token
            .clone()
            .ok_or(CalendarError::NotConfigured("GOOGLE_REFRESH_TOKEN"))?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            client_id,
            client_secret: Secret::new(client_secret),
            refresh_token: Secret::new(refresh_token),
            calendar_id: config.calendar_id.clone(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Point the client at different OAuth and API hosts.
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| CalendarError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| CalendarError::InvalidUrl(self.api_base.clone()))?
            .pop_if_empty()
            .extend(["calendars", self.calendar_id.as_str(), "events"]);
        url.query_pairs_mut().append_pair("sendUpdates", "all");
        Ok(url)
    }

    async fn access_token(&self) -> Result<String, CalendarError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Refreshing calendar access token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("refresh_token", self.refresh_token.expose_secret().as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::Auth(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CalendarError::Auth(format!("invalid token response: {e}")))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600)).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl CalendarService for GoogleCalendar {
    async fn create_event(&self, event: NewEvent) -> Result<CreatedEvent, CalendarError> {
        let token = self.access_token().await?;
        let body = EventBody::from(&event);

        let response = self
            .client
            .post(self.events_url()?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CalendarError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let inserted: InsertedEvent = response.json().await?;
        info!(event_id = %inserted.id, start = %event.start, "Calendar event created");
        Ok(CreatedEvent {
            id: inserted.id,
            html_link: inserted.html_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn config() -> CalendarConfig {
        CalendarConfig {
            client_id: Some("cid".to_string()),
            client_secret: Some("csecret".to_string()),
            refresh_token: Some("rtoken".to_string()),
            calendar_id: "primary".to_string(),
        }
    }

    fn event() -> NewEvent {
        let tz = Tz::America__Denver;
        let start = tz.with_ymd_and_hms(2025, 10, 22, 9, 0, 0).unwrap();
        NewEvent {
            title: "Demo".to_string(),
            start,
            end: start + chrono::Duration::hours(1),
            attendee: Some("me@example.com".to_string()),
            time_zone: tz,
        }
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let mut partial = config();
        partial.refresh_token = None;
        let err = GoogleCalendar::from_config(&partial).unwrap_err();
        assert!(matches!(err, CalendarError::NotConfigured("GOOGLE_REFRESH_TOKEN")));
    }

    #[test]
    fn test_event_body_wire_format() {
        let body = serde_json::to_value(EventBody::from(&event())).unwrap();
        assert_eq!(body["summary"], "Demo");
        assert_eq!(body["start"]["dateTime"], "2025-10-22T09:00:00-06:00");
        assert_eq!(body["start"]["timeZone"], "America/Denver");
        assert_eq!(body["end"]["dateTime"], "2025-10-22T10:00:00-06:00");
        assert_eq!(body["attendees"][0]["email"], "me@example.com");
        assert_eq!(body["reminders"]["useDefault"], true);
    }

    #[test]
    fn test_events_url_encodes_calendar_id() {
        let mut cfg = config();
        cfg.calendar_id = "team#cabins@group.calendar.google.com".to_string();
        let calendar = GoogleCalendar::from_config(&cfg).unwrap();
        let url = calendar.events_url().unwrap();
        assert!(url.as_str().starts_with(
            "https://www.googleapis.com/calendar/v3/calendars/team%23cabins@group.calendar.google.com/events"
        ));
        assert!(url.as_str().ends_with("?sendUpdates=all"));
        assert!(!format!("{:?}", calendar).contains("csecret"));
    }

    #[derive(Clone, Default)]
    struct FakeGoogle {
        token_requests: Arc<AtomicUsize>,
    }

    async fn token(
        State(state): State<FakeGoogle>,
        Form(form): Form<std::collections::HashMap<String, String>>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        state.token_requests.fetch_add(1, Ordering::SeqCst);
        if form.get("refresh_token").map(String::as_str) != Some("rtoken") {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid_grant"})),
            );
        }
        (
            StatusCode::OK,
            Json(serde_json::json!({"access_token": "atoken", "expires_in": 3600})),
        )
    }

    async fn insert(
        Path(calendar_id): Path<String>,
        Query(query): Query<std::collections::HashMap<String, String>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer atoken");
        if !authorized || query.get("sendUpdates").map(String::as_str) != Some("all") {
            return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({})));
        }
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": format!("evt-{}", body["summary"].as_str().unwrap_or("")),
                "htmlLink": format!("https://calendar.example/{calendar_id}"),
            })),
        )
    }

    async fn spawn_fake(state: FakeGoogle) -> String {
        let app = Router::new()
            .route("/token", post(token))
            .route("/calendar/v3/calendars/{calendar_id}/events", post(insert))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_create_event_refreshes_token_once() {
        let state = FakeGoogle::default();
        let base = spawn_fake(state.clone()).await;
        let calendar = GoogleCalendar::from_config(&config())
            .unwrap()
            .with_endpoints(format!("{base}/token"), format!("{base}/calendar/v3"));

        let created = calendar.create_event(event()).await.unwrap();
        assert_eq!(created.id, "evt-Demo");
        assert_eq!(created.html_link.as_deref(), Some("https://calendar.example/primary"));

        calendar.create_event(event()).await.unwrap();
        assert_eq!(state.token_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_refresh_token_is_auth_error() {
        let base = spawn_fake(FakeGoogle::default()).await;
        let mut cfg = config();
        cfg.refresh_token = Some("revoked".to_string());
        let calendar = GoogleCalendar::from_config(&cfg)
            .unwrap()
            .with_endpoints(format!("{base}/token"), format!("{base}/calendar/v3"));

        let err = calendar.create_event(event()).await.unwrap_err();
        assert!(matches!(err, CalendarError::Auth(_)));
    }
}
