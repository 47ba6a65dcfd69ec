//! Calendar insertion: decode the analyzer payload and create events.
//!
//! Events are inserted one at a time, in list order, with one API call each.
//! There is no batching, no transaction and no rollback. Under the default
//! [`InsertionPolicy::AbortOnFirstFailure`], a failure on event *k* leaves
//! events `1..k-1` in the calendar and returns
//! [`InsertionFailure::CalendarApiError`] with `created = k - 1`.
//! [`InsertionPolicy::ContinueOnFailure`] tries every event and reports the
//! failures in the [`InsertionSummary`] instead.
//!
//! Insertions are not idempotent: running the same payload twice creates
//! every event twice.

use crate::auth::AuthorizationContext;
use crate::config::{InsertionPolicy, PipelineConfig};
use crate::error::InsertionFailure;
use crate::model::{CandidateEvent, EventPayload, FailedInsertion, InsertionSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ── Calendar API types ───────────────────────────────────────────────────

/// Request body for the calendar "insert event" operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventBody {
    pub summary: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date_time: String,
}

impl From<&CandidateEvent> for EventBody {
    fn from(e: &CandidateEvent) -> Self {
        Self {
            summary: e.summary.clone(),
            start: EventDateTime {
                date_time: e.start_time.clone(),
            },
            end: EventDateTime {
                date_time: e.end_time.clone(),
            },
        }
    }
}

/// The parts of the created event we care about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertedEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub html_link: Option<String>,
}

/// Why one insertion call failed.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
}

/// A calendar that can store events.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Create one event in `calendar_id`.
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &EventBody,
        auth: &AuthorizationContext,
    ) -> Result<InsertedEvent, CalendarError>;
}

// ── Google Calendar ──────────────────────────────────────────────────────

/// Google Calendar API v3 client.
pub struct GoogleCalendar {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleCalendar {
    /// Client for `base_url` (normally [`crate::config::DEFAULT_CALENDAR_BASE_URL`]).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CalendarError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, CalendarError> {
        Self::new(
            config.calendar_base_url.clone(),
            Duration::from_secs(config.calendar_timeout_secs),
        )
    }

    fn events_url(&self, calendar_id: &str) -> Result<reqwest::Url, CalendarError> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| CalendarError::ApiError {
            status: 0,
            message: format!("invalid calendar base URL '{}': {e}", self.base_url),
        })?;
        url.path_segments_mut()
            .map_err(|_| CalendarError::ApiError {
                status: 0,
                message: format!("calendar base URL '{}' cannot have a path", self.base_url),
            })?
            .push("calendars")
            .push(calendar_id)
            .push("events");
        Ok(url)
    }
}

#[async_trait]
impl CalendarService for GoogleCalendar {
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &EventBody,
        auth: &AuthorizationContext,
    ) -> Result<InsertedEvent, CalendarError> {
        let url = self.events_url(calendar_id)?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(auth.access_token())
            .json(event)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CalendarError::AuthExpired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json().await?)
    }
}

// ── Event sink ───────────────────────────────────────────────────────────

/// Decode a payload into candidate events.
///
/// Fails if the payload is not a JSON array, if any element lacks one of
/// the three fields, or if a field is blank.
pub fn decode_events(payload: &EventPayload) -> Result<Vec<CandidateEvent>, InsertionFailure> {
    let events: Vec<CandidateEvent> =
        serde_json::from_str(payload.as_str()).map_err(|e| InsertionFailure::JsonDecodeError {
            detail: e.to_string(),
        })?;

    for (idx, event) in events.iter().enumerate() {
        if let Some(field) = event.blank_field() {
            return Err(InsertionFailure::JsonDecodeError {
                detail: format!("event {} has an empty '{}'", idx + 1, field),
            });
        }
    }

    Ok(events)
}

/// Inserts analyzed events into one calendar.
#[derive(Clone)]
pub struct EventSink {
    calendar: Arc<dyn CalendarService>,
    calendar_id: String,
    policy: InsertionPolicy,
}

impl EventSink {
    pub fn new(calendar: Arc<dyn CalendarService>, config: &PipelineConfig) -> Self {
        Self {
            calendar,
            calendar_id: config.calendar_id.clone(),
            policy: config.insertion_policy,
        }
    }

    /// Decode `payload` and insert every event it contains.
    pub async fn insert_events(
        &self,
        payload: &EventPayload,
        auth: &AuthorizationContext,
    ) -> Result<InsertionSummary, InsertionFailure> {
        let events = decode_events(payload)?;
        self.insert_candidates(&events, auth).await
    }

    /// Insert already-decoded events.
    pub async fn insert_candidates(
        &self,
        events: &[CandidateEvent],
        auth: &AuthorizationContext,
    ) -> Result<InsertionSummary, InsertionFailure> {
        if events.is_empty() {
            info!("No events found; nothing to insert");
            return Ok(InsertionSummary {
                created: 0,
                attempted: 0,
                failures: Vec::new(),
            });
        }

        let mut created = 0usize;
        let mut failures = Vec::new();

        for (idx, event) in events.iter().enumerate() {
            let body = EventBody::from(event);
            match self
                .calendar
                .insert_event(&self.calendar_id, &body, auth)
                .await
            {
                Ok(inserted) => {
                    created += 1;
                    debug!(
                        "Event {}/{} '{}' created (id={})",
                        idx + 1,
                        events.len(),
                        event.summary,
                        inserted.id
                    );
                }
                Err(e) => {
                    warn!(
                        "Event {}/{} '{}' failed: {}",
                        idx + 1,
                        events.len(),
                        event.summary,
                        e
                    );
                    match self.policy {
                        InsertionPolicy::AbortOnFirstFailure => {
                            return Err(InsertionFailure::CalendarApiError {
                                created,
                                attempted: idx + 1,
                                detail: e.to_string(),
                            });
                        }
                        InsertionPolicy::ContinueOnFailure => failures.push(FailedInsertion {
                            index: idx + 1,
                            summary: event.summary.clone(),
                            detail: e.to_string(),
                        }),
                    }
                }
            }
        }

        info!("Created {}/{} calendar events", created, events.len());
        Ok(InsertionSummary {
            created,
            attempted: events.len(),
            failures,
        })
    }
}
