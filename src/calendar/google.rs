use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::model::*;

use super::{CalendarEvent, CalendarProvider, EventId, ProviderError, Subject};

/// Google Calendar v3 client: `freeBusy` for busy time, `events` for booking.
#[derive(Clone)]
pub struct GoogleCalendarProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

// ── Wire types ─────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    items: Vec<FreeBusyItem<'a>>,
}

#[derive(Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<WireBusy>,
    #[serde(default)]
    errors: Vec<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireBusy {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    reason: String,
}

#[derive(Serialize)]
struct EventBody<'a> {
    summary: &'a str,
    description: &'a str,
    start: EventTime,
    end: EventTime,
    attendees: Vec<Attendee<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: String,
}

#[derive(Serialize)]
struct Attendee<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
struct CreatedEvent {
    id: String,
}

fn rfc3339(t: Timestamp) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl<'a> EventBody<'a> {
    fn from_event(event: &'a CalendarEvent) -> Self {
        Self {
            summary: &event.summary,
            description: &event.description,
            start: EventTime {
                date_time: rfc3339(event.period.start),
            },
            end: EventTime {
                date_time: rfc3339(event.period.end),
            },
            attendees: event.attendees.iter().map(|email| Attendee { email }).collect(),
            location: event.location.as_deref(),
        }
    }
}

/// Map the provider's answer (keyed by calendar id) back to subject addresses.
fn busy_by_address(
    response: FreeBusyResponse,
    subjects: &[Subject],
) -> HashMap<String, Vec<BusyInterval>> {
    let mut calendars = response.calendars;
    let mut result = HashMap::with_capacity(subjects.len());
    for subject in subjects {
        let Some(calendar) = calendars.remove(&subject.external_id) else {
            continue;
        };
        if !calendar.errors.is_empty() {
            let reasons: Vec<&str> = calendar.errors.iter().map(|e| e.reason.as_str()).collect();
            warn!(subject = %subject.address, ?reasons, "calendar not readable");
            continue;
        }
        result.insert(
            subject.address.clone(),
            calendar
                .busy
                .into_iter()
                .map(|b| BusyInterval::new(b.start, b.end))
                .collect(),
        );
    }
    result
}

fn status_error(status: StatusCode, body: &str) -> ProviderError {
    let msg = format!("HTTP {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transient(msg)
    } else {
        ProviderError::Permanent(msg)
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_decode() || e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        ProviderError::Transient(e.to_string())
    } else {
        ProviderError::Permanent(e.to_string())
    }
}

impl GoogleCalendarProvider {
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let token = config
            .google_token
            .clone()
            .ok_or_else(|| ProviderError::Permanent("PANELIST_GOOGLE_TOKEN is not set".into()))?;
        Ok(Self::new(&config.google_base_url, token))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Permanent(format!("bad base url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| ProviderError::Permanent(format!("base url cannot take a path: {}", self.base_url)))?
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    async fn get_calendars(
        &self,
        subjects: &[Subject],
        window: &TimePeriod,
    ) -> Result<HashMap<String, Vec<BusyInterval>>, ProviderError> {
        let body = FreeBusyRequest {
            time_min: rfc3339(window.start),
            time_max: rfc3339(window.end),
            items: subjects
                .iter()
                .map(|s| FreeBusyItem { id: &s.external_id })
                .collect(),
        };
        let response = self
            .client
            .post(self.url(&["freeBusy"])?)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let parsed: FreeBusyResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        debug!(calendars = parsed.calendars.len(), "freeBusy answered");
        Ok(busy_by_address(parsed, subjects))
    }

    async fn create_event(&self, event: &CalendarEvent) -> Result<EventId, ProviderError> {
        let response = self
            .client
            .post(self.url(&["calendars", &event.calendar_id, "events"])?)
            .bearer_auth(&self.token)
            .json(&EventBody::from_event(event))
            .send()
            .await
            .map_err(transport_error)?;
        let created: CreatedEvent = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(created.id)
    }

    async fn update_event(&self, id: &str, event: &CalendarEvent) -> Result<(), ProviderError> {
        let response = self
            .client
            .patch(self.url(&["calendars", &event.calendar_id, "events", id])?)
            .bearer_auth(&self.token)
            .json(&EventBody::from_event(event))
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_event(&self, calendar_id: &str, id: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.url(&["calendars", calendar_id, "events", id])?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;
        // Already gone counts as deleted.
        if response.status() == StatusCode::GONE || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}
