//! Calendar provider seam: the trait the engine fetches busy time through,
//! plus the mock, Google, and retrying implementations.

#[cfg(feature = "google")]
pub mod google;
pub mod mock;
pub mod retry;

pub use mock::MockCalendarProvider;
pub use retry::{RetryPolicy, RetryingProvider};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::FreeTimePolicy;
use crate::engine::CalendarSnapshot;
use crate::model::*;

/// Whose calendar to read: `address` keys the result, `external_id` is the
/// provider's calendar id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub address: String,
    pub external_id: String,
}

impl Subject {
    pub fn new(address: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            external_id: external_id.into(),
        }
    }

    pub fn interviewer(interviewer: &Interviewer) -> Self {
        Self::new(interviewer.address.clone(), interviewer.calendar_id())
    }

    pub fn room(room: &Room) -> Self {
        Self::new(room.address.clone(), room.calendar_id())
    }

    /// The interviewer's preference calendar, keyed by their own address.
    pub fn preferences(interviewer: &Interviewer) -> Option<Self> {
        interviewer
            .preferences_calendar
            .as_ref()
            .map(|cal| Self::new(interviewer.address.clone(), cal.clone()))
    }
}

pub type EventId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Calendar the event lives on.
    pub calendar_id: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub period: TimePeriod,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Worth retrying: timeouts, 429/5xx, malformed bodies.
    Transient(String),
    Permanent(String),
    /// Retries exhausted.
    Unavailable { attempts: u32, last: String },
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Transient(msg) => write!(f, "transient provider error: {msg}"),
            ProviderError::Permanent(msg) => write!(f, "provider error: {msg}"),
            ProviderError::Unavailable { attempts, last } => {
                write!(f, "provider unavailable after {attempts} attempts: {last}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Busy intervals per subject address. Subjects the provider knows nothing
    /// about may be missing from the map.
    async fn get_calendars(
        &self,
        subjects: &[Subject],
        window: &TimePeriod,
    ) -> Result<HashMap<String, Vec<BusyInterval>>, ProviderError>;

    async fn create_event(&self, event: &CalendarEvent) -> Result<EventId, ProviderError>;

    async fn update_event(&self, id: &str, event: &CalendarEvent) -> Result<(), ProviderError>;

    async fn delete_event(&self, calendar_id: &str, id: &str) -> Result<(), ProviderError>;
}

#[async_trait]
impl<P: CalendarProvider + ?Sized> CalendarProvider for Arc<P> {
    async fn get_calendars(
        &self,
        subjects: &[Subject],
        window: &TimePeriod,
    ) -> Result<HashMap<String, Vec<BusyInterval>>, ProviderError> {
        (**self).get_calendars(subjects, window).await
    }

    async fn create_event(&self, event: &CalendarEvent) -> Result<EventId, ProviderError> {
        (**self).create_event(event).await
    }

    async fn update_event(&self, id: &str, event: &CalendarEvent) -> Result<(), ProviderError> {
        (**self).update_event(id, event).await
    }

    async fn delete_event(&self, calendar_id: &str, id: &str) -> Result<(), ProviderError> {
        (**self).delete_event(calendar_id, id).await
    }
}

/// Fetch and snapshot every subject. Subjects missing from the provider's
/// answer get no snapshot, so the engine treats them as never free.
pub async fn fetch_snapshots<P: CalendarProvider + ?Sized>(
    provider: &P,
    subjects: &[Subject],
    window: &TimePeriod,
    policy: FreeTimePolicy,
) -> Result<Vec<CalendarSnapshot>, ProviderError> {
    if subjects.is_empty() {
        return Ok(Vec::new());
    }
    metrics::counter!(crate::observability::PROVIDER_REQUESTS_TOTAL, "op" => "get_calendars").increment(1);
    let mut busy = provider.get_calendars(subjects, window).await?;

    let mut snapshots = Vec::with_capacity(subjects.len());
    for subject in subjects {
        match busy.remove(&subject.address) {
            Some(intervals) => snapshots.push(CalendarSnapshot::from_busy(
                subject.address.clone(),
                *window,
                &intervals,
                policy,
            )),
            None => warn!(subject = %subject.address, "no calendar returned"),
        }
    }
    Ok(snapshots)
}

/// One `get_calendars` call per batch, run concurrently.
pub async fn fetch_snapshot_batches<P: CalendarProvider + ?Sized>(
    provider: &P,
    batches: &[Vec<Subject>],
    window: &TimePeriod,
    policy: FreeTimePolicy,
) -> Result<Vec<CalendarSnapshot>, ProviderError> {
    let fetches = batches
        .iter()
        .map(|batch| fetch_snapshots(provider, batch, window, policy));
    let results = futures::future::try_join_all(fetches).await?;
    Ok(results.into_iter().flatten().collect())
}
