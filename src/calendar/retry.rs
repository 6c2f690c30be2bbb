use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::model::*;

use super::{CalendarEvent, CalendarProvider, EventId, ProviderError, Subject};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries including the first.
    pub max_tries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed_tries`-th failure: base doubled each time, capped.
    pub fn delay_after(&self, failed_tries: u32) -> Duration {
        let exp = failed_tries.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Wraps a provider and retries transient failures with exponential backoff.
/// Permanent errors pass straight through.
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: CalendarProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    async fn retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
        T: Send,
    {
        let max_tries = self.policy.max_tries.max(1);
        let mut tries = 0;
        loop {
            tries += 1;
            match call().await {
                Ok(v) => return Ok(v),
                Err(ProviderError::Transient(msg)) if tries < max_tries => {
                    let delay = self.policy.delay_after(tries);
                    warn!(op, tries, ?delay, "transient provider error, retrying: {msg}");
                    metrics::counter!(crate::observability::PROVIDER_RETRIES_TOTAL, "op" => op).increment(1);
                    tokio::time::sleep(delay).await;
                }
                Err(ProviderError::Transient(msg)) => {
                    warn!(op, tries, "provider still failing, giving up: {msg}");
                    return Err(ProviderError::Unavailable {
                        attempts: tries,
                        last: msg,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<P: CalendarProvider> CalendarProvider for RetryingProvider<P> {
    async fn get_calendars(
        &self,
        subjects: &[Subject],
        window: &TimePeriod,
    ) -> Result<HashMap<String, Vec<BusyInterval>>, ProviderError> {
        self.retry("get_calendars", || self.inner.get_calendars(subjects, window))
            .await
    }

    async fn create_event(&self, event: &CalendarEvent) -> Result<EventId, ProviderError> {
        self.retry("create_event", || self.inner.create_event(event)).await
    }

    async fn update_event(&self, id: &str, event: &CalendarEvent) -> Result<(), ProviderError> {
        self.retry("update_event", || self.inner.update_event(id, event))
            .await
    }

    async fn delete_event(&self, calendar_id: &str, id: &str) -> Result<(), ProviderError> {
        self.retry("delete_event", || self.inner.delete_event(calendar_id, id))
            .await
    }
}
