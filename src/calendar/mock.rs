use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ulid::Ulid;

use crate::model::*;

use super::{CalendarEvent, CalendarProvider, EventId, ProviderError, Subject};

/// Fraction of fill blocks marked busy.
pub const DEFAULT_SATURATION: f64 = 0.33;
pub const DEFAULT_FILL_RESOLUTION_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy)]
struct RandomFill {
    seed: u64,
    saturation: f64,
    resolution_minutes: i64,
}

/// In-memory provider for tests and offline runs.
///
/// Busy time comes from `register_busyness` plus, when enabled, a random
/// fill that is a pure function of (seed, calendar id, window).
#[derive(Debug, Default)]
pub struct MockCalendarProvider {
    busy: DashMap<String, Vec<TimePeriod>>,
    events: DashMap<EventId, CalendarEvent>,
    fill: Option<RandomFill>,
    pending_failures: AtomicU32,
    calendar_requests: AtomicU32,
}

impl MockCalendarProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark roughly a third of every calendar busy in 15-minute blocks.
    pub fn with_random_fill(seed: u64) -> Self {
        Self::with_fill(seed, DEFAULT_SATURATION, DEFAULT_FILL_RESOLUTION_MINUTES)
    }

    pub fn with_fill(seed: u64, saturation: f64, resolution_minutes: i64) -> Self {
        Self {
            fill: Some(RandomFill {
                seed,
                saturation: saturation.clamp(0.0, 1.0),
                resolution_minutes: resolution_minutes.max(1),
            }),
            ..Self::default()
        }
    }

    pub fn register_busyness(&self, external_id: impl Into<String>, period: TimePeriod) {
        self.busy.entry(external_id.into()).or_default().push(period);
    }

    /// Fail the next `n` calendar reads with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    pub fn calendar_requests(&self) -> u32 {
        self.calendar_requests.load(Ordering::SeqCst)
    }

    pub fn event(&self, id: &str) -> Option<CalendarEvent> {
        self.events.get(id).map(|e| e.value().clone())
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Drop one busy span equal to `period`; other events at the same time stay.
    fn release(&self, calendar_id: &str, period: &TimePeriod) {
        if let Some(mut busy) = self.busy.get_mut(calendar_id)
            && let Some(i) = busy.iter().position(|p| p == period)
        {
            busy.remove(i);
        }
    }

    fn random_busy(&self, fill: RandomFill, external_id: &str, window: &TimePeriod) -> Vec<TimePeriod> {
        let mut rng = StdRng::seed_from_u64(fill.seed ^ calendar_hash(external_id));
        let mut busy = Vec::new();
        let mut current = window.start;
        while current < window.end {
            let next = (current + Duration::minutes(fill.resolution_minutes)).min(window.end);
            if rng.gen_bool(fill.saturation) {
                busy.push(TimePeriod::new(current, next));
            }
            current = next;
        }
        busy
    }
}

/// FNV-1a, stable across runs and platforms.
fn calendar_hash(id: &str) -> u64 {
    id.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl CalendarProvider for MockCalendarProvider {
    async fn get_calendars(
        &self,
        subjects: &[Subject],
        window: &TimePeriod,
    ) -> Result<HashMap<String, Vec<BusyInterval>>, ProviderError> {
        self.calendar_requests.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ProviderError::Transient("injected mock failure".into()));
        }

        let mut result = HashMap::with_capacity(subjects.len());
        for subject in subjects {
            let mut periods: Vec<TimePeriod> = self
                .busy
                .get(&subject.external_id)
                .map(|b| b.value().iter().filter(|p| p.overlaps(window)).copied().collect())
                .unwrap_or_default();
            if let Some(fill) = self.fill {
                periods.extend(self.random_busy(fill, &subject.external_id, window));
            }
            periods.sort();
            result.insert(
                subject.address.clone(),
                periods.into_iter().map(BusyInterval::from).collect(),
            );
        }
        Ok(result)
    }

    async fn create_event(&self, event: &CalendarEvent) -> Result<EventId, ProviderError> {
        let id = Ulid::new().to_string();
        self.register_busyness(event.calendar_id.clone(), event.period);
        self.events.insert(id.clone(), event.clone());
        Ok(id)
    }

    async fn update_event(&self, id: &str, event: &CalendarEvent) -> Result<(), ProviderError> {
        let Some(mut existing) = self.events.get_mut(id) else {
            return Err(ProviderError::Permanent(format!("no such event: {id}")));
        };
        self.release(&existing.calendar_id, &existing.period);
        self.register_busyness(event.calendar_id.clone(), event.period);
        *existing = event.clone();
        Ok(())
    }

    async fn delete_event(&self, calendar_id: &str, id: &str) -> Result<(), ProviderError> {
        match self.events.remove(id) {
            Some((_, event)) if event.calendar_id == calendar_id => {
                self.release(calendar_id, &event.period);
                Ok(())
            }
            Some((key, event)) => {
                self.events.insert(key, event);
                Err(ProviderError::Permanent(format!("event {id} is not on calendar {calendar_id}")))
            }
            None => Err(ProviderError::Permanent(format!("no such event: {id}"))),
        }
    }
}
