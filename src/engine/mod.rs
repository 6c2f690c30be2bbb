mod availability;
mod capacity;
mod error;
pub mod intervals;
mod scoring;
mod search;
#[cfg(test)]
mod tests;

pub use availability::{AvailabilityIndex, CalendarSnapshot};
pub use capacity::{CapacityPolicy, PrunedPool, prune};
pub use error::SchedulerError;
pub use intervals::{collapse, free_times, interview_chunks, subtract_intervals, time_period_after};
pub use scoring::{RoomPool, ScoringContext, ScoringWeights, choose_room, score};
pub use search::{
    SearchControl, SearchInput, SearchLimits, SearchOutcome, draw_order, rank, search, search_parallel,
    try_order_with_anchor,
};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::calendar::{self, CalendarProvider, Subject};
use crate::config::{FreeTimePolicy, SchedulerConfig};
use crate::limits::*;
use crate::model::*;

fn default_max_schedules() -> usize {
    DEFAULT_MAX_SCHEDULES
}

/// What the caller asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    #[serde(default)]
    pub groups: Vec<InterviewerGroup>,
    pub window: TimePeriod,
    #[serde(default)]
    pub break_period: Option<TimePeriod>,
    /// `None` disables room matching entirely.
    #[serde(default)]
    pub rooms: Option<Vec<Room>>,
    pub interview_type: InterviewType,
    #[serde(default = "default_max_schedules")]
    pub max_schedules: usize,
}

impl ScheduleRequest {
    pub fn new(groups: Vec<InterviewerGroup>, window: TimePeriod, interview_type: InterviewType) -> Self {
        Self {
            groups,
            window,
            break_period: None,
            rooms: None,
            interview_type,
            max_schedules: DEFAULT_MAX_SCHEDULES,
        }
    }
}

/// Calendars fetched ahead of a search, keyed by owner address.
#[derive(Debug, Clone, Default)]
pub struct CalendarSet {
    pub interviewers: AvailabilityIndex,
    /// Provider preference calendars; preferred time is the busy side.
    pub preferences: AvailabilityIndex,
    pub rooms: AvailabilityIndex,
}

/// Entry point: validate → prune → search.
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Snapshot a calendar with the configured free-time policy.
    pub fn snapshot(&self, owner: impl Into<String>, window: TimePeriod, busy: &[BusyInterval]) -> CalendarSnapshot {
        CalendarSnapshot::from_busy(owner, window, busy, self.config.free_time_policy)
    }

    /// Reject requests the search can never satisfy.
    pub fn validate(&self, request: &ScheduleRequest) -> Result<(), SchedulerError> {
        let limits = &self.config.limits;
        if limits.slot_minutes <= 0 {
            return Err(SchedulerError::Configuration("slot_minutes must be positive".into()));
        }
        if limits.scan_resolution_minutes <= 0 {
            return Err(SchedulerError::Configuration("scan_resolution_minutes must be positive".into()));
        }
        if self.config.weights.padding_minutes < 0 {
            return Err(SchedulerError::Configuration("padding_minutes must not be negative".into()));
        }
        let window = &request.window;
        if window.start >= window.end {
            return Err(SchedulerError::Configuration("scheduling window is empty or inverted".into()));
        }
        if window.duration_minutes() > MAX_WINDOW_MINUTES {
            return Err(SchedulerError::Configuration(format!(
                "scheduling window longer than {MAX_WINDOW_MINUTES} minutes"
            )));
        }
        if request.max_schedules == 0 {
            return Err(SchedulerError::Configuration("max_schedules must be at least 1".into()));
        }
        if let Some(b) = &request.break_period
            && b.start >= b.end
        {
            return Err(SchedulerError::Configuration("break period is empty or inverted".into()));
        }
        if request.groups.iter().all(|g| g.num_required == 0) {
            return Err(SchedulerError::Configuration("no interviewers requested".into()));
        }
        for (index, group) in request.groups.iter().enumerate() {
            if group.num_required > group.interviewers.len() {
                return Err(SchedulerError::MalformedGroup {
                    index,
                    reason: format!(
                        "requires {} interviewers but lists {}",
                        group.num_required,
                        group.interviewers.len()
                    ),
                });
            }
            let mut seen = HashSet::new();
            if let Some(dup) = group.interviewers.iter().find(|i| !seen.insert(i.address.as_str())) {
                return Err(SchedulerError::MalformedGroup {
                    index,
                    reason: format!("lists {} more than once", dup.address),
                });
            }
        }
        Ok(())
    }

    pub fn prune(&self, request: &ScheduleRequest, records: &[LoadRecord]) -> Result<PrunedPool, SchedulerError> {
        let policy = CapacityPolicy {
            default_weekly_cap: self.config.default_weekly_cap,
            offset: self.config.offset(),
        };
        capacity::prune(&request.groups, &request.window, records, request.interview_type, &policy)
    }

    /// Assemble the read-only search input. Preference windows declared on
    /// interviewers fill in for anyone without a provider preference calendar.
    pub fn build_input(&self, request: &ScheduleRequest, pool: PrunedPool, calendars: CalendarSet) -> SearchInput {
        let mut preferences = AvailabilityIndex::from_preference_windows(
            pool.groups.iter().flat_map(|g| &g.interviewers),
            &request.window,
            &self.config.offset(),
        );
        preferences.extend(calendars.preferences);

        SearchInput {
            groups: pool.groups,
            window: request.window,
            break_period: request.break_period,
            interview_type: request.interview_type,
            max_schedules: request.max_schedules,
            calendars: calendars.interviewers,
            preferences,
            load: pool.load,
            rooms: request
                .rooms
                .clone()
                .map(|rooms| RoomPool::new(rooms, calendars.rooms)),
            weights: self.config.weights.clone(),
            limits: self.config.limits.clone(),
        }
    }

    fn control(&self, token: CancellationToken) -> SearchControl {
        SearchControl::new(token, self.config.deadline.map(|d| Instant::now() + d))
    }

    fn seed(&self) -> u64 {
        self.config.seed.unwrap_or_else(rand::random)
    }

    /// Search on the calling thread with the given random source.
    pub fn schedule_with_rng<R: Rng + ?Sized>(
        &self,
        request: &ScheduleRequest,
        records: &[LoadRecord],
        calendars: CalendarSet,
        token: CancellationToken,
        rng: &mut R,
    ) -> Result<SearchOutcome, SchedulerError> {
        let started = Instant::now();
        let result = self.validate(request).and_then(|()| {
            let pool = self.prune(request, records)?;
            let input = self.build_input(request, pool, calendars);
            Ok(search(&input, &self.control(token), rng))
        });
        observe(request, &result, started);
        result
    }

    /// Search on the calling thread, seeded from the config (or entropy).
    pub fn schedule(
        &self,
        request: &ScheduleRequest,
        records: &[LoadRecord],
        calendars: CalendarSet,
    ) -> Result<SearchOutcome, SchedulerError> {
        let mut rng = StdRng::seed_from_u64(self.seed());
        self.schedule_with_rng(request, records, calendars, CancellationToken::new(), &mut rng)
    }

    /// Fetch every calendar the request needs from `provider`, then search on
    /// the configured number of blocking workers.
    pub async fn fetch_and_schedule<P: CalendarProvider + ?Sized>(
        &self,
        provider: &P,
        request: &ScheduleRequest,
        records: &[LoadRecord],
        token: CancellationToken,
    ) -> Result<SearchOutcome, SchedulerError> {
        let started = Instant::now();
        let result = async {
            self.validate(request)?;
            let pool = self.prune(request, records)?;
            let calendars = self.fetch_calendars(provider, request, &pool).await?;
            let input = self.build_input(request, pool, calendars);
            let seed = self.seed();
            let outcome = search_parallel(Arc::new(input), self.control(token), self.config.workers, seed).await;
            Ok::<_, SchedulerError>(outcome)
        }
        .await;
        observe(request, &result, started);
        result
    }

    async fn fetch_calendars<P: CalendarProvider + ?Sized>(
        &self,
        provider: &P,
        request: &ScheduleRequest,
        pool: &PrunedPool,
    ) -> Result<CalendarSet, SchedulerError> {
        let policy = self.config.free_time_policy;
        let batches: Vec<Vec<Subject>> = pool
            .groups
            .iter()
            .map(|g| g.interviewers.iter().map(Subject::interviewer).collect())
            .collect();
        let mut seen = HashSet::new();
        let preference_subjects: Vec<Subject> = pool
            .groups
            .iter()
            .flat_map(|g| &g.interviewers)
            .filter(|i| seen.insert(i.address.as_str()))
            .filter_map(Subject::preferences)
            .collect();
        let room_subjects: Vec<Subject> = request.rooms.iter().flatten().map(Subject::room).collect();

        let (interviewers, preferences, rooms) = futures::try_join!(
            calendar::fetch_snapshot_batches(provider, &batches, &request.window, policy),
            calendar::fetch_snapshots(provider, &preference_subjects, &request.window, FreeTimePolicy::WholeWindow),
            calendar::fetch_snapshots(provider, &room_subjects, &request.window, policy),
        )?;
        debug!(
            interviewers = interviewers.len(),
            preferences = preferences.len(),
            rooms = rooms.len(),
            "calendars fetched"
        );
        Ok(CalendarSet {
            interviewers: interviewers.into_iter().collect(),
            preferences: preferences.into_iter().collect(),
            rooms: rooms.into_iter().collect(),
        })
    }
}

fn observe(request: &ScheduleRequest, result: &Result<SearchOutcome, SchedulerError>, started: Instant) {
    metrics::counter!(crate::observability::SEARCHES_TOTAL, "status" => crate::observability::status_label(result))
        .increment(1);
    match result {
        Ok(outcome) => {
            metrics::histogram!(crate::observability::SEARCH_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
            metrics::histogram!(crate::observability::SEARCH_ATTEMPTS).record(outcome.attempts as f64);
            metrics::histogram!(crate::observability::SCHEDULES_RETURNED).record(outcome.interviews.len() as f64);
            info!(
                groups = request.groups.len(),
                interview_type = request.interview_type.display_name(),
                attempts = outcome.attempts,
                accepted = outcome.accepted,
                returned = outcome.interviews.len(),
                cancelled = outcome.cancelled,
                "schedules computed"
            );
        }
        Err(e) => info!(groups = request.groups.len(), "scheduling failed: {e}"),
    }
}
