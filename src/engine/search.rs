use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::limits::*;
use crate::model::*;

use super::availability::AvailabilityIndex;
use super::intervals::{interview_chunks, time_period_after};
use super::scoring::{self, RoomPool, ScoringContext, ScoringWeights};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchLimits {
    /// Anchored trials before giving up.
    pub max_attempts: u64,
    /// Upper bound on returned schedules, applied together with `max_schedules`.
    pub top_k: usize,
    pub slot_minutes: i64,
    pub scan_resolution_minutes: i64,
    /// Positions the break is tried at, counted from the front.
    pub break_positions: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SEARCH_ATTEMPTS,
            top_k: TOP_K_SCHEDULES,
            slot_minutes: MINUTES_OF_INTERVIEW,
            scan_resolution_minutes: SCAN_RESOLUTION_MINUTES,
            break_positions: BREAK_POSITIONS,
        }
    }
}

/// Everything one search reads. Built once per request, shared read-only by
/// every worker.
#[derive(Debug, Clone)]
pub struct SearchInput {
    pub groups: Vec<InterviewerGroup>,
    pub window: TimePeriod,
    pub break_period: Option<TimePeriod>,
    pub interview_type: InterviewType,
    pub max_schedules: usize,
    pub calendars: AvailabilityIndex,
    pub preferences: AvailabilityIndex,
    pub load: HashMap<String, u32>,
    pub rooms: Option<RoomPool>,
    pub weights: ScoringWeights,
    pub limits: SearchLimits,
}

impl SearchInput {
    fn scoring(&self) -> ScoringContext<'_> {
        ScoringContext {
            calendars: &self.calendars,
            preferences: &self.preferences,
            load: &self.load,
            rooms: self.rooms.as_ref(),
            interview_type: self.interview_type,
            weights: &self.weights,
        }
    }

    fn result_limit(&self) -> usize {
        self.limits.top_k.min(self.max_schedules)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Ranked, truncated.
    pub interviews: Vec<Interview>,
    pub attempts: u64,
    /// Distinct candidates accepted before truncation.
    pub accepted: usize,
    /// True when the token fired or the deadline passed; `interviews` holds
    /// whatever had been accepted by then.
    pub cancelled: bool,
}

/// Cancellation token plus optional wall-clock deadline.
#[derive(Debug, Clone, Default)]
pub struct SearchControl {
    pub token: CancellationToken,
    pub deadline: Option<Instant>,
}

impl SearchControl {
    pub fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ── Collection ──────────────────────────────────────────────────

type SlotKey = Vec<(SlotOwner, TimePeriod)>;

#[derive(Debug, Default)]
struct Collector {
    accepted: Vec<Interview>,
    seen: HashSet<SlotKey>,
}

impl Collector {
    /// False for duplicates of an already accepted slot sequence.
    fn offer(&mut self, interview: Interview) -> bool {
        let key: SlotKey = interview
            .slots
            .iter()
            .map(|s| (s.owner.clone(), s.period))
            .collect();
        if !self.seen.insert(key) {
            return false;
        }
        self.accepted.push(interview);
        true
    }

    fn ranked(mut self, limit: usize) -> Vec<Interview> {
        rank(&mut self.accepted);
        self.accepted.truncate(limit);
        self.accepted
    }
}

/// Priority descending, then earliest room (or first slot) start. Stable.
pub fn rank(interviews: &mut [Interview]) {
    fn start(i: &Interview) -> Option<Timestamp> {
        i.room
            .as_ref()
            .or_else(|| i.slots.first())
            .map(|s| s.period.start)
    }
    interviews.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| start(a).cmp(&start(b))));
}

/// Where a worker reports attempts and candidates.
trait AttemptSink {
    /// Reserve one attempt; false once the budget is spent.
    fn claim(&mut self) -> bool;
    fn offer(&mut self, interview: Interview);
    fn is_full(&self) -> bool;
}

struct LocalSink {
    attempts: u64,
    max_attempts: u64,
    max_schedules: usize,
    collector: Collector,
}

impl AttemptSink for LocalSink {
    fn claim(&mut self) -> bool {
        if self.attempts >= self.max_attempts {
            return false;
        }
        self.attempts += 1;
        true
    }

    fn offer(&mut self, interview: Interview) {
        self.collector.offer(interview);
    }

    fn is_full(&self) -> bool {
        self.collector.accepted.len() > self.max_schedules
    }
}

struct Shared {
    attempts: AtomicU64,
    full: AtomicBool,
    collector: Mutex<Collector>,
}

struct SharedSink {
    shared: Arc<Shared>,
    max_attempts: u64,
    max_schedules: usize,
}

impl AttemptSink for SharedSink {
    fn claim(&mut self) -> bool {
        self.shared
            .attempts
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_attempts).then_some(n + 1)
            })
            .is_ok()
    }

    fn offer(&mut self, interview: Interview) {
        let mut collector = self
            .shared
            .collector
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        collector.offer(interview);
        if collector.accepted.len() > self.max_schedules {
            self.shared.full.store(true, Ordering::Release);
        }
    }

    fn is_full(&self) -> bool {
        self.shared.full.load(Ordering::Acquire)
    }
}

// ── Generate / anchor / validate ───────────────────────────────

/// One random draw: `num_required` distinct members per group, groups in
/// order. `None` when the same interviewer was drawn by two groups.
pub fn draw_order<'a, R: Rng + ?Sized>(
    groups: &'a [InterviewerGroup],
    rng: &mut R,
) -> Option<Vec<&'a Interviewer>> {
    let mut order = Vec::with_capacity(groups.iter().map(|g| g.num_required).sum());
    for group in groups {
        order.extend(group.interviewers.choose_multiple(rng, group.num_required));
    }
    let mut seen = HashSet::with_capacity(order.len());
    order
        .iter()
        .all(|i| seen.insert(i.address.as_str()))
        .then_some(order)
}

/// Place `others` around a fixed `anchor` sitting at `anchor_index` and
/// check each interviewer is free for their slot.
///
/// Slots before the anchor walk back from its start, slots after walk
/// forward from its end, each `slot_minutes` long.
pub fn try_order_with_anchor(
    others: &[&Interviewer],
    anchor_index: usize,
    anchor: InterviewSlot,
    calendars: &AvailabilityIndex,
    slot_minutes: i64,
) -> Option<Vec<InterviewSlot>> {
    debug_assert!(anchor_index <= others.len());
    let anchor_period = anchor.period;
    let mut anchor = Some(anchor);
    let mut slots = Vec::with_capacity(others.len() + 1);

    for (i, interviewer) in others.iter().enumerate() {
        if i == anchor_index
            && let Some(a) = anchor.take()
        {
            slots.push(a);
        }
        let required = if i < anchor_index {
            let step = i as i64 - anchor_index as i64;
            time_period_after(anchor_period.start, slot_minutes, step)
        } else {
            let position = i + 1;
            let step = position as i64 - anchor_index as i64 - 1;
            time_period_after(anchor_period.end, slot_minutes, step)
        };
        if !calendars.is_free(&interviewer.address, &required) {
            return None;
        }
        slots.push(InterviewSlot::interviewer(interviewer, required));
    }
    if let Some(a) = anchor {
        slots.push(a);
    }
    Some(slots)
}

fn within_window(slots: &[InterviewSlot], window: &TimePeriod) -> bool {
    match (slots.first(), slots.last()) {
        (Some(first), Some(last)) => first.period.start >= window.start && last.period.end <= window.end,
        _ => false,
    }
}

/// Anchored trials for one draw: `(others, anchor_index, anchor)`.
fn anchored_trials<'a>(
    input: &SearchInput,
    order: &[&'a Interviewer],
) -> Vec<(Vec<&'a Interviewer>, usize, InterviewSlot)> {
    match input.break_period {
        Some(period) => {
            let positions = if order.is_empty() {
                1
            } else {
                input.limits.break_positions.min(order.len() + 1)
            };
            (0..positions)
                .map(|i| (order.to_vec(), i, InterviewSlot::break_slot(period)))
                .collect()
        }
        None => {
            let Some((&first, rest)) = order.split_first() else {
                return Vec::new();
            };
            let Some(snapshot) = input.calendars.get(&first.address) else {
                return Vec::new();
            };
            interview_chunks(
                &snapshot.free,
                input.limits.slot_minutes,
                input.limits.scan_resolution_minutes,
            )
            .into_iter()
            .map(|chunk| (rest.to_vec(), 0, InterviewSlot::interviewer(first, chunk)))
            .collect()
        }
    }
}

/// Worker loop shared by the sequential and parallel searches. Returns true
/// when it stopped because of cancellation.
fn run_worker<R, S>(input: &SearchInput, control: &SearchControl, rng: &mut R, sink: &mut S) -> bool
where
    R: Rng + ?Sized,
    S: AttemptSink,
{
    let ctx = input.scoring();
    let mut since_poll = 0u64;
    loop {
        if since_poll == 0 && control.is_cancelled() {
            return true;
        }
        if sink.is_full() {
            return false;
        }

        let trials = match draw_order(&input.groups, rng) {
            Some(order) => anchored_trials(input, &order),
            None => Vec::new(),
        };
        if trials.is_empty() {
            if !sink.claim() {
                return false;
            }
            since_poll = (since_poll + 1) % CANCEL_POLL_INTERVAL;
            continue;
        }

        for (others, anchor_index, anchor) in trials {
            if !sink.claim() {
                return false;
            }
            since_poll = (since_poll + 1) % CANCEL_POLL_INTERVAL;
            if since_poll == 0 && control.is_cancelled() {
                return true;
            }

            let Some(slots) = try_order_with_anchor(
                &others,
                anchor_index,
                anchor,
                &input.calendars,
                input.limits.slot_minutes,
            ) else {
                continue;
            };
            if !within_window(&slots, &input.window) {
                continue;
            }
            if let Some(interview) = scoring::score(&slots, &ctx, rng) {
                sink.offer(interview);
                if sink.is_full() {
                    return false;
                }
            }
        }
    }
}

// ── Entry points ───────────────────────────────────────────────

/// Randomized generate-and-test search on the calling thread.
///
/// Fixed `rng` seed and fixed input give identical output.
pub fn search<R: Rng + ?Sized>(input: &SearchInput, control: &SearchControl, rng: &mut R) -> SearchOutcome {
    let mut sink = LocalSink {
        attempts: 0,
        max_attempts: input.limits.max_attempts,
        max_schedules: input.max_schedules,
        collector: Collector::default(),
    };
    let cancelled = run_worker(input, control, rng, &mut sink);
    let accepted = sink.collector.accepted.len();
    debug!(attempts = sink.attempts, accepted, cancelled, "search finished");
    SearchOutcome {
        interviews: sink.collector.ranked(input.result_limit()),
        attempts: sink.attempts,
        accepted,
        cancelled,
    }
}

/// Same search spread over `workers` blocking threads. Worker `i` draws
/// from `StdRng::seed_from_u64(seed + i)`; the attempt budget and the
/// accepted set are shared.
pub async fn search_parallel(
    input: Arc<SearchInput>,
    control: SearchControl,
    workers: usize,
    seed: u64,
) -> SearchOutcome {
    let workers = workers.clamp(1, MAX_WORKERS);
    let shared = Arc::new(Shared {
        attempts: AtomicU64::new(0),
        full: AtomicBool::new(false),
        collector: Mutex::new(Collector::default()),
    });

    let handles = (0..workers).map(|worker| {
        let input = Arc::clone(&input);
        let control = control.clone();
        let mut sink = SharedSink {
            shared: Arc::clone(&shared),
            max_attempts: input.limits.max_attempts,
            max_schedules: input.max_schedules,
        };
        tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(worker as u64));
            run_worker(&input, &control, &mut rng, &mut sink)
        })
    });

    let mut cancelled = false;
    for result in futures::future::join_all(handles).await {
        match result {
            Ok(stopped) => cancelled |= stopped,
            Err(e) => warn!("search worker failed: {e}"),
        }
    }

    let attempts = shared.attempts.load(Ordering::Acquire);
    let collector = match Arc::try_unwrap(shared) {
        Ok(shared) => shared
            .collector
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner()),
        Err(shared) => {
            let mut guard = shared
                .collector
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        }
    };
    let accepted = collector.accepted.len();
    debug!(workers, attempts, accepted, cancelled, "parallel search finished");
    SearchOutcome {
        interviews: collector.ranked(input.result_limit()),
        attempts,
        accepted,
        cancelled,
    }
}
