use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::limits::IDEAL_PADDING_MINUTES;
use crate::model::*;

use super::availability::AvailabilityIndex;

/// Scoring policy. Everything here is tunable; the structure of the search
/// does not depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub room: i64,
    /// Subtracted from `room` when an onsite interview lands in a room not
    /// suited to onsites.
    pub non_onsite_room_penalty: i64,
    pub preference: i64,
    pub break_preference: i64,
    /// Preference score for interviewers with no preference data at all.
    pub no_preference_data: i64,
    pub padding: i64,
    pub padding_minutes: i64,
    pub load_base: i64,
    pub load_penalty: i64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            room: 100,
            non_onsite_room_penalty: 50,
            preference: 15,
            break_preference: 10,
            no_preference_data: 0,
            padding: 5,
            padding_minutes: IDEAL_PADDING_MINUTES,
            load_base: 50,
            load_penalty: 5,
        }
    }
}

/// Rooms offered to a request, with their calendars.
#[derive(Debug, Clone, Default)]
pub struct RoomPool {
    pub rooms: Vec<Room>,
    pub calendars: AvailabilityIndex,
}

impl RoomPool {
    pub fn new(rooms: Vec<Room>, calendars: AvailabilityIndex) -> Self {
        Self { rooms, calendars }
    }
}

/// Read-only inputs shared by every scoring call in one search.
#[derive(Clone, Copy)]
pub struct ScoringContext<'a> {
    pub calendars: &'a AvailabilityIndex,
    pub preferences: &'a AvailabilityIndex,
    pub load: &'a HashMap<String, u32>,
    /// `None` disables room matching.
    pub rooms: Option<&'a RoomPool>,
    pub interview_type: InterviewType,
    pub weights: &'a ScoringWeights,
}

/// Pick a room free for all of `span`. Returns the room slot and its score,
/// or `None` when the pool has nothing free.
pub fn choose_room<R: Rng + ?Sized>(
    pool: &RoomPool,
    span: &TimePeriod,
    interview_type: InterviewType,
    weights: &ScoringWeights,
    rng: &mut R,
) -> Option<(InterviewSlot, i64)> {
    let free: Vec<&Room> = pool
        .rooms
        .iter()
        .filter(|r| pool.calendars.is_free(&r.address, span))
        .collect();

    if interview_type.is_onsite() {
        let suited: Vec<&Room> = free.iter().copied().filter(|r| r.onsite_suitable).collect();
        if let Some(room) = suited.choose(rng) {
            return Some((InterviewSlot::room(room, *span), weights.room));
        }
        return free.choose(rng).map(|room| {
            (
                InterviewSlot::room(room, *span),
                weights.room - weights.non_onsite_room_penalty,
            )
        });
    }

    free.choose(rng)
        .map(|room| (InterviewSlot::room(room, *span), weights.room))
}

fn preference_score(slot: &InterviewSlot, ctx: &ScoringContext<'_>) -> i64 {
    match slot.owner.address() {
        None => ctx.weights.break_preference,
        Some(address) if !ctx.preferences.contains(address) => ctx.weights.no_preference_data,
        Some(address) if ctx.preferences.is_busy(address, &slot.period) => ctx.weights.preference,
        Some(_) => 0,
    }
}

fn padding_score(slot: &InterviewSlot, ctx: &ScoringContext<'_>) -> i64 {
    match slot.owner.address() {
        None => ctx.weights.padding,
        Some(address) => {
            let padded = slot.period.extend_end(ctx.weights.padding_minutes);
            if ctx.calendars.is_free(address, &padded) {
                ctx.weights.padding
            } else {
                0
            }
        }
    }
}

/// Score a validated slot sequence. Returns an annotated copy, or `None`
/// when a room pool is in use and no room fits the whole span.
pub fn score<R: Rng + ?Sized>(
    slots: &[InterviewSlot],
    ctx: &ScoringContext<'_>,
    rng: &mut R,
) -> Option<Interview> {
    let first = slots.first()?;
    let last = slots.last()?;
    let span = TimePeriod::try_new(first.period.start, last.period.end)?;

    let (room, room_score) = match ctx.rooms {
        None => (None, 0),
        Some(pool) => {
            let (slot, score) = choose_room(pool, &span, ctx.interview_type, ctx.weights, rng)?;
            (Some(slot), score)
        }
    };

    let mut priority = room_score + ctx.weights.load_base;
    let mut annotated = Vec::with_capacity(slots.len());
    for slot in slots {
        let preference = preference_score(slot, ctx);
        let padding = padding_score(slot, ctx);
        let load = match &slot.owner {
            SlotOwner::Interviewer { address, .. } => Some(ctx.load.get(address).copied().unwrap_or(0)),
            _ => None,
        };
        priority += preference + padding - ctx.weights.load_penalty * i64::from(load.unwrap_or(0));

        annotated.push(InterviewSlot {
            inside_preference: preference > 0,
            has_buffer: padding > 0,
            interviews_this_week: load,
            ..slot.clone()
        });
    }

    Some(Interview {
        slots: annotated,
        room,
        priority,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::config::FreeTimePolicy;
    use crate::engine::availability::CalendarSnapshot;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2012, 9, 27, 15, 0, 0).unwrap()
    }

    fn span(from: i64, to: i64) -> TimePeriod {
        TimePeriod::new(t0() + Duration::minutes(from), t0() + Duration::minutes(to))
    }

    fn snapshot(owner: &str, busy: &[TimePeriod]) -> CalendarSnapshot {
        CalendarSnapshot::from_periods(owner, span(0, 240), busy, FreeTimePolicy::WholeWindow)
    }

    fn mal() -> Interviewer {
        Interviewer::new("malcolm@reynolds.com", "Mal")
    }

    fn zoe() -> Interviewer {
        Interviewer::new("zoe@washburn.com", "Zoe")
    }

    struct Fixture {
        calendars: AvailabilityIndex,
        preferences: AvailabilityIndex,
        load: HashMap<String, u32>,
        weights: ScoringWeights,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                calendars: [
                    snapshot("malcolm@reynolds.com", &[span(60, 120)]),
                    snapshot("zoe@washburn.com", &[]),
                ]
                .into_iter()
                .collect(),
                preferences: AvailabilityIndex::new(),
                load: HashMap::new(),
                weights: ScoringWeights::default(),
            }
        }

        fn ctx<'a>(&'a self, rooms: Option<&'a RoomPool>, interview_type: InterviewType) -> ScoringContext<'a> {
            ScoringContext {
                calendars: &self.calendars,
                preferences: &self.preferences,
                load: &self.load,
                rooms,
                interview_type,
                weights: &self.weights,
            }
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn baseline_priority_without_rooms_or_preferences() {
        let fx = Fixture::new();
        // Mal 0-45 is padded (free until 60); Zoe 45-90 is padded.
        let slots = vec![
            InterviewSlot::interviewer(&mal(), span(0, 45)),
            InterviewSlot::interviewer(&zoe(), span(45, 90)),
        ];
        let interview = score(&slots, &fx.ctx(None, InterviewType::Skype), &mut rng()).unwrap();
        assert_eq!(interview.priority, 50 + 5 + 5);
        assert!(interview.room.is_none());
        assert!(interview.slots.iter().all(|s| s.has_buffer));
        assert_eq!(interview.slots[0].interviews_this_week, Some(0));
    }

    #[test]
    fn padding_lost_when_busy_right_after() {
        let fx = Fixture::new();
        let slots = vec![InterviewSlot::interviewer(&mal(), span(15, 60))];
        let interview = score(&slots, &fx.ctx(None, InterviewType::Skype), &mut rng()).unwrap();
        assert_eq!(interview.priority, 50);
        assert!(!interview.slots[0].has_buffer);
    }

    #[test]
    fn break_gets_fixed_bonuses() {
        let fx = Fixture::new();
        let slots = vec![
            InterviewSlot::break_slot(span(0, 75)),
            InterviewSlot::interviewer(&zoe(), span(75, 120)),
        ];
        let interview = score(&slots, &fx.ctx(None, InterviewType::Skype), &mut rng()).unwrap();
        // break: 10 preference + 5 padding; zoe: 5 padding
        assert_eq!(interview.priority, 50 + 10 + 5 + 5);
        assert!(interview.slots[0].inside_preference);
        assert_eq!(interview.slots[0].interviews_this_week, None);
    }

    #[test]
    fn load_penalty_per_slot() {
        let mut fx = Fixture::new();
        fx.load.insert("zoe@washburn.com".into(), 2);
        let slots = vec![InterviewSlot::interviewer(&zoe(), span(0, 45))];
        let interview = score(&slots, &fx.ctx(None, InterviewType::Skype), &mut rng()).unwrap();
        assert_eq!(interview.priority, 50 - 10 + 5);
        assert_eq!(interview.slots[0].interviews_this_week, Some(2));
    }

    #[test]
    fn preference_window_scores_when_covering() {
        let mut fx = Fixture::new();
        let mut z = zoe();
        z.preferences.push(PreferenceWindow {
            weekday: Weekday::Thu,
            start: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
        });
        fx.preferences =
            AvailabilityIndex::from_preference_windows([&z], &span(0, 240), &FixedOffset::east_opt(0).unwrap());

        let inside = vec![InterviewSlot::interviewer(&z, span(60, 105))];
        let outside = vec![InterviewSlot::interviewer(&z, span(120, 165))];
        let ctx = fx.ctx(None, InterviewType::Skype);
        let a = score(&inside, &ctx, &mut rng()).unwrap();
        let b = score(&outside, &ctx, &mut rng()).unwrap();
        assert_eq!(a.priority - b.priority, 15);
        assert!(a.slots[0].inside_preference);
        assert!(!b.slots[0].inside_preference);
    }

    #[test]
    fn no_preference_data_uses_configured_default() {
        let mut fx = Fixture::new();
        fx.weights.no_preference_data = 10;
        let slots = vec![InterviewSlot::interviewer(&zoe(), span(0, 45))];
        let interview = score(&slots, &fx.ctx(None, InterviewType::Skype), &mut rng()).unwrap();
        assert_eq!(interview.priority, 50 + 10 + 5);
    }

    fn room_pool() -> RoomPool {
        RoomPool::new(
            vec![
                Room::new("serenity@rooms", "Serenity", false),
                Room::new("bridge@rooms", "Bridge", true),
            ],
            [
                snapshot("serenity@rooms", &[]),
                snapshot("bridge@rooms", &[span(100, 140)]),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn onsite_prefers_suitable_room() {
        let fx = Fixture::new();
        let pool = room_pool();
        let slots = vec![InterviewSlot::interviewer(&zoe(), span(0, 45))];
        let interview = score(&slots, &fx.ctx(Some(&pool), InterviewType::OnSite), &mut rng()).unwrap();
        let room = interview.room.unwrap();
        assert_eq!(room.owner.address(), Some("bridge@rooms"));
        assert_eq!(room.period, span(0, 45));
        assert_eq!(interview.priority, 100 + 50 + 5);
    }

    #[test]
    fn onsite_falls_back_with_penalty() {
        let fx = Fixture::new();
        let pool = room_pool();
        let slots = vec![InterviewSlot::interviewer(&zoe(), span(90, 135))];
        let interview = score(&slots, &fx.ctx(Some(&pool), InterviewType::OnSite), &mut rng()).unwrap();
        assert_eq!(interview.room.unwrap().owner.address(), Some("serenity@rooms"));
        assert_eq!(interview.priority, 50 + 50 + 5);
    }

    #[test]
    fn no_free_room_rejects() {
        let fx = Fixture::new();
        let pool = RoomPool::new(
            vec![Room::new("bridge@rooms", "Bridge", true)],
            std::iter::once(snapshot("bridge@rooms", &[span(0, 240)])).collect(),
        );
        let slots = vec![InterviewSlot::interviewer(&zoe(), span(0, 45))];
        assert!(score(&slots, &fx.ctx(Some(&pool), InterviewType::Skype), &mut rng()).is_none());
    }

    #[test]
    fn input_slots_are_not_mutated() {
        let fx = Fixture::new();
        let slots = vec![InterviewSlot::interviewer(&zoe(), span(0, 45))];
        let before = slots.clone();
        let _ = score(&slots, &fx.ctx(None, InterviewType::Skype), &mut rng());
        assert_eq!(slots, before);
    }
}
