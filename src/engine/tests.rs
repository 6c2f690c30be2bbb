use chrono::{Duration, TimeZone, Utc};

use super::*;
use crate::calendar::{MockCalendarProvider, ProviderError};

// Thursday 2012-09-27 15:00 UTC; four-hour window.
fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2012, 9, 27, 15, 0, 0).unwrap()
}

fn span(from: i64, to: i64) -> TimePeriod {
    TimePeriod::new(t0() + Duration::minutes(from), t0() + Duration::minutes(to))
}

fn window() -> TimePeriod {
    span(0, 240)
}

fn captain() -> Interviewer {
    Interviewer::new("malcolm@reynolds.com", "Malcolm Reynolds")
}

fn first_mate() -> Interviewer {
    Interviewer::new("zoe@washburn.com", "Zoe Washburn")
}

/// Captain is busy in four back-to-back 15-minute blocks from minute 60.
fn captain_busy() -> Vec<BusyInterval> {
    [60, 75, 90, 105]
        .iter()
        .map(|&m| BusyInterval::from(span(m, m + 15)))
        .collect()
}

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig {
        seed: Some(1),
        ..SchedulerConfig::default()
    })
}

fn crew_calendars(scheduler: &Scheduler) -> CalendarSet {
    CalendarSet {
        interviewers: [
            scheduler.snapshot("malcolm@reynolds.com", window(), &captain_busy()),
            scheduler.snapshot("zoe@washburn.com", window(), &[]),
        ]
        .into_iter()
        .collect(),
        ..CalendarSet::default()
    }
}

fn request(groups: Vec<InterviewerGroup>, break_period: Option<TimePeriod>) -> ScheduleRequest {
    ScheduleRequest {
        break_period,
        ..ScheduleRequest::new(groups, window(), InterviewType::Skype)
    }
}

fn owners(interview: &Interview) -> Vec<Option<&str>> {
    interview.slots.iter().map(|s| s.owner.address()).collect()
}

// ── Fixture regressions ──────────────────────────────────

#[test]
fn break_at_window_start_yields_one_schedule() {
    let s = scheduler();
    let req = request(
        vec![InterviewerGroup::new(2, vec![captain(), first_mate()])],
        Some(span(0, 75)),
    );
    let outcome = s.schedule(&req, &[], crew_calendars(&s)).unwrap();

    assert_eq!(outcome.interviews.len(), 1);
    let interview = &outcome.interviews[0];
    assert_eq!(
        owners(interview),
        vec![None, Some("zoe@washburn.com"), Some("malcolm@reynolds.com")]
    );
    assert_eq!(interview.slots[0].period, span(0, 75));
    assert_eq!(interview.slots[1].period, span(75, 120));
    assert_eq!(interview.slots[2].period, span(120, 165));
    // break 10+5, two padded interviewers 5+5, no load
    assert_eq!(interview.priority, 50 + 15 + 10);
}

#[test]
fn shifted_break_with_single_member_groups_yields_two() {
    let s = scheduler();
    let req = request(
        vec![
            InterviewerGroup::new(1, vec![captain()]),
            InterviewerGroup::new(1, vec![first_mate()]),
        ],
        Some(span(45, 120)),
    );
    let outcome = s.schedule(&req, &[], crew_calendars(&s)).unwrap();

    assert_eq!(outcome.interviews.len(), 2);
    let mut shapes: Vec<Vec<TimePeriod>> = outcome
        .interviews
        .iter()
        .map(|i| i.slots.iter().map(|s| s.period).collect())
        .collect();
    shapes.sort();
    assert_eq!(
        shapes,
        vec![
            vec![span(0, 45), span(45, 120), span(120, 165)],
            vec![span(45, 120), span(120, 165), span(165, 210)],
        ]
    );
}

#[test]
fn no_break_yields_every_chunk() {
    let s = scheduler();
    let req = request(vec![InterviewerGroup::new(1, vec![first_mate()])], None);
    let outcome = s.schedule(&req, &[], crew_calendars(&s)).unwrap();

    assert_eq!(outcome.interviews.len(), 13);
    assert_eq!(outcome.accepted, 13);
    assert!(!outcome.cancelled);
    for interview in &outcome.interviews {
        assert!(window().contains(&interview.span().unwrap()));
    }
}

// ── Facade behaviour ─────────────────────────────────────

#[test]
fn same_seed_same_ranking() {
    let s = scheduler();
    let req = request(vec![InterviewerGroup::new(2, vec![captain(), first_mate()])], None);
    let a = s.schedule(&req, &[], crew_calendars(&s)).unwrap();
    let b = s.schedule(&req, &[], crew_calendars(&s)).unwrap();
    assert_eq!(a.interviews, b.interviews);
}

#[test]
fn load_lowers_priority_and_cap_prunes() {
    let s = scheduler();
    let records: Vec<LoadRecord> = (0..2)
        .map(|d| LoadRecord {
            interviewer: "zoe@washburn.com".into(),
            start: t0() - Duration::days(d + 1),
            kind: LoadKind::Interview,
        })
        .collect();
    let req = request(vec![InterviewerGroup::new(1, vec![first_mate()])], None);
    let outcome = s.schedule(&req, &records, crew_calendars(&s)).unwrap();
    assert!(outcome.interviews.iter().all(|i| i.slots[0].interviews_this_week == Some(2)));
    // base 50, two interviews at 5 each, padded
    assert_eq!(outcome.interviews[0].priority, 45);

    let mut capped = records.clone();
    capped.push(LoadRecord {
        interviewer: "zoe@washburn.com".into(),
        start: t0() - Duration::hours(1),
        kind: LoadKind::CodeTest,
    });
    let err = s.schedule(&req, &capped, crew_calendars(&s)).unwrap_err();
    assert!(matches!(err, SchedulerError::NoInterviewersAvailable { .. }));
}

#[test]
fn exhausted_room_pool_returns_empty_ok() {
    let s = scheduler();
    let mut req = request(vec![InterviewerGroup::new(1, vec![first_mate()])], None);
    req.rooms = Some(vec![Room::new("bridge@serenity", "Bridge", true)]);
    let mut calendars = crew_calendars(&s);
    calendars.rooms = std::iter::once(s.snapshot(
        "bridge@serenity",
        window(),
        &[BusyInterval::from(window())],
    ))
    .collect();

    let outcome = s.schedule(&req, &[], calendars).unwrap();
    assert!(outcome.interviews.is_empty());
}

#[test]
fn room_is_attached_when_free() {
    let s = scheduler();
    let mut req = request(vec![InterviewerGroup::new(1, vec![first_mate()])], None);
    req.rooms = Some(vec![Room::new("bridge@serenity", "Bridge", true)]);
    let mut calendars = crew_calendars(&s);
    calendars.rooms = std::iter::once(s.snapshot("bridge@serenity", window(), &[])).collect();

    let outcome = s.schedule(&req, &[], calendars).unwrap();
    assert_eq!(outcome.interviews.len(), 13);
    for interview in &outcome.interviews {
        let room = interview.room.as_ref().unwrap();
        assert_eq!(room.period, interview.span().unwrap());
        assert!(interview.priority >= 100);
    }
    for pair in outcome.interviews.windows(2) {
        if pair[0].priority == pair[1].priority {
            assert!(pair[0].room.as_ref().unwrap().period.start <= pair[1].room.as_ref().unwrap().period.start);
        }
    }
}

#[test]
fn validation_errors() {
    let s = scheduler();

    let mut req = request(vec![InterviewerGroup::new(3, vec![captain(), first_mate()])], None);
    assert!(matches!(
        s.validate(&req),
        Err(SchedulerError::MalformedGroup { index: 0, .. })
    ));

    req.groups = vec![InterviewerGroup::new(1, vec![first_mate(), first_mate()])];
    assert!(matches!(
        s.validate(&req),
        Err(SchedulerError::MalformedGroup { index: 0, .. })
    ));

    req.groups = vec![InterviewerGroup::new(1, vec![first_mate()])];
    req.max_schedules = 0;
    assert!(matches!(s.validate(&req), Err(SchedulerError::Configuration(_))));

    req.max_schedules = 10;
    req.window = span(60, 60);
    assert!(matches!(s.validate(&req), Err(SchedulerError::Configuration(_))));

    req.window = window();
    assert!(s.validate(&req).is_ok());
}

#[test]
fn degenerate_limits_rejected() {
    let req = request(vec![InterviewerGroup::new(1, vec![first_mate()])], None);

    let mut config = SchedulerConfig::default();
    config.limits.scan_resolution_minutes = 0;
    let err = Scheduler::new(config).schedule(&req, &[], CalendarSet::default()).unwrap_err();
    assert!(matches!(err, SchedulerError::Configuration(_)));

    let mut config = SchedulerConfig::default();
    config.limits.slot_minutes = -45;
    assert!(matches!(
        Scheduler::new(config).validate(&req),
        Err(SchedulerError::Configuration(_))
    ));

    let mut config = SchedulerConfig::default();
    config.weights.padding_minutes = -15;
    assert!(matches!(
        Scheduler::new(config).validate(&req),
        Err(SchedulerError::Configuration(_))
    ));
}

#[test]
fn cross_week_window_rejected() {
    let s = scheduler();
    let mut req = request(vec![InterviewerGroup::new(1, vec![first_mate()])], None);
    req.window = span(0, 5 * 24 * 60);
    let err = s.schedule(&req, &[], CalendarSet::default()).unwrap_err();
    assert!(matches!(err, SchedulerError::Configuration(_)));
}

#[test]
fn preference_windows_raise_priority() {
    let s = scheduler();
    let mut zoe = first_mate();
    zoe.preferences.push(PreferenceWindow {
        weekday: chrono::Weekday::Thu,
        start: chrono::NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        end: chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
    });
    let req = request(vec![InterviewerGroup::new(1, vec![zoe])], None);
    let outcome = s.schedule(&req, &[], crew_calendars(&s)).unwrap();
    // Only chunks fully inside 15:00-16:00 get the bonus, and they rank first.
    let top = &outcome.interviews[0];
    assert!(top.slots[0].inside_preference);
    assert_eq!(top.priority, 50 + 15 + 5);
    assert_eq!(outcome.interviews.iter().filter(|i| i.slots[0].inside_preference).count(), 2);
}

// ── Provider-backed path ─────────────────────────────────

fn crew_provider() -> MockCalendarProvider {
    let provider = MockCalendarProvider::new();
    for busy in captain_busy() {
        provider.register_busyness("malcolm@reynolds.com", busy.period().unwrap());
    }
    provider
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_and_schedule_matches_fixtures() {
    let s = scheduler();
    let provider = crew_provider();

    let req = request(
        vec![InterviewerGroup::new(2, vec![captain(), first_mate()])],
        Some(span(0, 75)),
    );
    let outcome = s
        .fetch_and_schedule(&provider, &req, &[], CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.interviews.len(), 1);

    let req = request(vec![InterviewerGroup::new(1, vec![first_mate()])], None);
    let outcome = s
        .fetch_and_schedule(&provider, &req, &[], CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.interviews.len(), 13);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parallel_workers_find_the_same_set() {
    let s = Scheduler::new(SchedulerConfig {
        workers: 4,
        seed: Some(7),
        ..SchedulerConfig::default()
    });
    let provider = crew_provider();
    let req = request(
        vec![
            InterviewerGroup::new(1, vec![captain()]),
            InterviewerGroup::new(1, vec![first_mate()]),
        ],
        Some(span(45, 120)),
    );
    let outcome = s
        .fetch_and_schedule(&provider, &req, &[], CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.interviews.len(), 2);
}

#[tokio::test]
async fn provider_failure_surfaces_as_scheduler_error() {
    let s = scheduler();
    let provider = crew_provider();
    provider.fail_next(1);
    let req = request(vec![InterviewerGroup::new(1, vec![first_mate()])], None);
    let err = s
        .fetch_and_schedule(&provider, &req, &[], CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Provider(ProviderError::Transient(_))));
}

#[tokio::test]
async fn cancelled_before_start_returns_partial() {
    let s = scheduler();
    let provider = crew_provider();
    let token = CancellationToken::new();
    token.cancel();
    let req = request(vec![InterviewerGroup::new(1, vec![first_mate()])], None);
    let outcome = s.fetch_and_schedule(&provider, &req, &[], token).await.unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.interviews.is_empty());
}
