use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use panelist::booking::{book_interview, cancel_interview, reassign_slot};
use panelist::calendar::{MockCalendarProvider, RetryPolicy, RetryingProvider};
use panelist::config::SchedulerConfig;
use panelist::engine::{ScheduleRequest, Scheduler, SchedulerError};
use panelist::groups::{Requisition, RequirementRules, assemble_groups};
use panelist::model::*;

// ── Test infrastructure ──────────────────────────────────────

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2012, 9, 27, 15, 0, 0).unwrap()
}

fn span(from: i64, to: i64) -> TimePeriod {
    TimePeriod::new(t0() + chrono::Duration::minutes(from), t0() + chrono::Duration::minutes(to))
}

fn crew(name: &str) -> Interviewer {
    Interviewer::new(format!("{name}@serenity.test"), name)
}

fn roster() -> Vec<Requisition> {
    vec![
        Requisition {
            name: "Backend Engineer".into(),
            interviewers: vec![crew("zoe"), crew("mal")],
        },
        Requisition {
            name: "Ops Engineer".into(),
            interviewers: vec![crew("wash"), crew("mal")],
        },
    ]
}

fn rules() -> RequirementRules {
    let mut rules = RequirementRules::new();
    rules.insert(
        "Backend",
        InterviewType::Skype,
        vec![(1, "Backend".into()), (1, "Ops".into())],
    );
    rules
}

fn request() -> ScheduleRequest {
    let requirements = rules().resolve("Backend", InterviewType::Skype, &roster()).unwrap();
    let groups = assemble_groups(requirements, &[], &["mal@serenity.test".to_string()]);
    ScheduleRequest::new(groups, span(0, 240), InterviewType::Skype)
}

fn provider() -> RetryingProvider<MockCalendarProvider> {
    RetryingProvider::new(
        MockCalendarProvider::new(),
        RetryPolicy {
            max_tries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    )
}

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig {
        seed: Some(11),
        ..SchedulerConfig::default()
    })
}

// ── End to end ───────────────────────────────────────────────

#[tokio::test]
async fn rules_to_booking_round_trip() {
    let provider = provider();
    let scheduler = scheduler();
    let request = request();
    assert_eq!(request.groups.len(), 2);

    let outcome = scheduler
        .fetch_and_schedule(&provider, &request, &[], CancellationToken::new())
        .await
        .unwrap();
    assert!(!outcome.interviews.is_empty());
    let top = outcome.interviews[0].clone();
    for pair in outcome.interviews.windows(2) {
        assert!(pair[0].priority >= pair[1].priority);
    }

    let booked = book_interview(&provider, &top, "River Tam", InterviewType::Skype, &[])
        .await
        .unwrap();
    assert_eq!(booked.events.len(), 2);
    assert_eq!(provider.inner().event_count(), 2);

    // Booked time is busy on the next search.
    let again = scheduler
        .fetch_and_schedule(&provider, &request, &[], CancellationToken::new())
        .await
        .unwrap();
    for interview in &again.interviews {
        for slot in &interview.slots {
            for held in &top.slots {
                if slot.owner == held.owner {
                    assert!(!slot.period.overlaps(&held.period));
                }
            }
        }
    }

    cancel_interview(&provider, booked).await.unwrap();
    assert_eq!(provider.inner().event_count(), 0);
}

#[tokio::test]
async fn transient_provider_failures_are_retried() {
    let provider = provider();
    provider.inner().fail_next(2);
    let outcome = scheduler()
        .fetch_and_schedule(&provider, &request(), &[], CancellationToken::new())
        .await
        .unwrap();
    assert!(!outcome.interviews.is_empty());
    assert!(provider.inner().calendar_requests() >= 3);
}

#[tokio::test]
async fn exhausted_retries_surface_unavailable() {
    let provider = provider();
    provider.inner().fail_next(100);
    let err = scheduler()
        .fetch_and_schedule(&provider, &request(), &[], CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Provider(_)));
}

#[tokio::test]
async fn reassigned_interviewer_takes_over_the_slot() {
    let provider = provider();
    let scheduler = scheduler();
    let outcome = scheduler
        .fetch_and_schedule(&provider, &request(), &[], CancellationToken::new())
        .await
        .unwrap();
    let top = &outcome.interviews[0];
    let mut booked = book_interview(&provider, top, "Simon Tam", InterviewType::Skype, &[])
        .await
        .unwrap();

    let slot = booked.events[0].slot;
    reassign_slot(&provider, &mut booked, slot, &crew("kaylee")).await.unwrap();
    assert_eq!(booked.interview.slots[slot].owner.address(), Some("kaylee@serenity.test"));
    assert_eq!(provider.inner().event_count(), 2);
    let event = provider.inner().event(&booked.events[0].event_id).unwrap();
    assert_eq!(event.calendar_id, "kaylee@serenity.test");
    assert!(event.description.contains("kaylee"));
}
