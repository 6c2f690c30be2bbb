//! Booking a chosen schedule onto interviewer calendars.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ulid::Ulid;

use crate::calendar::{CalendarEvent, CalendarProvider, EventId, ProviderError};
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The interview has no interviewer slots.
    Empty,
    /// `index` is out of range or names a break.
    NotAnInterviewerSlot(usize),
    Provider(ProviderError),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::Empty => write!(f, "interview has no interviewer slots"),
            BookingError::NotAnInterviewerSlot(i) => write!(f, "slot {i} is not an interviewer slot"),
            BookingError::Provider(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BookingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BookingError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProviderError> for BookingError {
    fn from(e: ProviderError) -> Self {
        BookingError::Provider(e)
    }
}

/// One event on one interviewer's calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedSlot {
    /// Index into `interview.slots`.
    pub slot: usize,
    pub calendar_id: String,
    pub event_id: EventId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedInterview {
    pub id: Ulid,
    pub candidate: String,
    pub interview_type: InterviewType,
    pub interview: Interview,
    pub events: Vec<BookedSlot>,
}

/// Calendar ids for interviewers whose provider id differs from their address.
fn calendar_ids(roster: &[Interviewer]) -> HashMap<&str, &str> {
    roster.iter().map(|i| (i.address.as_str(), i.calendar_id())).collect()
}

fn summary(candidate: &str, interview_type: InterviewType) -> String {
    format!("{} interview: {candidate}", interview_type.display_name())
}

/// One line per slot, breaks included, so every interviewer sees the day.
fn agenda(interview: &Interview) -> String {
    interview
        .slots
        .iter()
        .map(|slot| {
            let who = match &slot.owner {
                SlotOwner::Interviewer { display_name, address } | SlotOwner::Room { display_name, address } => {
                    if display_name.is_empty() { address.as_str() } else { display_name.as_str() }
                }
                SlotOwner::Break => "Break",
            };
            format!(
                "{}-{} {who}",
                slot.period.start.format("%H:%M"),
                slot.period.end.format("%H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn slot_event(
    calendar_id: &str,
    address: &str,
    slot: &InterviewSlot,
    interview: &Interview,
    candidate: &str,
    interview_type: InterviewType,
) -> CalendarEvent {
    let mut attendees = vec![address.to_string()];
    let mut location = None;
    if let Some(room) = &interview.room
        && let SlotOwner::Room { address: room_address, display_name } = &room.owner
    {
        attendees.push(room_address.clone());
        location = Some(if display_name.is_empty() { room_address.clone() } else { display_name.clone() });
    }
    CalendarEvent {
        calendar_id: calendar_id.to_string(),
        summary: summary(candidate, interview_type),
        description: agenda(interview),
        period: slot.period,
        attendees,
        location,
    }
}

/// Create one event per interviewer slot. `roster` resolves provider calendar
/// ids; addresses missing from it are booked on the address itself. If any
/// create fails, the events already created are deleted before returning.
pub async fn book_interview<P: CalendarProvider + ?Sized>(
    provider: &P,
    interview: &Interview,
    candidate: &str,
    interview_type: InterviewType,
    roster: &[Interviewer],
) -> Result<BookedInterview, BookingError> {
    let ids = calendar_ids(roster);
    let mut events = Vec::new();

    for (index, slot) in interview.slots.iter().enumerate() {
        let SlotOwner::Interviewer { address, .. } = &slot.owner else { continue };
        let calendar_id = ids.get(address.as_str()).copied().unwrap_or(address.as_str());
        let event = slot_event(calendar_id, address, slot, interview, candidate, interview_type);
        match provider.create_event(&event).await {
            Ok(event_id) => events.push(BookedSlot {
                slot: index,
                calendar_id: calendar_id.to_string(),
                event_id,
            }),
            Err(e) => {
                rollback(provider, &events).await;
                return Err(e.into());
            }
        }
    }

    if events.is_empty() {
        return Err(BookingError::Empty);
    }
    metrics::counter!(crate::observability::EVENTS_BOOKED_TOTAL).increment(events.len() as u64);
    let booked = BookedInterview {
        id: Ulid::new(),
        candidate: candidate.to_string(),
        interview_type,
        interview: interview.clone(),
        events,
    };
    info!(id = %booked.id, candidate, events = booked.events.len(), "interview booked");
    Ok(booked)
}

async fn rollback<P: CalendarProvider + ?Sized>(provider: &P, events: &[BookedSlot]) {
    for booked in events {
        if let Err(e) = provider.delete_event(&booked.calendar_id, &booked.event_id).await {
            warn!(event = %booked.event_id, "rollback failed: {e}");
        }
    }
}

/// Move slot `index` to `replacement`. The event is patched in place when the
/// calendar stays the same; otherwise the new event is created before the old
/// one is deleted.
pub async fn reassign_slot<P: CalendarProvider + ?Sized>(
    provider: &P,
    booked: &mut BookedInterview,
    index: usize,
    replacement: &Interviewer,
) -> Result<(), BookingError> {
    let position = booked
        .events
        .iter()
        .position(|e| e.slot == index)
        .ok_or(BookingError::NotAnInterviewerSlot(index))?;

    let mut updated = booked.interview.clone();
    let period = updated.slots[index].period;
    updated.slots[index] = InterviewSlot {
        interviews_this_week: updated.slots[index].interviews_this_week,
        ..InterviewSlot::interviewer(replacement, period)
    };
    let calendar_id = replacement.calendar_id();
    let event = slot_event(
        calendar_id,
        &replacement.address,
        &updated.slots[index],
        &updated,
        &booked.candidate,
        booked.interview_type,
    );

    let current = &booked.events[position];
    if current.calendar_id == calendar_id {
        provider.update_event(&current.event_id, &event).await?;
    } else {
        let event_id = provider.create_event(&event).await?;
        if let Err(e) = provider.delete_event(&current.calendar_id, &current.event_id).await {
            warn!(event = %current.event_id, "old event left behind after reassignment: {e}");
        }
        booked.events[position] = BookedSlot {
            slot: index,
            calendar_id: calendar_id.to_string(),
            event_id,
        };
    }
    booked.interview = updated;
    info!(id = %booked.id, slot = index, interviewer = %replacement.address, "slot reassigned");
    Ok(())
}

/// Delete every event. All deletes are attempted; the first failure is returned.
pub async fn cancel_interview<P: CalendarProvider + ?Sized>(
    provider: &P,
    booked: BookedInterview,
) -> Result<(), BookingError> {
    let mut first_error = None;
    for event in &booked.events {
        if let Err(e) = provider.delete_event(&event.calendar_id, &event.event_id).await {
            warn!(event = %event.event_id, "cancel failed: {e}");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e.into()),
        None => {
            info!(id = %booked.id, "interview cancelled");
            Ok(())
        }
    }
}
