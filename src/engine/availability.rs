use std::collections::HashMap;

use chrono::{Duration, FixedOffset};

use crate::config::FreeTimePolicy;
use crate::model::*;

use super::intervals::{collapse, free_times};

/// Busy and free time of one interviewer or room over a query window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSnapshot {
    pub owner: String,
    pub window: TimePeriod,
    /// Collapsed, sorted by start.
    pub busy: Vec<TimePeriod>,
    /// Sorted by start.
    pub free: Vec<TimePeriod>,
}

impl CalendarSnapshot {
    pub fn from_busy(
        owner: impl Into<String>,
        window: TimePeriod,
        raw: &[BusyInterval],
        policy: FreeTimePolicy,
    ) -> Self {
        let periods: Vec<TimePeriod> = raw.iter().filter_map(BusyInterval::period).collect();
        Self::from_periods(owner, window, &periods, policy)
    }

    pub fn from_periods(
        owner: impl Into<String>,
        window: TimePeriod,
        busy: &[TimePeriod],
        policy: FreeTimePolicy,
    ) -> Self {
        Self {
            owner: owner.into(),
            window,
            busy: collapse(busy),
            free: free_times(busy, &window, policy),
        }
    }

    /// True iff a single free span contains `period`.
    pub fn has_availability_during(&self, period: &TimePeriod) -> bool {
        covering(&self.free, period)
    }

    /// True iff a single busy span contains `period`.
    pub fn is_blocked_during(&self, period: &TimePeriod) -> bool {
        covering(&self.busy, period)
    }
}

/// `spans` must be sorted and disjoint. Only the last span starting at or
/// before `period.start` can contain it.
fn covering(spans: &[TimePeriod], period: &TimePeriod) -> bool {
    let idx = spans.partition_point(|s| s.start <= period.start);
    idx > 0 && spans[idx - 1].contains(period)
}

/// Snapshots keyed by owner address.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityIndex {
    snapshots: HashMap<String, CalendarSnapshot>,
}

impl AvailabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: CalendarSnapshot) {
        self.snapshots.insert(snapshot.owner.clone(), snapshot);
    }

    pub fn get(&self, owner: &str) -> Option<&CalendarSnapshot> {
        self.snapshots.get(owner)
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.snapshots.contains_key(owner)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Unknown owners are never free.
    pub fn is_free(&self, owner: &str, period: &TimePeriod) -> bool {
        self.snapshots
            .get(owner)
            .is_some_and(|s| s.has_availability_during(period))
    }

    /// Unknown owners are never busy.
    pub fn is_busy(&self, owner: &str, period: &TimePeriod) -> bool {
        self.snapshots
            .get(owner)
            .is_some_and(|s| s.is_blocked_during(period))
    }

    /// Preference calendars from weekly preference windows. Preferred time is
    /// stored as the "busy" side so `is_busy` answers "inside a preferred
    /// window". Interviewers without windows get no entry.
    pub fn from_preference_windows<'a>(
        interviewers: impl IntoIterator<Item = &'a Interviewer>,
        window: &TimePeriod,
        offset: &FixedOffset,
    ) -> Self {
        let first_day = window.start.with_timezone(offset).date_naive();
        let last_day = window.end.with_timezone(offset).date_naive();
        let mut index = Self::new();
        for interviewer in interviewers {
            if interviewer.preferences.is_empty() {
                continue;
            }
            let mut preferred = Vec::new();
            let mut day = first_day;
            while day <= last_day {
                preferred.extend(
                    interviewer
                        .preferences
                        .iter()
                        .filter_map(|p| p.period_on(day, offset)),
                );
                day += Duration::days(1);
            }
            index.insert(CalendarSnapshot::from_periods(
                interviewer.address.clone(),
                *window,
                &preferred,
                FreeTimePolicy::WholeWindow,
            ));
        }
        index
    }
}

impl FromIterator<CalendarSnapshot> for AvailabilityIndex {
    fn from_iter<I: IntoIterator<Item = CalendarSnapshot>>(iter: I) -> Self {
        let mut index = Self::new();
        for snapshot in iter {
            index.insert(snapshot);
        }
        index
    }
}

impl IntoIterator for AvailabilityIndex {
    type Item = CalendarSnapshot;
    type IntoIter = std::collections::hash_map::IntoValues<String, CalendarSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.into_values()
    }
}

impl Extend<CalendarSnapshot> for AvailabilityIndex {
    fn extend<I: IntoIterator<Item = CalendarSnapshot>>(&mut self, iter: I) {
        for snapshot in iter {
            self.insert(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone, Utc, Weekday};

    use super::*;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2012, 9, 27, 15, 0, 0).unwrap()
    }

    fn span(from: i64, to: i64) -> TimePeriod {
        TimePeriod::new(t0() + Duration::minutes(from), t0() + Duration::minutes(to))
    }

    fn captain() -> CalendarSnapshot {
        let busy: Vec<BusyInterval> = [60, 75, 90, 105]
            .iter()
            .map(|&m| BusyInterval::from(span(m, m + 15)))
            .collect();
        CalendarSnapshot::from_busy("malcolm@reynolds.com", span(0, 240), &busy, FreeTimePolicy::WholeWindow)
    }

    #[test]
    fn snapshot_collapses_and_derives_free() {
        let snap = captain();
        assert_eq!(snap.busy, vec![span(60, 120)]);
        assert_eq!(snap.free, vec![span(0, 60), span(120, 240)]);
    }

    #[test]
    fn availability_requires_single_free_span() {
        let snap = captain();
        assert!(snap.has_availability_during(&span(0, 45)));
        assert!(snap.has_availability_during(&span(15, 60)));
        assert!(snap.has_availability_during(&span(120, 165)));
        assert!(!snap.has_availability_during(&span(30, 75)));
        // Spans both free blocks but crosses the busy one.
        assert!(!snap.has_availability_during(&span(45, 135)));
        assert!(!snap.has_availability_during(&span(-45, 0)));
    }

    #[test]
    fn blocked_requires_containment() {
        let snap = captain();
        assert!(snap.is_blocked_during(&span(60, 120)));
        assert!(snap.is_blocked_during(&span(75, 90)));
        assert!(!snap.is_blocked_during(&span(45, 90)));
        assert!(!snap.is_blocked_during(&span(0, 45)));
    }

    #[test]
    fn index_unknown_owner_is_neither_free_nor_busy() {
        let index: AvailabilityIndex = std::iter::once(captain()).collect();
        assert_eq!(index.len(), 1);
        assert!(index.is_free("malcolm@reynolds.com", &span(0, 45)));
        assert!(index.is_busy("malcolm@reynolds.com", &span(60, 75)));
        assert!(!index.is_free("nobody@example.com", &span(0, 45)));
        assert!(!index.is_busy("nobody@example.com", &span(0, 45)));
    }

    #[test]
    fn preference_windows_become_blocked_spans() {
        let mut zoe = Interviewer::new("zoe@washburn.com", "Zoe");
        zoe.preferences.push(PreferenceWindow {
            weekday: Weekday::Thu,
            start: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
        });
        let wash = Interviewer::new("wash@leaf.com", "Wash");
        let utc = FixedOffset::east_opt(0).unwrap();

        let prefs = AvailabilityIndex::from_preference_windows([&zoe, &wash], &span(0, 240), &utc);
        assert!(prefs.contains("zoe@washburn.com"));
        assert!(!prefs.contains("wash@leaf.com"));
        assert!(prefs.is_busy("zoe@washburn.com", &span(60, 105)));
        assert!(!prefs.is_busy("zoe@washburn.com", &span(0, 45)));
        assert!(!prefs.is_busy("zoe@washburn.com", &span(135, 180)));
    }
}
