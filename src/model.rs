use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// The only time type the engine works in.
pub type Timestamp = DateTime<Utc>;

/// Closed time range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimePeriod {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimePeriod {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start <= end, "TimePeriod start must not be after end");
        Self { start, end }
    }

    /// Like `new`, but returns `None` for inverted ranges instead of asserting.
    pub fn try_new(start: Timestamp, end: Timestamp) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Move both ends by `minutes` (negative moves earlier).
    pub fn shift_minutes(&self, minutes: i64) -> Self {
        let delta = Duration::minutes(minutes);
        Self {
            start: self.start + delta,
            end: self.end + delta,
        }
    }

    /// Same start, end pushed out by `minutes`.
    pub fn extend_end(&self, minutes: i64) -> Self {
        Self::new(self.start, self.end + Duration::minutes(minutes))
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &TimePeriod) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &TimePeriod) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Drop seconds and sub-second precision.
pub fn truncate_to_minute(t: Timestamp) -> Timestamp {
    t - Duration::seconds(i64::from(t.second())) - Duration::nanoseconds(i64::from(t.nanosecond()))
}

/// A busy block as reported by a calendar provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl BusyInterval {
    /// Normalize to UTC and truncate to the minute.
    pub fn new<Tz: TimeZone>(start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        Self {
            start: truncate_to_minute(start.with_timezone(&Utc)),
            end: truncate_to_minute(end.with_timezone(&Utc)),
        }
    }

    /// `None` when the provider handed back an inverted pair.
    pub fn period(&self) -> Option<TimePeriod> {
        TimePeriod::try_new(self.start, self.end)
    }
}

impl From<TimePeriod> for BusyInterval {
    fn from(p: TimePeriod) -> Self {
        BusyInterval::new(p.start, p.end)
    }
}

/// Recurring weekly time-of-day range an interviewer prefers to interview in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceWindow {
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl PreferenceWindow {
    /// Concrete period on `date` in the given local offset, if the weekday matches.
    pub fn period_on(&self, date: NaiveDate, offset: &FixedOffset) -> Option<TimePeriod> {
        use chrono::Datelike;
        if date.weekday() != self.weekday {
            return None;
        }
        let start = offset
            .from_local_datetime(&date.and_time(self.start))
            .single()?
            .with_timezone(&Utc);
        let end = offset
            .from_local_datetime(&date.and_time(self.end))
            .single()?
            .with_timezone(&Utc);
        TimePeriod::try_new(start, end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interviewer {
    pub address: String,
    /// Calendar id at the provider; the address when unset.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    /// Maximum interviews per ISO week; the configured default applies when unset.
    #[serde(default)]
    pub weekly_cap: Option<u32>,
    #[serde(default)]
    pub onsite_eligible: bool,
    #[serde(default)]
    pub preferences: Vec<PreferenceWindow>,
    /// Separate provider calendar whose busy blocks mark preferred times.
    #[serde(default)]
    pub preferences_calendar: Option<String>,
}

impl Interviewer {
    pub fn new(address: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            external_id: None,
            display_name: display_name.into(),
            weekly_cap: None,
            onsite_eligible: true,
            preferences: Vec::new(),
            preferences_calendar: None,
        }
    }

    pub fn calendar_id(&self) -> &str {
        self.external_id.as_deref().unwrap_or(&self.address)
    }
}

/// Requirement to draw exactly `num_required` distinct interviewers from the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewerGroup {
    pub num_required: usize,
    pub interviewers: Vec<Interviewer>,
}

impl InterviewerGroup {
    pub fn new(num_required: usize, interviewers: Vec<Interviewer>) -> Self {
        Self {
            num_required,
            interviewers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub address: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub onsite_suitable: bool,
}

impl Room {
    pub fn new(address: impl Into<String>, display_name: impl Into<String>, onsite_suitable: bool) -> Self {
        Self {
            address: address.into(),
            external_id: None,
            display_name: display_name.into(),
            onsite_suitable,
        }
    }

    pub fn calendar_id(&self) -> &str {
        self.external_id.as_deref().unwrap_or(&self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterviewType {
    OnSite,
    Skype,
    SkypeOnSite,
}

impl InterviewType {
    /// True when the candidate is physically on site.
    pub fn is_onsite(&self) -> bool {
        matches!(self, InterviewType::OnSite | InterviewType::SkypeOnSite)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            InterviewType::OnSite => "On Site",
            InterviewType::Skype => "SPI",
            InterviewType::SkypeOnSite => "Skype On Site",
        }
    }
}

/// Who (or what) occupies a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotOwner {
    Interviewer { address: String, display_name: String },
    Break,
    Room { address: String, display_name: String },
}

impl SlotOwner {
    pub fn address(&self) -> Option<&str> {
        match self {
            SlotOwner::Interviewer { address, .. } | SlotOwner::Room { address, .. } => Some(address),
            SlotOwner::Break => None,
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, SlotOwner::Break)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewSlot {
    pub owner: SlotOwner,
    pub period: TimePeriod,
    pub inside_preference: bool,
    pub has_buffer: bool,
    /// Interviews already on the owner's week; `None` for breaks and rooms.
    pub interviews_this_week: Option<u32>,
}

impl InterviewSlot {
    pub fn new(owner: SlotOwner, period: TimePeriod) -> Self {
        Self {
            owner,
            period,
            inside_preference: false,
            has_buffer: false,
            interviews_this_week: None,
        }
    }

    pub fn interviewer(interviewer: &Interviewer, period: TimePeriod) -> Self {
        Self::new(
            SlotOwner::Interviewer {
                address: interviewer.address.clone(),
                display_name: interviewer.display_name.clone(),
            },
            period,
        )
    }

    pub fn break_slot(period: TimePeriod) -> Self {
        Self::new(SlotOwner::Break, period)
    }

    pub fn room(room: &Room, period: TimePeriod) -> Self {
        Self::new(
            SlotOwner::Room {
                address: room.address.clone(),
                display_name: room.display_name.clone(),
            },
            period,
        )
    }
}

/// One ranked candidate schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interview {
    pub slots: Vec<InterviewSlot>,
    pub room: Option<InterviewSlot>,
    pub priority: i64,
}

impl Interview {
    /// From the first slot's start to the last slot's end.
    pub fn span(&self) -> Option<TimePeriod> {
        let first = self.slots.first()?;
        let last = self.slots.last()?;
        TimePeriod::try_new(first.period.start, last.period.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadKind {
    Interview,
    CodeTest,
    ResumeScreen,
}

/// An existing recruiting commitment counted against an interviewer's weekly cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRecord {
    pub interviewer: String,
    pub start: Timestamp,
    pub kind: LoadKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2012, 9, 27, h, m, 0).unwrap()
    }

    #[test]
    fn period_basics() {
        let p = TimePeriod::new(at(9, 0), at(9, 45));
        assert_eq!(p.duration_minutes(), 45);
        assert_eq!(p.shift_minutes(15), TimePeriod::new(at(9, 15), at(10, 0)));
        assert_eq!(p.shift_minutes(-60), TimePeriod::new(at(8, 0), at(8, 45)));
        assert_eq!(p.extend_end(15).end, at(10, 0));
    }

    #[test]
    fn period_contains() {
        let outer = TimePeriod::new(at(9, 0), at(12, 0));
        let inner = TimePeriod::new(at(10, 0), at(11, 0));
        let partial = TimePeriod::new(at(8, 0), at(10, 0));
        assert!(outer.contains(&inner));
        assert!(outer.contains(&outer)); // closed on both ends
        assert!(!outer.contains(&partial));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn period_overlap_is_exclusive_at_edges() {
        let a = TimePeriod::new(at(9, 0), at(10, 0));
        let b = TimePeriod::new(at(9, 30), at(10, 30));
        let c = TimePeriod::new(at(10, 0), at(11, 0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn try_new_rejects_inverted() {
        assert!(TimePeriod::try_new(at(10, 0), at(9, 0)).is_none());
        assert!(TimePeriod::try_new(at(10, 0), at(10, 0)).is_some());
    }

    #[test]
    fn busy_interval_truncates_seconds_and_normalizes() {
        let pst = FixedOffset::west_opt(7 * 3600).unwrap();
        let start = pst.with_ymd_and_hms(2012, 9, 27, 8, 0, 42).unwrap();
        let end = pst.with_ymd_and_hms(2012, 9, 27, 8, 15, 59).unwrap();
        let busy = BusyInterval::new(start, end);
        assert_eq!(busy.start, at(15, 0));
        assert_eq!(busy.end, at(15, 15));
    }

    #[test]
    fn preference_window_expands_on_matching_weekday_only() {
        let window = PreferenceWindow {
            weekday: Weekday::Thu,
            start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        };
        let utc = FixedOffset::east_opt(0).unwrap();
        let thursday = NaiveDate::from_ymd_opt(2012, 9, 27).unwrap();
        let friday = NaiveDate::from_ymd_opt(2012, 9, 28).unwrap();
        assert_eq!(
            window.period_on(thursday, &utc),
            Some(TimePeriod::new(at(10, 0), at(12, 0)))
        );
        assert_eq!(window.period_on(friday, &utc), None);
    }

    #[test]
    fn onsite_flags() {
        assert!(InterviewType::OnSite.is_onsite());
        assert!(InterviewType::SkypeOnSite.is_onsite());
        assert!(!InterviewType::Skype.is_onsite());
    }

    #[test]
    fn interviewer_calendar_id_falls_back_to_address() {
        let mut i = Interviewer::new("zoe@washburn.com", "Zoe");
        assert_eq!(i.calendar_id(), "zoe@washburn.com");
        i.external_id = Some("cal-123".into());
        assert_eq!(i.calendar_id(), "cal-123");
    }

    #[test]
    fn interview_span() {
        let i = Interview {
            slots: vec![
                InterviewSlot::break_slot(TimePeriod::new(at(9, 0), at(10, 15))),
                InterviewSlot::new(SlotOwner::Break, TimePeriod::new(at(10, 15), at(11, 0))),
            ],
            room: None,
            priority: 0,
        };
        assert_eq!(i.span(), Some(TimePeriod::new(at(9, 0), at(11, 0))));
    }
}
