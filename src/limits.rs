/// Length of one interview slot.
pub const MINUTES_OF_INTERVIEW: i64 = 45;

/// Anchor chunks only start on multiples of this many minutes.
pub const SCAN_RESOLUTION_MINUTES: i64 = 15;

/// Free time wanted after a slot for it to earn the padding bonus.
pub const IDEAL_PADDING_MINUTES: i64 = 15;

/// Weekly interview cap for interviewers without their own.
pub const DEFAULT_WEEKLY_CAP: u32 = 3;

/// Attempt ceiling for one search.
pub const MAX_SEARCH_ATTEMPTS: u64 = 100_000;

/// Accepted candidates collected before the search stops early.
pub const DEFAULT_MAX_SCHEDULES: usize = 100;

/// Ranked schedules handed back to the caller.
pub const TOP_K_SCHEDULES: usize = 20;

/// Only try a break in the first two positions of a schedule.
pub const BREAK_POSITIONS: usize = 2;

/// Widest search window accepted (one ISO week).
pub const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;

/// Upper bound on parallel search workers.
pub const MAX_WORKERS: usize = 64;

/// Cancellation and deadline are polled every this many attempts.
pub const CANCEL_POLL_INTERVAL: u64 = 256;

/// Largest accepted local UTC offset, just under a day.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 23 * 60 + 59;
