use chrono::{Duration, Timelike};

use crate::config::FreeTimePolicy;
use crate::model::*;

// ── Interval library ──────────────────────────────────────────────

/// Sort and merge busy spans. Touching spans (`end >= next.start`) merge.
pub fn collapse(pairs: &[TimePeriod]) -> Vec<TimePeriod> {
    if pairs.len() <= 1 {
        return pairs.to_vec();
    }
    let mut sorted = pairs.to_vec();
    sorted.sort();
    merge_overlapping(&sorted)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[TimePeriod]) -> Vec<TimePeriod> {
    let mut merged: Vec<TimePeriod> = Vec::with_capacity(sorted.len());
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && last.end >= span.start {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Remove every span in `to_remove` (sorted) from every span in `base` (sorted).
pub fn subtract_intervals(base: &[TimePeriod], to_remove: &[TimePeriod]) -> Vec<TimePeriod> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimePeriod::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(TimePeriod::new(current_start, current_end));
        }
    }

    result
}

/// Derive free time inside `window` from busy spans.
///
/// The interior-gaps rule looks at the unclamped blocks, so a block ending
/// exactly at the window start does not count as starting there.
pub fn free_times(busy: &[TimePeriod], window: &TimePeriod, policy: FreeTimePolicy) -> Vec<TimePeriod> {
    match policy {
        FreeTimePolicy::WholeWindow => {
            let clamped: Vec<TimePeriod> = busy
                .iter()
                .filter_map(|b| TimePeriod::try_new(b.start.max(window.start), b.end.min(window.end)))
                .filter(|b| b.start < b.end)
                .collect();
            subtract_intervals(&[*window], &collapse(&clamped))
        }
        FreeTimePolicy::InteriorGapsOnly => collapse(busy)
            .windows(2)
            .filter(|pair| pair[0].start != window.start && pair[1].end != window.end)
            .filter_map(|pair| TimePeriod::try_new(pair[0].end.max(window.start), pair[1].start.min(window.end)))
            .filter(|gap| gap.start < gap.end)
            .collect(),
    }
}

/// `[anchor + step*length, anchor + (step+1)*length]`; negative steps walk backwards.
pub fn time_period_after(anchor: Timestamp, length_minutes: i64, step: i64) -> TimePeriod {
    let start = anchor + Duration::minutes(length_minutes * step);
    TimePeriod::new(start, start + Duration::minutes(length_minutes))
}

/// Round `t` up to the next multiple of `resolution` minutes past the hour.
fn align_up(t: Timestamp, resolution: i64) -> Timestamp {
    let t = truncate_to_minute(t) + if t.second() > 0 || t.nanosecond() > 0 {
        Duration::minutes(1)
    } else {
        Duration::zero()
    };
    let rem = i64::from(t.minute()) % resolution;
    if rem == 0 {
        t
    } else {
        t + Duration::minutes(resolution - rem)
    }
}

/// Candidate anchor slots of `length` minutes cut from each free span.
///
/// Chunks start on the `resolution` grid and must end strictly before the
/// free span does.
pub fn interview_chunks(free: &[TimePeriod], length: i64, resolution: i64) -> Vec<TimePeriod> {
    let mut chunks = Vec::new();
    for span in free.iter().filter(|f| f.duration_minutes() >= length) {
        let mut start = align_up(span.start, resolution);
        loop {
            let chunk = TimePeriod::new(start, start + Duration::minutes(length));
            if chunk.end >= span.end {
                break;
            }
            debug_assert_eq!(i64::from(chunk.end.minute()) % resolution, 0);
            chunks.push(chunk);
            start += Duration::minutes(resolution);
        }
    }
    chunks
}
