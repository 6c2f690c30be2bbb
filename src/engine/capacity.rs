use std::collections::{HashMap, HashSet};

use chrono::{Datelike, FixedOffset, IsoWeek};
use tracing::debug;

use crate::model::*;

use super::SchedulerError;

/// Interviewers that survived pruning, with their current weekly load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedPool {
    pub load: HashMap<String, u32>,
    pub groups: Vec<InterviewerGroup>,
}

pub struct CapacityPolicy {
    pub default_weekly_cap: Option<u32>,
    pub offset: FixedOffset,
}

fn iso_week(t: Timestamp, offset: &FixedOffset) -> IsoWeek {
    t.with_timezone(offset).iso_week()
}

/// Drop interviewers at their weekly cap (and, for onsite interviews, those
/// not eligible for onsites), then re-check every group can still be filled.
pub fn prune(
    groups: &[InterviewerGroup],
    window: &TimePeriod,
    records: &[LoadRecord],
    interview_type: InterviewType,
    policy: &CapacityPolicy,
) -> Result<PrunedPool, SchedulerError> {
    let week = iso_week(window.start, &policy.offset);
    if week != iso_week(window.end, &policy.offset) {
        return Err(SchedulerError::Configuration(
            "scheduling window must not cross an ISO week boundary".into(),
        ));
    }

    let mut week_load: HashMap<&str, u32> = HashMap::new();
    for record in records {
        if iso_week(record.start, &policy.offset) == week {
            *week_load.entry(record.interviewer.as_str()).or_default() += 1;
        }
    }

    let mut load: HashMap<String, u32> = HashMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut dropped = 0usize;
    for interviewer in groups.iter().flat_map(|g| &g.interviewers) {
        if !seen.insert(interviewer.address.as_str()) {
            continue;
        }
        let cap = interviewer
            .weekly_cap
            .or(policy.default_weekly_cap)
            .ok_or_else(|| {
                SchedulerError::Configuration(format!(
                    "no weekly interview cap for {} and no default configured",
                    interviewer.address
                ))
            })?;
        let count = week_load.get(interviewer.address.as_str()).copied().unwrap_or(0);
        if count >= cap {
            debug!(interviewer = %interviewer.address, count, cap, "at weekly cap, pruned");
            dropped += 1;
            continue;
        }
        if interview_type.is_onsite() && !interviewer.onsite_eligible {
            debug!(interviewer = %interviewer.address, "not onsite eligible, pruned");
            dropped += 1;
            continue;
        }
        load.insert(interviewer.address.clone(), count);
    }

    if dropped > 0 {
        metrics::counter!(crate::observability::INTERVIEWERS_PRUNED_TOTAL).increment(dropped as u64);
    }
    if load.is_empty() {
        return Err(SchedulerError::NoInterviewersAvailable { group: None });
    }

    let mut pruned_groups = Vec::with_capacity(groups.len());
    for (index, group) in groups.iter().enumerate() {
        let interviewers: Vec<Interviewer> = group
            .interviewers
            .iter()
            .filter(|i| load.contains_key(&i.address))
            .cloned()
            .collect();
        if interviewers.len() < group.num_required {
            return Err(SchedulerError::NoInterviewersAvailable { group: Some(index) });
        }
        pruned_groups.push(InterviewerGroup::new(group.num_required, interviewers));
    }

    Ok(PrunedPool {
        load,
        groups: pruned_groups,
    })
}
