//! Turning requisition pools into interviewer groups for a request.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::SchedulerError;
use crate::model::*;

/// A hiring requisition and the interviewers who may interview for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub name: String,
    pub interviewers: Vec<Interviewer>,
}

/// Draw `num_required` from `pool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRequirement {
    pub num_required: usize,
    pub pool: Vec<Interviewer>,
}

impl PoolRequirement {
    pub fn new(num_required: usize, pool: Vec<Interviewer>) -> Self {
        Self { num_required, pool }
    }
}

/// Build disjoint groups.
///
/// Excluded addresses leave every pool. Must-include interviewers form a
/// leading group that requires all of them. The remaining groups are ordered
/// smallest pool first, and anyone already in an earlier group is removed
/// from later ones. Groups requiring nobody are dropped.
pub fn assemble_groups(
    requirements: Vec<PoolRequirement>,
    must_include: &[Interviewer],
    exclude: &[String],
) -> Vec<InterviewerGroup> {
    let excluded: HashSet<&str> = exclude.iter().map(String::as_str).collect();

    let mut pools: Vec<PoolRequirement> = requirements
        .into_iter()
        .map(|mut req| {
            let mut seen = HashSet::new();
            req.pool
                .retain(|i| !excluded.contains(i.address.as_str()) && seen.insert(i.address.clone()));
            req
        })
        .collect();
    pools.sort_by_key(|req| req.pool.len());

    let mut must = must_include.to_vec();
    let mut seen = HashSet::new();
    must.retain(|i| seen.insert(i.address.clone()));
    if !must.is_empty() {
        pools.insert(0, PoolRequirement::new(must.len(), must));
    }

    let mut taken: HashSet<String> = HashSet::new();
    let mut groups = Vec::with_capacity(pools.len());
    for req in pools {
        let pool: Vec<Interviewer> = req
            .pool
            .into_iter()
            .filter(|i| !taken.contains(&i.address))
            .collect();
        taken.extend(pool.iter().map(|i| i.address.clone()));
        if req.num_required == 0 {
            continue;
        }
        groups.push(InterviewerGroup::new(req.num_required, pool));
    }
    debug!(groups = groups.len(), "interviewer groups assembled");
    groups
}

/// `(count, requisition name prefix)` pairs per requisition and interview type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementRules {
    rules: HashMap<String, HashMap<InterviewType, Vec<(usize, String)>>>,
}

impl RequirementRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, requisition: impl Into<String>, interview_type: InterviewType, requirements: Vec<(usize, String)>) {
        self.rules
            .entry(requisition.into())
            .or_default()
            .insert(interview_type, requirements);
    }

    /// `None` when there is no rule for the requisition or type.
    pub fn requirements(&self, requisition: &str, interview_type: InterviewType) -> Option<&[(usize, String)]> {
        self.rules
            .get(requisition)?
            .get(&interview_type)
            .map(Vec::as_slice)
    }

    /// Resolve each prefix to the first roster requisition whose name starts
    /// with it.
    pub fn resolve(
        &self,
        requisition: &str,
        interview_type: InterviewType,
        roster: &[Requisition],
    ) -> Result<Vec<PoolRequirement>, SchedulerError> {
        let requirements = self.requirements(requisition, interview_type).ok_or_else(|| {
            SchedulerError::Configuration(format!(
                "no interview rule for {requisition} ({})",
                interview_type.display_name()
            ))
        })?;

        requirements
            .iter()
            .map(|(count, prefix)| {
                roster
                    .iter()
                    .find(|r| r.name.starts_with(prefix.as_str()))
                    .map(|r| PoolRequirement::new(*count, r.interviewers.clone()))
                    .ok_or_else(|| SchedulerError::Configuration(format!("no requisition matches {prefix}")))
            })
            .collect()
    }
}
