use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::RetryPolicy;
use crate::engine::{ScoringWeights, SearchLimits};
use crate::limits::*;

/// How free time is derived from busy blocks inside a query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FreeTimePolicy {
    /// Complement of busy time within the window, including the spans that
    /// touch the window edges.
    #[default]
    WholeWindow,
    /// Only gaps strictly between two busy blocks; a gap is also skipped when
    /// its left block starts at the window start or its right block ends at
    /// the window end.
    InteriorGapsOnly,
}

impl FromStr for FreeTimePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "whole_window" | "whole-window" | "whole" => Ok(FreeTimePolicy::WholeWindow),
            "interior_gaps_only" | "interior-gaps-only" | "interior" => {
                Ok(FreeTimePolicy::InteriorGapsOnly)
            }
            other => Err(format!("unknown free time policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    #[default]
    Mock,
    Google,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(ProviderKind::Mock),
            "google" => Ok(ProviderKind::Google),
            other => Err(format!("unknown calendar provider: {other}")),
        }
    }
}

/// Everything the search engine needs besides the request itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cap for interviewers without their own. `None` makes a missing cap a
    /// configuration error.
    pub default_weekly_cap: Option<u32>,
    pub free_time_policy: FreeTimePolicy,
    /// Local offset used for ISO weeks and preference windows.
    pub utc_offset_minutes: i32,
    pub limits: SearchLimits,
    pub weights: ScoringWeights,
    /// 1 runs the search on the calling thread.
    pub workers: usize,
    pub deadline: Option<Duration>,
    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_weekly_cap: Some(DEFAULT_WEEKLY_CAP),
            free_time_policy: FreeTimePolicy::default(),
            utc_offset_minutes: 0,
            limits: SearchLimits::default(),
            weights: ScoringWeights::default(),
            workers: 1,
            deadline: None,
            seed: None,
        }
    }
}

impl SchedulerConfig {
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub google_token: Option<String>,
    pub google_base_url: String,
    pub retry: RetryPolicy,
    /// Seed for the mock provider's random calendar fill; no fill when unset.
    pub mock_fill_seed: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Mock,
            google_token: None,
            google_base_url: "https://www.googleapis.com/calendar/v3".into(),
            retry: RetryPolicy::default(),
            mock_fill_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub provider: ProviderConfig,
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Read `PANELIST_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value lookup; unset or unparsable keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| -> Option<String> {
            lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };
        fn parse_opt<T: FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let v = raw?;
            match v.parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    tracing::warn!("ignoring unparsable {key}={v}");
                    None
                }
            }
        }
        fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
            parse_opt(key, raw).unwrap_or(default)
        }

        let mut scheduler = SchedulerConfig::default();
        if let Some(cap) = parsed("PANELIST_DEFAULT_WEEKLY_CAP") {
            scheduler.default_weekly_cap = if cap.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_or("PANELIST_DEFAULT_WEEKLY_CAP", Some(cap), DEFAULT_WEEKLY_CAP))
            };
        }
        scheduler.free_time_policy = parse_or(
            "PANELIST_FREE_TIME_POLICY",
            parsed("PANELIST_FREE_TIME_POLICY"),
            scheduler.free_time_policy,
        );
        let offset = parse_or("PANELIST_UTC_OFFSET_MINUTES", parsed("PANELIST_UTC_OFFSET_MINUTES"), 0);
        scheduler.utc_offset_minutes = match offset {
            m if (-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&m) => m,
            m => {
                tracing::warn!("ignoring out-of-range PANELIST_UTC_OFFSET_MINUTES={m}");
                0
            }
        };
        scheduler.limits.max_attempts = parse_or(
            "PANELIST_MAX_ATTEMPTS",
            parsed("PANELIST_MAX_ATTEMPTS"),
            scheduler.limits.max_attempts,
        );
        scheduler.limits.top_k = parse_or("PANELIST_TOP_K", parsed("PANELIST_TOP_K"), scheduler.limits.top_k);
        scheduler.workers = parse_or("PANELIST_WORKERS", parsed("PANELIST_WORKERS"), 1usize).clamp(1, MAX_WORKERS);
        scheduler.deadline = parse_opt("PANELIST_DEADLINE_MS", parsed("PANELIST_DEADLINE_MS")).map(Duration::from_millis);
        scheduler.seed = parse_opt("PANELIST_SEED", parsed("PANELIST_SEED"));

        let mut provider = ProviderConfig {
            kind: parse_or("PANELIST_PROVIDER", parsed("PANELIST_PROVIDER"), ProviderKind::Mock),
            google_token: parsed("PANELIST_GOOGLE_TOKEN"),
            mock_fill_seed: parse_opt("PANELIST_MOCK_FILL_SEED", parsed("PANELIST_MOCK_FILL_SEED")),
            ..ProviderConfig::default()
        };
        if let Some(url) = parsed("PANELIST_GOOGLE_BASE_URL") {
            provider.google_base_url = url;
        }
        provider.retry.max_tries = parse_or(
            "PANELIST_RETRY_MAX_TRIES",
            parsed("PANELIST_RETRY_MAX_TRIES"),
            provider.retry.max_tries,
        )
        .max(1);
        if let Some(ms) = parse_opt("PANELIST_RETRY_BASE_DELAY_MS", parsed("PANELIST_RETRY_BASE_DELAY_MS")) {
            provider.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_opt("PANELIST_RETRY_MAX_DELAY_MS", parsed("PANELIST_RETRY_MAX_DELAY_MS")) {
            provider.retry.max_delay = Duration::from_millis(ms);
        }

        Self {
            scheduler,
            provider,
            metrics_port: parse_opt("PANELIST_METRICS_PORT", parsed("PANELIST_METRICS_PORT")),
        }
    }
}
