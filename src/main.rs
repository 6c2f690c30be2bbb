use std::collections::HashMap;
use std::io::Read;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use panelist::calendar::{CalendarProvider, MockCalendarProvider};
use panelist::config::{Config, ProviderConfig, ProviderKind};
use panelist::engine::{ScheduleRequest, Scheduler, SearchOutcome};
use panelist::groups::{Requisition, RequirementRules, assemble_groups};
use panelist::model::*;

/// Build the request's groups from requisition rules instead of listing them.
#[derive(Debug, Deserialize)]
struct Panel {
    requisition: String,
    roster: Vec<Requisition>,
    rules: RequirementRules,
    #[serde(default)]
    must_include: Vec<Interviewer>,
    #[serde(default)]
    exclude: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Input {
    request: ScheduleRequest,
    #[serde(default)]
    records: Vec<LoadRecord>,
    /// Mock provider only: busy time keyed by calendar id.
    #[serde(default)]
    busy: HashMap<String, Vec<TimePeriod>>,
    #[serde(default)]
    panel: Option<Panel>,
}

#[derive(Debug, Serialize)]
struct Output<'a> {
    #[serde(flatten)]
    outcome: &'a SearchOutcome,
    groups: &'a [InterviewerGroup],
}

fn read_input(path: Option<String>) -> Result<Input, Box<dyn std::error::Error>> {
    let raw = match path.as_deref() {
        Some("-") | None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
        Some(path) => std::fs::read_to_string(path)?,
    };
    Ok(serde_json::from_str(&raw)?)
}

fn resolve_groups(input: &mut Input) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(panel) = input.panel.take() {
        let requirements = panel
            .rules
            .resolve(&panel.requisition, input.request.interview_type, &panel.roster)?;
        input.request.groups = assemble_groups(requirements, &panel.must_include, &panel.exclude);
    }
    Ok(())
}

fn provider(
    config: &ProviderConfig,
    busy: HashMap<String, Vec<TimePeriod>>,
) -> Result<Box<dyn CalendarProvider>, Box<dyn std::error::Error>> {
    match config.kind {
        ProviderKind::Mock => {
            let mock = match config.mock_fill_seed {
                Some(seed) => MockCalendarProvider::with_random_fill(seed),
                None => MockCalendarProvider::new(),
            };
            for (calendar, periods) in busy {
                for period in periods {
                    mock.register_busyness(calendar.clone(), period);
                }
            }
            Ok(Box::new(mock))
        }
        #[cfg(feature = "google")]
        ProviderKind::Google => {
            use panelist::calendar::RetryingProvider;
            use panelist::calendar::google::GoogleCalendarProvider;
            let google = GoogleCalendarProvider::from_config(config)?;
            Ok(Box::new(RetryingProvider::new(google, config.retry.clone())))
        }
        #[cfg(not(feature = "google"))]
        ProviderKind::Google => Err("built without the google feature".into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = Config::from_env();
    panelist::observability::init(config.metrics_port)?;

    let mut input = read_input(std::env::args().nth(1))?;
    resolve_groups(&mut input)?;
    let provider = provider(&config.provider, std::mem::take(&mut input.busy))?;
    info!(
        provider = ?config.provider.kind,
        groups = input.request.groups.len(),
        workers = config.scheduler.workers,
        "scheduling"
    );

    // Ctrl-c stops the search and prints whatever was found so far.
    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, returning partial results");
            on_interrupt.cancel();
        }
    });

    let scheduler = Scheduler::new(config.scheduler);
    let outcome = scheduler
        .fetch_and_schedule(provider.as_ref(), &input.request, &input.records, token)
        .await?;

    let output = Output {
        outcome: &outcome,
        groups: &input.request.groups,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
