use std::net::SocketAddr;

// ── Search ───────────────────────────────────────────────────────

/// Counter: scheduling requests. Labels: status.
pub const SEARCHES_TOTAL: &str = "panelist_searches_total";

/// Histogram: end-to-end scheduling time in seconds, calendar fetches included.
pub const SEARCH_DURATION_SECONDS: &str = "panelist_search_duration_seconds";

/// Histogram: anchored attempts consumed per search.
pub const SEARCH_ATTEMPTS: &str = "panelist_search_attempts";

/// Histogram: schedules returned per search.
pub const SCHEDULES_RETURNED: &str = "panelist_schedules_returned";

/// Counter: interviewers removed by the capacity pruner.
pub const INTERVIEWERS_PRUNED_TOTAL: &str = "panelist_interviewers_pruned_total";

// ── Calendar provider ────────────────────────────────────────────

/// Counter: provider calls. Labels: op.
pub const PROVIDER_REQUESTS_TOTAL: &str = "panelist_provider_requests_total";

/// Counter: retried provider calls. Labels: op.
pub const PROVIDER_RETRIES_TOTAL: &str = "panelist_provider_retries_total";

/// Counter: calendar events created by booking.
pub const EVENTS_BOOKED_TOTAL: &str = "panelist_events_booked_total";

/// Install the Prometheus exporter on `port`. No-op when `port` is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Label for a scheduling outcome.
pub fn status_label<T>(result: &Result<T, crate::engine::SchedulerError>) -> &'static str {
    use crate::engine::SchedulerError;
    match result {
        Ok(_) => "ok",
        Err(SchedulerError::Configuration(_)) => "configuration",
        Err(SchedulerError::NoInterviewersAvailable { .. }) => "no_interviewers",
        Err(SchedulerError::MalformedGroup { .. }) => "malformed_group",
        Err(SchedulerError::Provider(_)) => "provider",
    }
}
