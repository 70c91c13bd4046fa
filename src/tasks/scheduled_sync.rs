//! Scheduled sync - keeps the project tree and issue cache fresh

use std::time::Duration;

use tracing::{error, info};

use crate::state::AppState;

/// Background task that periodically rebuilds the project tree, then the
/// issue cache.
///
/// The first run waits one full interval; a failed project sync still lets
/// the issue sync run against the previous tree.
pub async fn scheduled_sync_task(state: AppState, every: Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(interval_secs = every.as_secs(), "Scheduled sync task started");

    loop {
        interval.tick().await;
        run_once(&state).await;
    }
}

/// One scheduled round: projects, then issues.
///
/// The issue sync replaces the whole cache, so it runs with the scheduled
/// limit rather than the manual default.
pub async fn run_once(state: &AppState) {
    info!("Running scheduled sync...");

    match state.sync_projects(None).await {
        Ok(report) => info!(saved = report.saved, failed_batches = report.failed_batches, "Scheduled project sync done"),
        Err(e) => error!(error = %e, "Scheduled project sync failed"),
    }

    match state.sync_issues(Some(state.config.scheduled_issue_sync_limit)).await {
        Ok(report) => info!(saved = report.saved, failed_batches = report.failed_batches, "Scheduled issue sync done"),
        Err(e) => error!(error = %e, "Scheduled issue sync failed"),
    }
}
