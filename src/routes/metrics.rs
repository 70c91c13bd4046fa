//! Prometheus metrics endpoint

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::response::IntoResponse;

use crate::error::Result;
use crate::models::SyncReport;
use crate::state::AppState;

/// Which snapshot a sync run refreshed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Projects,
    Issues,
    Statuses,
    Roadmap,
}

/// Sync counters for Prometheus
#[derive(Default)]
pub struct Metrics {
    sync_runs_total: AtomicU64,
    sync_failures_total: AtomicU64,
    projects_synced_total: AtomicU64,
    issues_synced_total: AtomicU64,
    failed_batches_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished sync run
    pub fn observe(&self, kind: SyncKind, outcome: &Result<SyncReport>) {
        self.sync_runs_total.fetch_add(1, Ordering::Relaxed);

        let report = match outcome {
            Ok(report) => report,
            Err(_) => {
                self.sync_failures_total.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        self.failed_batches_total
            .fetch_add(report.failed_batches as u64, Ordering::Relaxed);
        match kind {
            SyncKind::Projects => {
                self.projects_synced_total
                    .fetch_add(report.saved as u64, Ordering::Relaxed);
            }
            SyncKind::Issues => {
                self.issues_synced_total
                    .fetch_add(report.saved as u64, Ordering::Relaxed);
            }
            SyncKind::Statuses | SyncKind::Roadmap => {}
        }
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sync_runs_total: self.sync_runs_total.load(Ordering::Relaxed),
            sync_failures_total: self.sync_failures_total.load(Ordering::Relaxed),
            projects_synced_total: self.projects_synced_total.load(Ordering::Relaxed),
            issues_synced_total: self.issues_synced_total.load(Ordering::Relaxed),
            failed_batches_total: self.failed_batches_total.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sync_runs_total: u64,
    pub sync_failures_total: u64,
    pub projects_synced_total: u64,
    pub issues_synced_total: u64,
    pub failed_batches_total: u64,
}

/// GET /metrics
///
/// Returns Prometheus-format metrics
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.get_metrics();

    let output = format!(
        r#"# HELP tracker_dash_sync_runs_total Total number of sync runs
# TYPE tracker_dash_sync_runs_total counter
tracker_dash_sync_runs_total {}

# HELP tracker_dash_sync_failures_total Total number of sync runs that failed
# TYPE tracker_dash_sync_failures_total counter
tracker_dash_sync_failures_total {}

# HELP tracker_dash_projects_synced_total Total number of project tree rows written
# TYPE tracker_dash_projects_synced_total counter
tracker_dash_projects_synced_total {}

# HELP tracker_dash_issues_synced_total Total number of issue rows written
# TYPE tracker_dash_issues_synced_total counter
tracker_dash_issues_synced_total {}

# HELP tracker_dash_failed_batches_total Total number of fetch batches skipped after an upstream error
# TYPE tracker_dash_failed_batches_total counter
tracker_dash_failed_batches_total {}

# HELP tracker_dash_info Build information
# TYPE tracker_dash_info gauge
tracker_dash_info{{version="{}"}} 1
"#,
        snapshot.sync_runs_total,
        snapshot.sync_failures_total,
        snapshot.projects_synced_total,
        snapshot.issues_synced_total,
        snapshot.failed_batches_total,
        env!("CARGO_PKG_VERSION"),
    );

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
}
