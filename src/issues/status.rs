//! Issue status catalogue and user-attributed status changes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::SyncReport;
use crate::services::credentials::{user_api_key, ApiKeyCipher};
use crate::services::tracker::TrackerClient;
use crate::store::{CredentialStore, IssueStore};

/// Replace the cached status catalogue with the tracker's
pub async fn sync_statuses<S: IssueStore + ?Sized>(tracker: &TrackerClient, store: &S) -> Result<SyncReport> {
    let statuses = tracker.issue_statuses().await?;
    let fetched = statuses.len();
    let saved = store.replace_statuses(&statuses).await?;

    info!(saved, "Issue statuses synced");
    Ok(SyncReport {
        message: format!("Synced {} issue statuses", saved),
        fetched,
        saved,
        failed_batches: 0,
    })
}

/// Status transition requested from the progress board
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub redmine_id: Option<i64>,
    pub old_status_name: Option<String>,
    pub new_status_name: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChanged {
    pub redmine_id: i64,
    pub old_status: String,
    pub new_status: String,
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn status_name(issue: &Value) -> &str {
    issue
        .get("status")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Applies status changes upstream with the requesting user's own key
pub struct StatusChanger<'a, S: ?Sized> {
    pub tracker: &'a TrackerClient,
    pub store: &'a S,
    pub cipher: &'a ApiKeyCipher,
}

impl<'a, S: IssueStore + CredentialStore + ?Sized> StatusChanger<'a, S> {
    /// Move an issue from `old_status_name` to `new_status_name`.
    ///
    /// The tracker's answer to the update is not trusted on its own: the issue
    /// is re-read with the system key and the change only counts if the new
    /// status is observed. The cache is updated last.
    pub async fn change(&self, request: &StatusChange) -> Result<StatusChanged> {
        let (Some(redmine_id), Some(old_status), Some(new_status), Some(user_id)) = (
            request.redmine_id,
            required(&request.old_status_name),
            required(&request.new_status_name),
            required(&request.user_id),
        ) else {
            return Err(AppError::InvalidRequest(
                "redmine_id, old_status_name, new_status_name and user_id are required".into(),
            ));
        };

        let api_key = user_api_key(self.store, self.cipher, user_id).await?;

        let issue = self.tracker.issue(redmine_id, Some(&api_key)).await?;
        let current = status_name(&issue);
        if current != old_status {
            return Err(AppError::Conflict(format!(
                "issue #{} is in status '{}', expected '{}'",
                redmine_id, current, old_status
            )));
        }

        let status = self
            .store
            .status_by_name(new_status)
            .await?
            .ok_or_else(|| AppError::InvalidRequest(format!("unknown status '{}'", new_status)))?;

        if !self.tracker.update_issue_status(redmine_id, status.id, &api_key).await? {
            return Err(AppError::PermissionDenied(format!(
                "tracker refused to update issue #{}",
                redmine_id
            )));
        }

        let observed = self.tracker.issue(redmine_id, None).await?;
        let actual = status_name(&observed);
        if actual != new_status {
            warn!(redmine_id, user_id, actual, "Status change did not take effect upstream");
            return Err(AppError::PermissionDenied(format!(
                "status was not changed; current status is '{}'",
                actual
            )));
        }

        self.store.update_status_name(redmine_id, old_status, new_status).await?;
        info!(redmine_id, user_id, old_status, new_status, "Issue status changed");

        Ok(StatusChanged {
            redmine_id,
            old_status: old_status.to_string(),
            new_status: new_status.to_string(),
        })
    }
}
