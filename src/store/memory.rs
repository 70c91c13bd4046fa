//! In-memory storage backend.
//!
//! Used by the test suite and by `STORE=memory` for running the service
//! without Postgres. Each snapshot swap replaces a whole `Vec` under one write
//! lock, so readers see either the old or the new snapshot.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{AppError, Result};
use crate::models::{
    IssueFilter, IssueRecord, IssueStatus, ProjectNode, ProjectRecord, RoadmapVersion, UserApiKey,
};
use crate::store::{CredentialStore, HierarchyStore, IssueStore, RoadmapStore, StoreHealth};

#[derive(Default)]
struct Inner {
    snapshot: Vec<ProjectRecord>,
    tree: Vec<ProjectNode>,
    issues: Vec<IssueRecord>,
    statuses: Vec<IssueStatus>,
    user_keys: HashMap<String, UserApiKey>,
    roadmap: Vec<RoadmapVersion>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_len(&self) -> usize {
        self.inner.read().snapshot.len()
    }

    pub fn issue_count(&self) -> usize {
        self.inner.read().issues.len()
    }
}

#[async_trait]
impl HierarchyStore for MemoryStore {
    async fn replace_snapshot(&self, records: &[ProjectRecord]) -> Result<usize> {
        self.inner.write().snapshot = records.to_vec();
        Ok(records.len())
    }

    async fn replace_tree(&self, nodes: &[ProjectNode]) -> Result<usize> {
        self.inner.write().tree = nodes.to_vec();
        Ok(nodes.len())
    }

    async fn load_tree(&self) -> Result<Vec<ProjectNode>> {
        Ok(self.inner.read().tree.clone())
    }
}

#[async_trait]
impl IssueStore for MemoryStore {
    async fn replace_issues(&self, issues: &[IssueRecord]) -> Result<usize> {
        self.inner.write().issues = issues.to_vec();
        Ok(issues.len())
    }

    async fn issues_by_filter(&self, filter: &IssueFilter) -> Result<Vec<IssueRecord>> {
        let mut matched: Vec<IssueRecord> = self
            .inner
            .read()
            .issues
            .iter()
            .filter(|issue| filter.matches(issue))
            .cloned()
            .collect();
        matched.sort_by_key(|issue| Reverse(issue.updated_on));
        Ok(matched)
    }

    async fn issues_by_ids(&self, ids: &[i64]) -> Result<Vec<IssueRecord>> {
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.issues.iter().find(|issue| issue.redmine_id == *id))
            .cloned()
            .collect())
    }

    async fn update_status_name(&self, redmine_id: i64, old_status: &str, new_status: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let issue = inner
            .issues
            .iter_mut()
            .find(|issue| issue.redmine_id == redmine_id)
            .ok_or_else(|| AppError::NotFound(format!("issue #{} is not cached", redmine_id)))?;

        if issue.status_name != old_status {
            return Err(AppError::Conflict(format!(
                "issue #{} is in status '{}', expected '{}'",
                redmine_id, issue.status_name, old_status
            )));
        }
        issue.status_name = new_status.to_string();
        Ok(())
    }

    async fn replace_statuses(&self, statuses: &[IssueStatus]) -> Result<usize> {
        self.inner.write().statuses = statuses.to_vec();
        Ok(statuses.len())
    }

    async fn status_by_name(&self, name: &str) -> Result<Option<IssueStatus>> {
        Ok(self
            .inner
            .read()
            .statuses
            .iter()
            .find(|status| status.name == name)
            .cloned())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn upsert_user_key(&self, key: &UserApiKey) -> Result<()> {
        let mut inner = self.inner.write();
        let mut key = key.clone();
        if let Some(existing) = inner.user_keys.get(&key.user_id) {
            key.created_at = existing.created_at;
        }
        inner.user_keys.insert(key.user_id.clone(), key);
        Ok(())
    }

    async fn user_key(&self, user_id: &str) -> Result<Option<UserApiKey>> {
        Ok(self.inner.read().user_keys.get(user_id).cloned())
    }
}

#[async_trait]
impl RoadmapStore for MemoryStore {
    async fn replace_roadmap(&self, versions: &[RoadmapVersion]) -> Result<usize> {
        self.inner.write().roadmap = versions.to_vec();
        Ok(versions.len())
    }

    async fn roadmap_by_status(&self, status: &str) -> Result<Vec<RoadmapVersion>> {
        let mut versions: Vec<RoadmapVersion> = self
            .inner
            .read()
            .roadmap
            .iter()
            .filter(|version| version.status == status)
            .cloned()
            .collect();
        versions.sort_by_key(|version| Reverse(version.created_on));
        Ok(versions)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
