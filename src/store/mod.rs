//! Storage seams for the cached tracker data
//!
//! Every `replace_*` operation is a snapshot swap: after it returns, the
//! table holds exactly the rows passed in. Implementations must make the swap
//! atomic with respect to readers.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    IssueFilter, IssueRecord, IssueStatus, ProjectNode, ProjectRecord, RoadmapVersion, UserApiKey,
};

/// Flat project snapshot and derived tree
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    async fn replace_snapshot(&self, records: &[ProjectRecord]) -> Result<usize>;

    async fn replace_tree(&self, nodes: &[ProjectNode]) -> Result<usize>;

    async fn load_tree(&self) -> Result<Vec<ProjectNode>>;
}

/// Issue cache and status catalogue
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn replace_issues(&self, issues: &[IssueRecord]) -> Result<usize>;

    /// Issues matching the filter, most recently updated first
    async fn issues_by_filter(&self, filter: &IssueFilter) -> Result<Vec<IssueRecord>>;

    /// Issues with the given ids, in the order requested; unknown ids are skipped
    async fn issues_by_ids(&self, ids: &[i64]) -> Result<Vec<IssueRecord>>;

    /// Set the cached status name of one issue, only if it is still `old_status`
    async fn update_status_name(&self, redmine_id: i64, old_status: &str, new_status: &str) -> Result<()>;

    async fn replace_statuses(&self, statuses: &[IssueStatus]) -> Result<usize>;

    async fn status_by_name(&self, name: &str) -> Result<Option<IssueStatus>>;
}

/// Per-user tracker credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or update by `user_id`, keeping the original `created_at`
    async fn upsert_user_key(&self, key: &UserApiKey) -> Result<()>;

    async fn user_key(&self, user_id: &str) -> Result<Option<UserApiKey>>;
}

/// Customer roadmap versions
#[async_trait]
pub trait RoadmapStore: Send + Sync {
    async fn replace_roadmap(&self, versions: &[RoadmapVersion]) -> Result<usize>;

    /// Versions in `status`, newest first
    async fn roadmap_by_status(&self, status: &str) -> Result<Vec<RoadmapVersion>>;
}

/// Backend liveness
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// Everything the application needs from a backend
pub trait Store: HierarchyStore + IssueStore + CredentialStore + RoadmapStore + StoreHealth {}

impl<T> Store for T where T: HierarchyStore + IssueStore + CredentialStore + RoadmapStore + StoreHealth {}
