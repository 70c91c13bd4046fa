//! Core domain models for the tracker mirror

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a project node in the customer hierarchy.
///
/// The numeric codes are persisted and consumed by the dashboard, so they are
/// discrete identifiers rather than a tree depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Level {
    /// Top-level customer project
    Customer,
    /// Region or site directly under a customer
    Site,
    /// Building grouping equipment under a site
    Building,
    /// Product or equipment leaf
    Leaf,
    /// Headquarters administrative project
    Headquarters,
    /// Direct child of the headquarters project
    HeadquartersChild,
    /// Sample evaluation administrative project
    SampleEvaluation,
    /// Guide administrative project
    Guide,
}

impl Level {
    pub const fn code(self) -> i32 {
        match self {
            Level::Customer => 1,
            Level::Site => 2,
            Level::Building => 3,
            Level::Leaf => 4,
            Level::Headquarters => 11,
            Level::HeadquartersChild => 12,
            Level::SampleEvaluation => 21,
            Level::Guide => 31,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Level::Customer),
            2 => Some(Level::Site),
            3 => Some(Level::Building),
            4 => Some(Level::Leaf),
            11 => Some(Level::Headquarters),
            12 => Some(Level::HeadquartersChild),
            21 => Some(Level::SampleEvaluation),
            31 => Some(Level::Guide),
            _ => None,
        }
    }
}

impl From<Level> for i32 {
    fn from(level: Level) -> Self {
        level.code()
    }
}

impl TryFrom<i32> for Level {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Level::from_code(code).ok_or_else(|| format!("unknown level code {}", code))
    }
}

/// A project as returned by the tracker, before any tree analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub redmine_id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub raw_data: Value,
}

impl ProjectRecord {
    /// Build a record from the tracker's JSON. Entries without an id are
    /// rejected; a missing name is kept as an empty one.
    pub fn from_json(raw: Value) -> Option<Self> {
        let redmine_id = raw.get("id")?.as_i64()?;
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let parent_id = parent_of(&raw);
        Some(Self {
            redmine_id,
            name,
            parent_id,
            raw_data: raw,
        })
    }
}

/// Upstream parent reference (`parent.id`) of a raw project payload
pub fn parent_of(raw: &Value) -> Option<i64> {
    raw.get("parent")?.get("id")?.as_i64()
}

/// One node of the derived project tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    pub redmine_project_id: i64,
    pub project_name: String,
    pub parent_id: Option<i64>,
    pub children_ids: Vec<i64>,
    pub level: Level,
    pub raw_data: Value,
}

/// A cached issue with its related objects flattened into id/name pairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub redmine_id: i64,
    pub project_id: Option<i64>,
    pub project_name: String,
    pub tracker_id: Option<i64>,
    pub tracker_name: String,
    pub status_id: Option<i64>,
    pub status_name: String,
    pub is_closed: bool,
    pub priority_id: Option<i64>,
    pub priority_name: String,
    pub author_id: Option<i64>,
    pub author_name: String,
    pub assigned_to_id: Option<i64>,
    pub assigned_to_name: String,
    pub subject: String,
    pub description: String,
    pub cost: String,
    pub pending: String,
    pub product: String,
    /// Upstream creation time shifted into the reporting timezone
    pub created_on: Option<NaiveDateTime>,
    /// Upstream update time shifted into the reporting timezone
    pub updated_on: Option<NaiveDateTime>,
    pub raw_data: Value,
}

/// Entry of the tracker's issue status catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatus {
    pub id: i64,
    pub name: String,
    pub is_closed: bool,
}

/// A registered user credential, stored encrypted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserApiKey {
    /// Tracker login
    pub user_id: String,
    pub firstname: String,
    pub lastname: String,
    pub user_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub api_key_encrypted: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A customer project milestone with the issues attached to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapVersion {
    pub redmine_version_id: i64,
    pub project_id: i64,
    pub project_name: String,
    pub version_name: String,
    pub status: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub created_on: Option<DateTime<Utc>>,
    pub updated_on: Option<DateTime<Utc>>,
    pub wiki_page_title: String,
    pub wiki_page_url: String,
    /// Comma-joined issue ids
    pub connected_issue_ids: String,
}

impl RoadmapVersion {
    pub fn issue_ids(&self) -> Vec<i64> {
        self.connected_issue_ids
            .split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect()
    }
}

/// Date range plus project set used to select cached issues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFilter {
    pub start_date: NaiveDate,
    /// Inclusive: issues created at any time on this day match
    pub end_date: NaiveDate,
    pub project_ids: Vec<i64>,
}

impl IssueFilter {
    pub fn matches(&self, issue: &IssueRecord) -> bool {
        let Some(project_id) = issue.project_id else {
            return false;
        };
        let Some(created_on) = issue.created_on else {
            return false;
        };
        let day = created_on.date();
        day >= self.start_date && day <= self.end_date && self.project_ids.contains(&project_id)
    }
}

/// Outcome of a snapshot sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub message: String,
    pub fetched: usize,
    pub saved: usize,
    pub failed_batches: usize,
}

impl SyncReport {
    pub fn nothing_to_sync() -> Self {
        Self {
            message: "Nothing to sync".to_string(),
            ..Self::default()
        }
    }
}

/// Uniform response envelope
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}
