//! Database access layer with SQLx and PostgreSQL

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::{
    IssueFilter, IssueRecord, IssueStatus, Level, ProjectNode, ProjectRecord, RoadmapVersion, UserApiKey,
};
use crate::store::{CredentialStore, HierarchyStore, IssueStore, RoadmapStore, StoreHealth};

const ISSUE_COLUMNS: &str = r#"
    redmine_id, project_id, project_name, tracker_id, tracker_name,
    status_id, status_name, is_closed, priority_id, priority_name,
    author_id, author_name, assigned_to_id, assigned_to_name,
    subject, description, cost, pending, product,
    created_on, updated_on, raw_data
"#;

const ROADMAP_COLUMNS: &str = r#"
    redmine_version_id, project_id, project_name, version_name, status,
    description, due_date, created_on, updated_on,
    wiki_page_title, wiki_page_url, connected_issue_ids
"#;

/// Database connection pool and operations
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(5.min(max_connections))
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .connect(connection_string)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {}", e)))?;

        info!("Database connection pool established");
        Ok(Self { pool })
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// Stored children list; anything that is not an array of ids reads as empty
fn children_from(value: &Value) -> Vec<i64> {
    match value.as_array() {
        Some(ids) => ids.iter().filter_map(Value::as_i64).collect(),
        None => {
            debug!(value = %value, "Ignoring malformed children_ids");
            Vec::new()
        }
    }
}

fn node_from_row(row: &PgRow) -> Result<ProjectNode> {
    let code: i32 = row.try_get("level")?;
    let redmine_project_id: i64 = row.try_get("redmine_project_id")?;
    let level = Level::from_code(code).ok_or_else(|| {
        AppError::DatabaseError(format!(
            "project {} has unknown level code {}",
            redmine_project_id, code
        ))
    })?;
    let children: Value = row.try_get("children_ids")?;

    Ok(ProjectNode {
        redmine_project_id,
        project_name: row.try_get("project_name")?,
        parent_id: row.try_get("parent_id")?,
        children_ids: children_from(&children),
        level,
        raw_data: row.try_get("raw_data")?,
    })
}

fn issue_from_row(row: &PgRow) -> Result<IssueRecord> {
    Ok(IssueRecord {
        redmine_id: row.try_get("redmine_id")?,
        project_id: row.try_get("project_id")?,
        project_name: row.try_get("project_name")?,
        tracker_id: row.try_get("tracker_id")?,
        tracker_name: row.try_get("tracker_name")?,
        status_id: row.try_get("status_id")?,
        status_name: row.try_get("status_name")?,
        is_closed: row.try_get("is_closed")?,
        priority_id: row.try_get("priority_id")?,
        priority_name: row.try_get("priority_name")?,
        author_id: row.try_get("author_id")?,
        author_name: row.try_get("author_name")?,
        assigned_to_id: row.try_get("assigned_to_id")?,
        assigned_to_name: row.try_get("assigned_to_name")?,
        subject: row.try_get("subject")?,
        description: row.try_get("description")?,
        cost: row.try_get("cost")?,
        pending: row.try_get("pending")?,
        product: row.try_get("product")?,
        created_on: row.try_get("created_on")?,
        updated_on: row.try_get("updated_on")?,
        raw_data: row.try_get("raw_data")?,
    })
}

fn version_from_row(row: &PgRow) -> Result<RoadmapVersion> {
    Ok(RoadmapVersion {
        redmine_version_id: row.try_get("redmine_version_id")?,
        project_id: row.try_get("project_id")?,
        project_name: row.try_get("project_name")?,
        version_name: row.try_get("version_name")?,
        status: row.try_get("status")?,
        description: row.try_get("description")?,
        due_date: row.try_get("due_date")?,
        created_on: row.try_get("created_on")?,
        updated_on: row.try_get("updated_on")?,
        wiki_page_title: row.try_get("wiki_page_title")?,
        wiki_page_url: row.try_get("wiki_page_url")?,
        connected_issue_ids: row.try_get("connected_issue_ids")?,
    })
}

fn key_from_row(row: &PgRow) -> Result<UserApiKey> {
    Ok(UserApiKey {
        user_id: row.try_get("user_id")?,
        firstname: row.try_get("firstname")?,
        lastname: row.try_get("lastname")?,
        user_name: row.try_get("user_name")?,
        email: row.try_get("email")?,
        api_key_encrypted: row.try_get("api_key_encrypted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl HierarchyStore for Database {
    async fn replace_snapshot(&self, records: &[ProjectRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM projects_default").execute(&mut *tx).await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO projects_default (redmine_id, project_name, parent_id, raw_data)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(record.redmine_id)
            .bind(&record.name)
            .bind(record.parent_id)
            .bind(&record.raw_data)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = records.len(), "Replaced project snapshot");
        Ok(records.len())
    }

    async fn replace_tree(&self, nodes: &[ProjectNode]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM projects").execute(&mut *tx).await?;
        for node in nodes {
            sqlx::query(
                r#"
                INSERT INTO projects (
                    redmine_project_id, project_name, parent_id,
                    raw_data, children_ids, level
                ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(node.redmine_project_id)
            .bind(&node.project_name)
            .bind(node.parent_id)
            .bind(&node.raw_data)
            .bind(Value::from(node.children_ids.clone()))
            .bind(node.level.code())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = nodes.len(), "Replaced project tree");
        Ok(nodes.len())
    }

    async fn load_tree(&self) -> Result<Vec<ProjectNode>> {
        let rows = sqlx::query(
            r#"
            SELECT redmine_project_id, project_name, parent_id, raw_data, children_ids, level
            FROM projects
            ORDER BY redmine_project_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(node_from_row).collect()
    }
}

#[async_trait]
impl IssueStore for Database {
    async fn replace_issues(&self, issues: &[IssueRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM issues").execute(&mut *tx).await?;
        for issue in issues {
            sqlx::query(
                r#"
                INSERT INTO issues (
                    redmine_id, project_id, project_name, tracker_id, tracker_name,
                    status_id, status_name, is_closed, priority_id, priority_name,
                    author_id, author_name, assigned_to_id, assigned_to_name,
                    subject, description, cost, pending, product,
                    created_on, updated_on, raw_data
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
                )
                "#,
            )
            .bind(issue.redmine_id)
            .bind(issue.project_id)
            .bind(&issue.project_name)
            .bind(issue.tracker_id)
            .bind(&issue.tracker_name)
            .bind(issue.status_id)
            .bind(&issue.status_name)
            .bind(issue.is_closed)
            .bind(issue.priority_id)
            .bind(&issue.priority_name)
            .bind(issue.author_id)
            .bind(&issue.author_name)
            .bind(issue.assigned_to_id)
            .bind(&issue.assigned_to_name)
            .bind(&issue.subject)
            .bind(&issue.description)
            .bind(&issue.cost)
            .bind(&issue.pending)
            .bind(&issue.product)
            .bind(issue.created_on)
            .bind(issue.updated_on)
            .bind(&issue.raw_data)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = issues.len(), "Replaced issue cache");
        Ok(issues.len())
    }

    async fn issues_by_filter(&self, filter: &IssueFilter) -> Result<Vec<IssueRecord>> {
        if filter.project_ids.is_empty() {
            return Ok(Vec::new());
        }

        let end = filter
            .end_date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AppError::InvalidRequest(format!("end date {} out of range", filter.end_date)))?;

        let query = format!(
            r#"
            SELECT {}
            FROM issues
            WHERE created_on >= $1 AND created_on < $2 AND project_id = ANY($3)
            ORDER BY updated_on DESC NULLS LAST
            "#,
            ISSUE_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(day_start(filter.start_date))
            .bind(day_start(end))
            .bind(&filter.project_ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(issue_from_row).collect()
    }

    async fn issues_by_ids(&self, ids: &[i64]) -> Result<Vec<IssueRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!("SELECT {} FROM issues WHERE redmine_id = ANY($1)", ISSUE_COLUMNS);
        let rows = sqlx::query(&query).bind(ids).fetch_all(&self.pool).await?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in &rows {
            let issue = issue_from_row(row)?;
            by_id.insert(issue.redmine_id, issue);
        }
        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }

    async fn update_status_name(&self, redmine_id: i64, old_status: &str, new_status: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE issues
            SET status_name = $3
            WHERE redmine_id = $1 AND status_name = $2
            "#,
        )
        .bind(redmine_id)
        .bind(old_status)
        .bind(new_status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status_name FROM issues WHERE redmine_id = $1")
            .bind(redmine_id)
            .fetch_optional(&self.pool)
            .await?;

        match current {
            None => Err(AppError::NotFound(format!("issue #{} is not cached", redmine_id))),
            Some(current) => {
                warn!(redmine_id, current = %current, expected = %old_status, "Cached status moved");
                Err(AppError::Conflict(format!(
                    "issue #{} is in status '{}', expected '{}'",
                    redmine_id, current, old_status
                )))
            }
        }
    }

    async fn replace_statuses(&self, statuses: &[IssueStatus]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM issue_statuses").execute(&mut *tx).await?;
        for status in statuses {
            sqlx::query("INSERT INTO issue_statuses (id, name, is_closed) VALUES ($1, $2, $3)")
                .bind(status.id)
                .bind(&status.name)
                .bind(status.is_closed)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(statuses.len())
    }

    async fn status_by_name(&self, name: &str) -> Result<Option<IssueStatus>> {
        let row = sqlx::query("SELECT id, name, is_closed FROM issue_statuses WHERE name = $1 ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(IssueStatus {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                is_closed: row.try_get("is_closed")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn upsert_user_key(&self, key: &UserApiKey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_api_keys (
                user_id, firstname, lastname, user_name, email,
                api_key_encrypted, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                firstname = EXCLUDED.firstname,
                lastname = EXCLUDED.lastname,
                user_name = EXCLUDED.user_name,
                email = EXCLUDED.email,
                api_key_encrypted = EXCLUDED.api_key_encrypted,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.firstname)
        .bind(&key.lastname)
        .bind(&key.user_name)
        .bind(&key.email)
        .bind(&key.api_key_encrypted)
        .bind(key.created_at)
        .bind(key.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn user_key(&self, user_id: &str) -> Result<Option<UserApiKey>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, firstname, lastname, user_name, email,
                   api_key_encrypted, created_at, updated_at
            FROM user_api_keys
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(key_from_row).transpose()
    }
}

#[async_trait]
impl RoadmapStore for Database {
    async fn replace_roadmap(&self, versions: &[RoadmapVersion]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM roadmap_versions").execute(&mut *tx).await?;
        for version in versions {
            sqlx::query(
                r#"
                INSERT INTO roadmap_versions (
                    redmine_version_id, project_id, project_name, version_name, status,
                    description, due_date, created_on, updated_on,
                    wiki_page_title, wiki_page_url, connected_issue_ids
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(version.redmine_version_id)
            .bind(version.project_id)
            .bind(&version.project_name)
            .bind(&version.version_name)
            .bind(&version.status)
            .bind(&version.description)
            .bind(version.due_date)
            .bind(version.created_on)
            .bind(version.updated_on)
            .bind(&version.wiki_page_title)
            .bind(&version.wiki_page_url)
            .bind(&version.connected_issue_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(versions.len())
    }

    async fn roadmap_by_status(&self, status: &str) -> Result<Vec<RoadmapVersion>> {
        let query = format!(
            "SELECT {} FROM roadmap_versions WHERE status = $1 ORDER BY created_on DESC NULLS LAST, id",
            ROADMAP_COLUMNS
        );
        let rows = sqlx::query(&query).bind(status).fetch_all(&self.pool).await?;
        rows.iter().map(version_from_row).collect()
    }
}

#[async_trait]
impl StoreHealth for Database {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
