//! Flattening of raw tracker issues into cache rows

use chrono::{DateTime, Duration, NaiveDateTime};
use serde_json::Value;
use tracing::debug;

use crate::models::IssueRecord;

/// Semantic columns filled from free-form custom fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Cost,
    Pending,
    Product,
}

/// Ordered role → field-name fragment table.
///
/// A custom field takes the first role with a fragment contained in its
/// lowercased name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRoleMap {
    rules: Vec<(FieldRole, Vec<String>)>,
}

impl Default for FieldRoleMap {
    fn default() -> Self {
        Self::empty()
            .with_role(FieldRole::Cost, ["비용"])
            .with_role(FieldRole::Pending, ["pending"])
            .with_role(FieldRole::Product, ["설비군", "product"])
    }
}

impl FieldRoleMap {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add or replace the fragments for `role`. Blank fragments are ignored.
    pub fn with_role<I, P>(mut self, role: FieldRole, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.into().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        match self.rules.iter_mut().find(|(r, _)| *r == role) {
            Some((_, existing)) => *existing = patterns,
            None => self.rules.push((role, patterns)),
        }
        self
    }

    pub fn role_of(&self, field_name: &str) -> Option<FieldRole> {
        let name = field_name.to_lowercase();
        self.rules
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| name.contains(p.as_str())))
            .map(|(role, _)| *role)
    }
}

/// Turns raw issue JSON into [`IssueRecord`]s
#[derive(Debug, Clone)]
pub struct IssueExtractor {
    roles: FieldRoleMap,
    offset: Duration,
}

impl IssueExtractor {
    pub fn new(roles: FieldRoleMap, offset_hours: i64) -> Self {
        Self {
            roles,
            offset: Duration::hours(offset_hours),
        }
    }

    /// `None` when the payload has no numeric id
    pub fn extract(&self, raw: Value) -> Option<IssueRecord> {
        let redmine_id = raw.get("id")?.as_i64()?;

        let (project_id, project_name) = id_name(&raw, "project");
        let (tracker_id, tracker_name) = id_name(&raw, "tracker");
        let (status_id, status_name) = id_name(&raw, "status");
        let (priority_id, priority_name) = id_name(&raw, "priority");
        let (author_id, author_name) = id_name(&raw, "author");
        let (assigned_to_id, assigned_to_name) = id_name(&raw, "assigned_to");

        let is_closed = raw
            .get("status")
            .and_then(|s| s.get("is_closed"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut cost = String::new();
        let mut pending = String::new();
        let mut product = String::new();
        let fields = raw.get("custom_fields").and_then(Value::as_array);
        for field in fields.into_iter().flatten() {
            let name = field.get("name").and_then(Value::as_str).unwrap_or_default();
            let value = field.get("value").map(value_text).unwrap_or_default();
            match self.roles.role_of(name) {
                Some(FieldRole::Cost) => cost = value,
                Some(FieldRole::Pending) => pending = value,
                Some(FieldRole::Product) => product = value,
                None => {}
            }
        }

        let created_on = self.shift(redmine_id, raw.get("created_on"));
        let updated_on = self.shift(redmine_id, raw.get("updated_on"));

        Some(IssueRecord {
            redmine_id,
            project_id,
            project_name,
            tracker_id,
            tracker_name,
            status_id,
            status_name,
            is_closed,
            priority_id,
            priority_name,
            author_id,
            author_name,
            assigned_to_id,
            assigned_to_name,
            subject: text(&raw, "subject"),
            description: text(&raw, "description"),
            cost,
            pending,
            product,
            created_on,
            updated_on,
            raw_data: raw,
        })
    }

    fn shift(&self, redmine_id: i64, value: Option<&Value>) -> Option<NaiveDateTime> {
        let raw = value?.as_str()?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.naive_utc() + self.offset),
            Err(e) => {
                debug!(redmine_id, value = raw, error = %e, "Unparseable issue timestamp");
                None
            }
        }
    }
}

fn id_name(raw: &Value, key: &str) -> (Option<i64>, String) {
    match raw.get(key) {
        Some(obj) if obj.is_object() => (
            obj.get("id").and_then(Value::as_i64),
            obj.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        ),
        _ => (None, String::new()),
    }
}

fn text(raw: &Value, key: &str) -> String {
    raw.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Custom field values may be strings, numbers or lists of either
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
