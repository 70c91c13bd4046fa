//! Dashboard aggregations over filtered issue lists
//!
//! Every function here is a pure transform of `&[IssueRecord]`. Report
//! endpoints assemble the results into an ordered list of [`Block`]s.

pub mod breakdown;
pub mod equipment;
pub mod member;
pub mod progress;

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::IssueRecord;

pub use breakdown::{type_breakdown, type_counts};
pub use equipment::{hw_analysis, hw_overview, sw_analysis, sw_overview};
pub use member::{best_work_items, best_work_summary, member_breakdown};
pub use progress::{progress_detail, progress_summary};

/// One typed section of a report response
#[derive(Debug, Clone, Serialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'static str>,
    pub data: Value,
}

impl Block {
    pub fn new<T: Serialize>(kind: &'static str, data: &T) -> Result<Self> {
        let data = serde_json::to_value(data)
            .map_err(|e| AppError::InternalError(format!("failed to encode {} block: {}", kind, e)))?;
        Ok(Self { kind, title: None, data })
    }

    pub fn titled<T: Serialize>(kind: &'static str, title: &'static str, data: &T) -> Result<Self> {
        Ok(Self {
            title: Some(title),
            ..Self::new(kind, data)?
        })
    }
}

/// Percentage rounded to one decimal; zero when `total` is zero
pub fn rate(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Completed/in-progress counts over a set of issues
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Tally {
    pub total_count: usize,
    pub completed_count: usize,
    pub in_progress_count: usize,
    pub completion_rate: f64,
}

impl Tally {
    pub fn of<'a>(issues: impl IntoIterator<Item = &'a IssueRecord>) -> Self {
        let (mut total, mut completed) = (0, 0);
        for issue in issues {
            total += 1;
            if issue.is_closed {
                completed += 1;
            }
        }
        Self {
            total_count: total,
            completed_count: completed,
            in_progress_count: total - completed,
            completion_rate: rate(completed, total),
        }
    }
}

/// Issue fields shown in drill-down lists
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueBrief {
    pub redmine_id: i64,
    pub subject: String,
    pub description: String,
    pub is_closed: bool,
}

impl From<&IssueRecord> for IssueBrief {
    fn from(issue: &IssueRecord) -> Self {
        Self {
            redmine_id: issue.redmine_id,
            subject: issue.subject.clone(),
            description: issue.description.clone(),
            is_closed: issue.is_closed,
        }
    }
}

/// Group issues by `key`, keeping groups in first-seen order
pub(crate) fn group_by<'a, K, F>(
    issues: impl IntoIterator<Item = &'a IssueRecord>,
    key: F,
) -> Vec<(K, Vec<&'a IssueRecord>)>
where
    K: Eq + Hash + Clone,
    F: Fn(&IssueRecord) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, Vec<&'a IssueRecord>)> = Vec::new();
    for issue in issues {
        let k = key(issue);
        match index.get(&k) {
            Some(&i) => groups[i].1.push(issue),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, vec![issue]));
            }
        }
    }
    groups
}

/// Progress summary plus per-tracker breakdown
pub fn summary_report(issues: &[IssueRecord]) -> Result<Vec<Block>> {
    Ok(vec![
        Block::new("progress_summary", &progress_summary(issues))?,
        Block::new("type_data_list", &type_breakdown(issues))?,
    ])
}

pub fn progress_report(issues: &[IssueRecord]) -> Result<Vec<Block>> {
    Ok(vec![
        Block::new("progress_summary", &progress_summary(issues))?,
        Block::new("progress_detail", &progress_detail(issues))?,
    ])
}

pub fn type_report(issues: &[IssueRecord]) -> Result<Vec<Block>> {
    Ok(vec![
        Block::new("type_data", &type_counts(issues))?,
        Block::new("type_data_list", &type_breakdown(issues))?,
    ])
}

pub fn member_report(issues: &[IssueRecord]) -> Result<Vec<Block>> {
    Ok(vec![
        Block::new("best_member_summary", &best_work_summary(issues))?,
        Block::new("best_member_data", &best_work_items(issues))?,
        Block::titled("member_issue_type", "작업자별 이슈 유형", &member_breakdown(issues))?,
    ])
}

/// HW blocks; each one only when there are HW issues to show
pub fn hw_report(issues: &[IssueRecord]) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    if let Some(overview) = hw_overview(issues) {
        blocks.push(Block::titled("hw_overview", "HW 이슈 전체 요약", &overview)?);
    }
    let analysis = hw_analysis(issues);
    if !analysis.is_empty() {
        blocks.push(Block::titled("hw_summary", "HW 설비군별 분석", &analysis)?);
    }
    Ok(blocks)
}

pub fn sw_report(issues: &[IssueRecord]) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    if let Some(overview) = sw_overview(issues) {
        blocks.push(Block::titled("sw_overview", "SW 이슈 전체 요약", &overview)?);
    }
    let analysis = sw_analysis(issues);
    if !analysis.is_empty() {
        blocks.push(Block::titled("sw_summary", "SW 설비군별 분석", &analysis)?);
    }
    Ok(blocks)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    use crate::issues::test_support::issue;
    use crate::models::IssueRecord;

    /// Issue with tracker, status, author and product set
    pub fn tracked(
        id: i64,
        tracker: &str,
        status: &str,
        closed: bool,
        author: &str,
        product: &str,
    ) -> IssueRecord {
        let mut record = issue(id, 10, "2024-03-01 00:00:00", "2024-03-01 00:00:00");
        record.tracker_name = tracker.to_string();
        record.status_name = status.to_string();
        record.is_closed = closed;
        record.author_name = author.to_string();
        record.product = product.to_string();
        record.raw_data = json!({ "id": id, "custom_fields": [] });
        record
    }
}
