//! Per-author views: best-work highlights and workload by issue type

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::IssueRecord;
use crate::report::{group_by, rate};

/// Status marking an issue as showcased work
pub const BEST_WORK_STATUS: &str = "[AE]BEST 작업";

const TRACKER_PREFIXES: [&str; 3] = ["[AE][이슈] ", "[AE][Setup] ", "[AE] "];

/// Tracker name without its team/category prefix
pub fn clean_tracker_name(tracker_name: &str) -> String {
    TRACKER_PREFIXES
        .iter()
        .fold(tracker_name.to_string(), |name, prefix| name.replace(prefix, ""))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BestWorkCount {
    pub author: String,
    pub count: usize,
}

/// Best-work issues per author, most first. Issues without an author are not counted.
pub fn best_work_summary(issues: &[IssueRecord]) -> Vec<BestWorkCount> {
    let best = issues
        .iter()
        .filter(|i| i.status_name == BEST_WORK_STATUS && !i.author_name.is_empty());

    let mut summary: Vec<BestWorkCount> = group_by(best, |i| i.author_name.clone())
        .into_iter()
        .map(|(author, group)| BestWorkCount {
            author,
            count: group.len(),
        })
        .collect();
    summary.sort_by(|a, b| b.count.cmp(&a.count));
    summary
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BestWorkItem {
    pub author: String,
    pub product: String,
    pub issue_id: i64,
    pub subject: String,
}

pub fn best_work_items(issues: &[IssueRecord]) -> Vec<BestWorkItem> {
    issues
        .iter()
        .filter(|i| i.status_name == BEST_WORK_STATUS)
        .map(|i| BestWorkItem {
            author: i.author_name.clone(),
            product: i.product.clone(),
            issue_id: i.redmine_id,
            subject: i.subject.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub tracker: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberIssue {
    pub redmine_id: i64,
    pub subject: String,
    pub tracker_name: String,
    pub status_name: String,
    pub created_on: Option<NaiveDateTime>,
    pub updated_on: Option<NaiveDateTime>,
    pub description: String,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductIssues {
    pub product: String,
    pub issues: Vec<MemberIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberWorkload {
    pub worker: String,
    pub total_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
    pub completion_rate: f64,
    pub in_progress_types: Vec<TypeCount>,
    pub completed_types: Vec<TypeCount>,
    pub products: Vec<ProductIssues>,
}

fn type_counts<'a>(issues: impl IntoIterator<Item = &'a IssueRecord>) -> Vec<TypeCount> {
    group_by(issues, |i| clean_tracker_name(&i.tracker_name))
        .into_iter()
        .map(|(tracker, group)| TypeCount {
            tracker,
            count: group.len(),
        })
        .collect()
}

/// Workload per author, busiest first
pub fn member_breakdown(issues: &[IssueRecord]) -> Vec<MemberWorkload> {
    let mut members: Vec<MemberWorkload> = group_by(issues, |i| i.author_name.clone())
        .into_iter()
        .map(|(worker, own)| {
            let completed = own.iter().filter(|i| i.is_closed).count();
            let products = group_by(own.iter().copied(), |i| i.product.clone())
                .into_iter()
                .map(|(product, group)| ProductIssues {
                    product,
                    issues: group
                        .into_iter()
                        .map(|i| MemberIssue {
                            redmine_id: i.redmine_id,
                            subject: i.subject.clone(),
                            tracker_name: i.tracker_name.clone(),
                            status_name: i.status_name.clone(),
                            created_on: i.created_on,
                            updated_on: i.updated_on,
                            description: i.description.clone(),
                            is_closed: i.is_closed,
                        })
                        .collect(),
                })
                .collect();

            MemberWorkload {
                total_tasks: own.len(),
                in_progress_tasks: own.len() - completed,
                completed_tasks: completed,
                completion_rate: rate(completed, own.len()),
                in_progress_types: type_counts(own.iter().copied().filter(|i| !i.is_closed)),
                completed_types: type_counts(own.iter().copied().filter(|i| i.is_closed)),
                products,
                worker,
            }
        })
        .collect();

    members.sort_by(|a, b| b.total_tasks.cmp(&a.total_tasks));
    members
}
