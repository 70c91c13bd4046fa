//! Per-tracker progress: summary counts and status-ordered detail

use serde::Serialize;

use crate::models::IssueRecord;
use crate::report::{group_by, Tally};

/// Trackers whose name contains this tag are internal and left out of the summary
pub const INTERNAL_TRACKER_TAG: &str = "[사내]";

/// Workflow order of statuses for the known trackers
pub fn workflow(tracker_name: &str) -> &'static [&'static str] {
    match tracker_name {
        "[AE][이슈] AE Part" => &[
            "[AE][운영]이슈 등록",
            "[AE][운영] 문제 조치",
            "[AE][운영] 확산 적용",
            "[AE][운영] 조치 완료",
            "[AE]BEST 작업",
        ],
        "[AE][이슈] HW Part" => &[
            "[AE][HW] 이슈 등록",
            "[AE][HW] 개선 방향 협의",
            "[AE][HW] 문제 조치",
            "[AE][HW] 확산",
            "[AE][HW] 조치 완료",
            "[AE]BEST 작업",
        ],
        "[AE][이슈] SW Part" => &[
            "[AE][SW] 이슈 등록",
            "[AE][SW] 개선 방향 협의",
            "[사내][SW] 개발",
            "[사내][SW] 개발 완료",
            "[AE][SW] 현장 적용",
            "[AE][SW] 확산 Patch",
            "[AE][SW] 조치 완료",
            "[AE]BEST 작업",
        ],
        "[AE][Setup] 이설 Setup" | "[AE][Setup] 초기 Setup" => &[
            "[AE][Setup] 반입&레벨링",
            "[AE][Setup] 기초 Setup",
            "[AE][Setup] TTTM",
            "[AE][Setup] 자동화",
            "[AE][Setup] Setup 완료",
        ],
        "[AE] 확산 적용" => &["[AE][확산] 확산 시작", "[AE][확산] 확산 완료"],
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status_name: String,
    pub total_count: usize,
    pub completed_count: usize,
    pub in_progress_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerProgress {
    pub tracker_name: String,
    #[serde(flatten)]
    pub tally: Tally,
    pub status_details: Vec<StatusCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub progress_data: Vec<TrackerProgress>,
}

/// Totals per tracker with per-status counts, largest tracker first
pub fn progress_summary(issues: &[IssueRecord]) -> ProgressSummary {
    let visible = issues
        .iter()
        .filter(|issue| !issue.tracker_name.contains(INTERNAL_TRACKER_TAG));

    let mut progress_data: Vec<TrackerProgress> = group_by(visible, |i| i.tracker_name.clone())
        .into_iter()
        .map(|(tracker_name, group)| {
            let status_details = group_by(group.iter().copied(), |i| i.status_name.clone())
                .into_iter()
                .map(|(status_name, in_status)| {
                    let tally = Tally::of(in_status);
                    StatusCount {
                        status_name,
                        total_count: tally.total_count,
                        completed_count: tally.completed_count,
                        in_progress_count: tally.in_progress_count,
                    }
                })
                .collect();
            TrackerProgress {
                tracker_name,
                tally: Tally::of(group),
                status_details,
            }
        })
        .collect();

    progress_data.sort_by(|a, b| b.tally.total_count.cmp(&a.tally.total_count));
    ProgressSummary { progress_data }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressIssue {
    pub redmine_id: i64,
    pub subject: String,
    pub description: String,
    pub status_name: String,
    pub assigned_to: String,
    pub author_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusColumn {
    pub status_name: String,
    pub issues: Vec<ProgressIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerDetail {
    pub tracker_name: String,
    pub status_details: Vec<StatusColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressDetail {
    pub progress_detail: Vec<TrackerDetail>,
}

fn progress_issue(issue: &IssueRecord) -> ProgressIssue {
    ProgressIssue {
        redmine_id: issue.redmine_id,
        subject: issue.subject.clone(),
        description: issue.description.clone(),
        status_name: issue.status_name.clone(),
        assigned_to: issue.assigned_to_name.clone(),
        author_name: issue.author_name.clone(),
    }
}

/// Board columns per tracker. Known workflows list every status in order,
/// empty ones included; statuses outside the workflow follow in first-seen order.
pub fn progress_detail(issues: &[IssueRecord]) -> ProgressDetail {
    let progress_detail = group_by(issues, |i| i.tracker_name.clone())
        .into_iter()
        .map(|(tracker_name, group)| {
            let order = workflow(&tracker_name);
            let mut by_status = group_by(group, |i| i.status_name.clone());

            let mut status_details: Vec<StatusColumn> = order
                .iter()
                .map(|status| {
                    let issues = by_status
                        .iter()
                        .position(|(name, _)| name == status)
                        .map(|pos| by_status.remove(pos).1)
                        .unwrap_or_default();
                    StatusColumn {
                        status_name: status.to_string(),
                        issues: issues.into_iter().map(progress_issue).collect(),
                    }
                })
                .collect();
            status_details.extend(by_status.into_iter().map(|(status_name, issues)| StatusColumn {
                status_name,
                issues: issues.into_iter().map(progress_issue).collect(),
            }));

            TrackerDetail {
                tracker_name,
                status_details,
            }
        })
        .collect();

    ProgressDetail { progress_detail }
}
