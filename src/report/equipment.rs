//! HW and SW part issues per equipment family (the issue's `product`)

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::issues::extract::value_text;
use crate::models::IssueRecord;
use crate::report::{group_by, rate};

pub const HW_TRACKER: &str = "[AE][이슈] HW Part";
pub const SW_TRACKER: &str = "[AE][이슈] SW Part";

/// Component entry recorded for HW issues that name no component
pub const NO_COMPONENT: &str = "없음";

const COMPONENT_FIELD_TAGS: [&str; 2] = ["[HW]", "[Optic]"];

fn after_ordinal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\d+\s*(.+)").expect("valid ordinal regex"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquipmentShare {
    pub total: usize,
    pub part: usize,
    pub part_ratio: f64,
    pub part_completion_rate: f64,
}

/// Share of one tracker's issues in the whole selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartOverview {
    pub tracker_name: &'static str,
    pub total_part_issues: usize,
    pub total_all_issues: usize,
    pub part_ratio: f64,
    pub completion_rate: f64,
    pub equipment_summary: BTreeMap<String, EquipmentShare>,
}

fn part_overview(issues: &[IssueRecord], tracker_name: &'static str) -> Option<PartOverview> {
    let is_part = |issue: &IssueRecord| issue.tracker_name == tracker_name;
    let part: Vec<&IssueRecord> = issues.iter().filter(|i| is_part(i)).collect();
    if part.is_empty() {
        return None;
    }
    let completed = part.iter().filter(|i| i.is_closed).count();

    let equipment_summary = group_by(issues, |i| i.product.clone())
        .into_iter()
        .map(|(product, group)| {
            let in_part: Vec<&&IssueRecord> = group.iter().filter(|i| is_part(i)).collect();
            let done = in_part.iter().filter(|i| i.is_closed).count();
            let share = EquipmentShare {
                total: group.len(),
                part: in_part.len(),
                part_ratio: rate(in_part.len(), group.len()),
                part_completion_rate: rate(done, in_part.len()),
            };
            (product, share)
        })
        .collect();

    Some(PartOverview {
        tracker_name,
        total_part_issues: part.len(),
        total_all_issues: issues.len(),
        part_ratio: rate(part.len(), issues.len()),
        completion_rate: rate(completed, part.len()),
        equipment_summary,
    })
}

/// `None` when the selection holds no HW issues
pub fn hw_overview(issues: &[IssueRecord]) -> Option<PartOverview> {
    part_overview(issues, HW_TRACKER)
}

/// `None` when the selection holds no SW issues
pub fn sw_overview(issues: &[IssueRecord]) -> Option<PartOverview> {
    part_overview(issues, SW_TRACKER)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HwIssue {
    pub redmine_id: i64,
    pub subject: String,
    pub description: String,
    pub is_closed: bool,
    pub hw_components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HwEquipment {
    pub total_hw_issues: usize,
    /// Every component value across the family's issues, `"없음"` for issues naming none
    pub hw_components: Vec<String>,
    pub hw_issues: Vec<HwIssue>,
}

/// Non-empty values of `[HW]`/`[Optic]` custom fields
pub fn hw_components(raw: &Value) -> Vec<String> {
    raw.get("custom_fields")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|field| {
            let name = field.get("name").and_then(Value::as_str).unwrap_or_default();
            COMPONENT_FIELD_TAGS.iter().any(|tag| name.contains(tag))
        })
        .filter_map(|field| field.get("value").map(value_text))
        .filter(|value| !value.is_empty())
        .collect()
}

pub fn hw_analysis(issues: &[IssueRecord]) -> BTreeMap<String, HwEquipment> {
    let hw = issues.iter().filter(|i| i.tracker_name == HW_TRACKER);

    group_by(hw, |i| i.product.clone())
        .into_iter()
        .map(|(product, group)| {
            let mut all_components = Vec::new();
            let hw_issues = group
                .iter()
                .map(|issue| {
                    let components = hw_components(&issue.raw_data);
                    if components.is_empty() {
                        all_components.push(NO_COMPONENT.to_string());
                    } else {
                        all_components.extend(components.iter().cloned());
                    }
                    HwIssue {
                        redmine_id: issue.redmine_id,
                        subject: issue.subject.clone(),
                        description: issue.description.clone(),
                        is_closed: issue.is_closed,
                        hw_components: components,
                    }
                })
                .collect();

            let equipment = HwEquipment {
                total_hw_issues: group.len(),
                hw_components: all_components,
                hw_issues,
            };
            (product, equipment)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwIssue {
    pub redmine_id: i64,
    pub subject: String,
    pub description: String,
    pub is_closed: bool,
    pub status_name: String,
    pub author_name: String,
    pub created_on: Option<NaiveDateTime>,
    pub updated_on: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwProjectGroup {
    pub project_id: Option<i64>,
    pub project_name: String,
    /// Part of the project name after its `#NN` ordinal
    pub label: String,
    pub total_issues: usize,
    pub sw_issues: Vec<SwIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwEquipment {
    pub total_sw_issues: usize,
    pub project_groups: Vec<SwProjectGroup>,
}

/// Equipment label of a project: text after `#NN`, else the full name
pub fn project_label(project_name: &str) -> String {
    after_ordinal()
        .captures(project_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| project_name.to_string())
}

pub fn sw_analysis(issues: &[IssueRecord]) -> BTreeMap<String, SwEquipment> {
    let sw = issues.iter().filter(|i| i.tracker_name == SW_TRACKER);

    group_by(sw, |i| i.product.clone())
        .into_iter()
        .map(|(product, group)| {
            let project_groups = group_by(group.iter().copied(), |i| i.project_id)
                .into_iter()
                .map(|(project_id, in_project)| {
                    let project_name = in_project[0].project_name.clone();
                    SwProjectGroup {
                        project_id,
                        label: project_label(&project_name),
                        project_name,
                        total_issues: in_project.len(),
                        sw_issues: in_project
                            .iter()
                            .map(|i| SwIssue {
                                redmine_id: i.redmine_id,
                                subject: i.subject.clone(),
                                description: i.description.clone(),
                                is_closed: i.is_closed,
                                status_name: i.status_name.clone(),
                                author_name: i.author_name.clone(),
                                created_on: i.created_on,
                                updated_on: i.updated_on,
                            })
                            .collect(),
                    }
                })
                .collect();

            let equipment = SwEquipment {
                total_sw_issues: group.len(),
                project_groups,
            };
            (product, equipment)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::tracked;
    use serde_json::json;

    #[test]
    fn test_hw_overview_shares() {
        let issues = vec![
            tracked(1, HW_TRACKER, "Done", true, "a", "Etcher"),
            tracked(2, HW_TRACKER, "New", false, "a", "Etcher"),
            tracked(3, SW_TRACKER, "New", false, "a", "Etcher"),
            tracked(4, SW_TRACKER, "New", false, "a", "Asher"),
        ];

        let overview = hw_overview(&issues).unwrap();
        assert_eq!(overview.total_part_issues, 2);
        assert_eq!(overview.total_all_issues, 4);
        assert_eq!(overview.part_ratio, 50.0);
        assert_eq!(overview.completion_rate, 50.0);

        let etcher = &overview.equipment_summary["Etcher"];
        assert_eq!((etcher.total, etcher.part), (3, 2));
        assert_eq!(etcher.part_ratio, 66.7);
        assert_eq!(overview.equipment_summary["Asher"].part_completion_rate, 0.0);

        assert!(hw_overview(&issues[2..]).is_none());
    }

    #[test]
    fn test_hw_components_and_placeholder() {
        let mut with_parts = tracked(1, HW_TRACKER, "New", false, "a", "Etcher");
        with_parts.raw_data = json!({"custom_fields": [
            {"name": "[HW] Part", "value": "Valve"},
            {"name": "[Optic] Lens", "value": ["L1", "L2"]},
            {"name": "[HW] Spare", "value": ""},
            {"name": "Owner", "value": "kim"}
        ]});
        let bare = tracked(2, HW_TRACKER, "New", false, "a", "Etcher");

        let analysis = hw_analysis(&[with_parts, bare]);
        let etcher = &analysis["Etcher"];
        assert_eq!(etcher.total_hw_issues, 2);
        assert_eq!(etcher.hw_components, vec!["Valve", "L1, L2", NO_COMPONENT]);
        assert!(etcher.hw_issues[1].hw_components.is_empty());
    }

    #[test]
    fn test_project_label() {
        assert_eq!(project_label("Etcher #03 Line B"), "Line B");
        assert_eq!(project_label("Plain name"), "Plain name");
    }

    #[test]
    fn test_sw_analysis_groups_by_project() {
        let mut a = tracked(1, SW_TRACKER, "New", false, "a", "Etcher");
        a.project_id = Some(401);
        a.project_name = "Etcher #01 Fab A".into();
        let mut b = a.clone();
        b.redmine_id = 2;
        let mut c = a.clone();
        c.redmine_id = 3;
        c.project_id = Some(402);

        let analysis = sw_analysis(&[a, b, c]);
        let etcher = &analysis["Etcher"];
        assert_eq!(etcher.total_sw_issues, 3);
        assert_eq!(etcher.project_groups.len(), 2);
        assert_eq!(etcher.project_groups[0].total_issues, 2);
        assert_eq!(etcher.project_groups[0].label, "Fab A");
    }
}
