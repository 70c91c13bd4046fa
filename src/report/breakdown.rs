//! Issue type counts and the tracker → product → member breakdown

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::IssueRecord;
use crate::report::{group_by, IssueBrief, Tally};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCounts {
    pub tracker_counts: BTreeMap<String, usize>,
}

pub fn type_counts(issues: &[IssueRecord]) -> TypeCounts {
    let mut tracker_counts = BTreeMap::new();
    for issue in issues {
        *tracker_counts.entry(issue.tracker_name.clone()).or_insert(0) += 1;
    }
    TypeCounts { tracker_counts }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberDetail {
    pub member_name: String,
    #[serde(flatten)]
    pub tally: Tally,
    pub issues: Vec<IssueBrief>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetail {
    pub product_name: String,
    #[serde(flatten)]
    pub tally: Tally,
    pub issues: Vec<IssueBrief>,
    pub member_details: Vec<MemberDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDetail {
    pub tracker_name: String,
    #[serde(flatten)]
    pub tally: Tally,
    pub product_details: Vec<ProductDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeBreakdown {
    pub type_list: Vec<TypeDetail>,
}

fn briefs(issues: &[&IssueRecord]) -> Vec<IssueBrief> {
    issues.iter().map(|issue| IssueBrief::from(*issue)).collect()
}

/// Trackers by size, their products by completion rate and each product's
/// authors by size. Ties keep first-seen order.
pub fn type_breakdown(issues: &[IssueRecord]) -> TypeBreakdown {
    let mut type_list: Vec<TypeDetail> = group_by(issues, |i| i.tracker_name.clone())
        .into_iter()
        .map(|(tracker_name, group)| {
            let mut product_details: Vec<ProductDetail> = group_by(group.iter().copied(), |i| i.product.clone())
                .into_iter()
                .map(|(product_name, in_product)| {
                    let mut member_details: Vec<MemberDetail> =
                        group_by(in_product.iter().copied(), |i| i.author_name.clone())
                            .into_iter()
                            .map(|(member_name, own)| MemberDetail {
                                member_name,
                                tally: Tally::of(own.iter().copied()),
                                issues: briefs(&own),
                            })
                            .collect();
                    member_details.sort_by(|a, b| b.tally.total_count.cmp(&a.tally.total_count));

                    ProductDetail {
                        product_name,
                        tally: Tally::of(in_product.iter().copied()),
                        issues: briefs(&in_product),
                        member_details,
                    }
                })
                .collect();
            product_details.sort_by(|a, b| b.tally.completion_rate.total_cmp(&a.tally.completion_rate));

            TypeDetail {
                tracker_name,
                tally: Tally::of(group),
                product_details,
            }
        })
        .collect();

    type_list.sort_by(|a, b| b.tally.total_count.cmp(&a.tally.total_count));
    TypeBreakdown { type_list }
}
