//! Read-side index over the classified project tree
//!
//! Answers the dashboard drill-down: site index, sub-site name and product
//! name resolve to the set of leaf project ids that issues are filtered by.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{Level, ProjectNode};

/// Selector value meaning "do not filter at this level"
pub const ALL: &str = "ALL";

fn ordinal_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?)\s+#\d+").expect("valid ordinal regex"))
}

fn numbered_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\s*").expect("valid prefix regex"))
}

/// Product code of a leaf name: the part before a trailing `#NN` ordinal,
/// or `None` when the name carries no ordinal.
pub fn product_code(name: &str) -> Option<&str> {
    ordinal_suffix()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Name used when comparing a leaf against a product selector
pub fn product_key(name: &str) -> &str {
    product_code(name).unwrap_or(name)
}

/// Strip a leading `"NN. "` ordering prefix from a display name
pub fn display_name(name: &str) -> String {
    numbered_prefix().replace(name, "").into_owned()
}

/// A customer project as listed on the site selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteEntry {
    pub site_index: usize,
    pub redmine_project_id: i64,
    pub project_name: String,
}

/// Immutable lookup structure over one tree snapshot
#[derive(Debug, Clone, Default)]
pub struct ProjectTree {
    nodes: HashMap<i64, ProjectNode>,
    customer_ids: Vec<i64>,
}

impl ProjectTree {
    pub fn new(nodes: Vec<ProjectNode>, customer_ids: Vec<i64>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.redmine_project_id, n)).collect(),
            customer_ids,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&ProjectNode> {
        self.nodes.get(&id)
    }

    fn children(&self, id: i64) -> impl Iterator<Item = &ProjectNode> {
        self.nodes
            .get(&id)
            .map(|n| n.children_ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|child| self.nodes.get(child))
    }

    /// Customer id at a selector position
    pub fn site_id(&self, site_index: usize) -> Result<i64> {
        self.customer_ids.get(site_index).copied().ok_or_else(|| {
            AppError::InvalidRequest(format!(
                "site index {} out of range (0..{})",
                site_index,
                self.customer_ids.len()
            ))
        })
    }

    /// Customer projects present in the tree, in configured order
    pub fn sites(&self) -> Vec<SiteEntry> {
        self.customer_ids
            .iter()
            .enumerate()
            .filter_map(|(site_index, id)| {
                self.nodes.get(id).map(|node| SiteEntry {
                    site_index,
                    redmine_project_id: *id,
                    project_name: display_name(&node.project_name),
                })
            })
            .collect()
    }

    /// Direct children of a site, in adjacency order
    pub fn sub_sites(&self, site_index: usize) -> Result<Vec<&ProjectNode>> {
        let site_id = self.site_id(site_index)?;
        Ok(self.children(site_id).collect())
    }

    /// Level-4 projects under a sub-site: its direct leaf children plus the
    /// leaf children of its buildings.
    fn leaves_under<'a>(&'a self, sub_site: &'a ProjectNode, seen: &mut HashSet<i64>) -> Vec<&'a ProjectNode> {
        let mut leaves = Vec::new();
        for child in self.children(sub_site.redmine_project_id) {
            match child.level {
                Level::Leaf => {
                    if seen.insert(child.redmine_project_id) {
                        leaves.push(child);
                    }
                }
                Level::Building => {
                    for grandchild in self.children(child.redmine_project_id) {
                        if grandchild.level == Level::Leaf && seen.insert(grandchild.redmine_project_id) {
                            leaves.push(grandchild);
                        }
                    }
                }
                _ => {}
            }
        }
        leaves
    }

    /// Resolve a drill-down selector to leaf project ids.
    ///
    /// `"ALL"` for `sub_site_name` walks every child of the site; `"ALL"` for
    /// `product_name` keeps every leaf. A specific product matches leaves whose
    /// name, with any `#NN` ordinal removed, equals it exactly.
    pub fn resolve(&self, site_index: usize, sub_site_name: &str, product_name: &str) -> Result<Vec<i64>> {
        let site_id = self.site_id(site_index)?;
        let mut seen = HashSet::new();

        let sub_sites = self
            .children(site_id)
            .filter(|node| sub_site_name == ALL || node.project_name == sub_site_name);

        let mut ids = Vec::new();
        for sub_site in sub_sites {
            for leaf in self.leaves_under(sub_site, &mut seen) {
                if product_name == ALL || product_key(&leaf.project_name) == product_name {
                    ids.push(leaf.redmine_project_id);
                }
            }
        }
        Ok(ids)
    }

    /// Union of [`resolve`](Self::resolve) over every selector combination
    pub fn resolve_all(&self, site_indexes: &[usize], sub_site_names: &[String], product_names: &[String]) -> Result<Vec<i64>> {
        let mut ids = BTreeSet::new();
        for site_index in site_indexes {
            for sub_site in sub_site_names {
                for product in product_names {
                    ids.extend(self.resolve(*site_index, sub_site, product)?);
                }
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Distinct product codes under every node named `sub_site_name`, in
    /// first-seen order. Leaves without an ordinal are not products.
    pub fn products(&self, sub_site_name: &str) -> Vec<String> {
        let mut matches: Vec<&ProjectNode> = self
            .nodes
            .values()
            .filter(|node| node.project_name == sub_site_name)
            .collect();
        matches.sort_by_key(|node| node.redmine_project_id);

        let mut seen = HashSet::new();
        let mut codes: Vec<String> = Vec::new();
        for sub_site in matches {
            for leaf in self.leaves_under(sub_site, &mut seen) {
                if let Some(code) = product_code(&leaf.project_name) {
                    if !codes.iter().any(|c| c == code) {
                        codes.push(code.to_string());
                    }
                }
            }
        }
        codes
    }
}
