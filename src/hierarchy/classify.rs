//! Tree reconstruction and level classification
//!
//! Takes the flat project snapshot, links every project to its parent and
//! assigns each node exactly one [`Level`]. Both passes are sequential over an
//! id-ordered map so results do not depend on the order batches arrived in.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::models::{Level, ProjectNode, ProjectRecord};

/// Id-based level overrides plus the structural constants the rules need
#[derive(Debug, Clone, Default)]
pub struct LevelRules {
    exceptions: HashMap<i64, Level>,
    headquarters_id: Option<i64>,
    customer_ids: Vec<i64>,
}

impl LevelRules {
    /// `customer_ids` is ordered: its positions are the site indexes used by
    /// the dashboard selectors.
    pub fn new(customer_ids: Vec<i64>) -> Self {
        Self {
            exceptions: HashMap::new(),
            headquarters_id: None,
            customer_ids,
        }
    }

    /// Register the headquarters project. It is pinned to
    /// [`Level::Headquarters`] and its direct children become
    /// [`Level::HeadquartersChild`].
    pub fn with_headquarters(mut self, id: i64) -> Self {
        self.headquarters_id = Some(id);
        self.exceptions.insert(id, Level::Headquarters);
        self
    }

    /// Pin a project id to a fixed level regardless of its position
    pub fn with_exception(mut self, id: i64, level: Level) -> Self {
        self.exceptions.insert(id, level);
        self
    }

    pub fn customer_ids(&self) -> &[i64] {
        &self.customer_ids
    }

    pub fn is_customer(&self, id: i64) -> bool {
        self.customer_ids.contains(&id)
    }

    /// Classify one node from local facts only. First matching rule wins.
    pub fn classify(&self, id: i64, parent_id: Option<i64>, has_children: bool) -> Level {
        if let Some(level) = self.exceptions.get(&id) {
            return *level;
        }

        match parent_id {
            None => Level::Customer,
            Some(parent) if Some(parent) == self.headquarters_id => Level::HeadquartersChild,
            Some(_) if !has_children => Level::Leaf,
            Some(parent) if self.is_customer(parent) => Level::Site,
            Some(_) => Level::Building,
        }
    }
}

/// Result of the adjacency and classification passes
#[derive(Debug, Clone, Default)]
pub struct Forest {
    /// One node per distinct project id, ascending by id
    pub nodes: Vec<ProjectNode>,
    /// Records dropped because their id was already seen
    pub duplicates: usize,
    /// Ids that sit on a parent cycle
    pub cyclic: Vec<i64>,
}

/// Build the classified forest from a flat project list
pub fn build_forest(records: Vec<ProjectRecord>, rules: &LevelRules) -> Forest {
    let mut by_id: BTreeMap<i64, ProjectRecord> = BTreeMap::new();
    let mut duplicates = 0;
    for record in records {
        if by_id.contains_key(&record.redmine_id) {
            duplicates += 1;
            continue;
        }
        by_id.insert(record.redmine_id, record);
    }
    if duplicates > 0 {
        debug!(duplicates, "Dropped duplicate project records");
    }

    // Adjacency pass
    let mut children: BTreeMap<i64, Vec<i64>> = by_id.keys().map(|id| (*id, Vec::new())).collect();
    for (id, record) in &by_id {
        if let Some(parent_id) = record.parent_id {
            if let Some(siblings) = children.get_mut(&parent_id) {
                siblings.push(*id);
            }
        }
    }

    let parents: BTreeMap<i64, Option<i64>> = by_id
        .iter()
        .map(|(id, record)| (*id, record.parent_id.filter(|p| by_id.contains_key(p))))
        .collect();
    let cyclic: Vec<i64> = find_cycle_members(&parents).into_iter().collect();
    if !cyclic.is_empty() {
        warn!(ids = ?cyclic, "Upstream project parents form a cycle");
    }

    // Classification pass
    let nodes = by_id
        .into_values()
        .map(|record| {
            let children_ids = children.remove(&record.redmine_id).unwrap_or_default();
            let level = rules.classify(record.redmine_id, record.parent_id, !children_ids.is_empty());
            ProjectNode {
                redmine_project_id: record.redmine_id,
                project_name: record.name,
                parent_id: record.parent_id,
                children_ids,
                level,
                raw_data: record.raw_data,
            }
        })
        .collect();

    Forest {
        nodes,
        duplicates,
        cyclic,
    }
}

/// Ids that are their own ancestor through the parent links
fn find_cycle_members(parents: &BTreeMap<i64, Option<i64>>) -> BTreeSet<i64> {
    let mut done: BTreeSet<i64> = BTreeSet::new();
    let mut members = BTreeSet::new();

    for start in parents.keys() {
        if done.contains(start) {
            continue;
        }

        let mut path: Vec<i64> = Vec::new();
        let mut on_path: BTreeSet<i64> = BTreeSet::new();
        let mut current = Some(*start);

        while let Some(id) = current {
            if done.contains(&id) {
                break;
            }
            if on_path.contains(&id) {
                if let Some(pos) = path.iter().position(|p| *p == id) {
                    members.extend(path[pos..].iter().copied());
                }
                break;
            }
            path.push(id);
            on_path.insert(id);
            current = parents.get(&id).copied().flatten();
        }

        done.extend(path);
    }

    members
}
