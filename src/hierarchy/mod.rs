//! Project hierarchy: classification, sync and drill-down resolution

pub mod cache;
pub mod classify;
pub mod sync;
pub mod tree;

pub use cache::HierarchyCache;
pub use classify::{build_forest, Forest, LevelRules};
pub use sync::HierarchySync;
pub use tree::{ProjectTree, ALL};
