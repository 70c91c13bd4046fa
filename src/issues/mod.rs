//! Issue cache: extraction, sync and status changes

pub mod extract;
pub mod status;
pub mod sync;

pub use extract::{FieldRole, FieldRoleMap, IssueExtractor};
pub use status::{StatusChange, StatusChanged, StatusChanger};
pub use sync::IssueSync;
