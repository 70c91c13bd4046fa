pub mod credentials;
pub mod roadmap;
pub mod tracker;
pub mod wiki;

pub use credentials::{ApiKeyCipher, KeyRegistry};
pub use tracker::{BatchPlan, TrackerClient, TrackerConfig};
