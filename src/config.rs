//! Service configuration from environment variables

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::hierarchy::LevelRules;
use crate::issues::{FieldRole, FieldRoleMap};
use crate::models::Level;
use crate::services::roadmap::DEFAULT_EXCLUDED_VERSIONS;
use crate::services::tracker::{BatchPlan, TrackerConfig};

/// Customer projects shown on the site selector, in display order
pub const DEFAULT_CUSTOMER_PROJECT_IDS: [i64; 9] = [100, 265, 432, 876, 205, 415, 203, 839, 833];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Backing store for cached tracker data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub store: StoreBackend,
    pub database_url: String,
    pub database_max_connections: u32,
    pub tracker: TrackerConfig,
    pub sync_batch_size: usize,
    pub sync_concurrency: usize,
    pub project_sync_limit: usize,
    pub issue_sync_limit: usize,
    /// Issue limit of the scheduled sync, which replaces the whole cache
    pub scheduled_issue_sync_limit: usize,
    /// `None` disables the background sync
    pub sync_interval: Option<Duration>,
    pub customer_project_ids: Vec<i64>,
    pub headquarters_project_id: i64,
    pub sample_evaluation_project_id: i64,
    pub guide_project_id: i64,
    pub field_roles: FieldRoleMap,
    pub issue_time_offset_hours: i64,
    pub roadmap_excluded_versions: Vec<String>,
    pub user_email_domain: String,
    /// Base64 of the 32-byte key sealing stored user API keys
    pub api_key_secret: String,
    /// Empty means any origin
    pub cors_allowed_origins: Vec<String>,
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => parse(key, &raw),
            None => Ok(default),
        }
    }

    fn ids(&self, key: &'static str, default: &[i64]) -> Result<Vec<i64>, ConfigError> {
        match self.get(key) {
            Some(raw) => list(&raw).iter().map(|id| parse(key, id)).collect(),
            None => Ok(default.to_vec()),
        }
    }
}

impl Config {
    /// Read the configuration from the process environment, after loading `.env`
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let store = match env.get("STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE",
                    reason: format!("unknown backend '{}'", other),
                })
            }
        };
        let database_url = match store {
            StoreBackend::Postgres => env.required("DATABASE_URL")?,
            StoreBackend::Memory => env.get("DATABASE_URL").unwrap_or_default(),
        };

        let mut field_roles = FieldRoleMap::default();
        for (key, role) in [
            ("ISSUE_FIELD_COST", FieldRole::Cost),
            ("ISSUE_FIELD_PENDING", FieldRole::Pending),
            ("ISSUE_FIELD_PRODUCT", FieldRole::Product),
        ] {
            if let Some(raw) = env.get(key) {
                field_roles = field_roles.with_role(role, list(&raw));
            }
        }

        let sync_interval = match env.get("SYNC_INTERVAL_SECS") {
            Some(raw) => match parse::<u64>("SYNC_INTERVAL_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => None,
        };

        let config = Self {
            listen_addr: env.or("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            store,
            database_url,
            database_max_connections: env.or("DATABASE_MAX_CONNECTIONS", 20)?,
            tracker: TrackerConfig {
                base_url: env.required("TRACKER_URL")?,
                api_key: env.required("TRACKER_API_KEY")?,
                timeout: Duration::from_secs(env.or("TRACKER_TIMEOUT_SECS", 30)?),
            },
            sync_batch_size: env.or("SYNC_BATCH_SIZE", 50)?,
            sync_concurrency: env.or("SYNC_CONCURRENCY", 10)?,
            project_sync_limit: env.or("PROJECT_SYNC_LIMIT", 1000)?,
            issue_sync_limit: env.or("ISSUE_SYNC_LIMIT", 100)?,
            scheduled_issue_sync_limit: env.or("SCHEDULED_ISSUE_SYNC_LIMIT", 10_000)?,
            sync_interval,
            customer_project_ids: env.ids("CUSTOMER_PROJECT_IDS", &DEFAULT_CUSTOMER_PROJECT_IDS)?,
            headquarters_project_id: env.or("HEADQUARTERS_PROJECT_ID", 9)?,
            sample_evaluation_project_id: env.or("SAMPLE_EVALUATION_PROJECT_ID", 846)?,
            guide_project_id: env.or("GUIDE_PROJECT_ID", 422)?,
            field_roles,
            issue_time_offset_hours: env.or("ISSUE_TIME_OFFSET_HOURS", 9)?,
            roadmap_excluded_versions: env
                .get("ROADMAP_EXCLUDED_VERSIONS")
                .map(|raw| list(&raw))
                .unwrap_or_else(|| DEFAULT_EXCLUDED_VERSIONS.iter().map(|s| s.to_string()).collect()),
            user_email_domain: env.or("USER_EMAIL_DOMAIN", "ati2000.co.kr".to_string())?,
            api_key_secret: env.required("API_KEY_SECRET")?,
            cors_allowed_origins: env.get("CORS_ALLOWED_ORIGINS").map(|raw| list(&raw)).unwrap_or_default(),
        };

        if config.scheduled_issue_sync_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "SCHEDULED_ISSUE_SYNC_LIMIT",
                reason: "must be at least 1".into(),
            });
        }
        if config.customer_project_ids.is_empty() {
            return Err(ConfigError::Invalid {
                key: "CUSTOMER_PROJECT_IDS",
                reason: "at least one customer project is required".into(),
            });
        }
        Ok(config)
    }

    /// Classification rules: the administrative projects are fixed exceptions
    pub fn level_rules(&self) -> LevelRules {
        LevelRules::new(self.customer_project_ids.clone())
            .with_headquarters(self.headquarters_project_id)
            .with_exception(self.sample_evaluation_project_id, Level::SampleEvaluation)
            .with_exception(self.guide_project_id, Level::Guide)
    }

    /// Batch plan for a project sync; `limit` overrides the configured one
    pub fn project_plan(&self, limit: Option<usize>) -> BatchPlan {
        BatchPlan::new(
            limit.unwrap_or(self.project_sync_limit),
            self.sync_batch_size,
            self.sync_concurrency,
        )
    }

    /// Batch plan for a manual issue sync; `limit` overrides the configured one
    pub fn issue_plan(&self, limit: Option<usize>) -> BatchPlan {
        BatchPlan::new(
            limit.unwrap_or(self.issue_sync_limit),
            self.sync_batch_size,
            self.sync_concurrency,
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 4] = [
        ("DATABASE_URL", "postgres://localhost/tracker"),
        ("TRACKER_URL", "https://pms.example.com"),
        ("TRACKER_API_KEY", "system"),
        ("API_KEY_SECRET", "c2VjcmV0"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(config.store, StoreBackend::Postgres);
        assert_eq!(config.sync_batch_size, 50);
        assert_eq!(config.sync_concurrency, 10);
        assert_eq!(config.project_plan(None).limit, 1000);
        assert_eq!(config.issue_plan(None).limit, 100);
        assert_eq!(config.issue_plan(Some(7)).limit, 7);
        assert_eq!(config.scheduled_issue_sync_limit, 10_000);
        assert_eq!(config.issue_plan(Some(config.scheduled_issue_sync_limit)).max_batches(), 200);
        assert_eq!(config.tracker.timeout, Duration::from_secs(30));
        assert_eq!(config.customer_project_ids, DEFAULT_CUSTOMER_PROJECT_IDS.to_vec());
        assert_eq!(config.issue_time_offset_hours, 9);
        assert!(config.sync_interval.is_none());
        assert_eq!(config.roadmap_excluded_versions.len(), 2);
    }

    #[test]
    fn test_level_rules_from_config() {
        let config = Config::from_lookup(lookup(&BASE)).unwrap();
        let rules = config.level_rules();
        assert_eq!(rules.classify(9, None, true), Level::Headquarters);
        assert_eq!(rules.classify(846, Some(9), false), Level::SampleEvaluation);
        assert_eq!(rules.classify(422, None, false), Level::Guide);
        assert_eq!(rules.classify(50, Some(9), true), Level::HeadquartersChild);
    }

    #[test]
    fn test_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("CUSTOMER_PROJECT_IDS", "7, 3"),
            ("SYNC_INTERVAL_SECS", "600"),
            ("ISSUE_FIELD_PRODUCT", "Tool Group"),
            ("CORS_ALLOWED_ORIGINS", "http://a.example, http://b.example"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.customer_project_ids, vec![7, 3]);
        assert_eq!(config.sync_interval, Some(Duration::from_secs(600)));
        assert_eq!(config.field_roles.role_of("tool group"), Some(FieldRole::Product));
        assert_eq!(config.cors_allowed_origins.len(), 2);
    }

    #[test]
    fn test_errors() {
        let missing = Config::from_lookup(lookup(&BASE[1..])).unwrap_err();
        assert!(matches!(missing, ConfigError::Missing("DATABASE_URL")));

        let mut pairs = BASE.to_vec();
        pairs.push(("SYNC_BATCH_SIZE", "lots"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: "SYNC_BATCH_SIZE", .. })
        ));

        let mut pairs = BASE.to_vec();
        pairs.push(("SCHEDULED_ISSUE_SYNC_LIMIT", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: "SCHEDULED_ISSUE_SYNC_LIMIT", .. })
        ));

        let memory = Config::from_lookup(lookup(&[
            ("STORE", "memory"),
            ("TRACKER_URL", "https://pms.example.com"),
            ("TRACKER_API_KEY", "system"),
            ("API_KEY_SECRET", "c2VjcmV0"),
        ]))
        .unwrap();
        assert_eq!(memory.store, StoreBackend::Memory);
    }
}
