//! Engine configuration.

use crate::TableName;
use std::time::Duration;

/// Tables the gym app keeps offline by default.
pub const DEFAULT_TABLES: [&str; 5] = ["subscribers", "groups", "group_items", "products", "sales"];

/// Shortest period the background sync timer accepts.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_millis(10);

/// Tunables for [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Tables refreshed from the remote after a sync
    pub tables: Vec<TableName>,
    /// Namespace of every key in the storage backend
    pub key_prefix: String,
    /// Failed attempts after which an operation stalls
    pub max_attempts: u32,
    /// Period of the background sync timer
    pub sync_interval: Duration,
    /// Upper bound on a single remote call
    pub remote_timeout: Duration,
    /// Buffered events per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tables: DEFAULT_TABLES.iter().map(|t| t.to_string()).collect(),
            key_prefix: "gymsync_".to_string(),
            max_attempts: 10,
            sync_interval: Duration::from_secs(30),
            remote_timeout: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Load overrides from `GYMSYNC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides through `lookup`; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(tables) = lookup("GYMSYNC_TABLES") {
            config.tables = tables
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(prefix) = lookup("GYMSYNC_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(raw) = lookup("GYMSYNC_MAX_ATTEMPTS") {
            config.max_attempts = parse("GYMSYNC_MAX_ATTEMPTS", &raw)?;
            if config.max_attempts == 0 {
                return Err(ConfigError::Invalid {
                    key: "GYMSYNC_MAX_ATTEMPTS",
                    value: raw,
                });
            }
        }
        if let Some(raw) = lookup("GYMSYNC_SYNC_INTERVAL_SECS") {
            let secs: u64 = parse("GYMSYNC_SYNC_INTERVAL_SECS", &raw)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "GYMSYNC_SYNC_INTERVAL_SECS",
                    value: raw,
                });
            }
            config.sync_interval = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("GYMSYNC_REMOTE_TIMEOUT_MS") {
            config.remote_timeout = Duration::from_millis(parse("GYMSYNC_REMOTE_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = lookup("GYMSYNC_EVENT_CAPACITY") {
            config.event_capacity = parse("GYMSYNC_EVENT_CAPACITY", &raw)?;
        }

        Ok(config)
    }

    pub fn with_tables<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TableName>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the timer period. Anything below [`MIN_SYNC_INTERVAL`] is raised to it.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval.max(MIN_SYNC_INTERVAL);
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
