//! Per-table synchronization policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ConfigError;

/// How a table is kept in the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Mirror the whole table.
    #[default]
    Full,
    /// Fetch only rows past the last checkpoint of `incremental_field`.
    Incremental,
    /// Sync lazily when a reader finds the cached copy stale.
    OnDemand,
}

impl CacheStrategy {
    /// Returns the configuration spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::OnDemand => "on-demand",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            "on-demand" | "on_demand" => Ok(Self::OnDemand),
            _ => Err(ConfigError::UnknownCacheStrategy(s.to_string())),
        }
    }
}

/// Declarative sync policy for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub cache_strategy: CacheStrategy,
    /// Rows per remote request.
    pub chunk_size: i64,
    /// Seconds a completed sync stays fresh; 0 never expires.
    pub ttl: i64,
    pub order_by: String,
    /// Extra SQL filter ANDed into every chunk request.
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    /// Upper bound on rows fetched per run.
    pub limit: Option<i64>,
    pub incremental_mode: bool,
    pub incremental_field: Option<String>,
    pub include_fields: Vec<String>,
    pub exclude_fields: Vec<String>,
    pub auto_sync: bool,
    /// Seconds between automatic syncs.
    pub sync_interval: u64,
    pub max_concurrent_chunks: usize,
    pub disabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_strategy: CacheStrategy::Full,
            chunk_size: 1000,
            ttl: 0,
            order_by: String::from("id"),
            where_clause: None,
            limit: None,
            incremental_mode: false,
            incremental_field: None,
            include_fields: Vec::new(),
            exclude_fields: Vec::new(),
            auto_sync: false,
            sync_interval: 3600,
            max_concurrent_chunks: 1,
            disabled: false,
        }
    }
}

impl SyncConfig {
    /// Checks the configuration, reporting the first violation.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` describing the violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size <= 0 {
            return Err(ConfigError::ChunkSize);
        }
        if self.limit.is_some_and(|limit| limit < self.chunk_size) {
            return Err(ConfigError::LimitBelowChunkSize);
        }
        if self.incremental_mode && self.incremental_field.is_none() {
            return Err(ConfigError::MissingIncrementalField);
        }
        if self.ttl < 0 {
            return Err(ConfigError::NegativeTtl);
        }
        Ok(())
    }

    /// Returns the chunk size as a row count.
    #[must_use]
    pub fn chunk_rows(&self) -> u64 {
        u64::try_from(self.chunk_size).unwrap_or(0)
    }

    /// Serializes only the fields that differ from their defaults.
    #[must_use]
    pub fn to_sparse_map(&self) -> Map<String, Value> {
        let defaults = Self::default();
        let (Ok(Value::Object(current)), Ok(Value::Object(defaults))) =
            (serde_json::to_value(self), serde_json::to_value(&defaults))
        else {
            return Map::new();
        };
        current
            .into_iter()
            .filter(|(key, value)| defaults.get(key) != Some(value))
            .collect()
    }
}
