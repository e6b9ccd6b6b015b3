//! Runtime settings for the cache, the sync engine and the query client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("Failed to read settings file '{path}': {source}")]
    Io {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`CacheSettings`].
    #[error("Invalid settings: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Settings shared by [`LocalStore`](crate::store::LocalStore),
/// [`SyncEngine`](crate::sync::SyncEngine) and
/// [`QueryClient`](crate::client::QueryClient).
///
/// Built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// sqlx connection string for the cache database.
    pub database_url: String,
    /// Default `ORDER BY` of plain SELECTs over registered tables.
    pub auto_order_by: bool,
    /// Default bound on concurrent table syncs in `dump_many`.
    pub max_concurrent: usize,
    /// Retries of a failed local chunk write before the table sync fails.
    pub local_retry_limit: u32,
    /// Per-table timeout applied by `dump_many`.
    pub sync_run_timeout_secs: Option<u64>,
    /// SQLite busy timeout.
    pub busy_timeout_ms: u64,
    /// Use WAL journaling for file databases.
    pub wal: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            database_url: String::from("sqlite::memory:"),
            auto_order_by: true,
            max_concurrent: 4,
            local_retry_limit: 3,
            sync_run_timeout_secs: None,
            busy_timeout_ms: 5_000,
            wal: true,
        }
    }
}

impl CacheSettings {
    /// Settings for a throwaway in-memory cache.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Parses settings from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` for malformed TOML or out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Invalid` for a zero concurrency bound or an
    /// empty database URL.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_concurrent == 0 {
            return Err(SettingsError::Invalid(String::from(
                "max_concurrent must be at least 1",
            )));
        }
        if self.database_url.trim().is_empty() {
            return Err(SettingsError::Invalid(String::from(
                "database_url must not be empty",
            )));
        }
        Ok(())
    }

    /// Returns true if the database lives in memory.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// The per-table timeout, if any.
    #[must_use]
    pub fn sync_run_timeout(&self) -> Option<Duration> {
        self.sync_run_timeout_secs.map(Duration::from_secs)
    }

    /// The SQLite busy timeout.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
