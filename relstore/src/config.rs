//! Store Configuration
//!
//! `TigerStyle`: Sensible defaults, builder pattern, explicit over implicit.
//!
//! `StoreConfig` names the database and the engine settings every
//! [`RelationalStorage`](crate::storage::RelationalStorage) built from it
//! shares. It can be built in code, read from the environment, or
//! deserialized from JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use thiserror::Error;

use relstore_core::constants::{
    POOL_ACQUIRE_TIMEOUT_MS_DEFAULT, POOL_CONNECTIONS_COUNT_DEFAULT, POOL_CONNECTIONS_COUNT_MAX,
};

use crate::storage::{is_valid_identifier, Dialect, StorageError, StorageResult};

/// Environment variable holding the connection URL.
pub const ENV_DATABASE_URL: &str = "RELSTORE_DATABASE_URL";
/// Environment variable overriding the dialect.
pub const ENV_DIALECT: &str = "RELSTORE_DIALECT";
/// Environment variable for the pool size.
pub const ENV_MAX_CONNECTIONS: &str = "RELSTORE_MAX_CONNECTIONS";
/// Environment variable for the acquire timeout in milliseconds.
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "RELSTORE_ACQUIRE_TIMEOUT_MS";
/// Environment variable for the table prefix.
pub const ENV_TABLE_PREFIX: &str = "RELSTORE_TABLE_PREFIX";

const SQLITE_MEMORY_URL: &str = "sqlite::memory:";

// =============================================================================
// Errors
// =============================================================================

/// Configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No connection URL.
    #[error("database url is empty")]
    MissingUrl,

    /// The dialect is neither set nor inferable from the URL.
    #[error("cannot infer SQL dialect from url {url:?}")]
    UnknownDialect {
        /// The URL
        url: String,
    },

    /// A setting is out of range or unparsable.
    #[error("invalid {key}: {value:?} ({reason})")]
    InvalidValue {
        /// Setting name
        key: &'static str,
        /// Offending value
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {reason}")]
    Parse {
        /// Parser message
        reason: String,
    },
}

// =============================================================================
// StoreConfig
// =============================================================================

/// Connection and engine configuration.
///
/// # Example
///
/// ```rust
/// use relstore::config::StoreConfig;
/// use relstore::storage::Dialect;
///
/// let config = StoreConfig::new("postgres://app@db/ledger")
///     .with_max_connections(20)
///     .with_table_prefix("app_");
///
/// assert_eq!(config.dialect().unwrap(), Dialect::Postgres);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection URL (`sqlite:`, `postgres://`, `mysql://`).
    ///
    /// Default: `sqlite::memory:`
    pub url: String,

    /// SQL dialect. Inferred from the URL scheme when `None`.
    pub dialect: Option<Dialect>,

    /// Pool size.
    ///
    /// Default: 10
    pub max_connections: u32,

    /// How long to wait for a pooled connection.
    ///
    /// Default: 30s
    pub acquire_timeout_ms: u64,

    /// Prepended to every table name.
    ///
    /// Default: empty
    pub table_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: SQLITE_MEMORY_URL.to_string(),
            dialect: None,
            max_connections: POOL_CONNECTIONS_COUNT_DEFAULT,
            acquire_timeout_ms: POOL_ACQUIRE_TIMEOUT_MS_DEFAULT,
            table_prefix: String::new(),
        }
    }
}

impl StoreConfig {
    /// Config for `url` with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Private in-memory SQLite database.
    ///
    /// Every connection to `sqlite::memory:` opens a separate database, so
    /// the pool is pinned to a single long-lived connection.
    #[must_use]
    pub fn sqlite_memory() -> Self {
        Self::new(SQLITE_MEMORY_URL).with_max_connections(1)
    }

    /// Read settings from `RELSTORE_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            config.url = url;
        }
        if let Ok(dialect) = std::env::var(ENV_DIALECT) {
            let parsed = serde_json::from_value(serde_json::Value::String(dialect.to_lowercase()))
                .map_err(|e| ConfigError::InvalidValue {
                    key: ENV_DIALECT,
                    value: dialect.clone(),
                    reason: e.to_string(),
                })?;
            config.dialect = Some(parsed);
        }
        if let Some(n) = env_number(ENV_MAX_CONNECTIONS)? {
            config.max_connections = n;
        }
        if let Some(ms) = env_number(ENV_ACQUIRE_TIMEOUT_MS)? {
            config.acquire_timeout_ms = ms;
        }
        if let Ok(prefix) = std::env::var(ENV_TABLE_PREFIX) {
            config.table_prefix = prefix;
        }

        Ok(config)
    }

    /// Parse a JSON document; missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Force a dialect.
    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Set the pool size.
    #[must_use]
    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub fn with_acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    /// Set the table prefix.
    #[must_use]
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Effective dialect: explicit, or inferred from the URL.
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownDialect` if neither is available.
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        self.dialect
            .or_else(|| Dialect::from_url(&self.url))
            .ok_or_else(|| ConfigError::UnknownDialect {
                url: self.url.clone(),
            })
    }

    /// True for in-memory SQLite URLs.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Check every setting.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        self.dialect()?;

        if self.max_connections == 0 || self.max_connections > POOL_CONNECTIONS_COUNT_MAX {
            return Err(ConfigError::InvalidValue {
                key: "max_connections",
                value: self.max_connections.to_string(),
                reason: format!("must be in [1, {POOL_CONNECTIONS_COUNT_MAX}]"),
            });
        }
        if self.acquire_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "acquire_timeout_ms",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        // The prefix must still yield a plain identifier once a type name follows.
        if !self.table_prefix.is_empty() && !is_valid_identifier(&format!("{}t", self.table_prefix)) {
            return Err(ConfigError::InvalidValue {
                key: "table_prefix",
                value: self.table_prefix.clone(),
                reason: "must be letters, digits and underscores".to_string(),
            });
        }

        Ok(())
    }

    /// Open a connection pool.
    ///
    /// Installs the compiled-in `sqlx` drivers on first use.
    ///
    /// # Errors
    /// Returns `StorageError::Initialization` for an invalid config and
    /// `StorageError::Resource` if the database cannot be reached.
    pub async fn connect(&self) -> StorageResult<AnyPool> {
        self.validate()
            .map_err(|e| StorageError::initialization(e.to_string()))?;

        install_default_drivers();

        let mut options = AnyPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_millis(self.acquire_timeout_ms));
        if self.is_in_memory() {
            // Closing the last connection drops the database.
            options = options.idle_timeout(None).max_lifetime(None);
        }

        let pool = options.connect(&self.url).await.map_err(|e| {
            tracing::warn!(url = %self.url, error = %e, "failed to connect");
            StorageError::resource(format!("failed to connect: {e}"))
        })?;

        tracing::info!(
            url = %self.url,
            max_connections = self.max_connections,
            "connection pool ready"
        );
        Ok(pool)
    }
}

fn env_number<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

// =============================================================================
// Tests
// =============================================================================
