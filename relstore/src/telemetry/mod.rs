//! Logging Initialization
//!
//! `TigerStyle`: Optional subscriber setup with graceful fallback. The library
//! itself only emits `tracing` spans and events; applications and tests call
//! [`init_telemetry`] once to print them.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relstore::telemetry::{init_telemetry, TelemetryConfig};
//!
//! // Initialize with defaults (reads RELSTORE_LOG, then RUST_LOG)
//! init_telemetry(TelemetryConfig::default()).expect("telemetry init");
//!
//! // Or configure explicitly
//! let config = TelemetryConfig::builder()
//!     .filter("relstore=debug,sqlx=warn")
//!     .json(true)
//!     .build();
//! ```
//!
//! ## Environment Variables
//!
//! - `RELSTORE_LOG` - filter directives (default: falls back to `RUST_LOG`)
//! - `RUST_LOG` - filter directives (default: "info")

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Preferred filter variable.
pub const ENV_LOG: &str = "RELSTORE_LOG";

const FILTER_DEFAULT: &str = "info";

/// Telemetry configuration errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Telemetry initialization failed
    #[error("telemetry initialization failed: {reason}")]
    InitFailed {
        /// The reason for the failure
        reason: String,
    },

    /// Filter directives could not be parsed
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter {
        /// The offending directives
        filter: String,
        /// Parser message
        reason: String,
    },
}

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, e.g. `relstore=debug`
    pub filter: String,

    /// Emit JSON lines instead of human-readable text
    pub json: bool,

    /// Include span open/close events
    pub span_events: bool,

    /// Route output to the test writer (captured by `cargo test`)
    pub test_writer: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: std::env::var(ENV_LOG)
                .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
                .unwrap_or_else(|_| FILTER_DEFAULT.to_string()),
            json: false,
            span_events: false,
            test_writer: false,
        }
    }
}

impl TelemetryConfig {
    /// Create a new builder for `TelemetryConfig`
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `TelemetryError::InvalidFilter` if the directives do not parse.
    pub fn validate(&self) -> Result<()> {
        self.env_filter().map(|_| ())
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        if self.filter.trim().is_empty() {
            return Err(TelemetryError::InvalidFilter {
                filter: self.filter.clone(),
                reason: "filter cannot be empty".to_string(),
            });
        }
        EnvFilter::try_new(&self.filter).map_err(|e| TelemetryError::InvalidFilter {
            filter: self.filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Builder for `TelemetryConfig`
#[derive(Default)]
pub struct TelemetryConfigBuilder {
    filter: Option<String>,
    json: Option<bool>,
    span_events: Option<bool>,
    test_writer: Option<bool>,
}

impl TelemetryConfigBuilder {
    /// Set the filter directives
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Emit JSON lines
    #[must_use]
    pub fn json(mut self, json: bool) -> Self {
        self.json = Some(json);
        self
    }

    /// Log span open and close
    #[must_use]
    pub fn span_events(mut self, enabled: bool) -> Self {
        self.span_events = Some(enabled);
        self
    }

    /// Write through the test harness
    #[must_use]
    pub fn test_writer(mut self, enabled: bool) -> Self {
        self.test_writer = Some(enabled);
        self
    }

    /// Build the `TelemetryConfig`
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let default = TelemetryConfig::default();
        TelemetryConfig {
            filter: self.filter.unwrap_or(default.filter),
            json: self.json.unwrap_or(default.json),
            span_events: self.span_events.unwrap_or(default.span_events),
            test_writer: self.test_writer.unwrap_or(default.test_writer),
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` for bad directives and
/// `TelemetryError::InitFailed` if a global subscriber is already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;

    // Preconditions
    let filter = config.env_filter()?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_target(true);

    let installed = match (config.json, config.test_writer) {
        (true, true) => builder.json().with_test_writer().try_init(),
        (true, false) => builder.json().try_init(),
        (false, true) => builder.with_test_writer().try_init(),
        (false, false) => builder.try_init(),
    };
    installed.map_err(|e| TelemetryError::InitFailed {
        reason: format!("failed to set global subscriber: {e}"),
    })?;

    tracing::debug!(filter = %config.filter, json = config.json, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_builder() {
        let config = TelemetryConfig::builder()
            .filter("relstore=trace")
            .json(true)
            .span_events(true)
            .build();

        assert_eq!(config.filter, "relstore=trace");
        assert!(config.json);
        assert!(config.span_events);
        assert!(!config.test_writer);
    }

    #[test]
    fn test_telemetry_config_validation() {
        assert!(TelemetryConfig::builder()
            .filter("relstore=debug,sqlx=warn")
            .build()
            .validate()
            .is_ok());

        let empty = TelemetryConfig::builder().filter("  ").build();
        assert!(matches!(
            empty.validate(),
            Err(TelemetryError::InvalidFilter { .. })
        ));

        let bad = TelemetryConfig::builder().filter("relstore=loudest").build();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_init_twice_fails_gracefully() {
        let config = TelemetryConfig::builder()
            .filter("warn")
            .test_writer(true)
            .build();
        // Another test may already have installed a subscriber; either way the
        // second call must report an error rather than panic.
        let _ = init_telemetry(config.clone());
        assert!(matches!(
            init_telemetry(config),
            Err(TelemetryError::InitFailed { .. })
        ));
    }
}
