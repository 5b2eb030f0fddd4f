//! Application configuration loaded from environment variables.

use std::time::Duration;

use runtime::RuntimeConfig;
use saga::ClientConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — Postgres ledger; unset means in-memory
/// - `SIGNAL_RETRY_ATTEMPTS` — delivery attempts after a bootstrap start
/// - `SIGNAL_RETRY_DELAY_MS` — pause between delivery attempts
/// - `RUN_DEADLINE_SECS` — wall-clock bound per saga run
/// - `SIGNAL_VISIBILITY_DELAY_MS` — artificial start-visibility lag,
///   zero outside of protocol testing
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub signal_retry_attempts: u32,
    pub signal_retry_delay: Duration,
    pub run_deadline: Duration,
    pub signal_visibility_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            signal_retry_attempts: std::env::var("SIGNAL_RETRY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.signal_retry_attempts),
            signal_retry_delay: std::env::var("SIGNAL_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.signal_retry_delay),
            run_deadline: std::env::var("RUN_DEADLINE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.run_deadline),
            signal_visibility_delay: std::env::var("SIGNAL_VISIBILITY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.signal_visibility_delay),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Client knobs derived from this configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            signal_retry_attempts: self.signal_retry_attempts,
            signal_retry_delay: self.signal_retry_delay,
            run_deadline: self.run_deadline,
        }
    }

    /// Runtime knobs derived from this configuration.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            signal_visibility_delay: self.signal_visibility_delay,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            signal_retry_attempts: client.signal_retry_attempts,
            signal_retry_delay: client.signal_retry_delay,
            run_deadline: client.run_deadline,
            signal_visibility_delay: Duration::ZERO,
        }
    }
}
