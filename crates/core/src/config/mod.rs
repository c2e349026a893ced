//! Database configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SEICHE_*)
//! 2. TOML config file (if SEICHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod stream;
mod validation;

pub use stream::{ConfigCells, Headers, WatcherConfig};
pub use validation::ConfigError;

/// Connection settings for one CouchDB database.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SEICHE_*)
/// 2. TOML config file (if SEICHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Hostname (including scheme, if not plain http) of the CouchDB server.
    ///
    /// Set via SEICHE_HOST environment variable.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the server listens on.
    ///
    /// Set via SEICHE_PORT environment variable.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name of the database all document operations target.
    ///
    /// Set via SEICHE_DATABASE environment variable.
    #[serde(default)]
    pub database: String,

    /// Headers attached to every outgoing request (session cookies,
    /// authorization, proxy headers).
    #[serde(default)]
    pub headers: Headers,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via SEICHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds. Applies to single-shot
    /// requests only; the change feed stays open indefinitely.
    ///
    /// Set via SEICHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    5984
}

fn default_user_agent() -> String {
    "seiche/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: String::new(),
            headers: Headers::new(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Settings for a named database on the default local server.
    pub fn for_database(database: impl Into<String>) -> Self {
        Self { database: database.into(), ..Default::default() }
    }

    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SEICHE_`
    /// 2. TOML file from `SEICHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SEICHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SEICHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
