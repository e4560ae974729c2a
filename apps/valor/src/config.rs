//! # Application Configuration
//!
//! `AppConfig` is read from an optional TOML file, then overridden by
//! `VALOR_*` environment variables. Command-line flags override both.
//!
//! | Variable             | Field          | Default     |
//! |----------------------|----------------|-------------|
//! | `VALOR_HOST`         | `host`         | `127.0.0.1` |
//! | `VALOR_PORT`         | `port`         | `8080`      |
//! | `VALOR_DATABASE`     | `database`     | `valor.db`  |
//! | `VALOR_API_KEY`      | `api_key`      | unset       |
//! | `VALOR_RATE_LIMIT`   | `rate_limit`   | `100`       |
//! | `VALOR_CORS_ORIGINS` | `cors_origins` | localhost   |
//! | `VALOR_DEBOUNCE_MS`  | `debounce_ms`  | `250`       |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use valor_core::SessionConfig;
use valor_core::primitives::DEBOUNCE_WINDOW_MS;

/// Why configuration could not be assembled.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },
}

/// Server and session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    /// Bearer key required on every route but `/health`. Unset disables auth.
    pub api_key: Option<String>,
    /// Requests per second; 0 disables limiting.
    pub rate_limit: u32,
    /// Comma-separated origins, or `*`. Unset allows localhost only.
    pub cors_origins: Option<String>,
    pub debounce_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database: PathBuf::from("valor.db"),
            api_key: None,
            rate_limit: 100,
            cors_origins: None,
            debounce_ms: DEBOUNCE_WINDOW_MS,
        }
    }
}

impl AppConfig {
    /// File (if given) then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env(|var| std::env::var(var).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let set = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(host) = set("VALOR_HOST") {
            self.host = host;
        }
        if let Some(port) = set("VALOR_PORT") {
            self.port = parse_env("VALOR_PORT", port)?;
        }
        if let Some(database) = set("VALOR_DATABASE") {
            self.database = PathBuf::from(database);
        }
        if let Some(key) = set("VALOR_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(limit) = set("VALOR_RATE_LIMIT") {
            self.rate_limit = parse_env("VALOR_RATE_LIMIT", limit)?;
        }
        if let Some(origins) = set("VALOR_CORS_ORIGINS") {
            self.cors_origins = Some(origins);
        }
        if let Some(ms) = set("VALOR_DEBOUNCE_MS") {
            self.debounce_ms = parse_env("VALOR_DEBOUNCE_MS", ms)?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            ..SessionConfig::default()
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

// =============================================================================
// TESTS
// =============================================================================
