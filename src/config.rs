//! Application configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML config file (`--config PATH`, or `config.toml` in the platform
//!    config directory)
//! 3. `HASHGEN_*` environment variables (e.g. `HASHGEN_PORT=9000`)
//! 4. Command-line flags
//!
//! Unknown keys in the config file are reported with a suggestion for the
//! closest known key, but do not prevent startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::digest::DEFAULT_SALT_LENGTH;
use crate::jobs::JobSettings;
use crate::store::DEFAULT_CAPACITY;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "HASHGEN_";

/// Largest salt accepted from configuration.
pub const MAX_SALT_LENGTH: usize = 1024;

/// Keys accepted in the config file.
const KNOWN_KEYS: &[&str] = &[
    "host",
    "port",
    "store_path",
    "cache_capacity",
    "job_delay_ms",
    "salt_length",
    "sync_writes",
];

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong type.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    /// A value was well-formed but not acceptable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host name or address to listen on.
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
    /// Result log location; `None` means the platform data directory.
    pub store_path: Option<PathBuf>,
    /// Maximum number of results kept in memory; 0 selects the default.
    pub cache_capacity: usize,
    /// Artificial delay before each job computes, in milliseconds.
    pub job_delay_ms: u64,
    /// Salt bytes used for salted submissions.
    pub salt_length: usize,
    /// Sync the log to disk after every append.
    pub sync_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            store_path: None,
            cache_capacity: DEFAULT_CAPACITY,
            job_delay_ms: 5000,
            salt_length: DEFAULT_SALT_LENGTH,
            sync_writes: false,
        }
    }
}

/// Command-line values layered on top of file and environment settings.
///
/// Only flags the user actually passed are serialized, so absent flags do
/// not mask lower layers.
#[derive(Debug, Default, Serialize)]
struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    salt_length: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    sync_writes: bool,
}

impl From<&Cli> for CliOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            host: cli.host.clone(),
            port: cli.port,
            store_path: cli.store_path.clone(),
            cache_capacity: cli.cache_capacity,
            job_delay_ms: cli.job_delay_ms,
            salt_length: cli.salt_length,
            sync_writes: cli.sync_writes,
        }
    }
}

impl Config {
    /// Load the full layered configuration for a command line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer cannot be parsed or the merged
    /// values fail [`validate`](Self::validate).
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = cli.config.clone().or_else(Self::default_config_path);
        let figment = Self::figment(file.as_deref())
            .merge(Serialized::defaults(CliOverrides::from(cli)));
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the defaults < file < environment stack without CLI flags.
    ///
    /// A missing file is skipped silently; an existing one is also checked
    /// for unknown keys.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            if path.exists() {
                log::debug!("Loading config file {}", path.display());
                warn_unknown_keys(path);
                figment = figment.merge(Toml::file(path));
            }
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Check values that parse but cannot be served.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.salt_length == 0 {
            return Err(ConfigError::Invalid(
                "salt_length must be at least 1".to_string(),
            ));
        }
        if self.salt_length > MAX_SALT_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "salt_length {} exceeds maximum of {}",
                self.salt_length, MAX_SALT_LENGTH
            )));
        }
        Ok(())
    }

    /// The result log path, falling back to the platform data directory.
    #[must_use]
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(default_store_path)
    }

    /// `host:port` for the HTTP listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Job tunables derived from this configuration.
    #[must_use]
    pub fn job_settings(&self) -> JobSettings {
        JobSettings::default()
            .with_delay(Duration::from_millis(self.job_delay_ms))
            .with_salt_length(self.salt_length)
    }

    /// The platform-specific config file location.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "hashgen", "hashgen")
}

fn default_store_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("results.jsonl"))
        .unwrap_or_else(|| PathBuf::from("results.jsonl"))
}

/// Top-level keys in `content` that are not config keys, each paired with
/// the closest known key if one is similar enough.
#[must_use]
pub fn unknown_keys(content: &str) -> Vec<(String, Option<&'static str>)> {
    let Ok(table) = content.parse::<toml::Table>() else {
        // Syntax errors are reported by the TOML provider.
        return Vec::new();
    };
    table
        .keys()
        .filter(|key| !KNOWN_KEYS.contains(&key.as_str()))
        .map(|key| (key.clone(), suggest_key(key)))
        .collect()
}

fn suggest_key(key: &str) -> Option<&'static str> {
    KNOWN_KEYS
        .iter()
        .map(|known| (*known, strsim::jaro_winkler(key, known)))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(known, _)| known)
}

fn warn_unknown_keys(path: &Path) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    for (key, suggestion) in unknown_keys(&content) {
        match suggestion {
            Some(known) => log::warn!(
                "Unknown config key '{}' in {} (did you mean '{}'?)",
                key,
                path.display(),
                known
            ),
            None => log::warn!("Unknown config key '{}' in {}", key, path.display()),
        }
    }
}
