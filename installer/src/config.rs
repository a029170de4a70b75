//! Layered runtime configuration.
//!
//! Settings are resolved from built-in defaults, then a TOML config file,
//! then `KEG_*` environment variables. Command-line flags are applied last
//! by the caller. The file is read from `--config` when given, else from
//! `keg/config.toml` under the platform configuration directory.

use crate::artefact::download::RetryPolicy;
use crate::layout::default_prefix;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable overriding the install prefix.
pub const PREFIX_ENV: &str = "KEG_PREFIX";
/// Environment variable overriding the download attempt bound.
pub const MAX_ATTEMPTS_ENV: &str = "KEG_MAX_ATTEMPTS";

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML of the expected shape.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// An environment variable holds an unusable value.
    #[error("invalid {var}={value:?}: {reason}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A setting is out of range.
    #[error("invalid `{key}`: {reason}")]
    InvalidValue {
        /// Config key.
        key: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No prefix was configured and the platform has no default.
    #[error("could not determine an install prefix; pass --prefix or set KEG_PREFIX")]
    NoPrefix,
}

/// Resolved keg settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Install prefix. Falls back to the platform default when unset.
    pub prefix: Option<Utf8PathBuf>,
    /// Download attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds; doubles per retry.
    pub backoff_base_ms: u64,
    /// Global timeout for one HTTP request in seconds.
    pub download_timeout_secs: u64,
    /// Time the smoke test may run before it is killed, in seconds.
    pub smoke_test_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: None,
            max_attempts: 3,
            backoff_base_ms: 500,
            download_timeout_secs: 60,
            smoke_test_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load defaults, the config file and the environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or an
    /// environment override is invalid.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(explicit) => Self::from_file(explicit)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(found) => Self::from_file(&found)?,
                None => Self::default(),
            },
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        debug!("loading config from {path}");
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Overlay `KEG_PREFIX` and `KEG_MAX_ATTEMPTS` from the environment.
    ///
    /// Blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when `KEG_MAX_ATTEMPTS` is not a
    /// positive integer.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(prefix) = env_value(PREFIX_ENV) {
            self.prefix = Some(Utf8PathBuf::from(prefix));
        }
        if let Some(raw) = env_value(MAX_ATTEMPTS_ENV) {
            self.max_attempts = raw.parse().map_err(|err: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    var: MAX_ATTEMPTS_ENV,
                    value: raw.clone(),
                    reason: err.to_string(),
                }
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_attempts",
                reason: "must be at least 1",
            });
        }
        if self.download_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "download_timeout_secs",
                reason: "must be at least 1",
            });
        }
        if self.smoke_test_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "smoke_test_timeout_secs",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Return the configured prefix or the platform default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoPrefix`] when neither is available.
    pub fn resolve_prefix(&self) -> Result<Utf8PathBuf, ConfigError> {
        self.prefix
            .clone()
            .or_else(default_prefix)
            .ok_or(ConfigError::NoPrefix)
    }

    /// Return the retry policy for artefact downloads.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_base_ms))
    }

    /// Return the per-request download timeout.
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Return the smoke test timeout.
    #[must_use]
    pub const fn smoke_test_timeout(&self) -> Duration {
        Duration::from_secs(self.smoke_test_timeout_secs)
    }
}

/// Return `<config_dir>/keg/config.toml` for the current platform.
#[must_use]
pub fn default_config_path() -> Option<Utf8PathBuf> {
    directories_next::BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::try_from(dirs.config_dir().to_path_buf()).ok())
        .map(|dir| dir.join("keg").join("config.toml"))
}

fn env_value(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
