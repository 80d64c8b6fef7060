//! Configuration management.
//!
//! Settings are layered, lowest priority first:
//!
//! 1. Built-in defaults (8 hour interval, `https://api.podio.com`,
//!    `~/.podio-mirror/data/mirror.db`)
//! 2. `~/.podio-mirror/config.json` (or `--config <path>`)
//! 3. Environment variables (`PODIO_CLIENT_ID`, `PODIO_CLIENT_SECRET`,
//!    `PODIO_USERNAME`, `PODIO_PASSWORD`, `PODIO_APP_IDS`,
//!    `PODIO_SYNC_INTERVAL`, `PODIO_MIRROR_DB`, `PODIO_API_ENDPOINT`)
//! 4. CLI flags (`--db`, `--interval`, `--app`)
//!
//! Layers are merged into a [`PartialConfig`] first so `podio-mirror config`
//! can show what is missing, then validated into a [`MirrorConfig`].

use crate::error::{Error, Result};
use crate::remote::DEFAULT_ENDPOINT;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default steady-state interval between cycles (8 hours).
pub const DEFAULT_INTERVAL_SECS: u64 = 8 * 60 * 60;

/// Default per-request timeout for Podio calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Podio OAuth credentials (password grant).
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &mask(&self.client_secret))
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .finish()
    }
}

/// Validated configuration for a mirror run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub credentials: Credentials,
    /// Applications to mirror, in processing order.
    pub app_ids: Vec<i64>,
    /// Sleep between successful cycles.
    pub interval: Duration,
    pub db_path: PathBuf,
    pub endpoint: String,
    pub request_timeout: Duration,
}

/// On-disk configuration file (`config.json`). Every member is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_ids: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub interval_secs: Option<u64>,
    pub app_ids: Vec<i64>,
}

impl PartialConfig {
    /// Overlay `other` on top of `self`: members set in `other` win.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            client_id: other.client_id.or(self.client_id),
            client_secret: other.client_secret.or(self.client_secret),
            username: other.username.or(self.username),
            password: other.password.or(self.password),
            app_ids: other.app_ids.or(self.app_ids),
            interval_secs: other.interval_secs.or(self.interval_secs),
            db_path: other.db_path.or(self.db_path),
            endpoint: other.endpoint.or(self.endpoint),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
        }
    }

    /// Read the environment layer through `lookup` (normally `std::env::var`).
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse.
    pub fn from_env<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            client_id: get("PODIO_CLIENT_ID"),
            client_secret: get("PODIO_CLIENT_SECRET"),
            username: get("PODIO_USERNAME"),
            password: get("PODIO_PASSWORD"),
            app_ids: get("PODIO_APP_IDS").map(|v| parse_app_ids(&v)).transpose()?,
            interval_secs: get("PODIO_SYNC_INTERVAL")
                .map(|v| parse_secs("PODIO_SYNC_INTERVAL", &v))
                .transpose()?,
            db_path: get("PODIO_MIRROR_DB").map(PathBuf::from),
            endpoint: get("PODIO_API_ENDPOINT"),
            request_timeout_secs: None,
        })
    }

    fn from_overrides(overrides: &Overrides) -> Self {
        Self {
            app_ids: (!overrides.app_ids.is_empty()).then(|| overrides.app_ids.clone()),
            interval_secs: overrides.interval_secs,
            db_path: overrides.db.clone(),
            ..Self::default()
        }
    }

    /// Validate into a runnable configuration.
    ///
    /// # Errors
    ///
    /// Returns `NotConfigured` naming the first missing credential, or when
    /// no application ids are configured, and `Config` for a zero interval.
    pub fn into_config(self) -> Result<MirrorConfig> {
        fn required(value: Option<String>, name: &str) -> Result<String> {
            value.ok_or_else(|| Error::NotConfigured(name.to_string()))
        }

        let credentials = Credentials {
            client_id: required(self.client_id, "PODIO_CLIENT_ID")?,
            client_secret: required(self.client_secret, "PODIO_CLIENT_SECRET")?,
            username: required(self.username, "PODIO_USERNAME")?,
            password: required(self.password, "PODIO_PASSWORD")?,
        };

        let app_ids = self.app_ids.unwrap_or_default();
        if app_ids.is_empty() {
            return Err(Error::NotConfigured("PODIO_APP_IDS".to_string()));
        }

        let interval_secs = self.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(Error::Config(
                "sync interval must be at least 1 second".to_string(),
            ));
        }

        let db_path = match self.db_path {
            Some(path) => path,
            None => default_db_path()
                .ok_or_else(|| Error::Config("Could not determine home directory".into()))?,
        };

        Ok(MirrorConfig {
            credentials,
            app_ids,
            interval: Duration::from_secs(interval_secs),
            db_path,
            endpoint: self.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            request_timeout: Duration::from_secs(
                self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        })
    }

    /// Copy with secrets replaced by a mask, for display.
    #[must_use]
    pub fn masked(&self) -> Self {
        Self {
            client_secret: self.client_secret.as_deref().map(mask),
            password: self.password.as_deref().map(mask),
            ..self.clone()
        }
    }
}

/// Merge file, environment and CLI layers.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed,
/// or if an environment variable is malformed.
pub fn resolve_partial(overrides: &Overrides) -> Result<PartialConfig> {
    let file = load_file_config(overrides.config_path.as_deref())?;
    let env = PartialConfig::from_env(|key| std::env::var(key).ok())?;
    Ok(file.merge(env).merge(PartialConfig::from_overrides(overrides)))
}

/// Resolve and validate the full configuration.
///
/// # Errors
///
/// See [`resolve_partial`] and [`PartialConfig::into_config`].
pub fn resolve(overrides: &Overrides) -> Result<MirrorConfig> {
    resolve_partial(overrides)?.into_config()
}

/// Load the config file. A missing file is an empty layer.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_file_config(explicit: Option<&Path>) -> Result<PartialConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => return Ok(PartialConfig::default()),
        },
    };

    if !path.exists() {
        if explicit.is_some() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(PartialConfig::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// The global podio-mirror directory (`~/.podio-mirror/`).
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".podio-mirror"))
}

/// Default config file location.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join("config.json"))
}

/// Default mirror database location.
#[must_use]
pub fn default_db_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join("data").join("mirror.db"))
}

/// Resolve the database path without requiring credentials.
///
/// Priority: explicit flag, `PODIO_MIRROR_DB`, config file, global default.
#[must_use]
pub fn resolve_db_path(explicit: Option<&Path>, config_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("PODIO_MIRROR_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    if let Ok(PartialConfig {
        db_path: Some(path),
        ..
    }) = load_file_config(config_path)
    {
        return Some(path);
    }

    default_db_path()
}

/// Parse a comma/whitespace separated list of application ids.
///
/// # Errors
///
/// Returns a `Config` error naming the first token that is not an integer.
pub fn parse_app_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| Error::Config(format!("Invalid application id: {token}")))
        })
        .collect()
}

fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{name} must be a number of seconds, got '{raw}'")))
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}
