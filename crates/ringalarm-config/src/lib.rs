//! Shared configuration for Ring alarm tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! credential-cache location, and translation to
//! `ringalarm_api::SessionConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use ringalarm_api::SessionConfig;

/// Keyring service name; entries are keyed `<profile>/password`.
pub const KEYRING_SERVICE: &str = "ringalarm";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// REST request budget in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// 401 re-authentication budget.
    #[serde(default)]
    pub retries: u32,

    /// Directory holding `.ringAlarmCache`. Defaults to the home directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retries: 0,
            cache_dir: None,
        }
    }
}

fn default_timeout() -> u64 {
    300
}

/// A named Ring account profile.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Ring account e-mail.
    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name containing the password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Override the 401 retry budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Override timeout (seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<u32>,

    /// Override the credential cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

// ── Paths ───────────────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ringalarm", "ringalarm").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ringalarm");
    p
}

/// Directory the credential cache lives in when nothing overrides it.
pub fn default_cache_dir() -> PathBuf {
    BaseDirs::new().map_or_else(|| PathBuf::from("."), |dirs| dirs.home_dir().to_path_buf())
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. `RINGALARM_*` variables override it, with
/// `__` separating nested keys (`RINGALARM_DEFAULTS__RETRIES=1`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RINGALARM_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Profile name to use: explicit choice, else the file's default, else "default".
pub fn active_profile_name(cfg: &Config, requested: Option<&str>) -> String {
    requested
        .map(str::to_owned)
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve username + password for a profile.
///
/// Username: profile, then `RINGALARM_USERNAME`. Password: the profile's
/// `password_env` variable, then `RINGALARM_PASSWORD`, then the system
/// keyring, then plaintext in the profile.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<(String, SecretString), ConfigError> {
    let no_credentials = || ConfigError::NoCredentials {
        profile: profile_name.into(),
    };

    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var("RINGALARM_USERNAME").ok())
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(no_credentials)?;

    // 1. Profile's password_env → env var lookup
    if let Some(env_name) = &profile.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            debug!(profile = profile_name, source = "password_env", "resolved password");
            return Ok((username, SecretString::from(pw)));
        }
    }

    // 2. Global env var
    if let Ok(pw) = std::env::var("RINGALARM_PASSWORD") {
        debug!(profile = profile_name, source = "env", "resolved password");
        return Ok((username, SecretString::from(pw)));
    }

    // 3. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(pw) = entry.get_password() {
            debug!(profile = profile_name, source = "keyring", "resolved password");
            return Ok((username, SecretString::from(pw)));
        }
    }

    // 4. Plaintext in config
    if let Some(pw) = &profile.password {
        return Ok((username, SecretString::from(pw.clone())));
    }

    Err(no_credentials())
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `SessionConfig` from a profile plus global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let (username, password) = resolve_credentials(profile, profile_name)?;

    let timeout = profile.timeout.unwrap_or(defaults.timeout);
    if timeout == 0 {
        return Err(ConfigError::Validation {
            field: "timeout".into(),
            reason: "must be greater than zero".into(),
        });
    }

    let mut config = SessionConfig::new(username, password)
        .with_retries(profile.retries.unwrap_or(defaults.retries))
        .with_timeout(Duration::from_secs(timeout));
    if let Some(agent) = &profile.user_agent {
        config.user_agent.clone_from(agent);
    }
    if let Some(version) = profile.api_version {
        config.api_version = version;
    }

    config.validate().map_err(|e| ConfigError::Validation {
        field: "credentials".into(),
        reason: e.to_string(),
    })?;
    Ok(config)
}

/// Cache directory for a profile: profile override, then defaults, then home.
pub fn cache_dir(profile: &Profile, defaults: &Defaults) -> PathBuf {
    profile
        .cache_dir
        .clone()
        .or_else(|| defaults.cache_dir.clone())
        .unwrap_or_else(default_cache_dir)
}
