//! Shared configuration for hgfeed tools.
//!
//! TOML profiles merged with `HGFEED_*` environment variables, translation
//! to `hgfeed_core::SessionConfig`, and storage for the refresh token that
//! lets a profile skip the password on the next run.

mod session_store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hgfeed_core::{PollInterval, SessionConfig, TlsVerification};

pub use session_store::{SessionBackend, SessionStore};

/// Profile used when neither the command line nor the file names one.
pub const DEFAULT_PROFILE: &str = "default";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' is not configured")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse stored session: {0}")]
    Deserialization(#[from] toml::de::Error),

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
            default_profile: Some(DEFAULT_PROFILE.into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds between polls in `watch`.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Per-operation timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_locale")]
    pub locale: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub session_store: SessionBackend,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            poll_interval: default_poll_interval(),
            timeout: default_timeout(),
            locale: default_locale(),
            timezone: default_timezone(),
            session_store: SessionBackend::default(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_poll_interval() -> u64 {
    15
}
fn default_timeout() -> u64 {
    10
}
fn default_locale() -> String {
    "it-IT".into()
}
fn default_timezone() -> String {
    "Europe/Rome".into()
}

/// A named HGSmart account.
///
/// There is no password field: a login stores a refresh token through the
/// profile's session store instead.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Account e-mail.
    pub username: String,

    /// API root override (e.g. a recording proxy).
    pub base_url: Option<String>,

    /// Override poll interval, seconds.
    pub poll_interval: Option<u64>,

    /// Override timeout, seconds.
    pub timeout: Option<u64>,

    pub locale: Option<String>,

    pub timezone: Option<String>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification.
    pub insecure: Option<bool>,

    /// Feeder models to manage. Omitted means the session default.
    pub models: Option<Vec<String>>,

    /// Where the refresh token lives.
    pub session_store: Option<SessionBackend>,

    /// File used when `session_store = "file"`.
    pub session_file: Option<PathBuf>,
}

impl Config {
    /// Resolve a profile by explicit name, then `default_profile`, then
    /// [`DEFAULT_PROFILE`].
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or(DEFAULT_PROFILE)
            .to_owned();
        let profile = self
            .profiles
            .get(&name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.clone(),
            })?;
        Ok((name, profile))
    }
}

// ── Config file path ────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "hgfeed", "hgfeed")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default session file for `profile` when the file backend is used.
pub fn default_session_file(profile: &str) -> PathBuf {
    let base = project_dirs().map_or_else(dirs_fallback, |dirs| dirs.data_local_dir().to_path_buf());
    base.join("sessions").join(format!("{profile}.toml"))
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hgfeed");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest with `__`, e.g.
/// `HGFEED_DEFAULTS__POLL_INTERVAL=30`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HGFEED_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Session config ──────────────────────────────────────────────────

/// Build a `SessionConfig` from a profile and the global defaults.
pub fn profile_to_session_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let mut config = SessionConfig::default();

    if let Some(ref base_url) = profile.base_url {
        url::Url::parse(base_url).map_err(|e| ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("invalid URL '{base_url}': {e}"),
        })?;
        config.base_url.clone_from(base_url);
    }

    config.tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let timeout = profile.timeout.unwrap_or(defaults.timeout);
    if timeout == 0 {
        return Err(ConfigError::Validation {
            field: "timeout".into(),
            reason: "must be at least 1 second".into(),
        });
    }
    config.operation_timeout = Duration::from_secs(timeout);
    config.poll_interval =
        PollInterval::from_secs(profile.poll_interval.unwrap_or(defaults.poll_interval));
    config.locale = profile.locale.clone().unwrap_or_else(|| defaults.locale.clone());
    config.timezone = profile
        .timezone
        .clone()
        .unwrap_or_else(|| defaults.timezone.clone());
    if let Some(ref models) = profile.models {
        config.supported_models.clone_from(models);
    }

    Ok(config)
}
