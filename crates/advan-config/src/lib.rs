//! Reader profiles for advan.
//!
//! TOML profiles merged with `ADVAN_`-prefixed environment variables, and
//! translation to `advan_core::ReaderSettings`.

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

use advan_core::{CoreError, DEFAULT_CONTROL_PORT, ReaderSettings};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

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
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named reader profiles.
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

/// Values applied to every profile that does not override them.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Control request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_tag_op_timeout_ms")]
    pub tag_op_timeout_ms: u64,

    #[serde(default = "default_write_retries")]
    pub write_retries: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            tag_op_timeout_ms: default_tag_op_timeout_ms(),
            write_retries: default_write_retries(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}
fn default_tag_op_timeout_ms() -> u64 {
    1000
}
fn default_write_retries() -> u32 {
    2
}

/// A named reader profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Reader host name or IP address.
    pub host: String,

    /// HTTP control port.
    pub port: Option<u16>,

    /// Event stream port.
    pub event_port: Option<u16>,

    #[serde(default = "default_antennas")]
    pub antennas: Vec<u32>,

    /// Transmit power per antenna, dBm. `0.0` keeps the device value.
    #[serde(default)]
    pub tx_power: Vec<f64>,

    /// Receive sensitivity per antenna, dBm.
    #[serde(default)]
    pub rx_sensitivity: Vec<f64>,

    pub write_power: Option<f64>,

    /// Gen2 session, 0-3.
    pub session: Option<u8>,

    /// Gen2 search target index, 0-3 (A, B, AB, BA).
    pub search_mode: Option<u8>,

    /// Override the default request timeout, seconds.
    pub timeout: Option<u64>,
}

fn default_antennas() -> Vec<u32> {
    vec![1]
}

impl Profile {
    /// Profile for `host` with every other field at its default.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            event_port: None,
            antennas: default_antennas(),
            tx_power: Vec::new(),
            rx_sensitivity: Vec::new(),
            write_power: None,
            session: None,
            search_mode: None,
            timeout: None,
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }

    /// Resolve a profile straight to validated reader settings.
    pub fn reader_settings(&self, name: Option<&str>) -> Result<ReaderSettings, ConfigError> {
        let (_, profile) = self.profile(name)?;
        profile_to_settings(profile, &self.defaults)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "advan", "advan").map_or_else(
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
    p.push("advan");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the platform path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// A missing file is not an error. Nested keys in the environment use a
/// double underscore: `ADVAN_PROFILES__DOCK__HOST=10.0.0.5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ADVAN_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build `ReaderSettings` from a profile.
///
/// Missing power / sensitivity arrays mean "device default" on every
/// antenna. The result is validated before it is returned.
pub fn profile_to_settings(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ReaderSettings, ConfigError> {
    let base = ReaderSettings::default();
    let antennas = profile.antennas.len();
    let fill = |values: &[f64]| {
        if values.is_empty() {
            vec![0.0; antennas]
        } else {
            values.to_vec()
        }
    };

    let settings = ReaderSettings {
        host: profile.host.clone(),
        port: profile.port.unwrap_or(DEFAULT_CONTROL_PORT),
        event_port: profile.event_port.unwrap_or(base.event_port),
        antennas: profile.antennas.clone(),
        tx_power: fill(&profile.tx_power),
        rx_sensitivity: fill(&profile.rx_sensitivity),
        write_power: profile.write_power.unwrap_or(base.write_power),
        session: profile.session.unwrap_or(base.session),
        search_mode_index: profile.search_mode.unwrap_or(base.search_mode_index),
        request_timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        tag_op_timeout_ms: defaults.tag_op_timeout_ms,
        write_retries: defaults.write_retries,
    };

    settings.validate().map_err(|e| match e {
        CoreError::Configuration { message } | CoreError::Validation { message } => {
            ConfigError::Validation {
                field: "profile".into(),
                reason: message,
            }
        }
        other => ConfigError::Validation {
            field: "profile".into(),
            reason: other.to_string(),
        },
    })?;
    Ok(settings)
}
