//! Shared configuration for Bookly widget shells.
//!
//! TOML profiles, API-key resolution (env + plaintext), and translation
//! to `bookly_core::WidgetConfig` / `bookly_api::TransportConfig`.
//! Embedding shells depend on this crate -- the core never reads config
//! files itself.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bookly_api::transport::TransportConfig;
use bookly_core::WidgetConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured for profile '{profile}'")]
    NoApiKey { profile: String },

    #[error("unknown profile '{profile}'")]
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

/// Top-level TOML configuration shared by widget shells.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named venue profiles.
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
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_refresh")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_true")]
    pub live_enabled: bool,

    #[serde(default = "default_polling")]
    pub polling_interval_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            refresh_interval_secs: default_refresh(),
            live_enabled: true,
            polling_interval_secs: default_polling(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_refresh() -> u64 {
    300
}
fn default_polling() -> u64 {
    2
}
fn default_true() -> bool {
    true
}

/// A named venue profile.
#[derive(Debug, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g. "https://api.bookly.example").
    pub backend: String,

    /// Venue id the widget serves.
    pub venue: String,

    /// Organization scope for storage keys and envelopes.
    pub organization: String,

    /// Publishable API key (plaintext -- prefer the env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Local cache directory. Platform data dir when unset.
    pub data_dir: Option<PathBuf>,

    /// Fee-rate fallback until the venue fetch supplies the real one.
    pub fee_rate: Option<f64>,

    /// Wall-clock offset fallback until the venue fetch supplies it.
    pub utc_offset_minutes: Option<i32>,

    /// Override the shared timeout.
    pub timeout: Option<u64>,

    /// Override the shared refresh interval.
    pub refresh_interval_secs: Option<u64>,

    /// Override the shared live-feed toggle.
    pub live_enabled: Option<bool>,

    /// Override the shared polling cadence.
    pub polling_interval_secs: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "bookly", "bookly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default local-cache directory for a profile.
pub fn default_data_dir(profile_name: &str) -> PathBuf {
    ProjectDirs::from("com", "bookly", "bookly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("data");
            p.push(profile_name);
            p
        },
        |dirs| dirs.data_dir().join(profile_name),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("bookly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = config_path();

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("BOOKLY_").split("_"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Key resolution ──────────────────────────────────────────────────

/// Resolve the publishable API key: named env var first, plaintext
/// profile value second.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoApiKey {
        profile: profile_name.into(),
    })
}

// ── Translation to runtime config ───────────────────────────────────

/// Build a `WidgetConfig` from a profile, applying shared defaults.
pub fn profile_to_widget_config(
    config: &Config,
    profile: &Profile,
    profile_name: &str,
) -> WidgetConfig {
    let defaults = &config.defaults;
    WidgetConfig {
        venue_id: profile.venue.clone(),
        organization_id: profile.organization.clone(),
        updated_by: Some(format!("widget:{profile_name}")),
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        refresh_interval_secs: profile
            .refresh_interval_secs
            .unwrap_or(defaults.refresh_interval_secs),
        live_enabled: profile.live_enabled.unwrap_or(defaults.live_enabled),
        polling_interval_secs: profile
            .polling_interval_secs
            .unwrap_or(defaults.polling_interval_secs),
        fee_rate: profile.fee_rate.unwrap_or(0.0),
        utc_offset_minutes: profile.utc_offset_minutes.unwrap_or(0),
    }
}

/// Build the backend URL and transport settings from a profile.
pub fn profile_transport(
    config: &Config,
    profile: &Profile,
    profile_name: &str,
) -> Result<(url::Url, TransportConfig), ConfigError> {
    let url: url::Url = profile
        .backend
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "backend".into(),
            reason: format!("invalid URL: {}", profile.backend),
        })?;

    let api_key = resolve_api_key(profile, profile_name)?;
    let timeout = Duration::from_secs(profile.timeout.unwrap_or(config.defaults.timeout));

    let transport = TransportConfig {
        api_key: Some(api_key),
        timeout,
    };
    Ok((url, transport))
}

/// Look up a profile by name, falling back to the configured default.
pub fn select_profile<'a>(
    config: &'a Config,
    name: Option<&'a str>,
) -> Result<(&'a str, &'a Profile), ConfigError> {
    let name = name
        .or(config.default_profile.as_deref())
        .unwrap_or("default");
    config
        .profiles
        .get(name)
        .map(|profile| (name, profile))
        .ok_or_else(|| ConfigError::UnknownProfile {
            profile: name.into(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            backend: "https://api.bookly.example".into(),
            venue: "ven_1".into(),
            organization: "org_1".into(),
            api_key: Some("pk_test_123".into()),
            api_key_env: None,
            data_dir: None,
            fee_rate: Some(0.06),
            utc_offset_minutes: Some(-360),
            timeout: None,
            refresh_interval_secs: Some(60),
            live_enabled: None,
            polling_interval_secs: None,
        }
    }

    #[test]
    fn widget_config_merges_profile_over_defaults() {
        let config = Config::default();
        let widget = profile_to_widget_config(&config, &profile(), "demo");

        assert_eq!(widget.venue_id, "ven_1");
        assert_eq!(widget.organization_id, "org_1");
        assert_eq!(widget.updated_by.as_deref(), Some("widget:demo"));
        // Profile override wins over the shared default.
        assert_eq!(widget.refresh_interval_secs, 60);
        // Shared defaults fill the gaps.
        assert!(widget.live_enabled);
        assert_eq!(widget.timeout, Duration::from_secs(30));
        assert_eq!(widget.utc_offset_minutes, -360);
    }

    #[test]
    fn transport_resolves_plaintext_key() {
        let config = Config::default();
        let (url, transport) = profile_transport(&config, &profile(), "demo").unwrap();
        assert_eq!(url.as_str(), "https://api.bookly.example/");
        assert!(transport.api_key.is_some());
    }

    #[test]
    fn missing_key_is_an_error() {
        let config = Config::default();
        let mut p = profile();
        p.api_key = None;
        let err = profile_transport(&config, &p, "demo").unwrap_err();
        assert!(matches!(err, ConfigError::NoApiKey { .. }));
    }

    #[test]
    fn select_profile_uses_default_name() {
        let mut config = Config::default();
        config.profiles.insert("default".into(), profile());

        let (name, _) = select_profile(&config, None).unwrap();
        assert_eq!(name, "default");

        let err = select_profile(&config, Some("ghost")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { .. }));
    }
}
