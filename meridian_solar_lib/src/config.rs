//! Runtime configuration: a TOML file, environment overrides for the
//! credentials, and range checks on every tunable.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use meridian_portal::{Credentials, PortalMarkers, SessionOptions};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const USERNAME_ENV: &str = "MERIDIAN_USERNAME";
pub const PASSWORD_ENV: &str = "MERIDIAN_PASSWORD";

pub const DEFAULT_SCAN_INTERVAL_MINUTES: u32 = 30;
pub const DEFAULT_HISTORY_DAYS: u32 = 7;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const MAX_USERNAME_LENGTH: usize = 254;
pub const MAX_PASSWORD_LENGTH: usize = 256;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Everything needed to build a coordinator.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub username: String,
    pub password: String,
    /// Minutes between update cycles.
    pub scan_interval_minutes: u32,
    /// Days of export history used for the average-daily-use fallback.
    pub history_days: u32,
    pub request_timeout_secs: u64,
    /// Overrides the built-in login page candidates when non-empty.
    pub candidate_urls: Vec<String>,
    /// Replaces the embedded extraction pattern table.
    pub patterns_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            scan_interval_minutes: DEFAULT_SCAN_INTERVAL_MINUTES,
            history_days: DEFAULT_HISTORY_DAYS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            candidate_urls: Vec::new(),
            patterns_file: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &meridian_portal::mask_username(&self.username))
            .field("password", &"<redacted>")
            .field("scan_interval_minutes", &self.scan_interval_minutes)
            .field("history_days", &self.history_days)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("candidate_urls", &self.candidate_urls)
            .field("patterns_file", &self.patterns_file)
            .finish()
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Credentials from `MERIDIAN_USERNAME` / `MERIDIAN_PASSWORD` take
    /// precedence over the file.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(USERNAME_ENV).ok(),
            std::env::var(PASSWORD_ENV).ok(),
        )
    }

    fn with_overrides(mut self, username: Option<String>, password: Option<String>) -> Self {
        if let Some(username) = username.filter(|u| !u.trim().is_empty()) {
            self.username = username;
        }
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.password = password;
        }
        self
    }

    /// Checks every field and normalises the username.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.username = validate_username(&self.username)?;
        validate_password(&self.password)?;
        validate_scan_interval(self.scan_interval_minutes)?;
        validate_history_days(self.history_days)?;
        validate_request_timeout(self.request_timeout_secs)?;
        for candidate in &self.candidate_urls {
            validate_candidate_url(candidate)?;
        }
        Ok(self)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.scan_interval_minutes) * 60)
    }

    pub fn session_options(&self, markers: PortalMarkers) -> SessionOptions {
        let mut options =
            SessionOptions::new(markers).with_timeout(Duration::from_secs(self.request_timeout_secs));
        if !self.candidate_urls.is_empty() {
            options = options.with_candidate_urls(self.candidate_urls.clone());
        }
        options
    }
}

/// Trims and strips control characters; must not end up empty.
pub fn validate_username(input: &str) -> Result<String, ConfigError> {
    if input.len() > MAX_USERNAME_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "username exceeds maximum length of {} bytes",
            MAX_USERNAME_LENGTH
        )));
    }
    let sanitized: String = input
        .chars()
        .filter(|c| !c.is_ascii_control())
        .collect::<String>()
        .trim()
        .to_string();
    if sanitized.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "username is empty (set it in the config file or {})",
            USERNAME_ENV
        )));
    }
    Ok(sanitized)
}

/// Passwords are taken verbatim; only emptiness and length are checked.
pub fn validate_password(input: &str) -> Result<(), ConfigError> {
    if input.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "password is empty (set it in the config file or {})",
            PASSWORD_ENV
        )));
    }
    if input.len() > MAX_PASSWORD_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "password exceeds maximum length of {} bytes",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Validate scan interval (must be 1..=180 minutes).
pub fn validate_scan_interval(minutes: u32) -> Result<u32, ConfigError> {
    if !(1..=180).contains(&minutes) {
        return Err(ConfigError::Invalid(
            "scan_interval_minutes must be between 1 and 180".to_string(),
        ));
    }
    Ok(minutes)
}

/// Validate history window (must be 1..=30 days).
pub fn validate_history_days(days: u32) -> Result<u32, ConfigError> {
    if !(1..=30).contains(&days) {
        return Err(ConfigError::Invalid(
            "history_days must be between 1 and 30".to_string(),
        ));
    }
    Ok(days)
}

/// Validate request timeout (must be 5..=120 seconds).
pub fn validate_request_timeout(secs: u64) -> Result<u64, ConfigError> {
    if !(5..=120).contains(&secs) {
        return Err(ConfigError::Invalid(
            "request_timeout_secs must be between 5 and 120".to_string(),
        ));
    }
    Ok(secs)
}

pub fn validate_candidate_url(input: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(input.trim())
        .map_err(|e| ConfigError::Invalid(format!("candidate url '{}': {}", input, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "candidate url '{}' must be http or https",
            input
        )));
    }
    Ok(url)
}
