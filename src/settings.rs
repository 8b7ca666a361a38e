//! Session-scoped configuration: where the cache lives, how the client
//! identifies itself and how hard upstream services are hit.

use crate::utils::get_cache_dir;
use bon::bon;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = concat!("wetter/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONCURRENCY: usize = 8;

pub const ENV_CACHE_DIR: &str = "WETTER_CACHE_DIR";
pub const ENV_CACHE_DISABLE: &str = "WETTER_CACHE_DISABLE";
pub const ENV_USER_AGENT: &str = "WETTER_USER_AGENT";
pub const ENV_TIMEOUT_SECS: &str = "WETTER_TIMEOUT_SECS";
pub const ENV_CONCURRENCY: &str = "WETTER_CONCURRENCY";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Configuration of one [`crate::Wetter`] session.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use wetter::Settings;
///
/// let settings = Settings::builder()
///     .cache_disabled(true)
///     .timeout(Duration::from_secs(10))
///     .concurrency(4)
///     .build();
/// assert_eq!(settings.concurrency(), 4);
/// assert!(settings.cache_disabled());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    cache_dir: Option<PathBuf>,
    cache_disabled: bool,
    user_agent: String,
    timeout: Duration,
    concurrency: usize,
}

#[bon]
impl Settings {
    /// # Arguments
    ///
    /// * `.cache_dir(PathBuf)`: Optional. Directory for cached remote content.
    ///   Defaults to `wetter_cache` inside the platform cache directory.
    /// * `.cache_disabled(bool)`: Optional. Disables persistence entirely. Defaults to `false`.
    /// * `.user_agent(impl Into<String>)`: Optional. Client identifier sent with every request.
    /// * `.timeout(Duration)`: Optional. Per-request timeout. Defaults to 30 seconds.
    /// * `.concurrency(usize)`: Optional. Parallel downloads per batch. Defaults to 8.
    #[builder]
    pub fn new(
        cache_dir: Option<PathBuf>,
        #[builder(default)] cache_disabled: bool,
        #[builder(into, default = DEFAULT_USER_AGENT.to_string())] user_agent: String,
        #[builder(default = DEFAULT_TIMEOUT)] timeout: Duration,
        #[builder(default = DEFAULT_CONCURRENCY)] concurrency: usize,
    ) -> Self {
        Self {
            cache_dir,
            cache_disabled,
            user_agent,
            timeout,
            concurrency: concurrency.max(1),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::builder().build()
    }
}

impl Settings {
    /// Default settings overlaid with `WETTER_*` environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Settings::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by environment variable name.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(value) = lookup(ENV_CACHE_DISABLE) {
            self.cache_disabled = parse_flag(ENV_CACHE_DISABLE, &value)?;
        }
        if let Some(agent) = lookup(ENV_USER_AGENT).filter(|v| !v.trim().is_empty()) {
            self.user_agent = agent.trim().to_string();
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            let secs = parse_positive(ENV_TIMEOUT_SECS, &value)?;
            self.timeout = Duration::from_secs(secs as u64);
        }
        if let Some(value) = lookup(ENV_CONCURRENCY) {
            self.concurrency = parse_positive(ENV_CONCURRENCY, &value)?;
        }
        Ok(self)
    }

    pub fn cache_dir(&self) -> Option<&PathBuf> {
        self.cache_dir.as_ref()
    }

    /// The configured cache directory, or the platform default.
    pub fn resolve_cache_dir(&self) -> io::Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_cache_dir(),
        }
    }

    pub fn cache_disabled(&self) -> bool {
        self.cache_disabled
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected a boolean flag",
        }),
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<usize, SettingsError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SettingsError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected a positive integer",
        }),
    }
}
