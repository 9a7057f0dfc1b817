//! Application configuration.
//!
//! Values come from a TOML file (every key optional) layered over built-in
//! defaults. The resolved [`AppConfig`] is turned into the immutable
//! settings structs handed to constructors.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::fetch::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    DEFAULT_MAX_JITTER, DEFAULT_REQUEST_TIMEOUT, FetchSettings, RetryPolicy,
};
use crate::model::TournamentType;
use crate::update::{
    DEFAULT_CONCURRENCY, DEFAULT_UNIT_DELAY, MAX_CONCURRENCY, MIN_CONCURRENCY, TournamentRefresh,
    UpdateSettings,
};
use crate::user_agent::default_user_agent;

/// Source site scraped by default.
pub const DEFAULT_BASE_URL: &str = "https://www.atptour.com";

/// Default directory for table files.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default listen address for `serve`.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

const APP_DIR: &str = "tennis-ingest";

/// TOML-backed file configuration. Absent keys keep the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub retry_jitter_ms: Option<u64>,
    /// Pause between two units sent to the same host.
    pub unit_delay_ms: Option<u64>,
    pub concurrency: Option<usize>,
    /// Wall-clock budget per update call.
    pub run_budget_secs: Option<u64>,
    pub tournament_refresh: Option<TournamentRefresh>,
    pub weekly_tournament_types: Option<Vec<TournamentType>>,
    /// When set, admin and task routes require `?token=`.
    pub admin_token: Option<String>,
    pub bind: Option<String>,
    pub user_agent: Option<String>,
}

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML, unknown keys, or out-of-range values.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates config values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range key.
    pub fn validate(&self) -> Result<()> {
        if let Some(secs) = self.request_timeout_secs
            && !(1..=3600).contains(&secs)
        {
            bail!("Invalid config value for `request_timeout_secs`: {secs}. Expected range: 1..=3600");
        }
        if let Some(attempts) = self.max_attempts
            && !(1..=10).contains(&attempts)
        {
            bail!("Invalid config value for `max_attempts`: {attempts}. Expected range: 1..=10");
        }
        if let Some(delay) = self.unit_delay_ms
            && delay > 60_000
        {
            bail!("Invalid config value for `unit_delay_ms`: {delay}. Expected range: 0..=60000");
        }
        if let Some(concurrency) = self.concurrency
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency)
        {
            bail!(
                "Invalid config value for `concurrency`: {concurrency}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"
            );
        }
        if let (Some(base), Some(max)) = (self.retry_base_delay_ms, self.retry_max_delay_ms)
            && base > max
        {
            bail!("`retry_base_delay_ms` ({base}) must not exceed `retry_max_delay_ms` ({max})");
        }
        if self.run_budget_secs == Some(0) {
            bail!("Invalid config value for `run_budget_secs`: 0. Omit the key for no budget");
        }
        if let Some(types) = &self.weekly_tournament_types
            && types.is_empty()
        {
            bail!("`weekly_tournament_types` must list at least one type");
        }
        if let Some(url) = &self.base_url {
            url::Url::parse(url).with_context(|| format!("Invalid `base_url` '{url}'"))?;
        }
        Ok(())
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_jitter: Duration,
    pub unit_delay: Duration,
    pub concurrency: usize,
    pub run_budget: Option<Duration>,
    pub tournament_refresh: TournamentRefresh,
    pub weekly_tournament_types: Vec<TournamentType>,
    pub admin_token: Option<String>,
    pub bind: String,
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let update = UpdateSettings::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: DEFAULT_BASE_DELAY,
            retry_max_delay: DEFAULT_MAX_DELAY,
            retry_jitter: DEFAULT_MAX_JITTER,
            unit_delay: DEFAULT_UNIT_DELAY,
            concurrency: DEFAULT_CONCURRENCY,
            run_budget: None,
            tournament_refresh: update.tournament_refresh,
            weekly_tournament_types: update.weekly_tournament_types,
            admin_token: None,
            bind: DEFAULT_BIND.to_string(),
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Layers a file config over the defaults.
    #[must_use]
    pub fn from_file(file: FileConfig) -> Self {
        let defaults = Self::default();
        Self {
            base_url: file.base_url.unwrap_or(defaults.base_url),
            data_dir: file.data_dir.unwrap_or(defaults.data_dir),
            request_timeout: file
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            max_attempts: file.max_attempts.unwrap_or(defaults.max_attempts),
            retry_base_delay: file
                .retry_base_delay_ms
                .map_or(defaults.retry_base_delay, Duration::from_millis),
            retry_max_delay: file
                .retry_max_delay_ms
                .map_or(defaults.retry_max_delay, Duration::from_millis),
            retry_jitter: file
                .retry_jitter_ms
                .map_or(defaults.retry_jitter, Duration::from_millis),
            unit_delay: file
                .unit_delay_ms
                .map_or(defaults.unit_delay, Duration::from_millis),
            concurrency: file.concurrency.unwrap_or(defaults.concurrency),
            run_budget: file.run_budget_secs.map(Duration::from_secs),
            tournament_refresh: file
                .tournament_refresh
                .unwrap_or(defaults.tournament_refresh),
            weekly_tournament_types: file
                .weekly_tournament_types
                .unwrap_or(defaults.weekly_tournament_types),
            admin_token: file.admin_token.filter(|t| !t.is_empty()),
            bind: file.bind.unwrap_or(defaults.bind),
            user_agent: file.user_agent.unwrap_or(defaults.user_agent),
        }
    }

    /// Loads `explicit` when given, else the default config path if that
    /// file exists, else the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or if any file read
    /// cannot be parsed or validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file '{}' does not exist", path.display());
                }
                Some(path.to_path_buf())
            }
            None => resolve_default_config_path().filter(|path| path.exists()),
        };

        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let file = FileConfig::parse(&raw)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        Ok(Self::from_file(file))
    }

    #[must_use]
    pub fn fetch_settings(&self) -> FetchSettings {
        let retry = RetryPolicy::new(
            self.max_attempts,
            self.retry_base_delay,
            self.retry_max_delay,
            DEFAULT_BACKOFF_MULTIPLIER,
        )
        .with_jitter(self.retry_jitter);
        FetchSettings {
            request_timeout: self.request_timeout,
            retry,
            user_agent: self.user_agent.clone(),
        }
    }

    #[must_use]
    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            concurrency: self.concurrency,
            unit_delay: self.unit_delay,
            run_budget: self.run_budget,
            tournament_refresh: self.tournament_refresh,
            weekly_tournament_types: self.weekly_tournament_types.clone(),
        }
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/tennis-ingest/config.toml`
/// 2. `$HOME/.config/tennis-ingest/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(env_var_non_empty_os("XDG_CONFIG_HOME"), env_var_non_empty_os("HOME"))
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home {
        return Some(PathBuf::from(xdg).join(APP_DIR).join("config.toml"));
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
