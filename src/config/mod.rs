//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::aggregator::{
    ChartSettings, DEFAULT_MOVING_AVERAGE_WINDOWS, DEFAULT_RETENTION_WEEKS, DEFAULT_STOCHASTIC_D,
    DEFAULT_STOCHASTIC_K,
};
use crate::cli::ConfigAction;
use crate::model::{Range, normalize_symbol, validate_symbol};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Sidebar symbols, in display order
    pub symbols: Vec<String>,

    /// Symbol shown in the main chart
    pub current_symbol: Option<String>,

    /// Logging level
    pub log_level: String,

    /// File-based logging configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Market data provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Chart building parameters
    #[serde(default)]
    pub chart: ChartConfig,

    /// Quote/chart cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct LogConfig {
    /// Rolling log file; logs go to stderr only when unset
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// REST API base URL
    pub base_url: String,

    /// API token, sent as a query parameter
    pub token: Option<String>,

    /// Request timeout in seconds, 0 for none
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Range of the main chart
    pub chart_range: Range,

    /// Range of sidebar thumbnails
    pub thumb_range: Range,

    pub retention_weeks: usize,
    pub moving_average_windows: Vec<usize>,
    pub stochastic_k: usize,
    pub stochastic_d: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// JSON file holding the durable cache
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["SPY".to_string(), "QQQ".to_string()],
            current_symbol: Some("SPY".to_string()),
            log_level: "info".to_string(),
            log: LogConfig::default(),
            provider: ProviderConfig::default(),
            chart: ChartConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cloud.iexapis.com/stable".to_string(),
            token: None,
            timeout_seconds: 0,
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            chart_range: Range::OneYear,
            thumb_range: Range::OneDay,
            retention_weeks: DEFAULT_RETENTION_WEEKS,
            moving_average_windows: DEFAULT_MOVING_AVERAGE_WINDOWS.to_vec(),
            stochastic_k: DEFAULT_STOCHASTIC_K,
            stochastic_d: DEFAULT_STOCHASTIC_D,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "cache/chartfeed.json".to_string(),
        }
    }
}

fn parse_symbols(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(normalize_symbol)
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply `CHARTFEED_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // CHARTFEED_SYMBOLS - comma-separated sidebar symbols
        if let Some(symbols) = lookup("CHARTFEED_SYMBOLS") {
            self.symbols = parse_symbols(&symbols);
        }

        if let Some(symbol) = lookup("CHARTFEED_CURRENT_SYMBOL") {
            let symbol = normalize_symbol(&symbol);
            self.current_symbol = (!symbol.is_empty()).then_some(symbol);
        }

        if let Some(log_level) = lookup("CHARTFEED_LOG_LEVEL") {
            self.log_level = log_level;
        }

        if let Some(file_path) = lookup("CHARTFEED_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = Some(file_path);
            }
        }

        if let Some(base_url) = lookup("CHARTFEED_PROVIDER_BASE_URL") {
            self.provider.base_url = base_url;
        }

        if let Some(token) = lookup("CHARTFEED_PROVIDER_TOKEN") {
            self.provider.token = Some(token);
        }

        if let Some(timeout) = lookup("CHARTFEED_PROVIDER_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.provider.timeout_seconds = value;
            }
        }

        if let Some(range) = lookup("CHARTFEED_CHART_RANGE") {
            if let Ok(value) = range.parse::<Range>() {
                self.chart.chart_range = value;
            }
        }

        if let Some(range) = lookup("CHARTFEED_THUMB_RANGE") {
            if let Ok(value) = range.parse::<Range>() {
                self.chart.thumb_range = value;
            }
        }

        if let Some(enabled) = lookup("CHARTFEED_CACHE_ENABLED") {
            self.cache.enabled = enabled.parse().unwrap_or(self.cache.enabled);
        }

        if let Some(path) = lookup("CHARTFEED_CACHE_PATH") {
            if !path.trim().is_empty() {
                self.cache.path = path;
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {:#}, using defaults", err);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for symbol in self.symbols.iter().chain(self.current_symbol.iter()) {
            validate_symbol(symbol).with_context(|| format!("Invalid symbol: {}", symbol))?;
        }

        if self.provider.base_url.trim().is_empty() {
            anyhow::bail!("provider.base_url must not be empty");
        }

        for (name, range) in [
            ("chart.chart_range", self.chart.chart_range),
            ("chart.thumb_range", self.chart.thumb_range),
        ] {
            if range == Range::Unspecified {
                anyhow::bail!("{} must be one-day or one-year", name);
            }
        }

        if self.chart.retention_weeks == 0 {
            anyhow::bail!("chart.retention_weeks must be greater than 0");
        }

        if self.chart.moving_average_windows.contains(&0) {
            anyhow::bail!("chart.moving_average_windows must not contain 0");
        }

        if self.chart.stochastic_k == 0 || self.chart.stochastic_d == 0 {
            anyhow::bail!("chart.stochastic_k and chart.stochastic_d must be greater than 0");
        }

        if self.cache.enabled && self.cache.path.trim().is_empty() {
            anyhow::bail!("cache.path must not be empty when the cache is enabled");
        }

        Ok(())
    }

    /// Chart parameters passed to the aggregator
    pub fn chart_settings(&self) -> ChartSettings {
        ChartSettings {
            retention_weeks: self.chart.retention_weeks,
            moving_average_windows: self.chart.moving_average_windows.clone(),
            stochastic_k: self.chart.stochastic_k,
            stochastic_d: self.chart.stochastic_d,
        }
    }

    /// Provider timeout, `None` when unbounded
    pub fn provider_timeout(&self) -> Option<Duration> {
        (self.provider.timeout_seconds > 0).then(|| Duration::from_secs(self.provider.timeout_seconds))
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        println!("Current configuration:");
        println!("{}", content);
        Ok(())
    }

    /// Handle configuration command
    pub fn handle_command(action: &ConfigAction, config_file: &str) -> Result<()> {
        match action {
            ConfigAction::Show => {
                let config = Config::load_or_default(config_file);
                config.display()?;
            }
            ConfigAction::Reset => {
                let default_config = Config::default();
                default_config.save_to_file(config_file)?;
                println!("Configuration reset: {}", config_file);
                default_config.display()?;
            }
        }
        Ok(())
    }
}
