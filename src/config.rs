use crate::constants::*;
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub venue: VenueConfig,
    pub fetch: FetchConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    pub base_url: String,
    pub calendar_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound on enrichment tasks in flight
    pub concurrency: usize,
    /// Per-fetch readiness bound for detail pages
    pub timeout_ms: u64,
    pub listing_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub jitter_ms: u64,
    pub user_agent: String,
    pub listing_ready_selector: String,
    pub detail_ready_selector: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub publish_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venue: VenueConfig::default(),
            fetch: FetchConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            calendar_url: CALENDAR_URL.to_string(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            listing_timeout_ms: DEFAULT_LISTING_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            jitter_ms: DEFAULT_JITTER_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            listing_ready_selector: LISTING_READY_SELECTOR.to_string(),
            detail_ready_selector: DETAIL_READY_SELECTOR.to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            publish_dir: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_millis(self.listing_timeout_ms)
    }
}

impl Config {
    /// Defaults, then `config.toml` (or the given path), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new("config.toml").exists() => Self::from_file(Path::new("config.toml"))?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("SCREENINGS_CONCURRENCY") {
            self.fetch.concurrency = v
                .trim()
                .parse()
                .map_err(|_| ScraperError::Config(format!("SCREENINGS_CONCURRENCY is not a number: {v}")))?;
        }
        if let Ok(v) = std::env::var("SCREENINGS_TIMEOUT_MS") {
            self.fetch.timeout_ms = v
                .trim()
                .parse()
                .map_err(|_| ScraperError::Config(format!("SCREENINGS_TIMEOUT_MS is not a number: {v}")))?;
        }
        if let Ok(v) = std::env::var("SCREENINGS_OUTPUT") {
            if !v.trim().is_empty() {
                self.output.path = PathBuf::from(v.trim());
            }
        }
        if let Ok(v) = std::env::var("SCREENINGS_PUBLISH_DIR") {
            if !v.trim().is_empty() {
                self.output.publish_dir = Some(PathBuf::from(v.trim()));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency < 1 {
            return Err(ScraperError::Config("concurrency must be at least 1".to_string()));
        }
        if self.fetch.timeout_ms == 0 || self.fetch.listing_timeout_ms == 0 {
            return Err(ScraperError::Config("timeouts must be greater than zero".to_string()));
        }
        if self.fetch.poll_interval_ms == 0 {
            return Err(ScraperError::Config("poll_interval_ms must be greater than zero".to_string()));
        }
        url::Url::parse(&self.venue.base_url)
            .map_err(|e| ScraperError::Config(format!("invalid base_url '{}': {e}", self.venue.base_url)))?;
        url::Url::parse(&self.venue.calendar_url)
            .map_err(|e| ScraperError::Config(format!("invalid calendar_url '{}': {e}", self.venue.calendar_url)))?;
        Ok(())
    }
}
