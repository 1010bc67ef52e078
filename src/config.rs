use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{mlog_debug, Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MUSTER_CONFIG";

pub const DEFAULT_API_URL: &str = "http://uinames.com/api/";

/// Run configuration. Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum spacing between two outbound calls.
    pub delay_millis: u64,
    /// Deadline for each join, counted from its last dispatch.
    pub join_timeout_secs: u64,
    /// Workflows started per iteration; also bounds how many run at once.
    pub workflow_count: usize,
    pub iteration_count: usize,
    pub iteration_delay_millis: u64,
    pub team_size_min: usize,
    pub team_size_max: usize,
    /// Upper bound on actions the pacer may hold at the same time.
    pub max_scheduled: usize,
    pub worker_threads: Option<usize>,
    pub request_timeout_secs: u64,
    pub api_url: String,
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delay_millis: 50,
            join_timeout_secs: 60,
            workflow_count: 200,
            iteration_count: 1,
            iteration_delay_millis: 5000,
            team_size_min: 2,
            team_size_max: 4,
            max_scheduled: 1000,
            worker_threads: None,
            request_timeout_secs: 30,
            api_url: DEFAULT_API_URL.to_string(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn muster_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".muster"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::muster_dir()?.join("muster.toml"))
    }

    /// Pick the config file: explicit path, then `MUSTER_CONFIG`, then the user default.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Ok(expand_tilde(path.trim())),
            _ => Self::default_path(),
        }
    }

    /// Load and validate. A missing file yields the defaults unless it was
    /// named explicitly.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(explicit)?;
        mlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            if explicit.is_some() {
                return Err(Error::Validation(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            mlog_debug!("Config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let config = Self::from_toml(&fs::read_to_string(&path)?)?;
        mlog_debug!(
            "Config loaded: delay={}ms timeout={}s workflows={} iterations={}",
            config.delay_millis,
            config.join_timeout_secs,
            config.workflow_count,
            config.iteration_count
        );
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                mlog_debug!("Creating config directory: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_toml()?)?;
        mlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.delay_millis == 0 {
            return Err(Error::Validation("delay_millis must be at least 1".into()));
        }
        if self.join_timeout_secs == 0 {
            return Err(Error::Validation(
                "join_timeout_secs must be at least 1".into(),
            ));
        }
        if self.workflow_count == 0 {
            return Err(Error::Validation("workflow_count must be at least 1".into()));
        }
        if self.iteration_count == 0 {
            return Err(Error::Validation(
                "iteration_count must be at least 1".into(),
            ));
        }
        if self.team_size_min == 0 {
            return Err(Error::Validation("team_size_min must be at least 1".into()));
        }
        if self.team_size_min > self.team_size_max {
            return Err(Error::Validation(format!(
                "team_size_min ({}) exceeds team_size_max ({})",
                self.team_size_min, self.team_size_max
            )));
        }
        if self.max_scheduled == 0 {
            return Err(Error::Validation("max_scheduled must be at least 1".into()));
        }
        if self.worker_threads == Some(0) {
            return Err(Error::Validation("worker_threads must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Validation(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        reqwest::Url::parse(&self.api_url)
            .map_err(|e| Error::Validation(format!("api_url '{}': {}", self.api_url, e)))?;
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.delay_millis)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.iteration_delay_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(expand_tilde)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
