pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing directly at a config file
pub const CONFIG_PATH_ENV: &str = "MINIFLUX_CONFIG_PATH";
/// Config file name searched for
pub const CONFIG_FILE: &str = "miniflux.yaml";
/// Per-project directory holding config, state and the local inventory
pub const PROJECT_DIR: &str = ".miniflux";

/// Find the config file to use, if any.
///
/// Search order:
/// 1. `MINIFLUX_CONFIG_PATH` (direct path)
/// 2. `./miniflux.yaml`
/// 3. `./.miniflux/miniflux.yaml`
/// 4. `~/.config/miniflux/miniflux.yaml`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        tracing::warn!(path = %path.display(), "{} points at a missing file", CONFIG_PATH_ENV);
    }

    let current_dir = std::env::current_dir()?;
    let candidates = [
        current_dir.join(CONFIG_FILE),
        current_dir.join(PROJECT_DIR).join(CONFIG_FILE),
    ];
    if let Some(path) = candidates.into_iter().find(|p| p.exists()) {
        return Ok(Some(path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("miniflux").join(CONFIG_FILE);
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Load the config found by [`find_config_file`], or defaults when there is none
pub fn load_config() -> Result<Config> {
    match find_config_file()? {
        Some(path) => Config::load_from(&path),
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub retry: RetrySettings,

    /// Child operations allowed to run at once within a dependency wave
    pub max_concurrency: usize,

    /// Where state files live; defaults to `./.miniflux`
    pub state_dir: Option<PathBuf>,

    pub local_cloud: LocalCloudSettings,

    /// File this config was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            max_concurrency: 1,
            state_dir: None,
            local_cloud: LocalCloudSettings::default(),
            source: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCloudSettings {
    /// Inventory file; defaults to `<state_dir>/inventory.json`
    pub inventory_file: Option<PathBuf>,
}

impl Config {
    pub fn from_yaml(content: &str, origin: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content, &path.display().to_string())?;
        config.source = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts < 1 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                field: "retry.backoff_multiplier",
                message: "must be at least 1.0".to_string(),
            });
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry.max_delay_ms",
                message: "must not be less than retry.initial_delay_ms".to_string(),
            });
        }
        if self.max_concurrency < 1 {
            return Err(ConfigError::Invalid {
                field: "max_concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// State directory, relative paths resolved against `project_root`
    pub fn state_dir(&self, project_root: &Path) -> PathBuf {
        match &self.state_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_root.join(dir),
            None => project_root.join(PROJECT_DIR),
        }
    }

    pub fn inventory_file(&self, project_root: &Path) -> PathBuf {
        match &self.local_cloud.inventory_file {
            Some(file) if file.is_absolute() => file.clone(),
            Some(file) => project_root.join(file),
            None => self.state_dir(project_root).join("inventory.json"),
        }
    }
}
