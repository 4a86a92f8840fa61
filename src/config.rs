use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::model::ROOT_FRAME;

const CONFIG_ENV: &str = "PAGECRAFT_CONFIG";
const DEBOUNCE_ENV: &str = "PAGECRAFT_SAVE_DEBOUNCE_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid PAGECRAFT_SAVE_DEBOUNCE_MS value: {0}")]
    InvalidDebounce(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub root_frame: String,
    pub default_page: String,
    pub save_debounce_ms: u64,
    pub max_relay_hops: u8,
    pub default_position: [f64; 2],
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_frame: ROOT_FRAME.to_string(),
            default_page: "home".to_string(),
            save_debounce_ms: 140,
            max_relay_hops: 16,
            default_position: [50.0, 50.0],
        }
    }
}

impl SyncConfig {
    /// Load from `config_path`, `$PAGECRAFT_CONFIG`, or the per-user config
    /// directory, in that order. A missing file means defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = config_path
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_yaml::from_str(&contents)?
            }
            _ => SyncConfig::default(),
        };

        if let Ok(raw) = std::env::var(DEBOUNCE_ENV) {
            config.save_debounce_ms = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidDebounce(raw.clone()))?;
        }

        Ok(config)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

fn default_config_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("org", "Pagecraft", "Pagecraft")?;
    Some(dirs.config_dir().join("pagecraft.yaml"))
}
