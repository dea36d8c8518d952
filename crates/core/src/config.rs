//! Strip configuration
//!
//! Settings come from defaults, then an optional JSON file, then
//! environment variables, each layer overriding the previous one.

use crate::error::ConfigError;
use pagestrip_scheduler::PoolConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Thumbnail edge lengths offered by the zoom control, in pixels
pub const DEFAULT_ITEM_SIZES: [u32; 8] = [64, 96, 128, 160, 200, 256, 320, 400];

/// Configuration for an [`ImageCollection`](crate::ImageCollection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripConfig {
    /// Ascending list of item edge lengths in pixels
    pub item_sizes: Vec<u32>,
    /// Index into `item_sizes` used at startup
    pub size_index: usize,
    /// Horizontal space inside an item not available to the thumbnail
    pub h_margin: u32,
    /// Vertical space inside an item not available to the thumbnail
    pub v_margin: u32,
    /// Height reserved for the caption under each thumbnail
    pub text_height: u32,
    /// Show outlines only and never render
    pub frame_only: bool,
    /// Number of render worker threads; 0 uses one per CPU
    pub render_workers: usize,
    /// How often idle render workers wake up, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            item_sizes: DEFAULT_ITEM_SIZES.to_vec(),
            size_index: 3,
            h_margin: 12,
            v_margin: 12,
            text_height: 20,
            frame_only: false,
            render_workers: 2,
            poll_interval_ms: 100,
        }
    }
}

impl StripConfig {
    /// Default location of the configuration file.
    ///
    /// - Linux: ~/.config/pagestrip/config.json
    /// - macOS: ~/Library/Application Support/pagestrip/config.json
    /// - Windows: %APPDATA%\pagestrip\config.json
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("pagestrip").join("config.json"),
            None => PathBuf::from("pagestrip.json"),
        }
    }

    /// Loads defaults overridden by environment variables.
    ///
    /// Environment variables:
    /// - `PAGESTRIP_SIZE_INDEX`: initial index into the size list
    /// - `PAGESTRIP_TEXT_HEIGHT`: caption height in pixels
    /// - `PAGESTRIP_RENDER_WORKERS`: render thread count
    /// - `PAGESTRIP_FRAME_ONLY`: `true` or `false`
    ///
    /// # Errors
    /// Returns an error if any variable holds a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file; missing fields keep defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file at `path` (or the default path) if it exists, then
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = if path.exists() {
            log::debug!("loading configuration from {}", path.display());
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `PAGESTRIP_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_value("PAGESTRIP_SIZE_INDEX")? {
            self.size_index = value;
        }
        if let Some(value) = env_value("PAGESTRIP_TEXT_HEIGHT")? {
            self.text_height = value;
        }
        if let Some(value) = env_value("PAGESTRIP_RENDER_WORKERS")? {
            self.render_workers = value;
        }
        if let Some(value) = env_value("PAGESTRIP_FRAME_ONLY")? {
            self.frame_only = value;
        }
        Ok(())
    }

    /// Writes the configuration as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Checks that the size list is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.item_sizes.is_empty() {
            return Err(ConfigError::Invalid("item_sizes is empty".to_string()));
        }
        if self.item_sizes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ConfigError::Invalid(
                "item_sizes must be strictly ascending".to_string(),
            ));
        }
        if self.item_sizes[0] == 0 {
            return Err(ConfigError::Invalid("item sizes must be positive".to_string()));
        }
        Ok(())
    }

    /// Worker pool settings for the render threads
    pub fn pool_config(&self) -> PoolConfig {
        let pool = if self.render_workers == 0 {
            PoolConfig::default()
        } else {
            PoolConfig::new(self.render_workers)
        };
        pool.with_poll_interval(Duration::from_millis(self.poll_interval_ms.max(1)))
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(None),
    }
}
