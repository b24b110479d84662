//! Configuration for the history and recovery core.
//!
//! [`Config`] is persisted as TOML (typically at
//! `~/.config/lyrics/config.toml` on Unix systems). Every field has a
//! default, so a partial or missing file is fine.
//!
//! # Key Configuration Fields
//!
//! - `idle_save_interval_secs`: minimum gap between idle-triggered autosaves
//! - `periodic_save_interval_secs`: period of the unconditional autosave
//! - `unsaved_key`: AppData key holding the unsynced history
//! - `app_version`: version string written into save containers
//!
//! # Example
//!
//! ```ignore
//! use lyrics_core::config::Config;
//!
//! let config = Config::load()?;
//! let period = config.periodic_save_interval();
//! ```

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{LyricsError, Result};
use crate::fs::FileSystem;

/// AppData key under which unsynced history is kept.
pub const DEFAULT_UNSAVED_KEY: &str = "unsaved-lyrics-key";

const DEFAULT_IDLE_SAVE_INTERVAL_SECS: u64 = 30;
const DEFAULT_PERIODIC_SAVE_INTERVAL_SECS: u64 = 5 * 60;

fn interval_or_default(field: &str, secs: u64, default_secs: u64) -> Duration {
    match i64::try_from(secs).ok().and_then(Duration::try_seconds) {
        Some(interval) => interval,
        None => {
            log::warn!(
                "{} = {} is out of range; using {}",
                field,
                secs,
                default_secs
            );
            Duration::seconds(default_secs as i64)
        }
    }
}

/// `Config` holds the tunable parts of autosave and recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Idle notifications closer together than this are skipped
    pub idle_save_interval_secs: u64,

    /// Period of the unconditional autosave
    pub periodic_save_interval_secs: u64,

    /// AppData key for the unsynced history record
    pub unsaved_key: String,

    /// Version of the running application, recorded in save containers
    pub app_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_save_interval_secs: DEFAULT_IDLE_SAVE_INTERVAL_SECS,
            periodic_save_interval_secs: DEFAULT_PERIODIC_SAVE_INTERVAL_SECS,
            unsaved_key: DEFAULT_UNSAVED_KEY.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Config {
    /// Minimum gap between idle-triggered autosaves.
    ///
    /// Falls back to the default when the configured value is out of range.
    pub fn idle_save_interval(&self) -> Duration {
        interval_or_default(
            "idle_save_interval_secs",
            self.idle_save_interval_secs,
            DEFAULT_IDLE_SAVE_INTERVAL_SECS,
        )
    }

    /// Period of the unconditional autosave.
    ///
    /// Falls back to the default when the configured value is out of range.
    pub fn periodic_save_interval(&self) -> Duration {
        interval_or_default(
            "periodic_save_interval_secs",
            self.periodic_save_interval_secs,
            DEFAULT_PERIODIC_SAVE_INTERVAL_SECS,
        )
    }

    /// Load config from a specific path using a FileSystem.
    pub fn load_from<FS: FileSystem>(fs: &FS, path: &Path) -> Result<Self> {
        let contents = fs.read_to_string(path).map_err(|e| LyricsError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path using a FileSystem.
    pub fn save_to<FS: FileSystem>(&self, fs: &FS, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs.create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs.write_file(path, &contents)
            .map_err(|e| LyricsError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(())
    }

    /// Load config from a FileSystem, returning default if not found or unreadable.
    pub fn load_from_or_default<FS: FileSystem>(fs: &FS, path: &Path) -> Self {
        match Self::load_from(fs, path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config ({})", e);
                Self::default()
            }
        }
    }
}

// ============================================================================
// Native-only implementation (not available in WASM)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
impl Config {
    /// Get the config file path (~/.config/lyrics/config.toml)
    /// Only available on native platforms
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lyrics").join("config.toml"))
    }

    /// Get the default app data directory (~/.local/share/lyrics on Linux)
    /// Only available on native platforms
    pub fn app_data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("lyrics"))
    }

    /// Load config from default location, or return default if file doesn't exist
    /// Only available on native platforms
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let contents = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&contents)?;
            return Ok(config);
        }

        // Return default config if file doesn't exist
        Ok(Config::default())
    }

    /// Save config to default location
    /// Only available on native platforms
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(LyricsError::NoConfigDir)?;

        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        Ok(())
    }
}
