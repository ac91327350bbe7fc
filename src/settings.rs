//! Tunables and file locations.
//!
//! Every field has a default; `settings.json` next to the executable may
//! override any subset of them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::collapse::CollapseConfig;
use crate::error::{FenceError, Result};
use crate::geometry::Rect;

pub const SETTINGS_FILE: &str = "settings.json";
pub const FENCES_FILE: &str = "fences.json";
pub const STORAGE_DIR: &str = "fences_storage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub snap_threshold: i32,
    pub resize_border: i32,
    pub title_height: i32,
    pub collapsed_height: i32,
    pub min_expanded_height: i32,
    pub fallback_expanded_height: i32,
    /// Used for a collapsed record that carries no expanded height.
    pub restored_expanded_height: i32,
    pub min_width: i32,
    pub default_rect: Rect,
    pub animation_ms: u64,
    pub save_debounce_ms: u64,
    pub restore_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    pub zorder_reset_delay_ms: u64,
    /// Overrides the directory holding `fences.json` and `fences_storage`.
    pub data_dir: Option<PathBuf>,
    /// Overrides the user's desktop directory.
    pub desktop_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            snap_threshold: 10,
            resize_border: 8,
            title_height: 32,
            collapsed_height: 32,
            min_expanded_height: 64,
            fallback_expanded_height: 200,
            restored_expanded_height: 300,
            min_width: 180,
            default_rect: Rect::new(100, 100, 280, 200),
            animation_ms: 200,
            save_debounce_ms: 1000,
            restore_delay_ms: 800,
            retry_delay_ms: 500,
            max_retries: 3,
            zorder_reset_delay_ms: 10,
            data_dir: None,
            desktop_dir: None,
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(FenceError::Document { path: path.to_path_buf(), source }),
        };
        serde_json::from_str(&text).map_err(|source| FenceError::Json { path: path.to_path_buf(), source })
    }

    /// Load from the data directory, logging and falling back to defaults on error.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(SETTINGS_FILE);
        Self::load(&path).unwrap_or_else(|e| {
            warn!("Ignoring settings: {}", e);
            Self::default()
        })
    }

    pub fn collapse_config(&self) -> CollapseConfig {
        CollapseConfig {
            collapsed_height: self.collapsed_height,
            min_expanded_height: self.min_expanded_height,
            fallback_expanded_height: self.fallback_expanded_height,
            duration: Duration::from_millis(self.animation_ms),
        }
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Directory of the running executable, or the working directory.
    pub fn exe_dir() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(Self::exe_dir)
    }

    pub fn fences_file(&self) -> PathBuf {
        self.data_dir().join(FENCES_FILE)
    }

    pub fn storage_root(&self) -> PathBuf {
        self.data_dir().join(STORAGE_DIR)
    }

    pub fn desktop_dir(&self) -> Option<PathBuf> {
        self.desktop_dir.clone().or_else(dirs::desktop_dir)
    }
}
