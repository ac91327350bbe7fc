//! Serializable snapshots of fences and their icons.
//!
//! Field names match the `fences.json` document: camelCase, with the
//! desktop-origin coordinates only present for icons taken off the desktop.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{FenceError, Result};
use crate::geometry::Point;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconRecord {
    pub name: String,
    /// Where the file lives now; inside fence storage if it was relocated.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_from_desktop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_y: Option<i32>,
}

impl IconRecord {
    /// An icon that references a file in place.
    pub fn linked(path: PathBuf) -> Self {
        Self {
            name: display_name(&path),
            original_path: Some(path.clone()),
            path,
            is_from_desktop: false,
            original_x: None,
            original_y: None,
        }
    }

    /// An icon whose file was moved off the desktop into fence storage.
    pub fn from_desktop(original_path: PathBuf, stored_path: PathBuf, position: Option<Point>) -> Self {
        Self {
            name: display_name(&original_path),
            path: stored_path,
            original_path: Some(original_path),
            is_from_desktop: true,
            original_x: Some(position.map_or(-1, |p| p.x)),
            original_y: Some(position.map_or(-1, |p| p.y)),
        }
    }

    /// Grid position on the desktop to restore to, if one was recorded.
    pub fn desktop_position(&self) -> Option<Point> {
        if !self.is_from_desktop {
            return None;
        }
        match (self.original_x, self.original_y) {
            (Some(x), Some(y)) if x >= 0 && y >= 0 => Some(Point::new(x, y)),
            _ => None,
        }
    }
}

/// Label shown for a file: its name without the final extension.
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FenceRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub expanded_height: Option<i32>,
    /// Whether the fence floats above other windows.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
    #[serde(default)]
    pub icons: Vec<IconRecord>,
}

/// On-disk document: `{ "fences": [ ... ] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FenceDocument {
    #[serde(default)]
    pub fences: Vec<FenceRecord>,
}

impl FenceDocument {
    /// Read the document; a missing file is an empty document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No fence document at {}", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(FenceError::Document { path: path.to_path_buf(), source }),
        };
        let doc: Self = serde_json::from_str(&text)
            .map_err(|source| FenceError::Json { path: path.to_path_buf(), source })?;
        debug!("Loaded {} fence records from {}", doc.fences.len(), path.display());
        Ok(doc)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|source| FenceError::Json { path: path.to_path_buf(), source })?;
        std::fs::write(path, json).map_err(|source| FenceError::Document { path: path.to_path_buf(), source })?;
        debug!("Saved {} fence records to {}", self.fences.len(), path.display());
        Ok(())
    }
}
