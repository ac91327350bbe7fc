//! Moving files between the desktop and fence-private storage.
//!
//! Every function either completes the move or leaves the file where it was,
//! so an icon's recorded path always names a file that exists.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{FenceError, Result};

/// Prefix used when a file returns to a desktop that already has one of the same name.
pub const RESTORED_PREFIX: &str = "restored_";

/// Private storage directory for one fence, created if missing.
pub fn fence_storage_dir(root: &Path, fence_id: &str) -> Result<PathBuf> {
    let dir = root.join(fence_id);
    std::fs::create_dir_all(&dir).map_err(|source| FenceError::StorageDir { path: dir.clone(), source })?;
    Ok(dir)
}

/// Whether `path` sits directly in the desktop directory. Compared
/// case-insensitively, as desktop paths are on Windows.
pub fn is_desktop_file(path: &Path, desktop_dir: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    normalize(parent) == normalize(desktop_dir)
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_lowercase()
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name().ok_or_else(|| FenceError::NoFileName(path.to_path_buf()))
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|source| FenceError::FileMove {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Move `path` into `dir`, replacing a stale file of the same name.
pub fn relocate(path: &Path, dir: &Path) -> Result<PathBuf> {
    let target = dir.join(file_name(path)?);
    if target == path {
        return Ok(target);
    }
    if target.exists() {
        debug!("Replacing stale {}", target.display());
        if let Err(e) = std::fs::remove_file(&target) {
            warn!("Could not remove stale {}: {}", target.display(), e);
        }
    }
    rename(path, &target)?;
    info!("Moved {} -> {}", path.display(), target.display());
    Ok(target)
}

/// Take a desktop file into fence storage.
pub fn take_from_desktop(path: &Path, storage_dir: &Path) -> Result<PathBuf> {
    relocate(path, storage_dir)
}

/// Put a stored file back on the desktop. When the name is taken the file
/// comes back as `restored_<name>`, then `restored_2_<name>` and so on.
/// An existing desktop file is never replaced.
pub fn return_to_desktop(stored: &Path, desktop_dir: &Path) -> Result<PathBuf> {
    let name = file_name(stored)?;
    let target = free_desktop_name(name, desktop_dir);
    rename(stored, &target)?;
    info!("Returned {} to the desktop as {}", stored.display(), target.display());
    Ok(target)
}

fn free_desktop_name(name: &std::ffi::OsStr, desktop_dir: &Path) -> PathBuf {
    let plain = desktop_dir.join(name);
    if !plain.exists() {
        return plain;
    }
    (1u32..)
        .map(|n| {
            let mut renamed = std::ffi::OsString::from(RESTORED_PREFIX);
            if n > 1 {
                renamed.push(format!("{n}_"));
            }
            renamed.push(name);
            desktop_dir.join(renamed)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(plain)
}
