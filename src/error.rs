//! Error type shared by the fence core and its Win32 bindings.

use std::path::PathBuf;
use thiserror::Error;

/// Convenient result alias for fence operations.
pub type Result<T> = std::result::Result<T, FenceError>;

/// Everything that can go wrong while managing fences.
///
/// Only [`FenceError::FileMove`], [`FenceError::StorageDir`] and
/// [`FenceError::DuplicateIcon`] are meant to reach the user; the rest are
/// logged and degrade the feature they belong to.
#[derive(Debug, Error)]
pub enum FenceError {
    #[error("Cannot move file {from} to {to}: {source}")]
    FileMove {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create fence storage directory {path}: {source}")]
    StorageDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fence already holds {0}")]
    DuplicateIcon(PathBuf),

    #[error("Desktop directory is unknown")]
    NoDesktopDir,

    #[error("File has no name component: {0}")]
    NoFileName(PathBuf),

    #[error("Failed to read or write {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to install {0} hook")]
    HookInstall(&'static str),

    #[error("Desktop shell window hierarchy not found")]
    ShellNotFound,

    #[error("Process bit-width does not match the OS; desktop icon access disabled")]
    ArchMismatch,

    #[error("Foreign process access failed: {0}")]
    RemoteAccess(String),

    #[error("Window error: {0}")]
    Window(String),
}

impl FenceError {
    /// Whether the user should see this in a blocking notification.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::FileMove { .. } | Self::StorageDir { .. } | Self::DuplicateIcon(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_move_message_names_both_paths() {
        let err = FenceError::FileMove {
            from: PathBuf::from("a.txt"),
            to: PathBuf::from("b.txt"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.txt"));
        assert!(msg.contains("b.txt"));
        assert!(msg.contains("denied"));
    }
}
