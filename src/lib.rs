//! Fence Desktop
//!
//! Movable, collapsible icon fences that live in the Windows desktop layer.
//! The decision logic is portable and tested on any platform; the Win32
//! bindings sit in `win32` submodules and in the window and app modules.

pub mod collapse;
pub mod context;
pub mod debounce;
pub mod desktop_icons;
pub mod embedding;
pub mod error;
pub mod fence;
pub mod geometry;
pub mod input_hooks;
pub mod record;
pub mod registry;
pub mod settings;
pub mod snapping;
pub mod storage;
pub mod title_edit;

#[cfg(target_os = "windows")]
mod app;
#[cfg(target_os = "windows")]
mod fence_window;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging based on debug/release mode. `log` records from the
/// window layer are forwarded to the same subscriber.
fn init_logging() {
    let level = if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let result = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(cfg!(debug_assertions))
        .with_line_number(cfg!(debug_assertions))
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

/// Main entry point
pub fn main() {
    init_logging();
    info!("Starting Fence Desktop v{}", env!("CARGO_PKG_VERSION"));

    #[cfg(target_os = "windows")]
    if let Err(e) = app::run() {
        tracing::error!("Fence Desktop failed: {}", e);
    }

    #[cfg(not(target_os = "windows"))]
    tracing::warn!("Desktop integration is only available on Windows");
}
