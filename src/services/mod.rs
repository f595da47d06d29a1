//! Shared background services for HeronShell.
//!
//! Services watch system state and broadcast events on the desktop bus.
//! Each service runs at most one background thread.
//!
//! - `desktop` - Desktop surface: items, rich directories, inotify monitor
//! - `thumbnails` - Background thumbnail generation queue
//! - `trash` - Trash item count via the freedesktop trash directory

pub mod desktop;
pub mod thumbnails;
pub mod trash;

use heron_thumbs::ThumbnailFactory;
use log::info;
use std::sync::Arc;

/// Start the shared background services.
/// Call this once from main before entering the event loop.
pub fn start_background(factory: Arc<ThumbnailFactory>) -> thumbnails::ThumbnailQueue {
    info!("Starting shared services...");
    trash::start_monitor();
    thumbnails::ThumbnailQueue::start(factory)
}
