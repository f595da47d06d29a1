//! HeronShell core: desktop surface services for Linux.
//!
//! - Desktop item model, rich directories and collision-safe naming
//! - inotify change monitoring with rename coalescing
//! - Background thumbnailing over the shared freedesktop cache
//! - Trash state tracking

pub mod config;
pub mod event_bus;
pub mod services;
pub mod util;
