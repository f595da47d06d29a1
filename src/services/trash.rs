//! Trash monitoring.
//!
//! The desktop shows a trash item whose icon depends on whether the trash
//! holds anything. This service watches the freedesktop trash files
//! directory and broadcasts the item count whenever it changes.

use crate::services::desktop::events::{self, DesktopEvent};
use crossbeam_channel::unbounded;
use log::{debug, warn};
use notify::{RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;

static STARTED: OnceLock<()> = OnceLock::new();

/// The freedesktop trash files directory, `~/.local/share/Trash/files`.
pub fn trash_files_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Trash")
        .join("files")
}

/// Number of top-level items in a trash directory. A missing directory is
/// an empty trash.
pub fn count_items(dir: &Path) -> usize {
    fs::read_dir(dir).map(|d| d.flatten().count()).unwrap_or(0)
}

/// Start the trash watcher thread once. Broadcasts the initial count
/// immediately, then again on every change.
pub fn start_monitor() {
    if STARTED.set(()).is_err() {
        return;
    }
    let dir = trash_files_dir();
    thread::Builder::new()
        .name("trash-monitor".into())
        .spawn(move || watch_loop(dir))
        .ok();
}

fn watch_loop(dir: PathBuf) {
    if let Err(e) = fs::create_dir_all(&dir) {
        warn!("cannot create trash directory {}: {e}", dir.display());
        return;
    }

    let mut count = count_items(&dir);
    events::send(DesktopEvent::TrashCountChanged(count));

    let (tx, rx) = unbounded();
    let mut watcher = match notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    }) {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!("trash watcher unavailable: {e}");
            return;
        }
    };
    if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        warn!("cannot watch trash directory {}: {e}", dir.display());
        return;
    }

    for result in rx {
        if let Err(e) = result {
            debug!("trash watch error: {e}");
            continue;
        }
        let current = count_items(&dir);
        if current != count {
            count = current;
            events::send(DesktopEvent::TrashCountChanged(count));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn counts_top_level_items_only() {
        let dir = TempDir::new().unwrap();
        let trash = dir.path().to_path_buf();
        assert_eq!(count_items(&trash), 0);

        File::create(trash.join("a.txt")).unwrap();
        fs::create_dir(trash.join("folder")).unwrap();
        File::create(trash.join("folder/nested.txt")).unwrap();
        assert_eq!(count_items(&trash), 2);
    }

    #[test]
    fn missing_directory_counts_as_empty() {
        assert_eq!(count_items(&PathBuf::from("/nonexistent/trash")), 0);
    }
}
