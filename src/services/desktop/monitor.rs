//! Desktop filesystem monitor.
//!
//! Watches the desktop directory and each of its immediate subdirectories
//! with raw inotify. The owner polls on its own timer; each poll drains
//! every queued kernel event and reduces the batch to item events:
//!
//! - A MOVED_FROM immediately followed by a MOVED_TO in the root is a
//!   rename. The pairing is positional, not cookie-based, so it also
//!   coalesces the common save pattern (write temp, rename over target).
//! - A MOVED_FROM with no following MOVED_TO in the batch is a delete, as
//!   is one displaced by a second MOVED_FROM.
//! - Events inside a subdirectory surface as an update of the subdirectory
//!   item itself; a MOVED_TO there consumes a pending root MOVED_FROM as a
//!   move into the folder.
//!
//! Hidden names (leading dot, trailing tilde) are ignored except rich
//! directory names, which start with the reserved dot prefix.

use crate::services::desktop::entry::DesktopEntry;
use crate::services::desktop::events::DesktopEvent;
use crate::services::desktop::is_item_name;
use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use log::{debug, warn};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::Sender;

const WATCH_MASK: WatchMask = WatchMask::CREATE
    .union(WatchMask::DELETE)
    .union(WatchMask::MODIFY)
    .union(WatchMask::MOVED_FROM)
    .union(WatchMask::MOVED_TO)
    .union(WatchMask::ATTRIB);

/// One decoded kernel event, owned so the read buffer can be reused.
struct RawEvent {
    wd: WatchDescriptor,
    mask: EventMask,
    name: Option<OsString>,
}

pub struct DesktopMonitor {
    root: PathBuf,
    /// `None` when inotify initialization failed; the monitor stays inert.
    inotify: Option<Inotify>,
    watches: HashMap<WatchDescriptor, PathBuf>,
    events: Sender<DesktopEvent>,
    started: bool,
}

impl DesktopMonitor {
    /// Create a monitor for `root`, publishing to `events`. Initialization
    /// failure is logged and yields an inert monitor rather than an error.
    pub fn new(root: PathBuf, events: Sender<DesktopEvent>) -> DesktopMonitor {
        let inotify = match Inotify::init() {
            Ok(inotify) => Some(inotify),
            Err(e) => {
                warn!("inotify unavailable, desktop changes will not be tracked: {e}");
                None
            }
        };

        DesktopMonitor {
            root,
            inotify,
            watches: HashMap::new(),
            events,
            started: false,
        }
    }

    /// Arm the watches on the root and every existing subdirectory.
    /// Idempotent; calling again on a started monitor does nothing.
    pub fn start(&mut self) {
        if self.started || self.inotify.is_none() {
            return;
        }
        self.started = true;

        let root = self.root.clone();
        self.add_watch(&root);

        if let Ok(entries) = fs::read_dir(&root) {
            for entry in entries.flatten() {
                self.add_watch(&entry.path());
            }
        }

        debug!("monitoring {} ({} watches)", self.root.display(), self.watches.len());
    }

    /// Drain all queued kernel events and publish the reduced item events.
    /// Call this on the poll timer.
    pub fn poll(&mut self) {
        let batch = match self.read_batch() {
            Ok(batch) => batch,
            Err(e) => {
                debug!("inotify read failed: {e}");
                return;
            }
        };
        if !batch.is_empty() {
            self.process_batch(batch);
        }
    }

    fn read_batch(&mut self) -> io::Result<Vec<RawEvent>> {
        let Some(inotify) = self.inotify.as_mut() else {
            return Ok(Vec::new());
        };

        let mut batch = Vec::new();
        let mut buffer = [0u8; 4096];
        loop {
            match inotify.read_events(&mut buffer) {
                Ok(events) => {
                    for event in events {
                        batch.push(RawEvent {
                            wd: event.wd.clone(),
                            mask: event.mask,
                            name: event.name.map(OsString::from),
                        });
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(batch)
    }

    fn process_batch(&mut self, batch: Vec<RawEvent>) {
        // A root MOVED_FROM waiting for its matching MOVED_TO.
        let mut pending: Option<PathBuf> = None;

        for event in batch {
            if event.mask.contains(EventMask::IGNORED) {
                self.watches.remove(&event.wd);
                continue;
            }

            let Some(dir) = self.watches.get(&event.wd).cloned() else {
                continue;
            };

            if dir != self.root {
                self.handle_subdir_event(&dir, &event, &mut pending);
                continue;
            }

            let Some(name) = event.name.as_deref() else {
                continue;
            };
            if !name.to_str().is_some_and(is_item_name) {
                continue;
            }
            let path = dir.join(name);

            if event.mask.contains(EventMask::MOVED_FROM) {
                // A second unpaired MOVED_FROM means the first one left the
                // desktop for good.
                if let Some(old) = pending.replace(path) {
                    self.emit_delete(old);
                }
            } else if event.mask.contains(EventMask::MOVED_TO) {
                match pending.take() {
                    Some(old) => self.emit_rename(old, path),
                    None => {
                        // Moved in from outside; the old location may shadow
                        // a stale item with the same name.
                        self.emit_delete(path.clone());
                        self.add_watch(&path);
                        self.emit_update(&path);
                    }
                }
            } else if event.mask.contains(EventMask::DELETE) {
                self.emit_delete(path);
            } else {
                // CREATE, MODIFY or ATTRIB. The watch is re-resolved on
                // every branch in case the name turned into a directory;
                // non-directories are skipped silently.
                self.add_watch(&path);
                self.emit_update(&path);
            }
        }

        // A MOVED_FROM whose pair never arrived in this batch left the
        // desktop; a cross-batch pair will surface as delete plus create.
        if let Some(old) = pending.take() {
            self.emit_delete(old);
        }
    }

    /// Content changed inside a subdirectory: the desktop shows that as a
    /// change of the subdirectory item (its composite icon, its count).
    /// Hidden names are filtered here too, so dotfile churn inside a
    /// folder does not refresh it.
    fn handle_subdir_event(&mut self, dir: &Path, event: &RawEvent, pending: &mut Option<PathBuf>) {
        if let Some(name) = event.name.as_deref()
            && !name.to_str().is_some_and(is_item_name)
        {
            return;
        }
        if event.mask.contains(EventMask::MOVED_TO)
            && let Some(old) = pending.take()
        {
            // An item left the root and landed in this folder.
            self.emit_delete(old);
        }
        self.emit_update(dir);
    }

    /// Watch a directory. Symlinks are resolved first; non-directories are
    /// skipped without noise since most desktop items are plain files.
    fn add_watch(&mut self, path: &Path) {
        let Some(inotify) = self.inotify.as_mut() else {
            return;
        };
        let Ok(resolved) = fs::canonicalize(path) else {
            return;
        };
        if !resolved.is_dir() {
            return;
        }
        match inotify.watches().add(&resolved, WATCH_MASK) {
            Ok(wd) => {
                self.watches.insert(wd, path.to_path_buf());
            }
            Err(e) => warn!("failed to watch {}: {e}", path.display()),
        }
    }

    fn emit_update(&self, path: &Path) {
        if let Some(entry) = DesktopEntry::from_path(path) {
            let _ = self.events.send(DesktopEvent::ItemUpdate(entry));
        }
    }

    fn emit_delete(&mut self, path: PathBuf) {
        self.watches.retain(|_, watched| *watched != path);
        let _ = self.events.send(DesktopEvent::ItemDelete(path));
    }

    fn emit_rename(&mut self, old: PathBuf, new: PathBuf) {
        for watched in self.watches.values_mut() {
            if *watched == old {
                *watched = new.clone();
            }
        }
        let _ = self
            .events
            .send(DesktopEvent::ItemRename { old, new });
    }
}
