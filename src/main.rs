//! HeronShell daemon - desktop surface services for Linux.
//!
//! Single-process architecture: one inotify-driven event loop, one
//! thumbnail worker, one trash watcher.

use heron_shell::config::ShellConfig;
use heron_shell::services;
use heron_shell::services::desktop::entry::EntryKind;
use heron_shell::services::desktop::events::{self, DesktopEvent};
use heron_shell::services::desktop::monitor::DesktopMonitor;
use heron_shell::services::desktop::DesktopService;
use heron_thumbs::{ThumbnailFactory, ThumbnailSize};
use log::info;
use std::sync::Arc;
use std::time::Duration;

const EVENT_POLL_INTERVAL_MS: u64 = 50;

fn main() {
    env_logger::init();
    info!("Starting HeronShell...");

    let config = ShellConfig::load();
    let desktop_dir = config.desktop_dir();
    info!("Desktop directory: {}", desktop_dir.display());

    let factory = Arc::new(ThumbnailFactory::new(ThumbnailSize::Normal));
    factory.set_disable_all(config.thumbnails.disable_all);
    factory.set_disabled_types(config.thumbnails.disabled_types.clone());

    let mut rx = events::subscribe();
    let queue = services::start_background(Arc::clone(&factory));

    let service = DesktopService::new(desktop_dir.clone(), events::sender());
    let mut monitor = DesktopMonitor::new(desktop_dir, events::sender());
    monitor.start();

    // Prime the surface: queue thumbnails and compose rich icons for
    // everything already on the desktop.
    for entry in service.list_entries() {
        match &entry.kind {
            EntryKind::File => queue.request(entry.path.clone()),
            EntryKind::Directory { rich: true } => {
                service.rich_dir_icon(&entry.path);
            }
            _ => {}
        }
    }

    info!("HeronShell running.");
    loop {
        std::thread::sleep(Duration::from_millis(EVENT_POLL_INTERVAL_MS));
        monitor.poll();

        for event in events::drain(&mut rx) {
            match event {
                DesktopEvent::ItemUpdate(entry) => match &entry.kind {
                    EntryKind::File => queue.request(entry.path.clone()),
                    EntryKind::Directory { rich: true } => {
                        service.rich_dir_icon(&entry.path);
                    }
                    _ => {}
                },
                DesktopEvent::ItemDelete(path) => {
                    info!("desktop item removed: {}", path.display());
                }
                DesktopEvent::ItemRename { old, new } => {
                    info!("desktop item renamed: {} -> {}", old.display(), new.display());
                    queue.request(new);
                }
                DesktopEvent::TrashCountChanged(count) => {
                    info!("trash now holds {count} items");
                }
                DesktopEvent::RichDirCreated(path) => {
                    service.rich_dir_icon(&path);
                }
            }
        }
    }
}
