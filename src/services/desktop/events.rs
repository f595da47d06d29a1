//! Desktop event definitions and broadcast event bus.
//!
//! Uses tokio::sync::broadcast so every consumer (renderer, thumbnail
//! queue, logging) receives every event. Events carry paths, so unlike a
//! status bus nothing is deduplicated on drain.

use crate::event_bus::CHANNEL_CAPACITY;
use crate::services::desktop::entry::DesktopEntry;
use std::path::PathBuf;
use std::sync::OnceLock;
use tokio::sync::broadcast::{self, Receiver, Sender};

/// All desktop surface changes reported by the background services.
#[derive(Clone, Debug)]
pub enum DesktopEvent {
    /// An item appeared or changed; carries the freshly parsed entry.
    ItemUpdate(DesktopEntry),
    /// An item disappeared.
    ItemDelete(PathBuf),
    /// An item moved within the desktop.
    ItemRename { old: PathBuf, new: PathBuf },
    /// The trash item count changed.
    TrashCountChanged(usize),
    /// A rich directory was just assembled from a selection.
    RichDirCreated(PathBuf),
}

// Static broadcast sender - subscribers get their own receiver via subscribe()
static DESKTOP_SENDER: OnceLock<Sender<DesktopEvent>> = OnceLock::new();

fn get_sender() -> &'static Sender<DesktopEvent> {
    DESKTOP_SENDER.get_or_init(|| {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        tx
    })
}

/// Send an event to all consumers. Non-blocking.
/// If no receivers, the event is dropped (expected during startup).
#[inline]
pub fn send(event: DesktopEvent) {
    let _ = get_sender().send(event);
}

/// Clone the global sender, for services constructed with an explicit bus.
pub fn sender() -> Sender<DesktopEvent> {
    get_sender().clone()
}

/// Subscribe to the event bus. Each consumer gets its own receiver.
pub fn subscribe() -> Receiver<DesktopEvent> {
    get_sender().subscribe()
}

/// Drain all pending events from a receiver in arrival order.
/// Handles RecvError::Lagged by continuing to drain.
#[inline]
pub fn drain(rx: &mut Receiver<DesktopEvent>) -> Vec<DesktopEvent> {
    let mut events = Vec::with_capacity(8);
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Empty) => break,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue, // Skip old, keep draining
            Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_arrival_order() {
        // The bus is global and other tests may publish concurrently, so
        // only this test's own marker events are asserted on.
        let marker = PathBuf::from("/bus-order-test/a");
        let mut rx = subscribe();
        send(DesktopEvent::TrashCountChanged(900_001));
        send(DesktopEvent::ItemDelete(marker.clone()));
        send(DesktopEvent::TrashCountChanged(900_002));

        let events: Vec<DesktopEvent> = drain(&mut rx)
            .into_iter()
            .filter(|e| match e {
                DesktopEvent::TrashCountChanged(n) => *n >= 900_000,
                DesktopEvent::ItemDelete(path) => *path == marker,
                _ => false,
            })
            .collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], DesktopEvent::TrashCountChanged(900_001)));
        assert!(matches!(events[1], DesktopEvent::ItemDelete(_)));
        assert!(matches!(events[2], DesktopEvent::TrashCountChanged(900_002)));
    }
}
