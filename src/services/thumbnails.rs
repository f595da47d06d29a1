//! Background thumbnail generation queue.
//!
//! Desktop items are queued as they appear or change; a single worker
//! thread drives the factory so generation never blocks the event loop.
//! Finished thumbnails surface as an item update on the bus.

use crate::services::desktop::entry::DesktopEntry;
use crate::services::desktop::events::{self, DesktopEvent};
use crossbeam_channel::{Sender, unbounded};
use heron_thumbs::{ThumbnailFactory, path_to_uri};
use log::debug;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

#[derive(Clone)]
pub struct ThumbnailQueue {
    tx: Sender<PathBuf>,
}

impl ThumbnailQueue {
    /// Start the worker thread and return the queue handle.
    pub fn start(factory: Arc<ThumbnailFactory>) -> ThumbnailQueue {
        let (tx, rx) = unbounded::<PathBuf>();
        thread::Builder::new()
            .name("thumbnail-worker".into())
            .spawn(move || {
                for path in rx {
                    process(&factory, &path);
                }
            })
            .ok();
        ThumbnailQueue { tx }
    }

    /// Queue a file for thumbnailing. Duplicates are cheap; already cached
    /// files are skipped by the worker.
    pub fn request(&self, path: PathBuf) {
        let _ = self.tx.send(path);
    }
}

fn process(factory: &ThumbnailFactory, path: &Path) {
    let Ok(metadata) = fs::metadata(path) else {
        return;
    };
    let mtime = metadata.mtime();
    let uri = path_to_uri(path);

    if factory.lookup(&uri, mtime).is_some() {
        return;
    }
    let Some(mime) = mime_guess::from_path(path).first_raw() else {
        return;
    };
    if !factory.can_thumbnail(&uri, mime, mtime) {
        return;
    }

    match factory.generate(&uri, mime) {
        Some(thumbnail) => {
            factory.save(&thumbnail, &uri, mtime);
            if let Some(entry) = DesktopEntry::from_path(path) {
                events::send(DesktopEvent::ItemUpdate(entry));
            }
        }
        None => {
            debug!("thumbnail generation failed for {}", path.display());
            factory.create_failure_record(&uri, mtime);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_thumbs::ThumbnailSize;
    use image::{Rgba, RgbaImage};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn wait_for<F: Fn() -> bool>(predicate: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn queued_images_land_in_the_cache() {
        let cache = TempDir::new().unwrap();
        let desktop = TempDir::new().unwrap();
        let factory = Arc::new(ThumbnailFactory::with_dirs(
            ThumbnailSize::Normal,
            cache.path().to_path_buf(),
            vec![],
        ));

        let source = desktop.path().join("photo.png");
        RgbaImage::from_pixel(300, 200, Rgba([5, 6, 7, 255]))
            .save(&source)
            .unwrap();
        let mtime = fs::metadata(&source).unwrap().mtime();
        let uri = path_to_uri(&source);

        let queue = ThumbnailQueue::start(Arc::clone(&factory));
        queue.request(source.clone());

        assert!(wait_for(|| factory.lookup(&uri, mtime).is_some()));
        let thumb = image::open(factory.lookup(&uri, mtime).unwrap()).unwrap();
        assert_eq!(thumb.width(), 128);
    }

    #[test]
    fn undecodable_files_get_a_failure_record() {
        let cache = TempDir::new().unwrap();
        let desktop = TempDir::new().unwrap();
        let factory = Arc::new(ThumbnailFactory::with_dirs(
            ThumbnailSize::Normal,
            cache.path().to_path_buf(),
            vec![],
        ));

        let source = desktop.path().join("corrupt.png");
        fs::write(&source, b"not a png at all").unwrap();
        let mtime = fs::metadata(&source).unwrap().mtime();
        let uri = path_to_uri(&source);

        let queue = ThumbnailQueue::start(Arc::clone(&factory));
        queue.request(source.clone());

        assert!(wait_for(|| factory.has_failed(&uri, mtime)));
        assert!(factory.lookup(&uri, mtime).is_none());
    }
}
