//! The thumbnail factory.
//!
//! Produces and caches preview images for (URI, mtime) pairs. Resolution
//! order: cached success, cached failure (short-circuits), external
//! thumbnailer matched by MIME type, generic decode with downscale.
//!
//! All public operations are safe to call from worker threads. The only
//! shared mutable state is the thumbnailer registry, guarded by one
//! factory-wide mutex; generation is process/IO bound and infrequent, so the
//! coarse lock is fine.

use crate::cache::{
    self, SOFTWARE_NAME, TAG_HEIGHT, TAG_MTIME, TAG_SOFTWARE, TAG_URI, TAG_WIDTH, ThumbnailSize,
};
use crate::decode::{decode_image, mime_supported_by_image_crate};
use crate::scale::scale_down;
use crate::thumbnailer::{THUMBNAILER_EXTENSION, Thumbnailer};
use crate::uri::uri_to_local_path;
use image::DynamicImage;
use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

const DEFAULT_APP_NAME: &str = "heron-thumbnail-factory";

/// A generated thumbnail plus the source dimensions when the generic
/// decoder produced it (external thumbnailers do not report them).
pub struct Thumbnail {
    pub image: DynamicImage,
    pub original_width: Option<u32>,
    pub original_height: Option<u32>,
}

/// Registry of external thumbnailers plus the disable settings.
///
/// Descriptors are stored once, keyed by their file path; the MIME index
/// refers to them by that key, so a descriptor shared by many MIME types
/// needs no reference counting.
#[derive(Default)]
struct RegistryState {
    thumbnailers: HashMap<PathBuf, Thumbnailer>,
    mime_map: HashMap<String, PathBuf>,
    disable_all: bool,
    disabled_types: Vec<String>,
}

impl RegistryState {
    fn is_disabled(&self, mime_type: &str) -> bool {
        self.disable_all || self.disabled_types.iter().any(|t| t == mime_type)
    }

    /// Map the descriptor's MIME types to it unless an earlier descriptor
    /// already claimed them (first registration wins).
    fn register(&mut self, thumb: Thumbnailer) {
        for mime in &thumb.mime_types {
            self.mime_map
                .entry(mime.clone())
                .or_insert_with(|| thumb.path.clone());
        }
        self.thumbnailers.insert(thumb.path.clone(), thumb);
    }

    fn unregister(&mut self, path: &Path) {
        self.thumbnailers.remove(path);
        self.mime_map.retain(|_, v| v != path);
    }

    fn command_for(&self, mime_type: &str) -> Option<&Thumbnailer> {
        self.thumbnailers.get(self.mime_map.get(mime_type)?)
    }
}

pub struct ThumbnailFactory {
    size: ThumbnailSize,
    cache_root: PathBuf,
    app_name: String,
    state: Arc<Mutex<RegistryState>>,
    /// Keeps the descriptor-directory watchers alive for the factory's
    /// lifetime.
    _watchers: Mutex<Vec<RecommendedWatcher>>,
}

impl ThumbnailFactory {
    /// Create a factory over the shared `~/.thumbnails` cache, scanning the
    /// standard thumbnailer description directories.
    pub fn new(size: ThumbnailSize) -> Self {
        Self::with_dirs(size, cache::default_cache_root(), thumbnailer_dirs())
    }

    /// Create a factory with an explicit cache root and descriptor
    /// directories. Useful for tests and non-standard cache consumers.
    pub fn with_dirs(
        size: ThumbnailSize,
        cache_root: PathBuf,
        descriptor_dirs: Vec<PathBuf>,
    ) -> Self {
        let state = Arc::new(Mutex::new(RegistryState::default()));
        let watchers = Self::load_thumbnailers(&state, &descriptor_dirs);

        ThumbnailFactory {
            size,
            cache_root,
            app_name: DEFAULT_APP_NAME.to_string(),
            state,
            _watchers: Mutex::new(watchers),
        }
    }

    /// Scan the descriptor directories (earlier directories take priority)
    /// and arm a change watcher on each existing one so the registry stays
    /// live.
    fn load_thumbnailers(
        state: &Arc<Mutex<RegistryState>>,
        dirs: &[PathBuf],
    ) -> Vec<RecommendedWatcher> {
        let mut watchers = Vec::new();
        let mut loaded = 0usize;

        for dir in dirs {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };

            let state_for_events = Arc::clone(state);
            match notify::recommended_watcher(move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    Self::on_descriptor_event(&state_for_events, &event);
                }
            }) {
                Ok(mut watcher) => {
                    if watcher.watch(dir, RecursiveMode::NonRecursive).is_ok() {
                        watchers.push(watcher);
                    }
                }
                Err(e) => debug!("no watcher for {}: {e}", dir.display()),
            }

            let mut registry = state.lock().unwrap();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(THUMBNAILER_EXTENSION) {
                    continue;
                }
                if let Some(thumb) = Thumbnailer::load(&path) {
                    registry.register(thumb);
                    loaded += 1;
                }
            }
        }

        info!("loaded {loaded} external thumbnailers");
        watchers
    }

    fn on_descriptor_event(state: &Arc<Mutex<RegistryState>>, event: &Event) {
        for path in &event.paths {
            if path.extension().and_then(|e| e.to_str()) != Some(THUMBNAILER_EXTENSION) {
                continue;
            }
            match event.kind {
                EventKind::Remove(_) => Self::remove_descriptor(state, path),
                EventKind::Create(_) | EventKind::Modify(_) => {
                    Self::reload_descriptor(state, path)
                }
                _ => {}
            }
        }
    }

    /// Reload one descriptor in place: its old MIME registrations are
    /// dropped and rebuilt from the file's current content.
    fn reload_descriptor(state: &Arc<Mutex<RegistryState>>, path: &Path) {
        let mut registry = state.lock().unwrap();
        registry.unregister(path);
        if let Some(thumb) = Thumbnailer::load(path) {
            registry.register(thumb);
        }
    }

    fn remove_descriptor(state: &Arc<Mutex<RegistryState>>, path: &Path) {
        debug!("thumbnailer removed: {}", path.display());
        state.lock().unwrap().unregister(path);
    }

    /// Disable or enable all external and generic thumbnailing.
    pub fn set_disable_all(&self, disabled: bool) {
        self.state.lock().unwrap().disable_all = disabled;
    }

    /// Blacklist individual MIME types.
    pub fn set_disabled_types(&self, types: Vec<String>) {
        self.state.lock().unwrap().disabled_types = types;
    }

    /// Locate a previously cached thumbnail for `(uri, mtime)`. Returns the
    /// cache path only when the record's embedded URI and mtime both match.
    pub fn lookup(&self, uri: &str, mtime: i64) -> Option<PathBuf> {
        let path = cache::thumbnail_path(&self.cache_root, self.size, uri);
        cache::is_valid(&path, uri, mtime).then_some(path)
    }

    /// Whether a still-valid failure record exists for `(uri, mtime)`. A
    /// mismatched mtime means the source changed since the failure, so the
    /// caller should retry.
    pub fn has_failed(&self, uri: &str, mtime: i64) -> bool {
        let path = cache::failed_path(&self.cache_root, &self.app_name, uri);
        cache::is_valid(&path, uri, mtime)
    }

    /// Whether this factory can at least try to thumbnail the file.
    /// Thumbnails themselves and files with valid failure records are
    /// refused.
    pub fn can_thumbnail(&self, uri: &str, mime_type: &str, mtime: i64) -> bool {
        if self.is_in_cache_tree(uri) {
            return false;
        }

        let have_script = {
            let registry = self.state.lock().unwrap();
            if registry.is_disabled(mime_type) {
                return false;
            }
            registry
                .command_for(mime_type)
                .is_some_and(Thumbnailer::is_usable)
        };

        if have_script || mime_supported_by_image_crate(mime_type) {
            !self.has_failed(uri, mtime)
        } else {
            false
        }
    }

    fn is_in_cache_tree(&self, uri: &str) -> bool {
        if uri.starts_with("file:/") && uri.contains("/.thumbnails/") {
            return true;
        }
        uri_to_local_path(uri).is_some_and(|p| p.starts_with(&self.cache_root))
    }

    /// Try to generate a thumbnail, preferring a registered external
    /// thumbnailer over the generic decoder. `None` means every strategy
    /// failed; callers usually record a failure next.
    pub fn generate(&self, uri: &str, mime_type: &str) -> Option<Thumbnail> {
        let size = self.size.pixels();

        let script = {
            let registry = self.state.lock().unwrap();
            if registry.is_disabled(mime_type) {
                return None;
            }
            registry.command_for(mime_type).cloned()
        };

        let mut thumbnail = script.and_then(|thumb| run_thumbnailer(&thumb, size, uri));

        if thumbnail.is_none() {
            let local = uri_to_local_path(uri)?;
            let decoded = decode_image(&local)?;
            thumbnail = Some(Thumbnail {
                image: decoded.image,
                original_width: Some(decoded.original_width),
                original_height: Some(decoded.original_height),
            });
        }

        let mut thumbnail = thumbnail?;
        let (width, height) = (thumbnail.image.width(), thumbnail.image.height());
        if width > size || height > size {
            let scale = f64::from(size) / f64::from(width.max(height));
            let dest_width = (f64::from(width) * scale + 0.5).floor().max(1.0) as u32;
            let dest_height = (f64::from(height) * scale + 0.5).floor().max(1.0) as u32;
            thumbnail.image = scale_down(&thumbnail.image, dest_width, dest_height);
        }

        Some(thumbnail)
    }

    /// Persist a generated thumbnail. Metadata is embedded, the file is
    /// written next to its final path and renamed into place with owner-only
    /// permissions. A failed save records a failure instead of dropping the
    /// result silently.
    pub fn save(&self, thumbnail: &Thumbnail, uri: &str, mtime: i64) {
        let path = cache::thumbnail_path(&self.cache_root, self.size, uri);

        let mut texts = vec![
            (TAG_URI, uri.to_string()),
            (TAG_MTIME, mtime.to_string()),
            (TAG_SOFTWARE, SOFTWARE_NAME.to_string()),
        ];
        if let (Some(w), Some(h)) = (thumbnail.original_width, thumbnail.original_height) {
            texts.push((TAG_WIDTH, w.to_string()));
            texts.push((TAG_HEIGHT, h.to_string()));
        }

        if let Err(e) = write_record(&path, &thumbnail.image, &texts) {
            warn!("failed to save thumbnail for {uri}: {e}");
            self.create_failure_record(uri, mtime);
        }
    }

    /// Persist a failure marker so repeat lookups short-circuit until the
    /// source mtime changes. The marker is a 1x1 image carrying the same
    /// metadata as a success record.
    pub fn create_failure_record(&self, uri: &str, mtime: i64) {
        let path = cache::failed_path(&self.cache_root, &self.app_name, uri);
        let placeholder = DynamicImage::new_rgba8(1, 1);
        let texts = vec![
            (TAG_URI, uri.to_string()),
            (TAG_MTIME, mtime.to_string()),
            (TAG_SOFTWARE, SOFTWARE_NAME.to_string()),
        ];
        if let Err(e) = write_record(&path, &placeholder, &texts) {
            warn!("failed to record thumbnail failure for {uri}: {e}");
        }
    }
}

/// Run an external thumbnailer synchronously, decoding its output file on a
/// zero exit status.
fn run_thumbnailer(thumb: &Thumbnailer, size: u32, uri: &str) -> Option<Thumbnail> {
    let outfile = tempfile::Builder::new()
        .prefix(".heron-thumbnail-")
        .suffix(".png")
        .tempfile()
        .ok()?;

    let command = thumb.expand_command(size, uri, outfile.path())?;
    let status = Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => image::open(outfile.path()).ok().map(|image| Thumbnail {
            image,
            original_width: None,
            original_height: None,
        }),
        Ok(status) => {
            debug!("thumbnailer {} exited with {status}", thumb.path.display());
            None
        }
        Err(e) => {
            debug!("thumbnailer {} failed to spawn: {e}", thumb.path.display());
            None
        }
    }
}

/// Atomic write of one cache record: temp file in the destination
/// directory, owner-only mode, rename into place. The cache directory is
/// created (0700) on the first failure and the write retried once.
fn write_record(path: &Path, image: &DynamicImage, texts: &[(&str, String)]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "record path has no parent"))?;

    let tmp = match NamedTempFile::new_in(dir) {
        Ok(tmp) => tmp,
        Err(_) => {
            fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
            NamedTempFile::new_in(dir)?
        }
    };

    cache::write_png(tmp.as_file(), image, texts)?;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Standard thumbnailer description directories: the user data dir first,
/// then each system data dir, all with a `thumbnailers/` subpath. Earlier
/// directories take priority.
pub fn thumbnailer_dirs() -> Vec<PathBuf> {
    let mut result = Vec::new();
    if let Some(data_home) = dirs::data_dir() {
        result.push(data_home.join("thumbnailers"));
    }
    let system = std::env::var("XDG_DATA_DIRS")
        .unwrap_or_else(|_| "/usr/local/share:/usr/share".to_string());
    for dir in system.split(':').filter(|d| !d.is_empty()) {
        result.push(PathBuf::from(dir).join("thumbnailers"));
    }
    result
}
