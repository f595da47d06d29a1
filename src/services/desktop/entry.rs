//! Desktop item model and .desktop entry parsing.

use crate::services::desktop::RICH_DIR_PREFIX;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Fallback icon name for launchers whose icon cannot be resolved.
pub const DEFAULT_APP_ICON: &str = "application-x-executable";
/// Fallback icon names for plain files and folders.
pub const DEFAULT_FILE_ICON: &str = "text-x-generic";
pub const DEFAULT_DIR_ICON: &str = "folder";

/// Application metadata parsed from a .desktop file.
#[derive(Clone, Debug)]
pub struct AppInfo {
    pub exec: String,
    pub icon_name: Option<String>,
    pub no_display: bool,
}

/// What kind of item sits on the desktop.
#[derive(Clone, Debug)]
pub enum EntryKind {
    /// A .desktop launcher.
    Application(AppInfo),
    /// A directory, rich when its basename carries the reserved prefix.
    Directory { rich: bool },
    /// Any other regular file.
    File,
}

/// One item on the desktop surface.
#[derive(Clone, Debug)]
pub struct DesktopEntry {
    pub path: PathBuf,
    /// Display name: the .desktop Name, the rich directory name, or the
    /// file name.
    pub name: String,
    pub kind: EntryKind,
}

impl DesktopEntry {
    /// Build an entry from a path on the desktop. `None` for paths that no
    /// longer exist.
    pub fn from_path(path: &Path) -> Option<DesktopEntry> {
        let metadata = fs::symlink_metadata(path).ok()?;
        let file_name = path.file_name()?.to_string_lossy().to_string();

        if metadata.is_dir() {
            let rich_name = rich_dir_display_name(path);
            let rich = rich_name.is_some();
            return Some(DesktopEntry {
                path: path.to_path_buf(),
                name: rich_name.unwrap_or(file_name),
                kind: EntryKind::Directory { rich },
            });
        }

        if path.extension().and_then(|e| e.to_str()) == Some("desktop")
            && let Some(app) = parse_desktop_file(path)
        {
            return Some(DesktopEntry {
                path: path.to_path_buf(),
                name: app.0,
                kind: EntryKind::Application(app.1),
            });
        }

        Some(DesktopEntry {
            path: path.to_path_buf(),
            name: file_name,
            kind: EntryKind::File,
        })
    }

    /// Resolve this entry's icon image, when one is known. Launchers fall
    /// back to a generic executable icon; image files stand in for their
    /// own icon; everything else gets a themed generic icon when one can
    /// be found.
    pub fn icon_path(&self) -> Option<PathBuf> {
        match &self.kind {
            EntryKind::Application(app) => {
                let name = app.icon_name.as_deref().unwrap_or(DEFAULT_APP_ICON);
                resolve_icon_name(name).or_else(|| resolve_icon_name(DEFAULT_APP_ICON))
            }
            EntryKind::Directory { .. } => resolve_icon_name(DEFAULT_DIR_ICON),
            EntryKind::File => {
                let mime = mime_guess::from_path(&self.path).first_raw().unwrap_or("");
                if mime.starts_with("image/") {
                    return Some(self.path.clone());
                }
                resolve_icon_name(DEFAULT_FILE_ICON)
            }
        }
    }
}

/// Display name of a rich directory: its basename minus the reserved
/// prefix. `None` for plain directories.
pub fn rich_dir_display_name(dir: &Path) -> Option<String> {
    dir.file_name()?
        .to_str()?
        .strip_prefix(RICH_DIR_PREFIX)
        .map(String::from)
}

/// Parse a .desktop file into (name, info).
fn parse_desktop_file(path: &Path) -> Option<(String, AppInfo)> {
    let content = fs::read_to_string(path).ok()?;
    let mut entries = HashMap::new();
    let mut in_desktop_entry = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            in_desktop_entry = line == "[Desktop Entry]";
            continue;
        }

        if in_desktop_entry
            && let Some((key, value)) = line.split_once('=')
        {
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    if entries.get("Type").map(|s| s.as_str()) != Some("Application") {
        return None;
    }

    let name = entries.get("Name")?.clone();
    let exec = entries.get("Exec")?.clone();

    Some((
        name,
        AppInfo {
            exec,
            icon_name: entries.get("Icon").cloned(),
            no_display: entries
                .get("NoDisplay")
                .map(|s| s == "true")
                .unwrap_or(false),
        },
    ))
}

/// Resolve an icon name to an image file. Absolute paths pass through; bare
/// names are probed in the common pixmap and hicolor locations.
pub fn resolve_icon_name(name: &str) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.is_absolute() {
        return direct.exists().then(|| direct.to_path_buf());
    }

    for dir in ["/usr/share/pixmaps", "/usr/local/share/pixmaps"] {
        for ext in ["png", "svg", "xpm"] {
            let candidate = Path::new(dir).join(format!("{name}.{ext}"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for size in ["48x48", "64x64", "128x128", "256x256", "scalable"] {
        let dir = PathBuf::from("/usr/share/icons/hicolor")
            .join(size)
            .join("apps");
        for ext in ["png", "svg"] {
            let candidate = dir.join(format!("{name}.{ext}"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_a_launcher() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("firefox.desktop");
        fs::write(
            &path,
            "[Desktop Entry]\nType=Application\nName=Firefox\nExec=firefox %u\nIcon=firefox\n",
        )
        .unwrap();

        let entry = DesktopEntry::from_path(&path).unwrap();
        assert_eq!(entry.name, "Firefox");
        match entry.kind {
            EntryKind::Application(app) => {
                assert_eq!(app.exec, "firefox %u");
                assert_eq!(app.icon_name.as_deref(), Some("firefox"));
                assert!(!app.no_display);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn malformed_launchers_degrade_to_plain_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.desktop");
        fs::write(&path, "[Desktop Entry]\nName=No exec here\n").unwrap();

        let entry = DesktopEntry::from_path(&path).unwrap();
        assert!(matches!(entry.kind, EntryKind::File));
        assert_eq!(entry.name, "broken.desktop");
    }

    #[test]
    fn rich_directories_are_named_by_their_prefix() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("Stuff");
        fs::create_dir(&plain).unwrap();
        let entry = DesktopEntry::from_path(&plain).unwrap();
        assert!(matches!(entry.kind, EntryKind::Directory { rich: false }));
        assert_eq!(entry.name, "Stuff");

        let rich = dir.path().join(format!("{RICH_DIR_PREFIX}My Games"));
        fs::create_dir(&rich).unwrap();
        let entry = DesktopEntry::from_path(&rich).unwrap();
        assert!(matches!(entry.kind, EntryKind::Directory { rich: true }));
        assert_eq!(entry.name, "My Games");
    }

    #[test]
    fn image_files_are_their_own_icon() {
        let dir = TempDir::new().unwrap();
        let picture = dir.path().join("shot.png");
        fs::write(&picture, b"").unwrap();
        let entry = DesktopEntry::from_path(&picture).unwrap();
        assert_eq!(entry.icon_path(), Some(picture));
    }

    #[test]
    fn missing_paths_yield_none() {
        assert!(DesktopEntry::from_path(Path::new("/nonexistent/x")).is_none());
    }
}
