//! Desktop surface service.
//!
//! Owns the desktop directory: listing its items, grouping selections into
//! rich directories, creating new files and folders with collision-safe
//! names, and composing rich directory icons.
//!
//! - `entry` - Item model and .desktop parsing
//! - `events` - Broadcast bus for desktop changes
//! - `monitor` - inotify change tracking
//! - `icon` - Composite rich directory icons

pub mod entry;
pub mod events;
pub mod icon;
pub mod monitor;

use entry::{DesktopEntry, EntryKind};
use events::DesktopEvent;
use log::info;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::Sender;
use walkdir::WalkDir;

/// Reserved basename prefix of rich directories. The display name follows
/// the prefix, so renaming a rich directory renames the directory itself.
pub const RICH_DIR_PREFIX: &str = ".heron_rich_dir_";

const NEW_FILE_TEMPLATE: &str = "New file";
const NEW_DIR_TEMPLATE: &str = "New directory";

/// Whether a file name is shown on the desktop. Dotfiles and editor
/// backups are not.
pub fn is_visible_name(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with('~')
}

/// Whether a name is a desktop item. Rich directory names start with a dot
/// but still count; other hidden names do not.
pub fn is_item_name(name: &str) -> bool {
    is_visible_name(name) || name.starts_with(RICH_DIR_PREFIX)
}

pub struct DesktopService {
    desktop_dir: PathBuf,
    events: Sender<DesktopEvent>,
}

impl DesktopService {
    pub fn new(desktop_dir: PathBuf, events: Sender<DesktopEvent>) -> DesktopService {
        DesktopService {
            desktop_dir,
            events,
        }
    }

    pub fn desktop_dir(&self) -> &Path {
        &self.desktop_dir
    }

    /// List the visible items currently on the desktop.
    pub fn list_entries(&self) -> Vec<DesktopEntry> {
        WalkDir::new(&self.desktop_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_str().is_some_and(is_item_name))
            .filter_map(|e| DesktopEntry::from_path(e.path()))
            .collect()
    }

    /// Group a selection of desktop items into a new rich directory named
    /// after the first item. Items that fail to move are left in place.
    pub fn create_rich_dir(&self, items: &[PathBuf]) -> io::Result<PathBuf> {
        let display = items
            .first()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("Group")
            .to_string();

        let dir_name = usable_name(&self.desktop_dir, &format!("{RICH_DIR_PREFIX}{display}"));
        let dir = self.desktop_dir.join(&dir_name);
        fs::create_dir(&dir)?;

        for item in items {
            let Some(name) = item.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let target = dir.join(usable_name(&dir, name));
            if let Err(e) = fs::rename(item, &target) {
                info!("could not move {} into {}: {e}", item.display(), dir.display());
            }
        }

        let _ = self.events.send(DesktopEvent::RichDirCreated(dir.clone()));
        Ok(dir)
    }

    /// Display name of a rich directory, `None` for plain directories.
    pub fn rich_dir_name(&self, dir: &Path) -> Option<String> {
        entry::rich_dir_display_name(dir)
    }

    /// Set a rich directory's display name by renaming the directory to
    /// the prefixed form. A plain directory becomes rich. Returns the
    /// directory's new path.
    pub fn set_rich_dir_name(&self, dir: &Path, name: &str) -> io::Result<PathBuf> {
        let parent = dir
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "directory has no parent"))?;
        let target = parent.join(format!("{RICH_DIR_PREFIX}{name}"));
        if target != dir {
            fs::rename(dir, &target)?;
        }
        Ok(target)
    }

    /// Create an empty file on the desktop with a collision-safe templated
    /// name. Returns the created path.
    pub fn new_file(&self) -> io::Result<PathBuf> {
        let path = self
            .desktop_dir
            .join(usable_templated_name(&self.desktop_dir, NEW_FILE_TEMPLATE));
        fs::File::create(&path)?;
        Ok(path)
    }

    /// Create an empty directory on the desktop with a collision-safe
    /// templated name. Returns the created path.
    pub fn new_directory(&self) -> io::Result<PathBuf> {
        let path = self
            .desktop_dir
            .join(usable_templated_name(&self.desktop_dir, NEW_DIR_TEMPLATE));
        fs::create_dir(&path)?;
        Ok(path)
    }

    /// Compose (and cache) the 2x2 preview icon for a rich directory.
    /// Launcher icons are preferred; cells left over are filled with the
    /// icons of ordinary children, then with placeholder tiles.
    pub fn rich_dir_icon(&self, dir: &Path) -> Option<PathBuf> {
        let mut children: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_item_name)
            })
            .collect();
        children.sort();

        let mut preferred: Vec<Option<PathBuf>> = Vec::new();
        let mut fallback: Vec<Option<PathBuf>> = Vec::new();
        for child in &children {
            let Some(entry) = DesktopEntry::from_path(child) else {
                continue;
            };
            let icon = entry.icon_path();
            match entry.kind {
                EntryKind::Application(_) => preferred.push(icon),
                _ => fallback.push(icon),
            }
            if preferred.len() == 4 {
                break;
            }
        }

        let mut cells = preferred;
        for icon in fallback {
            if cells.len() >= 4 {
                break;
            }
            cells.push(icon);
        }
        cells.resize(4, None);

        icon::generate_directory_icon(dir, &cells)
    }
}

/// First name of the form `name`, `name(0)`, `name(1)`, ... that does not
/// exist in `dir`.
fn usable_name(dir: &Path, name: &str) -> String {
    if !dir.join(name).exists() {
        return name.to_string();
    }
    let mut i = 0u32;
    loop {
        let candidate = format!("{name}({i})");
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        i += 1;
    }
}

/// Like [`usable_name`], but the counter lands before the extension:
/// `New file.txt` collides into `New file(0).txt`.
fn usable_templated_name(dir: &Path, template: &str) -> String {
    if !dir.join(template).exists() {
        return template.to_string();
    }
    let (prefix, base) = match template.rfind('.') {
        Some(dot) if dot > 0 => template.split_at(dot),
        _ => (template, ""),
    };
    let mut i = 0u32;
    loop {
        let candidate = format!("{prefix}({i}){base}");
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::CHANNEL_CAPACITY;
    use image::{Rgba, RgbaImage};
    use std::fs::File;
    use tempfile::TempDir;
    use tokio::sync::broadcast::{self, Receiver};

    fn service(dir: &TempDir) -> (DesktopService, Receiver<DesktopEvent>) {
        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        (DesktopService::new(dir.path().to_path_buf(), tx), rx)
    }

    #[test]
    fn collision_names_count_from_zero() {
        let dir = TempDir::new().unwrap();
        assert_eq!(usable_name(dir.path(), "Group"), "Group");
        File::create(dir.path().join("Group")).unwrap();
        assert_eq!(usable_name(dir.path(), "Group"), "Group(0)");
        File::create(dir.path().join("Group(0)")).unwrap();
        assert_eq!(usable_name(dir.path(), "Group"), "Group(1)");
    }

    #[test]
    fn templated_names_keep_the_extension_last() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("New file.txt")).unwrap();
        assert_eq!(
            usable_templated_name(dir.path(), "New file.txt"),
            "New file(0).txt"
        );
        File::create(dir.path().join("New file")).unwrap();
        assert_eq!(usable_templated_name(dir.path(), "New file"), "New file(0)");
    }

    #[test]
    fn new_file_and_directory_avoid_collisions() {
        let dir = TempDir::new().unwrap();
        let (service, _rx) = service(&dir);

        let first = service.new_file().unwrap();
        let second = service.new_file().unwrap();
        assert_eq!(first.file_name().unwrap(), "New file");
        assert_eq!(second.file_name().unwrap(), "New file(0)");
        assert!(first.is_file() && second.is_file());

        let folder = service.new_directory().unwrap();
        assert_eq!(folder.file_name().unwrap(), "New directory");
        assert!(folder.is_dir());
    }

    #[test]
    fn create_rich_dir_moves_items_and_announces() {
        let dir = TempDir::new().unwrap();
        let (service, mut rx) = service(&dir);

        let a = dir.path().join("report.pdf");
        let b = dir.path().join("notes.txt");
        File::create(&a).unwrap();
        File::create(&b).unwrap();

        let rich = service.create_rich_dir(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(
            rich.file_name().unwrap().to_str().unwrap(),
            format!("{RICH_DIR_PREFIX}report")
        );
        assert!(!a.exists() && !b.exists());
        assert!(rich.join("report.pdf").is_file());
        assert!(rich.join("notes.txt").is_file());
        assert_eq!(service.rich_dir_name(&rich).as_deref(), Some("report"));

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, DesktopEvent::RichDirCreated(p) if p == rich));
    }

    #[test]
    fn rich_dir_rename_renames_the_directory() {
        let dir = TempDir::new().unwrap();
        let (service, _rx) = service(&dir);
        let plain = dir.path().join("folder");
        fs::create_dir(&plain).unwrap();
        File::create(plain.join("inside.txt")).unwrap();

        assert_eq!(service.rich_dir_name(&plain), None);
        let rich = service.set_rich_dir_name(&plain, "Games").unwrap();
        assert!(!plain.exists());
        assert_eq!(service.rich_dir_name(&rich).as_deref(), Some("Games"));

        let renamed = service.set_rich_dir_name(&rich, "Work").unwrap();
        assert!(!rich.exists());
        assert_eq!(service.rich_dir_name(&renamed).as_deref(), Some("Work"));
        assert!(renamed.join("inside.txt").is_file());
    }

    #[test]
    fn listing_hides_dotfiles_but_shows_rich_directories() {
        let dir = TempDir::new().unwrap();
        let (service, _rx) = service(&dir);
        File::create(dir.path().join("visible.txt")).unwrap();
        File::create(dir.path().join(".hidden")).unwrap();
        File::create(dir.path().join("draft~")).unwrap();
        fs::create_dir(dir.path().join(format!("{RICH_DIR_PREFIX}Games"))).unwrap();

        let mut names: Vec<String> = service.list_entries().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["Games", "visible.txt"]);
    }

    #[test]
    fn rich_dir_icon_uses_file_contents_as_fallback() {
        let dir = TempDir::new().unwrap();
        let (service, _rx) = service(&dir);
        let rich = dir.path().join(format!("{RICH_DIR_PREFIX}Shots"));
        fs::create_dir(&rich).unwrap();
        RgbaImage::from_pixel(32, 32, Rgba([255, 0, 0, 255]))
            .save(rich.join("shot.png"))
            .unwrap();

        let icon = service.rich_dir_icon(&rich).unwrap();
        let composed = image::open(&icon).unwrap().to_rgba8();
        // The image child fills the first cell instead of the placeholder.
        assert_eq!(composed.get_pixel(2, 2).0, [255, 0, 0, 255]);
    }

    #[test]
    fn rich_dir_icon_prefers_launchers_over_sorted_position() {
        let dir = TempDir::new().unwrap();
        let (service, _rx) = service(&dir);
        let rich = dir.path().join(format!("{RICH_DIR_PREFIX}Mixed"));
        fs::create_dir(&rich).unwrap();

        let app_icon = dir.path().join("app-icon.png");
        RgbaImage::from_pixel(32, 32, Rgba([0, 0, 255, 255]))
            .save(&app_icon)
            .unwrap();
        for name in ["a.png", "b.png", "c.png", "d.png", "e.png"] {
            RgbaImage::from_pixel(32, 32, Rgba([255, 0, 0, 255]))
                .save(rich.join(name))
                .unwrap();
        }
        // Sorts after every image, but launchers still win the first cell.
        fs::write(
            rich.join("z.desktop"),
            format!(
                "[Desktop Entry]\nType=Application\nName=Z\nExec=z\nIcon={}\n",
                app_icon.display()
            ),
        )
        .unwrap();

        let icon = service.rich_dir_icon(&rich).unwrap();
        let composed = image::open(&icon).unwrap().to_rgba8();
        assert_eq!(composed.get_pixel(2, 2).0, [0, 0, 255, 255]);
        // Remaining cells fall back to the image children.
        assert_eq!(composed.get_pixel(26, 2).0, [255, 0, 0, 255]);
    }
}
