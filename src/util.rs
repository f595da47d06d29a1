//! Small filesystem and configuration helpers shared across services.

use log::warn;
use md5::{Digest, Md5};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const CONFIG_DIR_NAME: &str = "HeronShell";

/// Escape a string for interpolation into a shell command: backslash,
/// double quote and space are prefixed with a backslash.
pub fn shell_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '"' | ' ') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Write a file atomically: temp file in the destination directory, then a
/// rename over the final path. Readers never observe a partial file.
pub fn write_file_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    fs::write(tmp.path(), contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Path of a named configuration file under the user config directory.
pub fn config_file_path(name: &str) -> Option<PathBuf> {
    Some(dirs::config_dir()?.join(CONFIG_DIR_NAME).join(name))
}

/// Load a JSON configuration file, falling back to defaults when the file
/// is missing or unreadable.
pub fn load_app_config<T: DeserializeOwned + Default>(name: &str) -> T {
    let Some(path) = config_file_path(name) else {
        return T::default();
    };
    match fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("malformed config {}: {e}", path.display());
            T::default()
        }),
        Err(_) => T::default(),
    }
}

/// Save a configuration value as pretty JSON, atomically.
pub fn save_app_config<T: Serialize>(name: &str, value: &T) -> io::Result<()> {
    let path = config_file_path(name)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config directory"))?;
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_file_atomic(&path, &json)
}

/// Deterministic cache path for an artifact derived from `uri`, grouped by
/// artifact kind under the user cache directory.
pub fn derived_cache_path(kind: &str, uri: &str) -> Option<PathBuf> {
    let mut hasher = Md5::new();
    hasher.update(uri.as_bytes());
    let digest = hex::encode(hasher.finalize());
    Some(
        dirs::cache_dir()?
            .join(CONFIG_DIR_NAME)
            .join(kind)
            .join(format!("{digest}.png")),
    )
}
