//! Shell configuration, loaded once at startup.

use crate::util;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CONFIG_FILE: &str = "shell.json";

/// Top-level configuration. Every field has a default so a partial or
/// missing file still yields a working shell.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Desktop directory override. `None` means `~/Desktop`.
    pub desktop_dir: Option<PathBuf>,
    pub thumbnails: ThumbnailPrefs,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailPrefs {
    /// Disable all thumbnail generation.
    pub disable_all: bool,
    /// MIME types that must never be thumbnailed.
    pub disabled_types: Vec<String>,
}

impl ShellConfig {
    /// Load the configuration, writing a default file on first run so users
    /// have something to edit.
    pub fn load() -> ShellConfig {
        let config: ShellConfig = util::load_app_config(CONFIG_FILE);
        if util::config_file_path(CONFIG_FILE).is_some_and(|p| !p.exists())
            && let Err(e) = util::save_app_config(CONFIG_FILE, &config)
        {
            warn!("could not write default config: {e}");
        }
        config
    }

    /// The desktop directory this shell manages.
    pub fn desktop_dir(&self) -> PathBuf {
        self.desktop_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Desktop")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: ShellConfig =
            serde_json::from_str(r#"{"thumbnails": {"disable_all": true}}"#).unwrap();
        assert!(config.thumbnails.disable_all);
        assert!(config.thumbnails.disabled_types.is_empty());
        assert!(config.desktop_dir.is_none());
    }

    #[test]
    fn default_serializes_and_roundtrips() {
        let config = ShellConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ShellConfig = serde_json::from_str(&json).unwrap();
        assert!(back.desktop_dir.is_none());
        assert!(!back.thumbnails.disable_all);
    }
}
