//! Thumbnail cache layout and PNG metadata handling.
//!
//! The on-disk format follows the shared freedesktop thumbnail cache so any
//! other consumer of `~/.thumbnails` sees the same records:
//! `<cache_root>/{normal|large}/<md5(uri)>.png` for successes and
//! `<cache_root>/fail/<app>/<md5(uri)>.png` for failure markers. Validity is
//! carried in PNG tEXt chunks, not in filesystem metadata.

use image::DynamicImage;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

/// Keyword of the tEXt chunk holding the source URI.
pub const TAG_URI: &str = "Thumb::URI";
/// Keyword of the tEXt chunk holding the source mtime (decimal seconds).
pub const TAG_MTIME: &str = "Thumb::MTime";
/// Original (pre-scale) source width, when known.
pub const TAG_WIDTH: &str = "Thumb::Image::Width";
/// Original (pre-scale) source height, when known.
pub const TAG_HEIGHT: &str = "Thumb::Image::Height";
/// Software tag written into every record.
pub const TAG_SOFTWARE: &str = "Software";

pub(crate) const SOFTWARE_NAME: &str = "Heron::ThumbnailFactory";

/// Thumbnail size class. Two fixed classes only, matching the shared cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThumbnailSize {
    /// 128 px, cache subdirectory `normal`.
    Normal,
    /// 256 px, cache subdirectory `large`.
    Large,
}

impl ThumbnailSize {
    pub fn pixels(self) -> u32 {
        match self {
            ThumbnailSize::Normal => 128,
            ThumbnailSize::Large => 256,
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            ThumbnailSize::Normal => "normal",
            ThumbnailSize::Large => "large",
        }
    }
}

/// MD5 digest of a URI as a lowercase hex string. This is the identity key
/// of every cache record.
pub fn uri_md5(uri: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(uri.as_bytes());
    hex::encode(hasher.finalize())
}

/// Default cache root shared with other thumbnailing applications.
pub fn default_cache_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".thumbnails")
}

/// Deterministic path of the success record for `uri` at `size`.
pub fn thumbnail_path(cache_root: &Path, size: ThumbnailSize, uri: &str) -> PathBuf {
    cache_root
        .join(size.dir_name())
        .join(format!("{}.png", uri_md5(uri)))
}

/// Deterministic path of the failure record for `uri`, namespaced per app.
pub fn failed_path(cache_root: &Path, app_name: &str, uri: &str) -> PathBuf {
    cache_root
        .join("fail")
        .join(app_name)
        .join(format!("{}.png", uri_md5(uri)))
}

/// Read the tEXt chunks of a PNG file. `None` when the file is missing or
/// not a readable PNG.
pub fn read_png_meta(path: &Path) -> Option<HashMap<String, String>> {
    let file = File::open(path).ok()?;
    let decoder = png::Decoder::new(BufReader::new(file));
    let reader = decoder.read_info().ok()?;
    let mut meta = HashMap::new();
    for chunk in &reader.info().uncompressed_latin1_text {
        meta.insert(chunk.keyword.clone(), chunk.text.clone());
    }
    Some(meta)
}

/// A record is valid only when both the embedded URI and mtime match exactly.
pub fn is_valid(path: &Path, uri: &str, mtime: i64) -> bool {
    let Some(meta) = read_png_meta(path) else {
        return false;
    };
    if meta.get(TAG_URI).map(String::as_str) != Some(uri) {
        return false;
    }
    meta.get(TAG_MTIME)
        .and_then(|s| s.parse::<i64>().ok())
        .is_some_and(|t| t == mtime)
}

/// Encode `image` as RGBA8 PNG into `writer` with the given tEXt chunks.
pub(crate) fn write_png<W: Write>(
    writer: W,
    image: &DynamicImage,
    texts: &[(&str, String)],
) -> io::Result<()> {
    let rgba = image.to_rgba8();
    let mut encoder = png::Encoder::new(writer, rgba.width(), rgba.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    for (keyword, text) in texts {
        encoder.add_text_chunk((*keyword).to_string(), text.clone())?;
    }
    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgba.as_raw())?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn md5_matches_known_vectors() {
        assert_eq!(uri_md5(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(uri_md5("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn cache_paths_use_size_class_and_digest() {
        let root = Path::new("/cache");
        let uri = "file:///home/u/Desktop/pic.png";
        let normal = thumbnail_path(root, ThumbnailSize::Normal, uri);
        let large = thumbnail_path(root, ThumbnailSize::Large, uri);
        assert_eq!(normal.parent().unwrap(), root.join("normal"));
        assert_eq!(large.parent().unwrap(), root.join("large"));
        let name = normal.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), 32 + 4);
        assert!(name.ends_with(".png"));
        assert_eq!(normal.file_name(), large.file_name());

        let failed = failed_path(root, "my-app", uri);
        assert_eq!(failed.parent().unwrap(), root.join("fail").join("my-app"));
        assert_eq!(failed.file_name(), normal.file_name());
    }

    #[test]
    fn png_meta_roundtrip_and_validity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thumb.png");
        let image = DynamicImage::new_rgba8(4, 4);
        let uri = "file:///tmp/a.txt";

        let file = File::create(&path).unwrap();
        write_png(
            file,
            &image,
            &[
                (TAG_URI, uri.to_string()),
                (TAG_MTIME, "1234".to_string()),
                (TAG_SOFTWARE, SOFTWARE_NAME.to_string()),
            ],
        )
        .unwrap();

        let meta = read_png_meta(&path).unwrap();
        assert_eq!(meta.get(TAG_URI).unwrap(), uri);
        assert_eq!(meta.get(TAG_MTIME).unwrap(), "1234");

        assert!(is_valid(&path, uri, 1234));
        assert!(!is_valid(&path, uri, 1235));
        assert!(!is_valid(&path, "file:///tmp/b.txt", 1234));
        assert!(!is_valid(&dir.path().join("missing.png"), uri, 1234));
    }
}
