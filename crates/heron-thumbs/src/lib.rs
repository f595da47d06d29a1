//! heron-thumbs: Freedesktop thumbnail cache and factory.
//!
//! Provides a unified service for:
//! - Shared `~/.thumbnails` cache records keyed by URI digest, validated
//!   against the source mtime
//! - External `.thumbnailer` descriptors with live registry updates
//! - Generic image decoding with EXIF orientation handling
//! - Fast box-average downscaling to the target size class

mod cache;
mod decode;
mod factory;
mod scale;
mod thumbnailer;
mod uri;

pub use cache::{
    TAG_HEIGHT, TAG_MTIME, TAG_SOFTWARE, TAG_URI, TAG_WIDTH, ThumbnailSize, default_cache_root,
    failed_path, is_valid, read_png_meta, thumbnail_path, uri_md5,
};
pub use factory::{Thumbnail, ThumbnailFactory, thumbnailer_dirs};
pub use scale::scale_down;
pub use thumbnailer::{Thumbnailer, expand_command_template};
pub use uri::{path_to_uri, uri_to_local_path};
