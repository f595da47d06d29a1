//! Composite rich directory icons.
//!
//! A rich directory is previewed as a 2x2 grid of the icons of its first
//! items, rendered once and cached under the user cache directory keyed by
//! the directory URI.

use crate::util;
use heron_thumbs::{path_to_uri, scale_down};
use image::{DynamicImage, Rgba, RgbaImage, imageops};
use log::debug;
use std::io::Cursor;
use std::path::{Path, PathBuf};

const ICON_SIZE: u32 = 48;
const CELL_SIZE: u32 = ICON_SIZE / 2;

/// Flat tile drawn for cells with no usable icon.
const EMPTY_CELL: Rgba<u8> = Rgba([128, 128, 128, 48]);

/// Render the composite icon for `dir` from up to four cell icons and
/// write it to the derived cache. Returns the cached path.
pub fn generate_directory_icon(dir: &Path, cells: &[Option<PathBuf>]) -> Option<PathBuf> {
    let mut canvas = RgbaImage::new(ICON_SIZE, ICON_SIZE);

    for (index, cell) in cells.iter().take(4).enumerate() {
        let x = (index as u32 % 2) * CELL_SIZE;
        let y = (index as u32 / 2) * CELL_SIZE;
        match cell.as_deref().and_then(load_cell) {
            Some(tile) => imageops::overlay(&mut canvas, &tile, i64::from(x), i64::from(y)),
            None => fill_cell(&mut canvas, x, y),
        }
    }

    let mut encoded = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
        .ok()?;

    let uri = path_to_uri(dir);
    let path = util::derived_cache_path("richdir", &uri)?;
    if let Err(e) = util::write_file_atomic(&path, &encoded) {
        debug!("could not cache icon for {}: {e}", dir.display());
        return None;
    }
    Some(path)
}

/// Decode one cell icon and shrink it to cell size. Undecodable icons
/// (missing files, SVG) are treated as empty cells.
fn load_cell(path: &Path) -> Option<RgbaImage> {
    let icon = image::open(path).ok()?;
    Some(scale_down(&icon, CELL_SIZE, CELL_SIZE).to_rgba8())
}

fn fill_cell(canvas: &mut RgbaImage, x0: u32, y0: u32) {
    for y in y0..y0 + CELL_SIZE {
        for x in x0..x0 + CELL_SIZE {
            canvas.put_pixel(x, y, EMPTY_CELL);
        }
    }
}
