//! Generic image decoding fallback.
//!
//! Used when no external thumbnailer is registered for a MIME type. Decodes
//! with the `image` crate, records the original dimensions before any
//! scaling, and applies embedded EXIF orientation where the format carries
//! one (JPEG/TIFF). The caller performs the final box-average downscale
//! against its target size.

use image::codecs::jpeg::JpegDecoder;
use image::codecs::tiff::TiffDecoder;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub(crate) struct DecodedImage {
    pub image: DynamicImage,
    /// Dimensions of the source before orientation and scaling.
    pub original_width: u32,
    pub original_height: u32,
}

pub(crate) fn decode_image(path: &Path) -> Option<DecodedImage> {
    let reader = ImageReader::open(path).ok()?.with_guessed_format().ok()?;
    let format = reader.format();

    let (image, width, height) = match format {
        Some(ImageFormat::Jpeg) => {
            let file = BufReader::new(File::open(path).ok()?);
            let mut decoder = JpegDecoder::new(file).ok()?;
            let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
            let (width, height) = decoder.dimensions();
            let mut image = DynamicImage::from_decoder(decoder).ok()?;
            image.apply_orientation(orientation);
            (image, width, height)
        }
        Some(ImageFormat::Tiff) => {
            let file = BufReader::new(File::open(path).ok()?);
            let mut decoder = TiffDecoder::new(file).ok()?;
            let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
            let (width, height) = decoder.dimensions();
            let mut image = DynamicImage::from_decoder(decoder).ok()?;
            image.apply_orientation(orientation);
            (image, width, height)
        }
        _ => {
            let image = reader.decode().ok()?;
            let (width, height) = (image.width(), image.height());
            (image, width, height)
        }
    };

    Some(DecodedImage {
        image,
        original_width: width,
        original_height: height,
    })
}

/// Whether a MIME type can be handled by the generic decoder.
pub(crate) fn mime_supported_by_image_crate(mime_type: &str) -> bool {
    ImageFormat::from_mime_type(mime_type).is_some_and(|f| f.reading_enabled())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use tempfile::TempDir;

    #[test]
    fn decodes_a_png_and_reports_original_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("img.png");
        RgbaImage::from_pixel(20, 10, image::Rgba([9, 8, 7, 255]))
            .save(&path)
            .unwrap();

        let decoded = decode_image(&path).unwrap();
        assert_eq!(decoded.original_width, 20);
        assert_eq!(decoded.original_height, 10);
        assert_eq!(decoded.image.width(), 20);
    }

    #[test]
    fn undecodable_files_yield_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not-an-image.png");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(decode_image(&path).is_none());
        assert!(decode_image(&dir.path().join("missing.png")).is_none());
    }

    #[test]
    fn image_crate_mime_support() {
        assert!(mime_supported_by_image_crate("image/png"));
        assert!(mime_supported_by_image_crate("image/jpeg"));
        assert!(!mime_supported_by_image_crate("application/x-unknown"));
        assert!(!mime_supported_by_image_crate("video/mp4"));
    }
}
