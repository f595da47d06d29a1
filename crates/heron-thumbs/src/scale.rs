//! Box-average downscaling.
//!
//! Much faster than a general resampling filter when shrinking large images.
//! The source is partitioned into `dest_width x dest_height` blocks sized as
//! evenly as possible (integer step plus Bresenham-style remainder
//! accumulation per axis) and each destination pixel is the mean of its
//! block. With an alpha channel, color channels are alpha-weighted and the
//! output alpha is the mean alpha; a fully transparent block yields
//! transparent black.

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

/// Scale `src` down to `dest_width x dest_height`.
///
/// Destination dimensions must be non-zero; dimensions larger than the
/// source are clamped to the source size (the algorithm only shrinks).
pub fn scale_down(src: &DynamicImage, dest_width: u32, dest_height: u32) -> DynamicImage {
    let dest_width = dest_width.clamp(1, src.width());
    let dest_height = dest_height.clamp(1, src.height());

    if src.color().has_alpha() {
        DynamicImage::ImageRgba8(scale_down_rgba(&src.to_rgba8(), dest_width, dest_height))
    } else {
        DynamicImage::ImageRgb8(scale_down_rgb(&src.to_rgb8(), dest_width, dest_height))
    }
}

/// Split an axis of `source` length into `dest` blocks: each step advances by
/// `quot` and one extra pixel whenever the accumulated remainder overflows.
struct BlockIter {
    pos: i64,
    len: i64,
    quot: i64,
    rem: i64,
    frac: i64,
    dest: i64,
}

impl BlockIter {
    fn new(source: u32, dest: u32) -> Self {
        let (source, dest) = (source as i64, dest as i64);
        BlockIter {
            pos: 0,
            len: source,
            quot: source / dest,
            rem: source % dest,
            frac: -dest / 2,
            dest,
        }
    }
}

impl Iterator for BlockIter {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<(i64, i64)> {
        if self.pos >= self.len {
            return None;
        }
        let start = self.pos;
        let mut end = start + self.quot;
        self.frac += self.rem;
        if self.frac > 0 {
            end += 1;
            self.frac -= self.dest;
        }
        self.pos = end;
        Some((start, end))
    }
}

fn scale_down_rgba(src: &RgbaImage, dest_width: u32, dest_height: u32) -> RgbaImage {
    let mut out = RgbaImage::new(dest_width, dest_height);

    for (oy, (y1, y2)) in BlockIter::new(src.height(), dest_height).enumerate() {
        for (ox, (x1, x2)) in BlockIter::new(src.width(), dest_width).enumerate() {
            let (mut r, mut g, mut b, mut a) = (0u64, 0u64, 0u64, 0u64);
            let mut pixels = 0u64;
            for y in y1..y2 {
                for x in x1..x2 {
                    let p = src.get_pixel(x as u32, y as u32);
                    let alpha = u64::from(p[3]);
                    r += alpha * u64::from(p[0]);
                    g += alpha * u64::from(p[1]);
                    b += alpha * u64::from(p[2]);
                    a += alpha;
                    pixels += 1;
                }
            }
            let pixel = if a != 0 {
                Rgba([(r / a) as u8, (g / a) as u8, (b / a) as u8, (a / pixels) as u8])
            } else {
                Rgba([0, 0, 0, 0])
            };
            out.put_pixel(ox as u32, oy as u32, pixel);
        }
    }

    out
}

fn scale_down_rgb(src: &RgbImage, dest_width: u32, dest_height: u32) -> RgbImage {
    let mut out = RgbImage::new(dest_width, dest_height);

    for (oy, (y1, y2)) in BlockIter::new(src.height(), dest_height).enumerate() {
        for (ox, (x1, x2)) in BlockIter::new(src.width(), dest_width).enumerate() {
            let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
            let mut pixels = 0u64;
            for y in y1..y2 {
                for x in x1..x2 {
                    let p = src.get_pixel(x as u32, y as u32);
                    r += u64::from(p[0]);
                    g += u64::from(p[1]);
                    b += u64::from(p[2]);
                    pixels += 1;
                }
            }
            out.put_pixel(
                ox as u32,
                oy as u32,
                Rgb([(r / pixels) as u8, (g / pixels) as u8, (b / pixels) as u8]),
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_rgba(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    #[test]
    fn block_partition_covers_source_exactly() {
        for (source, dest) in [(10u32, 3u32), (128, 128), (1000, 7), (5, 5), (17, 16)] {
            let blocks: Vec<_> = BlockIter::new(source, dest).collect();
            assert_eq!(blocks.len(), dest as usize, "{source}->{dest}");
            assert_eq!(blocks[0].0, 0);
            assert_eq!(blocks.last().unwrap().1, source as i64);
            for pair in blocks.windows(2) {
                assert_eq!(pair[0].1, pair[1].0);
            }
        }
    }

    #[test]
    fn uniform_color_survives_any_shrink() {
        let src = uniform_rgba(97, 41, [200, 100, 50, 255]);
        for (w, h) in [(13, 7), (97, 41), (1, 1), (50, 40)] {
            let out = scale_down(&src, w, h).to_rgba8();
            assert_eq!(out.dimensions(), (w, h));
            for p in out.pixels() {
                assert_eq!(p.0, [200, 100, 50, 255]);
            }
        }
    }

    #[test]
    fn same_size_scale_is_identity_for_opaque_images() {
        let mut src = RgbaImage::new(9, 6);
        for (x, y, p) in src.enumerate_pixels_mut() {
            *p = Rgba([(x * 25) as u8, (y * 40) as u8, (x + y) as u8, 255]);
        }
        let src = DynamicImage::ImageRgba8(src);
        let out = scale_down(&src, 9, 6);
        assert_eq!(src.to_rgba8().as_raw(), out.to_rgba8().as_raw());
    }

    #[test]
    fn fully_transparent_block_becomes_transparent_black() {
        let src = uniform_rgba(8, 8, [255, 255, 255, 0]);
        let out = scale_down(&src, 2, 2).to_rgba8();
        for p in out.pixels() {
            assert_eq!(p.0, [0, 0, 0, 0]);
        }
    }

    #[test]
    fn rgb_path_averages_without_alpha_weighting() {
        let mut src = RgbImage::new(2, 1);
        src.put_pixel(0, 0, Rgb([0, 0, 0]));
        src.put_pixel(1, 0, Rgb([200, 100, 50]));
        let out = scale_down(&DynamicImage::ImageRgb8(src), 1, 1).to_rgb8();
        assert_eq!(out.get_pixel(0, 0).0, [100, 50, 25]);
    }

    #[test]
    fn oversized_destination_is_clamped() {
        let src = uniform_rgba(4, 4, [1, 2, 3, 255]);
        let out = scale_down(&src, 10, 10);
        assert_eq!(out.width(), 4);
        assert_eq!(out.height(), 4);
    }
}
