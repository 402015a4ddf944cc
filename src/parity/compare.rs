//! Perceptual screenshot comparison.
//!
//! A port of the pixelmatch protocol: per-pixel color distance in YIQ space
//! against a squared threshold, with anti-aliasing detection so font
//! smoothing differences are not counted. Inputs of different sizes are
//! padded to the element-wise maximum on a white canvas first, so dimension
//! mismatches degrade into visible diff area instead of aborting.

use image::{Rgba, RgbaImage};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const AA_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);

#[derive(Debug)]
pub struct DiffResult {
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub ratio: f64,
    pub diff_image: RgbaImage,
}

/// Pad `img` to `width`x`height` on a white canvas, anchored top-left.
pub fn pad_to(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.width() == width && img.height() == height {
        return img.clone();
    }
    let mut canvas = RgbaImage::from_pixel(width, height, WHITE);
    image::imageops::overlay(&mut canvas, img, 0, 0);
    canvas
}

/// Compare two screenshots. `threshold` is the perceptual sensitivity
/// (0 = exact, higher = more tolerant); anti-aliased pixels are excluded.
pub fn compare(a: &RgbaImage, b: &RgbaImage, threshold: f32) -> DiffResult {
    let width = a.width().max(b.width());
    let height = a.height().max(b.height());
    let a = pad_to(a, width, height);
    let b = pad_to(b, width, height);

    let max_delta = 35215.0 * f64::from(threshold) * f64::from(threshold);
    let mut diff_image = RgbaImage::from_pixel(width, height, WHITE);
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let delta = color_delta(a.get_pixel(x, y), b.get_pixel(x, y), false);
            if delta.abs() > max_delta {
                if antialiased(&a, x, y, &b) || antialiased(&b, x, y, &a) {
                    diff_image.put_pixel(x, y, AA_COLOR);
                } else {
                    diff_image.put_pixel(x, y, DIFF_COLOR);
                    diff_pixels += 1;
                }
            } else {
                diff_image.put_pixel(x, y, gray_pixel(a.get_pixel(x, y)));
            }
        }
    }

    let total_pixels = u64::from(width) * u64::from(height);
    DiffResult {
        diff_pixels,
        total_pixels,
        ratio: diff_pixels as f64 / total_pixels as f64,
        diff_image,
    }
}

fn blend(channel: f64, alpha: f64) -> f64 {
    255.0 + (channel - 255.0) * alpha
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

fn premultiply(p: &Rgba<u8>) -> (f64, f64, f64) {
    let [r, g, b, a] = p.0.map(f64::from);
    if a < 255.0 {
        let a = a / 255.0;
        (blend(r, a), blend(g, a), blend(b, a))
    } else {
        (r, g, b)
    }
}

/// Signed perceptual distance between two pixels. With `y_only`, just the
/// brightness difference (used by the anti-aliasing detector).
fn color_delta(p1: &Rgba<u8>, p2: &Rgba<u8>, y_only: bool) -> f64 {
    if p1 == p2 {
        return 0.0;
    }
    let (r1, g1, b1) = premultiply(p1);
    let (r2, g2, b2) = premultiply(p2);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;
    if y_only {
        return y;
    }
    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;
    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

struct Neighborhood {
    x0: u32,
    y0: u32,
    x2: u32,
    y2: u32,
    on_edge: bool,
}

fn neighborhood(img: &RgbaImage, x: u32, y: u32) -> Neighborhood {
    let x0 = x.saturating_sub(1);
    let y0 = y.saturating_sub(1);
    let x2 = (x + 1).min(img.width() - 1);
    let y2 = (y + 1).min(img.height() - 1);
    Neighborhood {
        x0,
        y0,
        x2,
        y2,
        on_edge: x == x0 || x == x2 || y == y0 || y == y2,
    }
}

/// Whether the pixel at (x, y) in `img` looks like an anti-aliasing
/// artifact: its darkest and brightest neighbors sit inside larger flat
/// regions in both images.
fn antialiased(img: &RgbaImage, x: u32, y: u32, other: &RgbaImage) -> bool {
    let n = neighborhood(img, x, y);
    let mut zeroes: u32 = if n.on_edge { 1 } else { 0 };
    let center = img.get_pixel(x, y);

    let mut min = 0.0f64;
    let mut max = 0.0f64;
    let mut min_pos = None;
    let mut max_pos = None;

    for ny in n.y0..=n.y2 {
        for nx in n.x0..=n.x2 {
            if nx == x && ny == y {
                continue;
            }
            let delta = color_delta(center, img.get_pixel(nx, ny), true);
            if delta == 0.0 {
                zeroes += 1;
                // Too much flat area around for this to be anti-aliasing.
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_pos = Some((nx, ny));
            } else if delta > max {
                max = delta;
                max_pos = Some((nx, ny));
            }
        }
    }

    // No darker and no brighter neighbor means no gradient to smooth.
    let (Some((min_x, min_y)), Some((max_x, max_y))) = (min_pos, max_pos) else {
        return false;
    };

    (has_many_siblings(img, min_x, min_y) && has_many_siblings(other, min_x, min_y))
        || (has_many_siblings(img, max_x, max_y) && has_many_siblings(other, max_x, max_y))
}

/// Whether (x, y) has at least three identical neighbors, i.e. sits inside
/// a flat region.
fn has_many_siblings(img: &RgbaImage, x: u32, y: u32) -> bool {
    let n = neighborhood(img, x, y);
    let mut zeroes: u32 = if n.on_edge { 1 } else { 0 };
    let center = img.get_pixel(x, y);

    for ny in n.y0..=n.y2 {
        for nx in n.x0..=n.x2 {
            if nx == x && ny == y {
                continue;
            }
            if img.get_pixel(nx, ny) == center {
                zeroes += 1;
                if zeroes > 2 {
                    return true;
                }
            }
        }
    }
    false
}

fn gray_pixel(p: &Rgba<u8>) -> Rgba<u8> {
    let (r, g, b) = premultiply(p);
    let y = rgb2y(r, g, b);
    let v = blend(y, 0.1 * f64::from(p.0[3]) / 255.0).round() as u8;
    Rgba([v, v, v, 255])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(rgba))
    }

    #[test]
    fn test_identical_images_have_zero_ratio() {
        let img = solid(16, 16, [120, 80, 200, 255]);
        let result = compare(&img, &img.clone(), 0.1);
        assert_eq!(result.diff_pixels, 0);
        assert_eq!(result.ratio, 0.0);
    }

    #[test]
    fn test_black_vs_white_approaches_full_ratio() {
        let black = solid(20, 20, [0, 0, 0, 255]);
        let white = solid(20, 20, [255, 255, 255, 255]);
        let result = compare(&black, &white, 0.1);
        assert_eq!(result.ratio, 1.0);
    }

    #[test]
    fn test_padding_makes_unequal_sizes_comparable() {
        let small = solid(4, 4, [255, 255, 255, 255]);
        let large = solid(8, 8, [255, 255, 255, 255]);
        let result = compare(&small, &large, 0.1);
        // The padded region is white on white.
        assert_eq!(result.diff_pixels, 0);
        assert_eq!(result.total_pixels, 64);
    }

    #[test]
    fn test_localized_change_yields_small_ratio() {
        let base = solid(10, 10, [255, 255, 255, 255]);
        let mut changed = base.clone();
        changed.put_pixel(5, 5, Rgba([0, 0, 0, 255]));
        let result = compare(&base, &changed, 0.1);
        assert_eq!(result.diff_pixels, 1);
        assert!(result.ratio < 0.05);
    }

    #[test]
    fn test_threshold_tolerates_subtle_differences() {
        let a = solid(10, 10, [200, 200, 200, 255]);
        let b = solid(10, 10, [203, 203, 203, 255]);
        let result = compare(&a, &b, 0.1);
        assert_eq!(result.diff_pixels, 0);
    }

    #[test]
    fn test_semi_transparent_pixels_blend_onto_white() {
        // Fully transparent black is white once blended.
        let a = solid(10, 10, [0, 0, 0, 0]);
        let b = solid(10, 10, [255, 255, 255, 255]);
        let result = compare(&a, &b, 0.1);
        assert_eq!(result.diff_pixels, 0);
    }
}
