//! Diagnostic overlays: detected foci drawn as circles on 8-bit RGB renditions.

use image::{imageops, GenericImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use plotters::prelude::*;

use crate::blob::Blob;

pub const RAD51_MARK: Rgb<u8> = Rgb([0, 255, 255]);
pub const DAPI_MARK: Rgb<u8> = Rgb([0, 255, 0]);
pub const RAD51_PANEL_MARK: Rgb<u8> = Rgb([255, 255, 0]);
pub const PROB_PANEL_MARK: Rgb<u8> = Rgb([255, 0, 255]);

/// Radius and stroke of the per-tile foci markers.
const MARK_RADIUS: i32 = 3;
const MARK_THICKNESS: i32 = 3;

/// Padding around a nucleus bounding box in debug crops.
pub const CROP_PAD: usize = 10;

/// Height of the title band above a debug strip.
pub const CAPTION_HEIGHT: u32 = 16;
const CAPTION_FONT_SIZE: u32 = 11;

/// Hollow circle centred on `(row, col)`; strokes wider than one pixel grow
/// symmetrically around `radius`.
pub fn draw_ring(img: &mut RgbImage, row: i32, col: i32, radius: i32, thickness: i32, color: Rgb<u8>) {
    let inner = radius - (thickness - 1) / 2;
    let outer = radius + thickness / 2;
    for r in inner.max(0)..=outer {
        draw_hollow_circle_mut(img, (col, row), r, color);
    }
}

/// Copy of `base` with a fixed-size marker at every blob centre.
pub fn annotate(base: &RgbImage, blobs: &[Blob], color: Rgb<u8>) -> RgbImage {
    let mut out = base.clone();
    for b in blobs {
        draw_ring(&mut out, b.row as i32, b.col as i32, MARK_RADIUS, MARK_THICKNESS, color);
    }
    out
}

/// Crop a bounding box `(min_row, min_col, max_row, max_col)` grown by `pad`
/// and clipped to the image. Returns the crop and its top-left `(row, col)`,
/// or `None` when nothing of the box lies inside the image.
pub fn crop_padded(
    img: &RgbImage,
    bbox: (usize, usize, usize, usize),
    pad: usize,
) -> Option<(RgbImage, (usize, usize))> {
    let (min_r, min_c, max_r, max_c) = bbox;
    let (w, h) = (img.width() as usize, img.height() as usize);
    let top = min_r.saturating_sub(pad).min(h);
    let left = min_c.saturating_sub(pad).min(w);
    let bottom = (max_r + pad).min(h).max(top);
    let right = (max_c + pad).min(w).max(left);
    if bottom == top || right == left {
        return None;
    }
    let crop = imageops::crop_imm(
        img,
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    )
    .to_image();
    Some((crop, (top, left)))
}

/// Draw blobs onto a crop whose top-left corner sits at `origin` in tile coordinates.
pub fn mark_crop<'a>(
    crop: &RgbImage,
    origin: (usize, usize),
    blobs: impl IntoIterator<Item = &'a Blob>,
    color: Rgb<u8>,
) -> RgbImage {
    let mut out = crop.clone();
    for b in blobs {
        let row = b.row as i32 - origin.0 as i32;
        let col = b.col as i32 - origin.1 as i32;
        draw_ring(&mut out, row, col, b.radius() as i32, 1, color);
    }
    out
}

/// Place panels side by side; the strip is as tall as the tallest panel.
pub fn hconcat(panels: &[RgbImage]) -> RgbImage {
    let width: u32 = panels.iter().map(|p| p.width()).sum();
    let height = panels.iter().map(|p| p.height()).max().unwrap_or(0);
    let mut out = RgbImage::new(width, height);
    let mut x = 0;
    for p in panels {
        // cannot fail: the strip is sized from the panels
        let _ = out.copy_from(p, x, 0);
        x += p.width();
    }
    out
}

/// Panels side by side under a white band holding one title per panel.
/// Titles that cannot be rendered (no usable system font) leave the band blank.
pub fn titled_strip(panels: &[RgbImage], titles: &[String]) -> RgbImage {
    let strip = hconcat(panels);
    let mut out = RgbImage::from_pixel(
        strip.width(),
        strip.height() + CAPTION_HEIGHT,
        Rgb([255, 255, 255]),
    );
    // cannot fail: the band only adds rows
    let _ = out.copy_from(&strip, 0, CAPTION_HEIGHT);
    let widths: Vec<u32> = panels.iter().map(|p| p.width()).collect();
    if let Err(e) = draw_titles(&mut out, &widths, titles) {
        log::warn!("Panel titles not drawn: {}", e);
    }
    out
}

fn draw_titles(
    img: &mut RgbImage,
    widths: &[u32],
    titles: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let size = img.dimensions();
    let root = BitMapBackend::with_buffer(img, size).into_drawing_area();
    let style = ("sans-serif", CAPTION_FONT_SIZE).into_font().color(&BLACK);
    let mut x = 0i32;
    for (width, title) in widths.iter().zip(titles) {
        root.draw_text(title, &style, (x + 2, 2))?;
        x += *width as i32;
    }
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotate_draws_marker_ring() {
        let base = RgbImage::new(20, 20);
        let blobs = [Blob { row: 10, col: 8, sigma: 1.0 }];
        let out = annotate(&base, &blobs, RAD51_MARK);
        // ring at radius 2..=4 around (row 10, col 8)
        assert_eq!(out.get_pixel(8 + 3, 10), &RAD51_MARK);
        assert_eq!(out.get_pixel(8, 10 - 4), &RAD51_MARK);
        assert_eq!(out.get_pixel(8, 10), &Rgb([0, 0, 0]));
        assert_eq!(base.get_pixel(11, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn crop_is_clipped_at_the_border() {
        let img = RgbImage::from_fn(30, 20, |x, y| Rgb([x as u8, y as u8, 0]));
        let (crop, origin) = crop_padded(&img, (2, 5, 8, 12), CROP_PAD).unwrap();
        assert_eq!(origin, (0, 0));
        assert_eq!((crop.width(), crop.height()), (22, 18));

        let (crop, origin) = crop_padded(&img, (12, 20, 15, 25), 2).unwrap();
        assert_eq!(origin, (10, 18));
        assert_eq!((crop.width(), crop.height()), (9, 7));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([18, 10, 0]));
    }

    #[test]
    fn box_outside_the_image_has_no_crop() {
        let img = RgbImage::new(30, 20);
        assert!(crop_padded(&img, (40, 5, 50, 12), CROP_PAD).is_none());
        assert!(crop_padded(&img, (2, 45, 8, 50), CROP_PAD).is_none());
        // partly inside after padding
        let (crop, origin) = crop_padded(&img, (25, 5, 28, 12), CROP_PAD).unwrap();
        assert_eq!(origin, (15, 0));
        assert_eq!(crop.height(), 5);
    }

    #[test]
    fn mark_crop_uses_local_coordinates() {
        let crop = RgbImage::new(15, 15);
        let blob = Blob { row: 27, col: 33, sigma: 2.0 };
        let out = mark_crop(&crop, (20, 25), [&blob], PROB_PANEL_MARK);
        // radius floor(2 * sqrt 2) = 2 around local (7, 8)
        assert_eq!(out.get_pixel(8 + 2, 7), &PROB_PANEL_MARK);
        assert_eq!(out.get_pixel(8, 7), &Rgb([0, 0, 0]));
    }

    #[test]
    fn hconcat_lays_panels_side_by_side() {
        let a = RgbImage::from_pixel(3, 4, Rgb([1, 1, 1]));
        let b = RgbImage::from_pixel(2, 4, Rgb([2, 2, 2]));
        let strip = hconcat(&[a, b]);
        assert_eq!((strip.width(), strip.height()), (5, 4));
        assert_eq!(strip.get_pixel(2, 0), &Rgb([1, 1, 1]));
        assert_eq!(strip.get_pixel(3, 3), &Rgb([2, 2, 2]));
    }

    #[test]
    fn titled_strip_adds_a_white_band() {
        let a = RgbImage::from_pixel(30, 4, Rgb([1, 1, 1]));
        let b = RgbImage::from_pixel(30, 4, Rgb([2, 2, 2]));
        let strip = titled_strip(&[a, b], &["a".to_string(), "b".to_string()]);
        assert_eq!((strip.width(), strip.height()), (60, 4 + CAPTION_HEIGHT));
        assert_eq!(strip.get_pixel(29, CAPTION_HEIGHT - 1), &Rgb([255, 255, 255]));
        assert_eq!(strip.get_pixel(0, CAPTION_HEIGHT), &Rgb([1, 1, 1]));
        assert_eq!(strip.get_pixel(59, CAPTION_HEIGHT + 3), &Rgb([2, 2, 2]));
    }
}
