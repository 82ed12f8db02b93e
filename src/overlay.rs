//! Evidence annotation.
//!
//! Draws boxed text banners onto an image with a built-in 5x7 bitmap font.
//! Lowercase input is drawn in uppercase; characters without a glyph are drawn
//! as '?'. Everything is clipped to the image bounds.

use image::{Rgb, RgbImage};

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SPACING: u32 = 1;

const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([220, 0, 0]);

/// Banner placement and sizing.
#[derive(Clone, Copy, Debug)]
pub struct BannerStyle {
    /// Pixel size of one font cell.
    pub scale: u32,
    /// Horizontal and vertical padding around the text.
    pub padding: (u32, u32),
}

impl Default for BannerStyle {
    fn default() -> Self {
        Self {
            scale: 2,
            padding: (15, 8),
        }
    }
}

/// Label banner at (20, 20) and timestamp banner at (20, 90).
pub fn draw_detection_overlay(image: &mut RgbImage, label_text: &str, timestamp_text: &str) {
    let style = BannerStyle::default();
    draw_text_box(image, label_text, (20, 20), style);
    draw_text_box(image, timestamp_text, (20, 90), style);
}

/// Draw `text` in a filled box whose top-left corner is `top_left`.
///
/// Returns the box size `(width, height)` before clipping.
pub fn draw_text_box(
    image: &mut RgbImage,
    text: &str,
    top_left: (u32, u32),
    style: BannerStyle,
) -> (u32, u32) {
    let scale = style.scale.max(1);
    let (text_width, text_height) = text_size(text, scale);
    let box_width = text_width + style.padding.0 * 2;
    let box_height = text_height + style.padding.1 * 2;

    fill_rect(image, top_left, (box_width, box_height), BOX_COLOR);

    let mut x = top_left.0 + style.padding.0;
    let y = top_left.1 + style.padding.1;
    for ch in text.chars() {
        draw_glyph(image, glyph(ch), (x, y), scale);
        x += (GLYPH_WIDTH + GLYPH_SPACING) * scale;
    }
    (box_width, box_height)
}

/// Rendered size of `text` at `scale`, without padding.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return (0, GLYPH_HEIGHT * scale);
    }
    let width = chars * (GLYPH_WIDTH + GLYPH_SPACING) * scale - GLYPH_SPACING * scale;
    (width, GLYPH_HEIGHT * scale)
}

fn fill_rect(image: &mut RgbImage, origin: (u32, u32), size: (u32, u32), color: Rgb<u8>) {
    let x_end = origin.0.saturating_add(size.0).min(image.width());
    let y_end = origin.1.saturating_add(size.1).min(image.height());
    for y in origin.1..y_end {
        for x in origin.0..x_end {
            image.put_pixel(x, y, color);
        }
    }
}

fn draw_glyph(image: &mut RgbImage, rows: [u8; 7], origin: (u32, u32), scale: u32) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            let cell = (
                origin.0 + col * scale,
                origin.1 + row as u32 * scale,
            );
            fill_rect(image, cell, (scale, scale), TEXT_COLOR);
        }
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ' ' => [0x00; 7],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_size_accounts_for_spacing() {
        assert_eq!(text_size("AB", 1), (11, 7));
        assert_eq!(text_size("AB", 2), (22, 14));
        assert_eq!(text_size("", 2), (0, 14));
    }

    #[test]
    fn box_is_white_and_glyphs_are_red() {
        let mut image = RgbImage::from_pixel(200, 60, Rgb([0, 0, 0]));
        let style = BannerStyle {
            scale: 1,
            padding: (2, 2),
        };
        let (w, h) = draw_text_box(&mut image, "I", (10, 10), style);
        assert_eq!((w, h), (9, 11));
        // Padding corner stays box-colored.
        assert_eq!(*image.get_pixel(10, 10), BOX_COLOR);
        // Top bar of 'I' (0x0E) lights columns 1..=3 of the first row.
        assert_eq!(*image.get_pixel(13, 12), TEXT_COLOR);
        assert_eq!(*image.get_pixel(12, 12), BOX_COLOR);
        // Outside the box is untouched.
        assert_eq!(*image.get_pixel(30, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn drawing_is_clipped_to_image() {
        let mut image = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
        draw_detection_overlay(&mut image, "ACCIDENT DETECTED!", "2026-10-17 12:00:00");
        assert_eq!(image.dimensions(), (16, 16));
    }

    #[test]
    fn lowercase_uses_uppercase_glyphs() {
        assert_eq!(glyph('a'), glyph('A'));
        assert_eq!(glyph('~'), glyph('?'));
    }
}
