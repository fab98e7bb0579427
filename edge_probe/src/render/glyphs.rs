use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};

const GLYPH_ROWS: usize = 7;
const GLYPH_COLS: i32 = 5;
const BITMAP_SCALE: i32 = 2;
const FONT_PX: f32 = 16.0;

// 5x7 cells, bit 4 is the leftmost column.
fn bitmap(c: char) -> [u8; GLYPH_ROWS] {
    match c {
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
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ' ' => [0x00; GLYPH_ROWS],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

/// Face used for score labels.
#[derive(Clone)]
pub enum LabelFace {
    /// Built-in digit face, enough for formatted scores.
    Bitmap,
    Font(FontArc),
}

impl LabelFace {
    pub fn height(&self, text: &str) -> i32 {
        match self {
            LabelFace::Bitmap => GLYPH_ROWS as i32 * BITMAP_SCALE,
            LabelFace::Font(font) => text_size(PxScale::from(FONT_PX), font, text).1 as i32,
        }
    }

    /// Draws `text` with its top-left corner at (`x`, `y`). Pixels outside
    /// the image are skipped.
    pub fn draw(&self, img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        match self {
            LabelFace::Bitmap => draw_bitmap_text(img, x, y, text, color),
            LabelFace::Font(font) => {
                draw_text_mut(img, color, x, y, PxScale::from(FONT_PX), font, text)
            }
        }
    }
}

fn draw_bitmap_text(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let advance = (GLYPH_COLS + 1) * BITMAP_SCALE;
    for (i, c) in text.chars().enumerate() {
        let origin_x = x + i as i32 * advance;
        for (row, bits) in bitmap(c).iter().enumerate() {
            for col in 0..GLYPH_COLS {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let cell = Rect::at(
                    origin_x + col * BITMAP_SCALE,
                    y + row as i32 * BITMAP_SCALE,
                )
                .of_size(BITMAP_SCALE as u32, BITMAP_SCALE as u32);
                draw_filled_rect_mut(img, cell, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INK: Rgb<u8> = Rgb([0, 255, 0]);

    fn lit(img: &RgbImage) -> usize {
        img.pixels().filter(|p| **p == INK).count()
    }

    #[test]
    fn test_bitmap_digits_are_distinct() {
        let digits: Vec<_> = "0123456789".chars().map(bitmap).collect();
        for (i, a) in digits.iter().enumerate() {
            for b in digits.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_bitmap_text_draws_scaled_cells() {
        let mut img = RgbImage::new(40, 20);
        LabelFace::Bitmap.draw(&mut img, 0, 0, "-", INK);

        // One row of five cells, each 2x2.
        assert_eq!(lit(&img), 5 * 4);
        assert_eq!(*img.get_pixel(0, 6), INK);
        assert_eq!(*img.get_pixel(9, 7), INK);
        assert_eq!(*img.get_pixel(0, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_bitmap_text_clips_outside_image() {
        let mut img = RgbImage::new(10, 10);
        LabelFace::Bitmap.draw(&mut img, -4, -12, "0.88", INK);
        LabelFace::Bitmap.draw(&mut img, 8, 8, "0.88", INK);
        LabelFace::Bitmap.draw(&mut img, 500, -500, "1", INK);

        assert!(lit(&img) > 0);
    }
}
