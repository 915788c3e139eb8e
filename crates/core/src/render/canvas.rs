use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{Rgb, RgbImage};

const GLYPH_BITS: usize = 8;

/// Parses `#RRGGBB`, `#RGB` or the same without `#`.
pub fn parse_color(raw: &str) -> Option<Rgb<u8>> {
    let hex = raw.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(Rgb([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        ])),
        3 => {
            let short = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
            Some(Rgb([short(0)?, short(1)?, short(2)?]))
        }
        _ => None,
    }
}

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn blend(under: u8, over: u8, alpha: f32) -> u8 {
    (f32::from(under) * (1.0 - alpha) + f32::from(over) * alpha)
        .round()
        .clamp(0.0, 255.0) as u8
}

pub(crate) struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Rgb<u8>) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, background),
        }
    }

    pub fn width(&self) -> f32 {
        self.image.width() as f32
    }

    pub fn height(&self) -> f32 {
        self.image.height() as f32
    }

    /// Blends `color` over `[x0, x1) x [y0, y1)`, clipped to the canvas.
    pub fn fill_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgb<u8>, alpha: f32) {
        if alpha <= 0.0 {
            return;
        }
        let alpha = alpha.min(1.0);
        let clip = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as u32;
        let (w, h) = self.image.dimensions();
        let (xa, xb) = (clip(x0, w), clip(x1, w));
        let (ya, yb) = (clip(y0, h), clip(y1, h));

        for y in ya..yb {
            for x in xa..xb {
                let px = self.image.get_pixel_mut(x, y);
                for c in 0..3 {
                    px.0[c] = blend(px.0[c], color.0[c], alpha);
                }
            }
        }
    }

    /// Draws one character in a square cell whose top-left corner is `(left, top)`.
    pub fn draw_glyph(
        &mut self,
        ch: char,
        left: f32,
        top: f32,
        cell: f32,
        color: Rgb<u8>,
        alpha: f32,
    ) {
        let bit = cell / GLYPH_BITS as f32;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_BITS {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let x = left + col as f32 * bit;
                let y = top + row as f32 * bit;
                self.fill_rect(x, y, x + bit, y + bit, color, alpha);
            }
        }
    }

    /// Draws a single line of text centred on `(cx, cy)`.
    pub fn draw_text_centered(
        &mut self,
        text: &str,
        cx: f32,
        cy: f32,
        cell: f32,
        color: Rgb<u8>,
        alpha: f32,
    ) {
        let width = text.chars().count() as f32 * cell;
        let left = cx - width / 2.0;
        let top = cy - cell / 2.0;
        for (i, ch) in text.chars().enumerate() {
            self.draw_glyph(ch, left + i as f32 * cell, top, cell, color, alpha);
        }
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    #[test]
    fn parses_long_and_short_hex() {
        assert_eq!(parse_color("#FFD700"), Some(Rgb([255, 215, 0])));
        assert_eq!(parse_color("ffd700"), Some(Rgb([255, 215, 0])));
        assert_eq!(parse_color("#0f8"), Some(Rgb([0, 255, 136])));
        assert_eq!(parse_color("gold"), None);
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("#ééé"), None);
    }

    #[test]
    fn fill_rect_clips_to_canvas() {
        let mut canvas = Canvas::new(4, 4, BLACK);
        canvas.fill_rect(-10.0, -10.0, 2.0, 2.0, WHITE, 1.0);
        let img = canvas.into_image();
        assert_eq!(*img.get_pixel(0, 0), WHITE);
        assert_eq!(*img.get_pixel(1, 1), WHITE);
        assert_eq!(*img.get_pixel(2, 2), BLACK);
    }

    #[test]
    fn half_alpha_blends() {
        let mut canvas = Canvas::new(1, 1, BLACK);
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0, WHITE, 0.5);
        assert_eq!(*canvas.into_image().get_pixel(0, 0), Rgb([128, 128, 128]));
    }

    #[test]
    fn space_draws_nothing_and_letters_draw_something() {
        let mut canvas = Canvas::new(32, 16, BLACK);
        canvas.draw_glyph(' ', 0.0, 0.0, 16.0, WHITE, 1.0);
        assert!(canvas.image.pixels().all(|p| *p == BLACK));

        canvas.draw_glyph('A', 16.0, 0.0, 16.0, WHITE, 1.0);
        let img = canvas.into_image();
        assert!(img.pixels().any(|p| *p == WHITE));
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(*img.get_pixel(x, y), BLACK);
            }
        }
    }
}
