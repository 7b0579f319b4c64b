use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::{debug, info};
use std::path::Path;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const CORNER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const CORNER_LENGTH: i32 = 30;
const CORNER_THICKNESS: i32 = 5;
const LABEL_PADDING: i32 = 10;
const LABEL_MIN_Y: i32 = 35;
const FONT_SCALE: f32 = 22.;

const SYSTEM_FONTS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Draws detection boxes and labels. Without a font only the boxes are drawn.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font_path: Option<&Path>) -> Result<Self> {
        match font_path {
            Some(path) => Ok(Self {
                font: Some(load_font(path)?),
            }),
            None => Ok(Self::with_system_font()),
        }
    }

    pub fn with_system_font() -> Self {
        for path in SYSTEM_FONTS.iter() {
            if let Ok(font) = load_font(Path::new(path)) {
                info!("Loaded system font {}", path);
                return Self { font: Some(font) };
            }
        }
        debug!("No system font found, labels will not be drawn");
        Self::without_font()
    }

    pub fn without_font() -> Self {
        Self { font: None }
    }

    /// Thin box outline with thick accents on the four corners.
    pub fn corner_rect(&self, canvas: &mut RgbImage, x: i32, y: i32, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(width, height), BOX_COLOR);

        let (w, h) = (width as i32, height as i32);
        let len_x = CORNER_LENGTH.min(w) as u32;
        let len_y = CORNER_LENGTH.min(h) as u32;
        let t = CORNER_THICKNESS as u32;
        let (right, bottom) = (x + w - len_x as i32, y + h - len_y as i32);
        let horizontal = [(x, y), (right, y), (x, y + h - t as i32), (right, y + h - t as i32)];
        for &(cx, cy) in horizontal.iter() {
            draw_filled_rect_mut(canvas, Rect::at(cx, cy).of_size(len_x, t), CORNER_COLOR);
        }
        let vertical = [(x, y), (x + w - t as i32, y), (x, bottom), (x + w - t as i32, bottom)];
        for &(cx, cy) in vertical.iter() {
            draw_filled_rect_mut(canvas, Rect::at(cx, cy).of_size(t, len_y), CORNER_COLOR);
        }
    }

    /// Filled label box whose lower left corner sits at
    /// `(max(0, x), max(35, y))`.
    pub fn put_text_rect(&self, canvas: &mut RgbImage, text: &str, x: i32, y: i32) {
        let font = match &self.font {
            Some(font) => font,
            None => return,
        };
        let scale = PxScale::from(FONT_SCALE);
        let (text_w, text_h) = text_size(scale, font, text);
        let (x, y) = (x.max(0), y.max(LABEL_MIN_Y));
        let top = y - text_h as i32 - 2 * LABEL_PADDING;
        let padding = 2 * LABEL_PADDING as u32;
        draw_filled_rect_mut(
            canvas,
            Rect::at(x, top).of_size(text_w + padding, text_h + padding),
            BOX_COLOR,
        );
        draw_text_mut(
            canvas,
            TEXT_COLOR,
            x + LABEL_PADDING,
            top + LABEL_PADDING,
            scale,
            font,
            text,
        );
    }
}

fn load_font(path: &Path) -> Result<FontVec> {
    let data = std::fs::read(path)
        .with_context(|| format!("Could not read font {}", path.display()))?;
    FontVec::try_from_vec(data).map_err(|_| anyhow!("Failed to parse font file {}", path.display()))
}
