use ab_glyph::FontArc;
use anyhow::{anyhow, Result};
use image::{DynamicImage, Rgba};
use imageproc::drawing::{draw_text_mut, text_size};
use tiny_skia::{Paint, Pixmap, Rect, Transform};

use super::font::load_font;
use crate::canvas::raster::pixmap_to_image;
use crate::canvas::Raster;
use crate::recognition::{format_result, RecognitionResult};
use crate::settings::{CanvasSettings, RenderSettings};

// Rough advance width, as a fraction of the font size, when no font is loaded.
const FALLBACK_ADVANCE: f32 = 0.6;
const SEPARATOR_THICKNESS: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLabel {
    pub text: String,
    /// Top-left corner in logical pixels.
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

/// Composites recognition results onto a clean canvas.
pub struct ResultRenderer {
    settings: RenderSettings,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    font: Option<FontArc>,
}

impl ResultRenderer {
    pub fn new(settings: &RenderSettings, canvas: &CanvasSettings) -> Self {
        let font = load_font(settings.font_path.as_deref());
        Self::with_font(settings, canvas, font)
    }

    pub fn with_font(
        settings: &RenderSettings,
        canvas: &CanvasSettings,
        font: Option<FontArc>,
    ) -> Self {
        let pixel_ratio = if canvas.pixel_ratio.is_finite() && canvas.pixel_ratio > 0.0 {
            canvas.pixel_ratio
        } else {
            1.0
        };
        Self {
            settings: settings.clone(),
            width: canvas.width,
            height: canvas.height,
            pixel_ratio,
            font,
        }
    }

    /// Logical y of the band's top edge.
    pub fn band_top(&self) -> f32 {
        (self.height as f32 - self.settings.band_height).max(0.0)
    }

    pub fn layout_labels(&self, results: &[RecognitionResult]) -> Vec<PlacedLabel> {
        let size = self.settings.font_size;
        let y = self.band_top() + ((self.settings.band_height - size) / 2.0).max(0.0);
        let mut x = self.settings.padding;

        results
            .iter()
            .map(|result| {
                let text = format_result(result);
                let width = self.measure(&text);
                let label = PlacedLabel { text, x, y, width };
                x += width + self.settings.spacing;
                label
            })
            .collect()
    }

    /// Draws the results band over `clean` and returns the composite.
    ///
    /// `clean` itself is never modified. With no results the clean raster is
    /// returned as is.
    pub fn render(&self, clean: &Raster, results: &[RecognitionResult]) -> Result<Raster> {
        if results.is_empty() {
            return Ok(clean.clone());
        }

        let mut pixmap = match clean.decode()? {
            Some(pixmap) => pixmap,
            None => self.blank_pixmap()?,
        };
        self.draw_band(&mut pixmap)?;

        let mut image = match pixmap_to_image(&pixmap)? {
            DynamicImage::ImageRgba8(rgba) => rgba,
            other => other.to_rgba8(),
        };

        if let Some(font) = &self.font {
            let ratio = self.pixel_ratio;
            let color = Rgba(self.settings.text_color);
            for label in self.layout_labels(results) {
                if label.x >= self.width as f32 {
                    break;
                }
                draw_text_mut(
                    &mut image,
                    color,
                    (label.x * ratio).round() as i32,
                    (label.y * ratio).round() as i32,
                    self.settings.font_size * ratio,
                    font,
                    &label.text,
                );
            }
        }

        Raster::from_image(&DynamicImage::ImageRgba8(image))
    }

    fn blank_pixmap(&self) -> Result<Pixmap> {
        let width = ((self.width as f32) * self.pixel_ratio).ceil() as u32;
        let height = ((self.height as f32) * self.pixel_ratio).ceil() as u32;
        Pixmap::new(width, height).ok_or_else(|| anyhow!("cannot allocate {width}x{height} canvas"))
    }

    fn draw_band(&self, pixmap: &mut Pixmap) -> Result<()> {
        let width = pixmap.width() as f32;
        let height = pixmap.height() as f32;
        let band_height = (self.settings.band_height * self.pixel_ratio).min(height);
        if band_height <= 0.0 {
            return Ok(());
        }
        let top = height - band_height;

        let band = Rect::from_xywh(0.0, top, width, band_height)
            .ok_or_else(|| anyhow!("invalid results band rect"))?;
        pixmap.fill_rect(band, &solid_paint(self.settings.band_color), Transform::identity(), None);

        let thickness = (SEPARATOR_THICKNESS * self.pixel_ratio).min(band_height);
        let separator = Rect::from_xywh(0.0, top, width, thickness)
            .ok_or_else(|| anyhow!("invalid separator rect"))?;
        pixmap.fill_rect(
            separator,
            &solid_paint(self.settings.separator_color),
            Transform::identity(),
            None,
        );
        Ok(())
    }

    fn measure(&self, text: &str) -> f32 {
        let size = self.settings.font_size;
        match &self.font {
            Some(font) => text_size(size, font, text).0 as f32,
            None => text.chars().count() as f32 * size * FALLBACK_ADVANCE,
        }
    }
}

fn solid_paint(rgba: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]);
    paint.anti_alias = false;
    paint
}
