use std::fmt;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use tiny_skia::{ColorU8, Pixmap};

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// PNG raster encoded as a `data:` URL, the form hosts persist and reload.
///
/// An empty string is a valid raster and means "blank canvas".
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Raster(String);

impl Raster {
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Wraps an already encoded raster. Bare base64 without a `data:` prefix
    /// is accepted as well.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn encode(pixmap: &Pixmap) -> Result<Self> {
        Self::from_image(&pixmap_to_image(pixmap)?)
    }

    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let png = encode_png(image)?;
        Ok(Self(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(png))))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Base64 body without the `data:` header, as shipped to the recognizer.
    pub fn base64_payload(&self) -> &str {
        match self.0.find(";base64,") {
            Some(idx) if self.0.starts_with("data:") => &self.0[idx + ";base64,".len()..],
            _ => &self.0,
        }
    }

    pub fn png_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.base64_payload().trim())
            .context("raster is not valid base64")
    }

    /// Decodes into a premultiplied pixmap. `None` for the blank raster.
    pub fn decode(&self) -> Result<Option<Pixmap>> {
        if self.is_empty() {
            return Ok(None);
        }
        let bytes = self.png_bytes()?;
        let image = image::load_from_memory(&bytes).context("cannot decode raster image")?;
        image_to_pixmap(&image).map(Some)
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full payloads are hundreds of KB; show just enough to tell them apart.
        let head: String = self.0.chars().take(48).collect();
        write!(f, "Raster({} chars, {head:?}..)", self.0.len())
    }
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("cannot encode PNG")?;
    Ok(buffer.into_inner())
}

pub fn pixmap_to_image(pixmap: &Pixmap) -> Result<DynamicImage> {
    let mut data = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    let rgba = RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
        .ok_or_else(|| anyhow!("cannot construct image from pixmap"))?;
    Ok(DynamicImage::ImageRgba8(rgba))
}

pub fn image_to_pixmap(image: &DynamicImage) -> Result<Pixmap> {
    let rgba = image.to_rgba8();
    let mut pixmap = Pixmap::new(rgba.width(), rgba.height())
        .ok_or_else(|| anyhow!("cannot allocate {}x{} pixmap", rgba.width(), rgba.height()))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(rgba.pixels()) {
        *dst = ColorU8::from_rgba(src[0], src[1], src[2], src[3]).premultiply();
    }
    Ok(pixmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_pixmap(width: u32, height: u32, rgba: [u8; 4]) -> Pixmap {
        let mut pixmap = Pixmap::new(width, height).expect("pixmap");
        pixmap.fill(tiny_skia::Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
        pixmap
    }

    #[test]
    fn encoded_raster_is_png_data_url() {
        let raster = Raster::encode(&solid_pixmap(8, 4, [255, 0, 0, 255])).expect("encode");
        assert!(raster.as_str().starts_with(DATA_URL_PREFIX));
        let bytes = raster.png_bytes().expect("base64");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn opaque_pixels_survive_decode() {
        let original = solid_pixmap(5, 7, [10, 200, 30, 255]);
        let raster = Raster::encode(&original).expect("encode");
        let decoded = raster.decode().expect("decode").expect("non-empty");
        assert_eq!(decoded.width(), 5);
        assert_eq!(decoded.height(), 7);
        assert_eq!(decoded.data(), original.data());
    }

    #[test]
    fn empty_raster_decodes_to_none() {
        assert!(Raster::empty().decode().expect("decode").is_none());
    }

    #[test]
    fn bare_base64_is_accepted() {
        let raster = Raster::encode(&solid_pixmap(2, 2, [0, 0, 0, 255])).expect("encode");
        let bare = Raster::from_encoded(raster.base64_payload().to_string());
        assert_eq!(bare.png_bytes().expect("bytes"), raster.png_bytes().expect("bytes"));
    }
}
