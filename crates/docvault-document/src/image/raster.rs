// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster image — the RGBA8 page buffer passed between pipeline stages.

use docvault_core::error::{Result, VaultError};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::{debug, instrument};

/// An in-memory page as interleaved RGBA8.
///
/// Pipeline stages consume a `RasterImage` and return a new one; nothing
/// mutates a buffer another stage still holds.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbaImage,
}

impl RasterImage {
    // -- Construction ---------------------------------------------------------

    /// Decode encoded bytes (JPEG, PNG, WebP).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn decode(data: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(data)
            .map_err(|err| VaultError::Codec(format!("failed to decode image: {err}")))?;
        debug!(width = decoded.width(), height = decoded.height(), "image decoded");
        Ok(Self::from_dynamic(decoded))
    }

    /// Load and decode an image file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let decoded = image::open(path.as_ref()).map_err(|err| {
            VaultError::Codec(format!("failed to open {}: {err}", path.as_ref().display()))
        })?;
        Ok(Self::from_dynamic(decoded))
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            pixels: image.into_rgba8(),
        }
    }

    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// A `width` x `height` image of a single colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Rgba(rgba)),
        }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// RGBA value at (`x`, `y`). Panics when out of bounds, like `image`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.pixels
    }

    // -- Output ---------------------------------------------------------------

    /// Encode as baseline JPEG. Alpha is dropped.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let rgb = DynamicImage::ImageRgba8(self.pixels.clone()).into_rgb8();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder)
            .map_err(|err| VaultError::Codec(format!("JPEG encoding failed: {err}")))?;
        Ok(buffer)
    }

    /// Encode as PNG, keeping alpha.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.pixels
            .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|err| VaultError::Codec(format!("PNG encoding failed: {err}")))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_roundtrip_preserves_pixels() {
        let mut image = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        image.put_pixel(1, 2, Rgba([200, 100, 50, 128]));
        let raster = RasterImage::from_rgba(image);

        let decoded = RasterImage::decode(&raster.encode_png().unwrap()).unwrap();
        assert_eq!(decoded, raster);
    }

    #[test]
    fn jpeg_keeps_dimensions() {
        let raster = RasterImage::filled(64, 48, [120, 130, 140, 255]);
        let jpeg = raster.encode_jpeg(85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(RasterImage::decode(&jpeg).unwrap().dimensions(), (64, 48));
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(
            RasterImage::decode(b"definitely not an image"),
            Err(VaultError::Codec(_))
        ));
    }
}
