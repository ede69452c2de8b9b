// src/engine/raster.rs
//
// In-memory image handle used by the native backend: interleaved 8-bit bands
// plus the colour interpretation those bands carry.

use crate::engine::backend::{BackendError, BackendImage, BackendResult, Interpretation};
use crate::engine::common::buffer_len;
use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

/// Owned pixel buffer. Dropping it releases the pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    bands: u32,
    interpretation: Interpretation,
    pixels: Vec<u8>,
}

impl Raster {
    /// Build a raster, checking the buffer really holds `width * height * bands` bytes.
    pub fn from_raw(
        width: u32,
        height: u32,
        bands: u32,
        interpretation: Interpretation,
        pixels: Vec<u8>,
    ) -> BackendResult<Self> {
        if !(1..=4).contains(&bands) {
            return Err(BackendError::new(
                "raster",
                format!("unsupported band count {bands}"),
            ));
        }
        let expected = buffer_len(width, height, bands);
        if pixels.len() as u64 != expected {
            return Err(BackendError::new(
                "raster",
                format!(
                    "buffer holds {} bytes, {width}x{height}x{bands} needs {expected}",
                    pixels.len()
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            bands,
            interpretation,
            pixels,
        })
    }

    /// Wrap a decoded `image` crate buffer, narrowing 16-bit and float data to 8-bit.
    pub fn from_dynamic(img: DynamicImage) -> BackendResult<Self> {
        let (width, height) = (img.width(), img.height());
        let (bands, interpretation, pixels) = match img {
            DynamicImage::ImageLuma8(buf) => (1, Interpretation::Bw, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => (2, Interpretation::Bw, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (3, Interpretation::Srgb, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (4, Interpretation::Srgb, buf.into_raw()),
            other @ DynamicImage::ImageLuma16(_) => {
                (1, Interpretation::Bw, other.to_luma8().into_raw())
            }
            other @ DynamicImage::ImageLumaA16(_) => {
                (2, Interpretation::Bw, other.to_luma_alpha8().into_raw())
            }
            other if other.color().has_alpha() => {
                (4, Interpretation::Srgb, other.to_rgba8().into_raw())
            }
            other => (3, Interpretation::Srgb, other.to_rgb8().into_raw()),
        };
        Self::from_raw(width, height, bands, interpretation, pixels)
    }

    /// View as an `image` crate buffer with the same band layout.
    /// CMYK travels as a 4-band RGBA container.
    pub fn to_dynamic(&self) -> BackendResult<DynamicImage> {
        let (w, h) = (self.width, self.height);
        let pixels = self.pixels.clone();
        let img = match self.bands {
            1 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
            2 => GrayAlphaImage::from_raw(w, h, pixels).map(DynamicImage::ImageLumaA8),
            3 => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
            _ => RgbaImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgba8),
        };
        img.ok_or_else(|| BackendError::new("raster", "buffer does not match dimensions"))
    }

    /// Rebuild from an `image` crate buffer, keeping this raster's interpretation.
    pub fn with_dynamic(&self, img: DynamicImage) -> BackendResult<Self> {
        let rebuilt = Self::from_dynamic(img)?;
        Ok(Self {
            interpretation: self.interpretation,
            ..rebuilt
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Whether the last band is alpha rather than colour.
    pub fn has_alpha(&self) -> bool {
        match self.interpretation {
            Interpretation::Srgb => self.bands == 4,
            Interpretation::Bw => self.bands == 2,
            Interpretation::Cmyk | Interpretation::Multiband => false,
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.pixels.len() as u64
    }
}

impl BackendImage for Raster {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn bands(&self) -> u32 {
        self.bands
    }

    fn interpretation(&self) -> Interpretation {
        self.interpretation
    }
}
