// src/engine/backend.rs
//
// Seam between the pipeline executor and the pixel-level primitives.
//
// Every primitive consumes the handle it transforms and returns either a new
// handle or an explicit error. There is no ambient error state to scrape: the
// diagnostic travels in `BackendError`.

use crate::ops::{CropRect, Extend, ImageType, Interpolator};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Colour interpretation of a handle's bands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interpretation {
    /// 3 colour bands, optionally followed by alpha
    Srgb,
    /// 1 grey band, optionally followed by alpha
    Bw,
    /// 4 ink bands (stored inverted, as Adobe JPEGs carry them)
    Cmyk,
    /// Anything else
    Multiband,
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Srgb => "srgb",
            Self::Bw => "b-w",
            Self::Cmyk => "cmyk",
            Self::Multiband => "multiband",
        })
    }
}

/// Read-only view of a backend image.
pub trait BackendImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn bands(&self) -> u32;
    fn interpretation(&self) -> Interpretation;
}

/// Which decoder a pipeline run goes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodeRoute {
    /// Format-specific loader for a sniffed JPEG/PNG
    Sniffed(ImageType),
    /// Generic loader for any format it recognises
    Legacy,
}

/// JPEG save policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JpegSaveOptions {
    pub quality: u8,
    /// Drop every metadata marker
    pub strip: bool,
    /// Optimized Huffman tables
    pub optimize_coding: bool,
    /// Progressive scans
    pub interlace: bool,
}

impl JpegSaveOptions {
    /// Fixed output policy: stripped, optimized coding, baseline scans.
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality,
            strip: true,
            optimize_coding: true,
            interlace: false,
        }
    }
}

/// Background used when flattening alpha away.
pub const FLATTEN_BACKGROUND: [u8; 3] = [255, 255, 255];

/// Failure reported by a single primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{op}: {message}")]
pub struct BackendError {
    pub op: &'static str,
    pub message: Cow<'static, str>,
}

impl BackendError {
    pub fn new(op: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Pixel-level primitives the executor sequences.
///
/// Implementations must be shareable across caller threads; each call owns its
/// own chain of handles so no handle is ever seen by two calls.
pub trait ImageBackend: Sync {
    type Image: BackendImage + Send;

    /// Header-only dimensions, without decoding pixels.
    fn probe(&self, bytes: &[u8], route: DecodeRoute) -> BackendResult<(u32, u32)>;

    /// Decode, dividing both axes by `shrink` during decode when the format
    /// supports it (JPEG: 1, 2, 4, 8). Other formats ignore `shrink`.
    fn decode(&self, bytes: &[u8], route: DecodeRoute, shrink: u32) -> BackendResult<Self::Image>;

    /// Extract a rectangle. The rectangle is already inside the image.
    fn extract_area(&self, image: Self::Image, rect: CropRect) -> BackendResult<Self::Image>;

    /// Integral box shrink by whole factors per axis.
    fn shrink(&self, image: Self::Image, xshrink: u32, yshrink: u32) -> BackendResult<Self::Image>;

    /// Uniform scale through `interpolator`.
    fn affine(
        &self,
        image: Self::Image,
        scale: f64,
        interpolator: Interpolator,
    ) -> BackendResult<Self::Image>;

    /// Place the image at (`left`, `top`) in a `width` x `height` canvas.
    fn embed(
        &self,
        image: Self::Image,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        extend: Extend,
    ) -> BackendResult<Self::Image>;

    fn colourspace(
        &self,
        image: Self::Image,
        target: Interpretation,
    ) -> BackendResult<Self::Image>;

    /// Composite alpha/extra bands onto `background`, leaving 3 bands.
    fn flatten(&self, image: Self::Image, background: [u8; 3]) -> BackendResult<Self::Image>;

    fn gaussian_blur(&self, image: Self::Image, sigma: f32) -> BackendResult<Self::Image>;

    fn jpeg_save(&self, image: Self::Image, options: &JpegSaveOptions) -> BackendResult<Vec<u8>>;

    /// Drop per-thread scratch state. Called once at the end of every call,
    /// whether it succeeded or not.
    fn release_thread_state(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_save_policy() {
        let opts = JpegSaveOptions::with_quality(82);
        assert_eq!(opts.quality, 82);
        assert!(opts.strip);
        assert!(opts.optimize_coding);
        assert!(!opts.interlace);
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new("shrink", "zero factor");
        assert_eq!(err.to_string(), "shrink: zero factor");
    }

    #[test]
    fn test_interpretation_display() {
        assert_eq!(Interpretation::Srgb.to_string(), "srgb");
        assert_eq!(Interpretation::Cmyk.to_string(), "cmyk");
    }
}
