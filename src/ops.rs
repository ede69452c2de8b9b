// src/ops.rs
//
// Per-call resize request types.
// These are plain values - cheap to build, copied freely, never mutated by the engine.

use crate::error::LazyResizeError;
use std::fmt;
use std::str::FromStr;

/// Explicit pre-resize crop rectangle, in source pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CropRect {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(top: u32, left: u32, width: u32, height: u32) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Strict containment check: the whole rectangle lies inside the image.
    /// Unlike validation this never clamps.
    pub fn fits_within(&self, img_width: u32, img_height: u32) -> bool {
        let right = self.left as u64 + self.width as u64;
        let bottom = self.top as u64 + self.height as u64;
        right <= img_width as u64 && bottom <= img_height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Resampling kernel for the residual (fractional) scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interpolator {
    /// Default quality
    #[default]
    Bicubic,
    /// Fast
    Bilinear,
    /// Edge-preserving, fewest halos
    Nohalo,
}

impl Interpolator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bicubic => "bicubic",
            Self::Bilinear => "bilinear",
            Self::Nohalo => "nohalo",
        }
    }
}

impl fmt::Display for Interpolator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpolator {
    type Err = LazyResizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "bicubic" => Ok(Self::Bicubic),
            "bilinear" => Ok(Self::Bilinear),
            "nohalo" => Ok(Self::Nohalo),
            other => Err(LazyResizeError::invalid_argument(
                "interpolator",
                other.to_string(),
                "Expected bicubic, bilinear, or nohalo",
            )),
        }
    }
}

/// How a fixed width x height box is honoured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResizeFit {
    /// Fit inside the box (largest axis factor). Output may be smaller than the box on one axis.
    #[default]
    Contain,
    /// Cover the box (smallest axis factor). Output may overflow the box on one axis;
    /// with `embed` set the overflow is trimmed by `Options::gravity`, otherwise it
    /// is left to the caller (see `crop_with_gravity`).
    Cover,
}

impl FromStr for ResizeFit {
    type Err = LazyResizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "contain" | "inside" => Ok(Self::Contain),
            "cover" | "crop" => Ok(Self::Cover),
            other => Err(LazyResizeError::invalid_argument(
                "fit",
                other.to_string(),
                "Expected contain or cover",
            )),
        }
    }
}

/// Edge-fill policy for embed/pad operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Extend {
    #[default]
    Black,
    White,
}

impl Extend {
    /// Fill value applied to every colour band.
    pub fn fill_value(&self) -> u8 {
        match self {
            Self::Black => 0,
            Self::White => 255,
        }
    }
}

impl FromStr for Extend {
    type Err = LazyResizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "black" => Ok(Self::Black),
            "white" => Ok(Self::White),
            other => Err(LazyResizeError::invalid_argument(
                "extend",
                other.to_string(),
                "Expected black or white",
            )),
        }
    }
}

bitflags::bitflags! {
    /// Crop anchor. Directional flags may be combined; contradictory pairs
    /// resolve by `engine::GRAVITY_EVALUATION_ORDER` (last wins).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Gravity: u8 {
        const CENTRE = 1;
        const NORTH = 1 << 1;
        const EAST = 1 << 2;
        const SOUTH = 1 << 3;
        const WEST = 1 << 4;
    }
}

impl Default for Gravity {
    fn default() -> Self {
        Gravity::CENTRE
    }
}

/// Source formats the primary entry point accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageType {
    Jpeg,
    Png,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    /// Only JPEG can discard resolution during decode.
    pub fn supports_decode_shrink(&self) -> bool {
        matches!(self, Self::Jpeg)
    }
}

/// Default JPEG quality when the request leaves it at 0.
pub const DEFAULT_QUALITY: u8 = 100;

/// Immutable per-call resize request.
///
/// ```
/// use lazy_resize::ops::{Interpolator, Options};
///
/// let opts = Options::new()
///     .width(800)
///     .interpolator(Interpolator::Bilinear)
///     .quality(85);
/// assert_eq!(opts.width, 800);
/// assert_eq!(opts.height, 0);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options {
    /// Target width; 0 derives it from the aspect ratio.
    pub width: u32,
    /// Target height; 0 derives it from the aspect ratio.
    pub height: u32,
    pub fit: ResizeFit,
    /// Allow upscaling past the source size.
    pub enlarge: bool,
    pub crop: Option<CropRect>,
    /// Pad a letterboxed result to exactly width x height.
    pub embed: bool,
    pub extend: Extend,
    pub interpolator: Interpolator,
    /// Gaussian sigma; 0 disables.
    pub blur: f32,
    /// JPEG quality 1-100; 0 means `DEFAULT_QUALITY`.
    pub quality: u8,
    /// Which side survives when an embedded cover resize trims its overflow.
    pub gravity: Gravity,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    pub fn fit(mut self, fit: ResizeFit) -> Self {
        self.fit = fit;
        self
    }

    pub fn enlarge(mut self, enlarge: bool) -> Self {
        self.enlarge = enlarge;
        self
    }

    pub fn crop(mut self, rect: CropRect) -> Self {
        self.crop = Some(rect);
        self
    }

    pub fn embed(mut self, extend: Extend) -> Self {
        self.embed = true;
        self.extend = extend;
        self
    }

    pub fn interpolator(mut self, interpolator: Interpolator) -> Self {
        self.interpolator = interpolator;
        self
    }

    pub fn blur(mut self, sigma: f32) -> Self {
        self.blur = sigma;
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    /// Quality actually handed to the encoder.
    pub fn effective_quality(&self) -> u8 {
        match self.quality {
            0 => DEFAULT_QUALITY,
            q => q.min(100),
        }
    }

    /// Blur sigma when blurring is requested. NaN and negatives count as disabled.
    pub fn blur_sigma(&self) -> Option<f32> {
        (self.blur > 0.0).then_some(self.blur)
    }
}
