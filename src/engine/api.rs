// src/engine/api.rs
//
// Engine structure and the public entry points.
// This is the main public API of the resize core.
//
// Every entry point runs inside a `CallScope`: the runtime must be up (or
// startable), the call's memory is reserved, and backend thread state is
// released when the call returns, whichever way it returns.

use crate::engine::backend::{BackendImage, DecodeRoute, ImageBackend, JpegSaveOptions};
use crate::engine::decoder;
use crate::engine::gravity::resolve_gravity;
use crate::engine::memory::estimate_call_bytes;
use crate::engine::native::NativeBackend;
use crate::engine::pipeline::{Pipeline, ResizeOutput};
use crate::engine::raster::Raster;
use crate::engine::runtime::CallScope;
use crate::error::{LazyResizeError, Result};
use crate::ops::{CropRect, Extend, Gravity, Options, DEFAULT_QUALITY};

/// The resize engine over a backend.
///
/// Usage:
/// ```no_run
/// use lazy_resize::{Engine, Options};
///
/// let engine = Engine::native();
/// let input = std::fs::read("photo.jpg")?;
/// let thumb = engine.resize(&input, &Options::new().width(250))?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Engine<B: ImageBackend = NativeBackend> {
    backend: B,
}

impl Engine<NativeBackend> {
    pub const fn native() -> Self {
        Self {
            backend: NativeBackend::new(),
        }
    }
}

impl<B: ImageBackend> Engine<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // =========================================================================
    // RESIZE
    // =========================================================================

    /// Resize a JPEG or PNG and encode the result as JPEG.
    pub fn resize(&self, bytes: &[u8], opts: &Options) -> Result<Vec<u8>> {
        self.resize_with_report(bytes, opts).map(|out| out.data)
    }

    /// Same as `resize`, also returning the plan and the stages that ran.
    pub fn resize_with_report(&self, bytes: &[u8], opts: &Options) -> Result<ResizeOutput> {
        let mut scope = CallScope::enter(&self.backend)?;
        Pipeline::new(&mut scope).run(bytes, opts)
    }

    /// Resize anything the generic loader reads. Always contain fit, always
    /// JPEG out, never decode-time shrink.
    pub fn resize_via_legacy_decoder(&self, bytes: &[u8], opts: &Options) -> Result<Vec<u8>> {
        let mut scope = CallScope::enter(&self.backend)?;
        Pipeline::new(&mut scope)
            .run_legacy(bytes, opts)
            .map(|out| out.data)
    }

    // =========================================================================
    // HANDLE OPERATIONS
    // =========================================================================

    /// Decode a JPEG or PNG at full size.
    pub fn load(&self, bytes: &[u8]) -> Result<B::Image> {
        let mut scope = CallScope::enter(&self.backend)?;
        let format = decoder::detect_format(bytes).ok_or_else(|| {
            LazyResizeError::unsupported_format(if bytes.len() < 2 {
                "empty or truncated input"
            } else {
                "unknown"
            })
        })?;
        let route = DecodeRoute::Sniffed(format);
        let (width, height) = self
            .backend
            .probe(bytes, route)
            .map_err(|e| LazyResizeError::decode_failed(e.to_string()))?;
        decoder::check_dimensions(width, height)?;
        scope.reserve(estimate_call_bytes(width, height, 1));
        self.backend
            .decode(bytes, route, 1)
            .map_err(|e| LazyResizeError::decode_failed(e.to_string()))
    }

    /// Cut an exact rectangle. The rectangle must lie fully inside the image.
    pub fn crop_fixed(
        &self,
        image: B::Image,
        top: u32,
        left: u32,
        width: u32,
        height: u32,
    ) -> Result<B::Image> {
        let rect = CropRect::new(top, left, width, height);
        let (img_width, img_height) = (image.width(), image.height());
        if rect.is_empty() || !rect.fits_within(img_width, img_height) {
            return Err(LazyResizeError::crop_out_of_bounds(
                top, left, width, height, img_width, img_height,
            ));
        }
        let mut scope = CallScope::enter(&self.backend)?;
        scope.reserve(estimate_call_bytes(width, height, 1));
        self.backend
            .extract_area(image, rect)
            .map_err(|e| LazyResizeError::transform_failed("crop", e.message))
    }

    /// Cut a `width` x `height` box anchored by `gravity`.
    pub fn crop_with_gravity(
        &self,
        image: B::Image,
        width: u32,
        height: u32,
        gravity: Gravity,
    ) -> Result<B::Image> {
        let (img_width, img_height) = (image.width(), image.height());
        let (left, top) = resolve_gravity(img_width, img_height, width, height, gravity);
        if left < 0 || top < 0 {
            return Err(LazyResizeError::crop_out_of_bounds(
                top.max(0) as u32,
                left.max(0) as u32,
                width,
                height,
                img_width,
                img_height,
            ));
        }
        self.crop_fixed(image, top as u32, left as u32, width, height)
    }

    /// Place the image at (`left`, `top`) on a `width` x `height` canvas.
    pub fn embed(
        &self,
        image: B::Image,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        extend: Extend,
    ) -> Result<B::Image> {
        if width == 0 || height == 0 {
            return Err(LazyResizeError::invalid_argument(
                "embed",
                format!("{width}x{height}"),
                "Canvas must be at least 1x1",
            ));
        }
        let mut scope = CallScope::enter(&self.backend)?;
        scope.reserve(estimate_call_bytes(width, height, 1));
        self.backend
            .embed(image, left, top, width, height, extend)
            .map_err(|e| LazyResizeError::transform_failed("embed", e.message))
    }

    /// Encode as baseline JPEG with metadata stripped. Quality 0 means the
    /// default (100); values above 100 are clamped.
    pub fn save_jpeg(&self, image: B::Image, quality: u8) -> Result<Vec<u8>> {
        let quality = match quality {
            0 => DEFAULT_QUALITY,
            q => q.min(100),
        };
        let _scope = CallScope::enter(&self.backend)?;
        self.backend
            .jpeg_save(image, &JpegSaveOptions::with_quality(quality))
            .map_err(|e| LazyResizeError::encode_failed("jpeg", e.message))
    }
}

static NATIVE: Engine = Engine::native();

/// Resize a JPEG or PNG on the native backend.
pub fn resize(bytes: &[u8], opts: &Options) -> Result<Vec<u8>> {
    NATIVE.resize(bytes, opts)
}

pub fn resize_with_report(bytes: &[u8], opts: &Options) -> Result<ResizeOutput> {
    NATIVE.resize_with_report(bytes, opts)
}

pub fn resize_via_legacy_decoder(bytes: &[u8], opts: &Options) -> Result<Vec<u8>> {
    NATIVE.resize_via_legacy_decoder(bytes, opts)
}

pub fn load(bytes: &[u8]) -> Result<Raster> {
    NATIVE.load(bytes)
}

pub fn crop_fixed(image: Raster, top: u32, left: u32, width: u32, height: u32) -> Result<Raster> {
    NATIVE.crop_fixed(image, top, left, width, height)
}
