// src/engine/native.rs
//
// The production backend: mozjpeg / zune-png / image decoders, fast_image_resize
// kernels and the mozjpeg encoder, run on the calling thread's worker lane.
//
// Decodes go through the runtime's operation cache, so repeated inputs with the
// same decode settings skip the decoder entirely.

use crate::engine::backend::{
    BackendResult, DecodeRoute, ImageBackend, Interpretation, JpegSaveOptions,
};
use crate::engine::cache::CacheKey;
use crate::engine::raster::Raster;
use crate::engine::runtime;
use crate::engine::{decoder, encoder, pool, transform};
use crate::ops::{CropRect, Extend, Interpolator};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub const fn new() -> Self {
        Self
    }
}

/// Run `f` on the caller's lane, or inline when no runtime is up.
fn install<T: Send>(f: impl FnOnce() -> T + Send) -> T {
    match runtime::snapshot() {
        Some(state) => state.install(f),
        None => f(),
    }
}

impl ImageBackend for NativeBackend {
    type Image = Raster;

    fn probe(&self, bytes: &[u8], route: DecodeRoute) -> BackendResult<(u32, u32)> {
        decoder::probe_dimensions(bytes, route)
    }

    fn decode(&self, bytes: &[u8], route: DecodeRoute, shrink: u32) -> BackendResult<Raster> {
        let state = runtime::snapshot();
        let key = CacheKey::new(bytes, route, shrink);
        if let Some(hit) = state.as_ref().and_then(|s| s.cache().get(&key)) {
            tracing::trace!(target: "lazy_resize::cache", "decode cache hit");
            return Ok(Raster::clone(&hit));
        }

        let decoded = install(|| decoder::decode(bytes, route, shrink))?;
        if let Some(state) = state {
            let bytes = decoded.byte_len();
            if state.cache().admits(bytes) {
                state.cache().insert(key, Arc::new(decoded.clone()), bytes);
            }
        }
        Ok(decoded)
    }

    fn extract_area(&self, image: Raster, rect: CropRect) -> BackendResult<Raster> {
        install(|| transform::extract_area(image, rect))
    }

    fn shrink(&self, image: Raster, xshrink: u32, yshrink: u32) -> BackendResult<Raster> {
        install(|| transform::shrink(image, xshrink, yshrink))
    }

    fn affine(&self, image: Raster, scale: f64, interpolator: Interpolator) -> BackendResult<Raster> {
        install(|| transform::affine(image, scale, interpolator))
    }

    fn embed(
        &self,
        image: Raster,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        extend: Extend,
    ) -> BackendResult<Raster> {
        install(|| transform::embed(image, left, top, width, height, extend))
    }

    fn colourspace(&self, image: Raster, target: Interpretation) -> BackendResult<Raster> {
        install(|| transform::colourspace(image, target))
    }

    fn flatten(&self, image: Raster, background: [u8; 3]) -> BackendResult<Raster> {
        install(|| transform::flatten(image, background))
    }

    fn gaussian_blur(&self, image: Raster, sigma: f32) -> BackendResult<Raster> {
        install(|| transform::gaussian_blur(image, sigma))
    }

    fn jpeg_save(&self, image: Raster, options: &JpegSaveOptions) -> BackendResult<Vec<u8>> {
        install(|| encoder::encode_jpeg(&image, options))
    }

    fn release_thread_state(&self) {
        transform::release_thread_buffers();
        let generation = runtime::snapshot().map(|state| state.generation());
        pool::broadcast_on_lane(generation, transform::release_thread_buffers);
    }
}
