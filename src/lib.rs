// lib.rs
//
// lazy-resize: the resize core of an image thumbnailing service
//
// Design goals:
// - Plan before decoding, so large JPEGs never exist at full size
// - Integral reductions first, kernel resampling only for the remainder
// - One fixed stage order, identical for every input route
// - Explicit runtime lifecycle and bounded memory

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{
    crop_fixed, load, resize, resize_via_legacy_decoder, resize_with_report, Engine,
    NativeBackend, Raster, ResizeOutput,
};
pub use engine::runtime::{init, is_initialized, shutdown, stats, BackendConfig};
pub use error::{ErrorCategory, LazyResizeError, Result};
pub use ops::{CropRect, Extend, Gravity, ImageType, Interpolator, Options, ResizeFit};

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Formats the primary entry point accepts
pub fn supported_input_formats() -> &'static [&'static str] {
    &["jpeg", "png"]
}

/// Formats the legacy entry point accepts, on top of JPEG and PNG
pub fn legacy_input_formats() -> &'static [&'static str] {
    &["jpeg", "png", "webp", "gif", "bmp", "tiff"]
}
