// src/engine.rs
//
// The core of lazy-resize. A single-pass resize pipeline that:
// 1. Plans the geometry against header dimensions before decoding
// 2. Pushes as much reduction as possible into decode and box shrink
// 3. Runs every primitive through a swappable backend
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
/// This is the same limit used by libvips/sharp.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod api;
pub mod backend;
mod cache;
mod common;
mod crop;
mod decoder;
mod encoder;
mod gravity;
pub mod memory;
mod native;
pub mod pipeline;
mod planner;
mod pool;
mod raster;
pub mod runtime;
mod transform;

pub use api::{crop_fixed, load, resize, resize_via_legacy_decoder, resize_with_report, Engine};
pub use backend::{
    BackendError, BackendImage, BackendResult, DecodeRoute, ImageBackend, Interpretation,
    JpegSaveOptions, FLATTEN_BACKGROUND,
};
pub use cache::{CacheKey, CacheStats, OperationCache};
pub use common::run_with_panic_policy;
pub use crop::validate_crop;
pub use decoder::{check_dimensions, detect_format};
pub use gravity::{resolve_gravity, GRAVITY_EVALUATION_ORDER};
pub use memory::{estimate_call_bytes, MemoryPermit, WeightedSemaphore};
pub use native::NativeBackend;
pub use pipeline::{Pipeline, ResizeOutput, Stage, StageRecord};
pub use planner::{needs_resample, plan, GeometryPlan, DECODE_SHRINK_STEPS, IDENTITY_EPSILON};
pub use raster::Raster;
pub use runtime::{BackendConfig, CallScope, RuntimeStats};
