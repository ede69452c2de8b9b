// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Codec libraries report some failures by unwinding; this turns them into errors.

use crate::engine::backend::{BackendError, BackendResult};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a primitive and convert any panic into a `BackendError` tagged with `op`.
///
/// mozjpeg reports libjpeg fatal errors as panics; nothing a primitive
/// touches is shared, so unwinding out of one leaves no broken state behind.
pub fn run_with_panic_policy<T, F>(op: &'static str, f: F) -> BackendResult<T>
where
    F: FnOnce() -> BackendResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(BackendError::new(
            op,
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Bytes needed for a `width` x `height` x `bands` 8-bit buffer, saturating.
pub fn buffer_len(width: u32, height: u32, bands: u32) -> u64 {
    (width as u64)
        .saturating_mul(height as u64)
        .saturating_mul(bands as u64)
}
