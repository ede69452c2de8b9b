// src/error.rs
//
// Unified error handling for lazy-resize
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input, recoverable
// - CodecError: Format/decode/encode issues
// - ResourceLimit: Dimension limits, runtime not available
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by callers to decide how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Dimension limits, runtime shut down
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

/// lazy-resize error types
///
/// Every failure carries the taxonomy kind in its variant and a human-readable
/// diagnostic in its message. No partial image is ever returned alongside one.
#[derive(Debug, Clone, Error)]
pub enum LazyResizeError {
    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Operation Errors
    #[error("Crop bounds (left {left}+{width}, top {top}+{height}) exceed image dimensions ({img_width}x{img_height})")]
    CropOutOfBounds {
        top: u32,
        left: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },

    #[error("{stage} failed: {message}")]
    TransformFailed {
        stage: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Configuration Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // State Errors
    #[error("Resize runtime is not initialized (shut down or never started)")]
    NotInitialized,

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl LazyResizeError {
    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn crop_out_of_bounds(
        top: u32,
        left: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::CropOutOfBounds {
            top,
            left,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn transform_failed(
        stage: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::TransformFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn not_initialized() -> Self {
        Self::NotInitialized
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CropOutOfBounds { .. } | Self::InvalidArgument { .. } => {
                ErrorCategory::UserError
            }

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::TransformFailed { .. }
            | Self::EncodeFailed { .. } => ErrorCategory::CodecError,

            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::NotInitialized => ErrorCategory::ResourceLimit,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }

    /// Whether a caller can reasonably retry with different input or state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::UserError | ErrorCategory::ResourceLimit
        )
    }

    /// Encode failures are reported separately but belong with the
    /// post-decode transform failures in the taxonomy.
    pub fn is_transform_failure(&self) -> bool {
        matches!(
            self,
            Self::TransformFailed { .. } | Self::EncodeFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LazyResizeError>;
