// src/engine/crop.rs
//
// Crop rectangle validation against real image bounds.

use crate::ops::CropRect;

/// Clamp a requested crop to the image, or drop it.
///
/// - no rectangle: no crop
/// - `top`/`left` beyond the image: no crop (the rectangle is discarded, not an error)
/// - otherwise width and height are clamped down so the rectangle fits
///
/// Validating an already valid rectangle returns it unchanged.
pub fn validate_crop(img_width: u32, img_height: u32, rect: Option<CropRect>) -> Option<CropRect> {
    let rect = rect?;

    if rect.top > img_height || rect.left > img_width {
        return None;
    }

    Some(CropRect {
        width: rect.width.min(img_width - rect.left),
        height: rect.height.min(img_height - rect.top),
        ..rect
    })
}
