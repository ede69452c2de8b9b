// src/engine/transform.rs
//
// Pixel primitives of the native backend: extract, box shrink, kernel resample,
// embed, colour normalization, flatten and blur.
//
// Every function consumes its input raster and hands back a new one.

use crate::engine::backend::{BackendError, BackendImage, BackendResult, Interpretation};
use crate::engine::raster::Raster;
use crate::ops::{CropRect, Extend, Interpolator};
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeAlg, ResizeOptions};
use std::cell::RefCell;

thread_local! {
    // Resizer keeps its convolution buffers between calls on the same thread.
    static RESIZER: RefCell<Option<fir::Resizer>> = const { RefCell::new(None) };
}

/// Drop this thread's cached resizer buffers.
pub fn release_thread_buffers() {
    RESIZER.with(|cell| {
        cell.borrow_mut().take();
    });
}

/// Whether this thread currently holds resizer buffers.
#[cfg(test)]
pub fn thread_buffers_held() -> bool {
    RESIZER.with(|cell| cell.borrow().is_some())
}

/// Kernel used for the residual resample.
pub fn resize_alg_for(interpolator: Interpolator) -> ResizeAlg {
    match interpolator {
        Interpolator::Bilinear => ResizeAlg::Convolution(fir::FilterType::Bilinear),
        Interpolator::Bicubic => ResizeAlg::Convolution(fir::FilterType::CatmullRom),
        Interpolator::Nohalo => ResizeAlg::Convolution(fir::FilterType::Lanczos3),
    }
}

/// Copy out `rect`, which must lie inside the image.
pub fn extract_area(image: Raster, rect: CropRect) -> BackendResult<Raster> {
    if rect.is_empty() || !rect.fits_within(image.width(), image.height()) {
        return Err(BackendError::new(
            "extract_area",
            format!(
                "bad extract area {}x{}+{}+{} for {}x{} image",
                rect.width,
                rect.height,
                rect.left,
                rect.top,
                image.width(),
                image.height()
            ),
        ));
    }

    let bands = image.bands() as usize;
    let src_stride = image.width() as usize * bands;
    let row_len = rect.width as usize * bands;
    let x0 = rect.left as usize * bands;

    let mut pixels = Vec::with_capacity(row_len * rect.height as usize);
    for row in image
        .pixels()
        .chunks_exact(src_stride)
        .skip(rect.top as usize)
        .take(rect.height as usize)
    {
        pixels.extend_from_slice(&row[x0..x0 + row_len]);
    }

    Raster::from_raw(
        rect.width,
        rect.height,
        image.bands(),
        image.interpretation(),
        pixels,
    )
}

/// Box-average shrink by whole factors. Each axis is rounded to the nearest
/// pixel independently and never drops below 1.
pub fn shrink(image: Raster, xshrink: u32, yshrink: u32) -> BackendResult<Raster> {
    if xshrink == 0 || yshrink == 0 {
        return Err(BackendError::new("shrink", "shrink factors must be >= 1"));
    }
    if xshrink == 1 && yshrink == 1 {
        return Ok(image);
    }
    let dst_w = scaled_dimension(image.width(), 1.0 / xshrink as f64);
    let dst_h = scaled_dimension(image.height(), 1.0 / yshrink as f64);
    resample(
        image,
        dst_w,
        dst_h,
        ResizeAlg::Convolution(fir::FilterType::Box),
        "shrink",
    )
}

/// Uniform scale through the chosen kernel.
pub fn affine(image: Raster, scale: f64, interpolator: Interpolator) -> BackendResult<Raster> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(BackendError::new(
            "affine",
            format!("scale must be positive and finite, got {scale}"),
        ));
    }
    let dst_w = scaled_dimension(image.width(), scale);
    let dst_h = scaled_dimension(image.height(), scale);
    if dst_w == image.width() && dst_h == image.height() {
        return Ok(image);
    }
    resample(image, dst_w, dst_h, resize_alg_for(interpolator), "affine")
}

fn scaled_dimension(size: u32, scale: f64) -> u32 {
    let value = (size as f64 * scale).round();
    if value < 1.0 {
        1
    } else {
        value.min(u32::MAX as f64) as u32
    }
}

fn pixel_type_for(bands: u32) -> BackendResult<PixelType> {
    match bands {
        1 => Ok(PixelType::U8),
        2 => Ok(PixelType::U8x2),
        3 => Ok(PixelType::U8x3),
        4 => Ok(PixelType::U8x4),
        other => Err(BackendError::new(
            "resample",
            format!("unsupported band count {other}"),
        )),
    }
}

fn resample(
    image: Raster,
    dst_width: u32,
    dst_height: u32,
    alg: ResizeAlg,
    op: &'static str,
) -> BackendResult<Raster> {
    let pixel_type = pixel_type_for(image.bands())?;
    let premultiply = image.has_alpha();
    let (bands, interpretation) = (image.bands(), image.interpretation());
    let (src_w, src_h) = (image.width(), image.height());

    let mut src = fir::images::Image::from_vec_u8(src_w, src_h, image.into_pixels(), pixel_type)
        .map_err(|e| BackendError::new(op, format!("source image error: {e:?}")))?;
    let mut dst = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src)
            .map_err(|e| BackendError::new(op, format!("failed to premultiply alpha: {e}")))?;
    }

    let options = ResizeOptions::new().resize_alg(alg);
    RESIZER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let resizer = slot.get_or_insert_with(fir::Resizer::new);
        resizer
            .resize(&src, &mut dst, &options)
            .map_err(|e| BackendError::new(op, format!("resize error: {e:?}")))
    })?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst)
            .map_err(|e| BackendError::new(op, format!("failed to unpremultiply alpha: {e}")))?;
    }

    Raster::from_raw(dst_width, dst_height, bands, interpretation, dst.into_vec())
}

/// Place `image` at (`left`, `top`) on a `width` x `height` canvas filled per
/// `extend`. Parts falling outside the canvas are clipped.
pub fn embed(
    image: Raster,
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    extend: Extend,
) -> BackendResult<Raster> {
    if width == 0 || height == 0 {
        return Err(BackendError::new("embed", "canvas must not be empty"));
    }
    if left == 0 && top == 0 && width == image.width() && height == image.height() {
        return Ok(image);
    }

    let bands = image.bands() as usize;
    let canvas_len = width as usize * height as usize * bands;
    let mut pixels = vec![extend.fill_value(); canvas_len];

    let copy_w = image.width().min(width.saturating_sub(left)) as usize;
    let copy_h = image.height().min(height.saturating_sub(top)) as usize;
    if copy_w > 0 && copy_h > 0 {
        let src_stride = image.width() as usize * bands;
        let dst_stride = width as usize * bands;
        let row_len = copy_w * bands;
        for (y, row) in image.pixels().chunks_exact(src_stride).take(copy_h).enumerate() {
            let start = (top as usize + y) * dst_stride + left as usize * bands;
            pixels[start..start + row_len].copy_from_slice(&row[..row_len]);
        }
    }

    Raster::from_raw(width, height, image.bands(), image.interpretation(), pixels)
}

/// Convert into `target`. Only sRGB is a supported target.
pub fn colourspace(image: Raster, target: Interpretation) -> BackendResult<Raster> {
    if target != Interpretation::Srgb {
        return Err(BackendError::new(
            "colourspace",
            format!("unsupported target interpretation {target}"),
        ));
    }

    let (w, h) = (image.width(), image.height());
    match (image.interpretation(), image.bands()) {
        (Interpretation::Srgb, _) => Ok(image),
        (Interpretation::Bw, bands @ (1 | 2)) => {
            let out_bands = if bands == 2 { 4 } else { 3 };
            let mut pixels = Vec::with_capacity(w as usize * h as usize * out_bands as usize);
            for px in image.pixels().chunks_exact(bands as usize) {
                pixels.extend_from_slice(&[px[0], px[0], px[0]]);
                if bands == 2 {
                    pixels.push(px[1]);
                }
            }
            Raster::from_raw(w, h, out_bands, Interpretation::Srgb, pixels)
        }
        (Interpretation::Cmyk, 4) => {
            // inverted (Adobe) CMYK: 255 means no ink
            let mut pixels = Vec::with_capacity(w as usize * h as usize * 3);
            for px in image.pixels().chunks_exact(4) {
                let k = px[3] as u32;
                for &ink in &px[..3] {
                    pixels.push(((ink as u32 * k + 127) / 255) as u8);
                }
            }
            Raster::from_raw(w, h, 3, Interpretation::Srgb, pixels)
        }
        (Interpretation::Multiband, bands @ (3 | 4)) => Raster::from_raw(
            w,
            h,
            bands,
            Interpretation::Srgb,
            image.into_pixels(),
        ),
        (from, bands) => Err(BackendError::new(
            "colourspace",
            format!("cannot convert {bands}-band {from} image to srgb"),
        )),
    }
}

/// Composite the alpha band onto `background`. Images without alpha pass through.
pub fn flatten(image: Raster, background: [u8; 3]) -> BackendResult<Raster> {
    if !image.has_alpha() {
        return Ok(image);
    }

    let (w, h) = (image.width(), image.height());
    let bands = image.bands() as usize;
    let colour_bands = bands - 1;
    let mut pixels = Vec::with_capacity(w as usize * h as usize * colour_bands);
    for px in image.pixels().chunks_exact(bands) {
        let alpha = px[colour_bands] as u32;
        for (i, &c) in px[..colour_bands].iter().enumerate() {
            let bg = background[i.min(2)] as u32;
            pixels.push(((c as u32 * alpha + bg * (255 - alpha) + 127) / 255) as u8);
        }
    }
    Raster::from_raw(
        w,
        h,
        colour_bands as u32,
        image.interpretation(),
        pixels,
    )
}

pub fn gaussian_blur(image: Raster, sigma: f32) -> BackendResult<Raster> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(BackendError::new(
            "gaussian_blur",
            format!("sigma must be positive, got {sigma}"),
        ));
    }
    let blurred = image.to_dynamic()?.blur(sigma);
    image.with_dynamic(blurred)
}
