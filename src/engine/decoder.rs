// src/engine/decoder.rs
//
// Decoder operations: format sniffing, header probing, JPEG (mozjpeg, with DCT
// scaling for decode-time shrink), PNG (zune-png) and the generic legacy loader.

use crate::engine::backend::{BackendError, BackendResult, DecodeRoute, Interpretation};
use crate::engine::common::run_with_panic_policy;
use crate::engine::raster::Raster;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::LazyResizeError;
use crate::ops::ImageType;
use image::{ImageFormat, ImageReader};
use mozjpeg::{ColorSpace as JpegColorSpace, Decompress};
use std::io::Cursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

const MARKER_JPEG: [u8; 2] = [0xFF, 0xD8];
const MARKER_PNG: [u8; 2] = [0x89, 0x50];

/// Sniff the two leading magic bytes. Shorter input is never recognised.
pub fn detect_format(bytes: &[u8]) -> Option<ImageType> {
    match bytes.get(..2)? {
        m if m == MARKER_JPEG => Some(ImageType::Jpeg),
        m if m == MARKER_PNG => Some(ImageType::Png),
        _ => None,
    }
}

/// Format the generic loader would pick for `bytes`, if any.
pub fn detect_legacy_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> Result<(), LazyResizeError> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(LazyResizeError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(LazyResizeError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Read dimensions from the header without decoding pixels.
pub fn probe_dimensions(bytes: &[u8], route: DecodeRoute) -> BackendResult<(u32, u32)> {
    run_with_panic_policy("probe", || {
        let reader = match route {
            DecodeRoute::Sniffed(ImageType::Jpeg) => {
                ImageReader::with_format(Cursor::new(bytes), ImageFormat::Jpeg)
            }
            DecodeRoute::Sniffed(ImageType::Png) => {
                ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png)
            }
            DecodeRoute::Legacy => ImageReader::new(Cursor::new(bytes))
                .with_guessed_format()
                .map_err(|e| BackendError::new("probe", format!("failed to read header: {e}")))?,
        };
        if reader.format().is_none() {
            return Err(BackendError::new("probe", "unknown image format"));
        }
        reader
            .into_dimensions()
            .map_err(|e| BackendError::new("probe", format!("failed to read dimensions: {e}")))
    })
}

/// Decode through the route's loader. `shrink` only affects JPEG.
pub fn decode(bytes: &[u8], route: DecodeRoute, shrink: u32) -> BackendResult<Raster> {
    match route {
        DecodeRoute::Sniffed(ImageType::Jpeg) => decode_jpeg_mozjpeg(bytes, shrink),
        DecodeRoute::Sniffed(ImageType::Png) => decode_png_zune(bytes),
        DecodeRoute::Legacy => decode_with_image_crate(bytes),
    }
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo).
///
/// `shrink` of 2, 4 or 8 uses DCT scaling, so the full-size image never
/// exists. The scaled size is `ceil(size / shrink)` on each axis.
/// CMYK/YCCK sources stay CMYK; the colour stage converts them later.
pub fn decode_jpeg_mozjpeg(data: &[u8], shrink: u32) -> BackendResult<Raster> {
    run_with_panic_policy("jpegload", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(BackendError::new("jpegload", "missing JPEG EOI marker"));
        }

        let mut decompress = Decompress::new_mem(data).map_err(|e| {
            BackendError::new("jpegload", format!("decompress init failed: {e:?}"))
        })?;

        let numerator = match shrink {
            8 => 1,
            4 => 2,
            2 => 4,
            _ => 8,
        };
        if numerator != 8 {
            decompress.scale(numerator);
        }

        match decompress.color_space() {
            JpegColorSpace::JCS_CMYK | JpegColorSpace::JCS_YCCK => {
                let mut started = decompress
                    .to_colorspace(JpegColorSpace::JCS_CMYK)
                    .map_err(|e| BackendError::new("jpegload", format!("cmyk start failed: {e:?}")))?;
                let (w, h) = (started.width() as u32, started.height() as u32);
                let pixels: Vec<[u8; 4]> = started.read_scanlines().map_err(|e| {
                    BackendError::new("jpegload", format!("failed to read scanlines: {e:?}"))
                })?;
                Raster::from_raw(w, h, 4, Interpretation::Cmyk, pixels.concat())
            }
            JpegColorSpace::JCS_GRAYSCALE => {
                let mut started = decompress.grayscale().map_err(|e| {
                    BackendError::new("jpegload", format!("grayscale start failed: {e:?}"))
                })?;
                let (w, h) = (started.width() as u32, started.height() as u32);
                let pixels: Vec<u8> = started.read_scanlines().map_err(|e| {
                    BackendError::new("jpegload", format!("failed to read scanlines: {e:?}"))
                })?;
                Raster::from_raw(w, h, 1, Interpretation::Bw, pixels)
            }
            _ => {
                let mut started = decompress.rgb().map_err(|e| {
                    BackendError::new("jpegload", format!("rgb conversion failed: {e:?}"))
                })?;
                let (w, h) = (started.width() as u32, started.height() as u32);
                let pixels: Vec<[u8; 3]> = started.read_scanlines().map_err(|e| {
                    BackendError::new("jpegload", format!("failed to read scanlines: {e:?}"))
                })?;
                Raster::from_raw(w, h, 3, Interpretation::Srgb, pixels.concat())
            }
        }
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> BackendResult<Raster> {
    run_with_panic_policy("pngload", || {
        // zune caps each side at 16384 by default; our own limits are checked
        // at probe time
        let options = DecoderOptions::default()
            .png_set_strip_to_8bit(true)
            .set_max_width(MAX_DIMENSION as usize)
            .set_max_height(MAX_DIMENSION as usize);
        let mut decoder = PngDecoder::new_with_options(zune_core::bytestream::ZCursor::new(data), options);
        let pixels = decoder
            .decode()
            .map_err(|e| BackendError::new("pngload", format!("decode failed: {e}")))?;

        let info = decoder
            .info()
            .ok_or_else(|| BackendError::new("pngload", "missing header info"))?;
        let (width, height) = (info.width as u32, info.height as u32);

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(BackendError::new(
                    "pngload",
                    "unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| BackendError::new("pngload", "missing colorspace"))?;

        match colorspace {
            ColorSpace::RGB => Raster::from_raw(width, height, 3, Interpretation::Srgb, buf),
            ColorSpace::RGBA => Raster::from_raw(width, height, 4, Interpretation::Srgb, buf),
            ColorSpace::Luma => Raster::from_raw(width, height, 1, Interpretation::Bw, buf),
            ColorSpace::LumaA => Raster::from_raw(width, height, 2, Interpretation::Bw, buf),
            other => Err(BackendError::new(
                "pngload",
                format!("unsupported colorspace {other:?}"),
            )),
        }
    })
}

/// Generic loader for the legacy route: anything the `image` crate can read.
pub fn decode_with_image_crate(data: &[u8]) -> BackendResult<Raster> {
    run_with_panic_policy("load", || {
        let img = image::load_from_memory(data)
            .map_err(|e| BackendError::new("load", format!("decode failed: {e}")))?;
        Raster::from_dynamic(img)
    })
}
