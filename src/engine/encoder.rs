// src/engine/encoder.rs
//
// JPEG output via mozjpeg. Every output of the engine goes through here.

use crate::engine::backend::{BackendError, BackendImage, BackendResult, JpegSaveOptions};
use crate::engine::common::run_with_panic_policy;
use crate::engine::raster::Raster;
use mozjpeg::{ColorSpace, Compress};

/// Encode a raster as JPEG.
///
/// Accepts 3-band sRGB and 1-band grey input; anything else must be
/// normalized and flattened first. Metadata is never written: mozjpeg only
/// emits the markers we ask for, so `strip` costs nothing here.
pub fn encode_jpeg(image: &Raster, options: &JpegSaveOptions) -> BackendResult<Vec<u8>> {
    run_with_panic_policy("jpegsave", || {
        let (w, h) = (image.width(), image.height());
        if w == 0 || h == 0 {
            return Err(BackendError::new(
                "jpegsave",
                "invalid image dimensions: width or height is zero",
            ));
        }

        let (in_space, bands) = match image.bands() {
            1 => (ColorSpace::JCS_GRAYSCALE, 1usize),
            3 => (ColorSpace::JCS_RGB, 3usize),
            other => {
                return Err(BackendError::new(
                    "jpegsave",
                    format!("cannot save {other}-band image as JPEG"),
                ))
            }
        };

        let mut comp = Compress::new(in_space);
        // baseline profile; progressive scans only when asked for
        comp.set_fastest_defaults();
        comp.set_size(w as usize, h as usize);
        if bands == 3 {
            comp.set_color_space(ColorSpace::JCS_YCbCr);
        }
        comp.set_quality(options.quality.clamp(1, 100) as f32);
        comp.set_optimize_coding(options.optimize_coding);
        if options.interlace {
            comp.set_progressive_mode();
        }

        let estimated_size = (w as usize * h as usize * bands / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                BackendError::new("jpegsave", format!("failed to start compress: {e:?}"))
            })?;

            let stride = w as usize * bands;
            for row in image.pixels().chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    BackendError::new("jpegsave", format!("failed to write scanlines: {e:?}"))
                })?;
            }

            writer.finish().map_err(|e| {
                BackendError::new("jpegsave", format!("failed to finish: {e:?}"))
            })?;
        }

        Ok(output)
    })
}
