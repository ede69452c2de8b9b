// src/engine/planner.rs
//
// Geometry planning: split a requested scale into decode-time shrink,
// integral box shrink and a fractional residual resample.
//
// Decode-time shrink discards data before pixels exist, integral shrink is
// artifact-free, and only the residual goes through a resampling kernel.
// The plan pushes as much reduction as possible into the first two.

use crate::ops::{Options, ResizeFit};

/// Decode-time shrink divisors JPEG DCT scaling can produce, largest first.
pub const DECODE_SHRINK_STEPS: [u32; 3] = [8, 4, 2];

/// Residuals closer than this to 1.0 are treated as identity and skipped.
pub const IDENTITY_EPSILON: f64 = 1e-9;

/// Outcome of planning a resize against concrete source dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryPlan {
    /// Overall downscale factor still to be applied after decode (>1 shrinks, <1 enlarges).
    pub factor: f64,
    /// Integral box-shrink factor, always >= 1.
    pub shrink: u32,
    /// Fractional scale for the resample stage. 0 means skip resampling.
    pub residual: f64,
    /// JPEG decode-time divisor: 1, 2, 4 or 8.
    pub decode_shrink: u32,
    /// Target width after every stage.
    pub width: u32,
    /// Target height after every stage.
    pub height: u32,
    pub fit: ResizeFit,
}

impl GeometryPlan {
    fn identity(width: u32, height: u32, fit: ResizeFit) -> Self {
        Self {
            factor: 1.0,
            shrink: 1,
            residual: 0.0,
            decode_shrink: 1,
            width,
            height,
            fit,
        }
    }

    /// Fold JPEG decode-time shrink into the plan.
    ///
    /// The largest divisor not exceeding `shrink` is taken out of the factor,
    /// then shrink and residual are recomputed against the reduced factor so
    /// the two downscales are never double-counted.
    pub fn with_decode_shrink(mut self) -> Self {
        let divisor = decode_shrink_for(self.shrink);
        if divisor > 1 {
            self.decode_shrink = divisor;
            self.factor = (self.factor / divisor as f64).max(1.0);
            self.shrink = integral_shrink(self.factor);
            self.residual = self.shrink as f64 / self.factor;
        }
        self
    }

    /// Residual measured from the dimensions the image actually has after
    /// decode-time and box shrink. Decoders and shrinkers round each axis on
    /// their own, so the predicted residual can be off by a pixel.
    pub fn residual_after_reduction(&self, actual_width: u32, actual_height: u32) -> f64 {
        if actual_width == 0 || actual_height == 0 {
            return self.residual;
        }
        let rx = self.width as f64 / actual_width as f64;
        let ry = self.height as f64 / actual_height as f64;
        match self.fit {
            ResizeFit::Contain => rx.min(ry),
            ResizeFit::Cover => rx.max(ry),
        }
    }

    /// True when any integral reduction (decode-time or box) is planned.
    pub fn reduces(&self) -> bool {
        self.shrink > 1 || self.decode_shrink > 1
    }
}

/// Whether a residual scale actually changes the image.
pub fn needs_resample(residual: f64) -> bool {
    residual != 0.0 && (residual - 1.0).abs() >= IDENTITY_EPSILON
}

/// Largest JPEG decode divisor not exceeding `shrink`, or 1.
pub fn decode_shrink_for(shrink: u32) -> u32 {
    DECODE_SHRINK_STEPS
        .iter()
        .copied()
        .find(|&step| shrink >= step)
        .unwrap_or(1)
}

fn integral_shrink(factor: f64) -> u32 {
    let floored = factor.floor();
    if floored >= 1.0 {
        floored.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

/// Plan a resize of an `in_width` x `in_height` image.
///
/// Never fails: zero-sized inputs and requests with no target at all come back
/// as the identity transform.
pub fn plan(in_width: u32, in_height: u32, opts: &Options) -> GeometryPlan {
    if in_width == 0 || in_height == 0 {
        return GeometryPlan::identity(in_width, in_height, opts.fit);
    }

    let in_w = in_width as f64;
    let in_h = in_height as f64;

    let (factor, out_width, out_height) = match (opts.width, opts.height) {
        (w, h) if w > 0 && h > 0 => {
            let xf = in_w / w as f64;
            let yf = in_h / h as f64;
            let factor = match opts.fit {
                ResizeFit::Contain => xf.max(yf),
                ResizeFit::Cover => xf.min(yf),
            };
            (factor, w, h)
        }
        (w, _) if w > 0 => {
            let factor = in_w / w as f64;
            (factor, w, derived_dimension(in_h, factor))
        }
        (_, h) if h > 0 => {
            let factor = in_h / h as f64;
            (factor, derived_dimension(in_w, factor), h)
        }
        _ => (1.0, in_width, in_height),
    };

    if !opts.enlarge && in_width < out_width && in_height < out_height {
        return GeometryPlan::identity(in_width, in_height, opts.fit);
    }

    let shrink = integral_shrink(factor);
    GeometryPlan {
        factor,
        shrink,
        residual: shrink as f64 / factor,
        decode_shrink: 1,
        width: out_width,
        height: out_height,
        fit: opts.fit,
    }
}

// Aspect-derived axis, floored; never 0 so the residual stays meaningful.
fn derived_dimension(source: f64, factor: f64) -> u32 {
    let value = (source / factor).floor();
    if value < 1.0 {
        1
    } else {
        value.min(u32::MAX as f64) as u32
    }
}
