// src/engine/pipeline.rs
//
// Pipeline executor: sequences backend primitives for one resize call.
//
// Fixed stage order:
//   detect -> probe -> decode (with decode-time shrink unless cropping)
//   -> crop -> box shrink -> residual resample -> embed
//   -> sRGB -> flatten -> blur -> JPEG encode
//
// Each stage consumes the previous handle. The first failure ends the run; the
// handle in flight is dropped with it.

use crate::engine::backend::{
    BackendError, BackendImage, BackendResult, DecodeRoute, ImageBackend, Interpretation,
    JpegSaveOptions, FLATTEN_BACKGROUND,
};
use crate::engine::crop::validate_crop;
use crate::engine::decoder;
use crate::engine::gravity::resolve_gravity;
use crate::engine::memory::estimate_call_bytes;
use crate::engine::planner::{self, needs_resample, GeometryPlan};
use crate::engine::runtime::CallScope;
use crate::error::LazyResizeError;
use crate::ops::{CropRect, Extend, Gravity, Options, ResizeFit};
use std::borrow::Cow;
use std::fmt;

// Always LazyResizeError so the caller sees the stage taxonomy, never a raw
// backend error.
type PipelineResult<T> = std::result::Result<T, LazyResizeError>;

/// Stages the executor can run, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Crop,
    Shrink,
    Affine,
    Embed,
    Colourspace,
    Flatten,
    Blur,
    Encode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Crop => "crop",
            Self::Shrink => "shrink",
            Self::Affine => "affine",
            Self::Embed => "embed",
            Self::Colourspace => "colourspace",
            Self::Flatten => "flatten",
            Self::Blur => "blur",
            Self::Encode => "encode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the handle a stage received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: Stage,
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub interpretation: Interpretation,
}

impl StageRecord {
    fn of(stage: Stage, image: &impl BackendImage) -> Self {
        Self {
            stage,
            width: image.width(),
            height: image.height(),
            bands: image.bands(),
            interpretation: image.interpretation(),
        }
    }
}

/// Encoded result plus what the executor did to get there.
#[derive(Clone, Debug)]
pub struct ResizeOutput {
    /// Baseline JPEG bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub plan: GeometryPlan,
    /// Stages in the order they ran. Decode records its output, every other
    /// stage records its input.
    pub stages: Vec<StageRecord>,
}

impl ResizeOutput {
    pub fn ran(&self, stage: Stage) -> bool {
        self.stages.iter().any(|record| record.stage == stage)
    }
}

/// One run of the executor inside a call scope.
pub struct Pipeline<'s, 'b, B: ImageBackend + ?Sized> {
    scope: &'s mut CallScope<'b, B>,
    stages: Vec<StageRecord>,
}

impl<'s, 'b, B: ImageBackend + ?Sized> Pipeline<'s, 'b, B> {
    pub fn new(scope: &'s mut CallScope<'b, B>) -> Self {
        Self {
            scope,
            stages: Vec::with_capacity(9),
        }
    }

    /// Resize a sniffed JPEG or PNG.
    pub fn run(self, bytes: &[u8], opts: &Options) -> PipelineResult<ResizeOutput> {
        let format = decoder::detect_format(bytes).ok_or_else(|| unsupported(bytes))?;
        self.execute(bytes, opts, DecodeRoute::Sniffed(format))
    }

    /// Resize anything the generic loader recognises. Contain fit, no
    /// decode-time shrink.
    pub fn run_legacy(self, bytes: &[u8], opts: &Options) -> PipelineResult<ResizeOutput> {
        if decoder::detect_legacy_format(bytes).is_none() {
            return Err(unsupported(bytes));
        }
        let opts = Options {
            fit: ResizeFit::Contain,
            ..opts.clone()
        };
        self.execute(bytes, &opts, DecodeRoute::Legacy)
    }

    fn execute(
        mut self,
        bytes: &[u8],
        opts: &Options,
        route: DecodeRoute,
    ) -> PipelineResult<ResizeOutput> {
        let backend = self.scope.backend();

        let (in_width, in_height) = backend.probe(bytes, route).map_err(decode_error)?;
        decoder::check_dimensions(in_width, in_height)?;

        // a rectangle clamped down to nothing is no crop
        let crop = validate_crop(in_width, in_height, opts.crop).filter(|rect| !rect.is_empty());
        let (mut image, plan) = match crop {
            Some(rect) => {
                // Crop and decode-time shrink are exclusive: the crop box is in
                // full-size coordinates.
                self.scope.reserve(estimate_call_bytes(in_width, in_height, 1));
                let image = self.decode(bytes, route, 1)?;
                let image = self.stage(Stage::Crop, image, |img| backend.extract_area(img, rect))?;
                let plan = planner::plan(image.width(), image.height(), opts);
                (image, plan)
            }
            None => {
                let mut plan = planner::plan(in_width, in_height, opts);
                if matches!(route, DecodeRoute::Sniffed(format) if format.supports_decode_shrink()) {
                    plan = plan.with_decode_shrink();
                }
                self.scope
                    .reserve(estimate_call_bytes(in_width, in_height, plan.decode_shrink));
                let image = self.decode(bytes, route, plan.decode_shrink)?;
                (image, plan)
            }
        };

        tracing::debug!(
            target: "lazy_resize::pipeline",
            factor = plan.factor,
            shrink = plan.shrink,
            residual = plan.residual,
            decode_shrink = plan.decode_shrink,
            width = plan.width,
            height = plan.height,
            "plan"
        );

        if plan.shrink > 1 {
            image = self.stage(Stage::Shrink, image, |img| {
                backend.shrink(img, plan.shrink, plan.shrink)
            })?;
        }

        let residual = if plan.reduces() {
            plan.residual_after_reduction(image.width(), image.height())
        } else {
            plan.residual
        };
        if needs_resample(residual) {
            image = self.stage(Stage::Affine, image, |img| {
                backend.affine(img, residual, opts.interpolator)
            })?;
        }

        if opts.embed && opts.width > 0 && opts.height > 0 {
            image = self.fit_box(image, opts.width, opts.height, opts.extend, opts.gravity)?;
        }

        image = self.stage(Stage::Colourspace, image, |img| {
            backend.colourspace(img, Interpretation::Srgb)
        })?;

        if image.interpretation() != Interpretation::Cmyk && image.bands() > 3 {
            image = self.stage(Stage::Flatten, image, |img| {
                backend.flatten(img, FLATTEN_BACKGROUND)
            })?;
        }

        if let Some(sigma) = opts.blur_sigma() {
            image = self.stage(Stage::Blur, image, |img| backend.gaussian_blur(img, sigma))?;
        }

        let (width, height) = (image.width(), image.height());
        self.record(StageRecord::of(Stage::Encode, &image));
        let save = JpegSaveOptions::with_quality(opts.effective_quality());
        let data = backend
            .jpeg_save(image, &save)
            .map_err(|e| LazyResizeError::encode_failed("jpeg", e.message))?;

        Ok(ResizeOutput {
            data,
            width,
            height,
            plan,
            stages: self.stages,
        })
    }

    fn decode(&mut self, bytes: &[u8], route: DecodeRoute, shrink: u32) -> PipelineResult<B::Image> {
        let image = self
            .scope
            .backend()
            .decode(bytes, route, shrink)
            .map_err(decode_error)?;
        self.record(StageRecord::of(Stage::Decode, &image));
        Ok(image)
    }

    /// Pad to exactly `width` x `height`, centring the image. An axis that is
    /// already larger than the box (cover fit) is trimmed first, keeping the
    /// side `gravity` points at.
    fn fit_box(
        &mut self,
        mut image: B::Image,
        width: u32,
        height: u32,
        extend: Extend,
        gravity: Gravity,
    ) -> PipelineResult<B::Image> {
        let backend = self.scope.backend();
        if image.width() > width || image.height() > height {
            let (crop_w, crop_h) = (image.width().min(width), image.height().min(height));
            // box no larger than the image, so the origin is never negative
            let (left, top) = resolve_gravity(image.width(), image.height(), crop_w, crop_h, gravity);
            let rect = CropRect::new(top as u32, left as u32, crop_w, crop_h);
            image = self.stage(Stage::Crop, image, |img| backend.extract_area(img, rect))?;
        }
        if image.width() == width && image.height() == height {
            return Ok(image);
        }
        let left = (width - image.width()) / 2;
        let top = (height - image.height()) / 2;
        self.stage(Stage::Embed, image, |img| {
            backend.embed(img, left, top, width, height, extend)
        })
    }

    fn stage(
        &mut self,
        stage: Stage,
        image: B::Image,
        f: impl FnOnce(B::Image) -> BackendResult<B::Image>,
    ) -> PipelineResult<B::Image> {
        self.record(StageRecord::of(stage, &image));
        f(image).map_err(|e| LazyResizeError::transform_failed(stage.as_str(), e.message))
    }

    fn record(&mut self, record: StageRecord) {
        tracing::debug!(
            target: "lazy_resize::pipeline",
            stage = record.stage.as_str(),
            width = record.width,
            height = record.height,
            bands = record.bands,
            interpretation = %record.interpretation,
        );
        self.stages.push(record);
    }
}

fn decode_error(err: BackendError) -> LazyResizeError {
    LazyResizeError::decode_failed(err.to_string())
}

fn unsupported(bytes: &[u8]) -> LazyResizeError {
    let format: Cow<'static, str> = match bytes {
        [] => "empty input".into(),
        [_] => "truncated input".into(),
        [a, b, ..] => format!("unknown (magic {a:02X} {b:02X})").into(),
    };
    LazyResizeError::unsupported_format(format)
}
