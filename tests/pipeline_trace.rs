// tests/pipeline_trace.rs
//
// Executor tests against a recording backend.
// The mock does no pixel work; it tracks shapes and the order primitives run in,
// and can be told to fail at any one of them.

use lazy_resize::engine::{
    BackendError, BackendImage, BackendResult, DecodeRoute, ImageBackend, Interpretation,
    JpegSaveOptions, Stage,
};
use lazy_resize::{
    CropRect, Engine, Extend, Gravity, Interpolator, LazyResizeError, Options, ResizeFit,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];
const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47];

#[derive(Debug, Clone, Copy, PartialEq)]
struct MockImage {
    width: u32,
    height: u32,
    bands: u32,
    interpretation: Interpretation,
}

impl BackendImage for MockImage {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn bands(&self) -> u32 {
        self.bands
    }
    fn interpretation(&self) -> Interpretation {
        self.interpretation
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RecordedOp {
    Probe,
    Decode { shrink: u32 },
    Extract(CropRect),
    Shrink(u32, u32),
    Affine { scale: f64, interpolator: Interpolator },
    Embed { left: u32, top: u32, width: u32, height: u32 },
    Colourspace(MockImage),
    Flatten(MockImage),
    Blur(f32),
    Save { quality: u8 },
}

/// Mock backend that records operations without executing them.
struct MockBackend {
    source: MockImage,
    fail_on: Option<&'static str>,
    operations: Mutex<Vec<RecordedOp>>,
    releases: AtomicUsize,
}

impl MockBackend {
    fn new(width: u32, height: u32, bands: u32, interpretation: Interpretation) -> Self {
        Self {
            source: MockImage {
                width,
                height,
                bands,
                interpretation,
            },
            fail_on: None,
            operations: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
        }
    }

    fn failing_at(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    fn get_operations(&self) -> Vec<RecordedOp> {
        self.operations.lock().clone()
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn step(&self, op: &'static str, record: RecordedOp) -> BackendResult<()> {
        self.operations.lock().push(record);
        if self.fail_on == Some(op) {
            return Err(BackendError::new(op, "injected failure"));
        }
        Ok(())
    }
}

fn scaled(size: u32, scale: f64) -> u32 {
    ((size as f64 * scale).round() as u32).max(1)
}

impl ImageBackend for MockBackend {
    type Image = MockImage;

    fn probe(&self, _bytes: &[u8], _route: DecodeRoute) -> BackendResult<(u32, u32)> {
        self.step("probe", RecordedOp::Probe)?;
        Ok((self.source.width, self.source.height))
    }

    fn decode(&self, _bytes: &[u8], _route: DecodeRoute, shrink: u32) -> BackendResult<MockImage> {
        self.step("decode", RecordedOp::Decode { shrink })?;
        Ok(MockImage {
            width: self.source.width.div_ceil(shrink),
            height: self.source.height.div_ceil(shrink),
            ..self.source
        })
    }

    fn extract_area(&self, image: MockImage, rect: CropRect) -> BackendResult<MockImage> {
        self.step("extract_area", RecordedOp::Extract(rect))?;
        Ok(MockImage {
            width: rect.width,
            height: rect.height,
            ..image
        })
    }

    fn shrink(&self, image: MockImage, xshrink: u32, yshrink: u32) -> BackendResult<MockImage> {
        self.step("shrink", RecordedOp::Shrink(xshrink, yshrink))?;
        Ok(MockImage {
            width: scaled(image.width, 1.0 / xshrink as f64),
            height: scaled(image.height, 1.0 / yshrink as f64),
            ..image
        })
    }

    fn affine(
        &self,
        image: MockImage,
        scale: f64,
        interpolator: Interpolator,
    ) -> BackendResult<MockImage> {
        self.step("affine", RecordedOp::Affine { scale, interpolator })?;
        Ok(MockImage {
            width: scaled(image.width, scale),
            height: scaled(image.height, scale),
            ..image
        })
    }

    fn embed(
        &self,
        image: MockImage,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        _extend: Extend,
    ) -> BackendResult<MockImage> {
        self.step(
            "embed",
            RecordedOp::Embed {
                left,
                top,
                width,
                height,
            },
        )?;
        Ok(MockImage {
            width,
            height,
            ..image
        })
    }

    fn colourspace(&self, image: MockImage, target: Interpretation) -> BackendResult<MockImage> {
        self.step("colourspace", RecordedOp::Colourspace(image))?;
        let bands = match (image.interpretation, image.bands) {
            (Interpretation::Cmyk, _) => 3,
            (Interpretation::Bw, 2) => 4,
            (Interpretation::Bw, _) => 3,
            (_, bands) => bands,
        };
        Ok(MockImage {
            bands,
            interpretation: target,
            ..image
        })
    }

    fn flatten(&self, image: MockImage, _background: [u8; 3]) -> BackendResult<MockImage> {
        self.step("flatten", RecordedOp::Flatten(image))?;
        Ok(MockImage { bands: 3, ..image })
    }

    fn gaussian_blur(&self, image: MockImage, sigma: f32) -> BackendResult<MockImage> {
        self.step("gaussian_blur", RecordedOp::Blur(sigma))?;
        Ok(image)
    }

    fn jpeg_save(&self, _image: MockImage, options: &JpegSaveOptions) -> BackendResult<Vec<u8>> {
        self.step(
            "jpeg_save",
            RecordedOp::Save {
                quality: options.quality,
            },
        )?;
        Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
    }

    fn release_thread_state(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn op_names(ops: &[RecordedOp]) -> Vec<&'static str> {
    ops.iter()
        .map(|op| match op {
            RecordedOp::Probe => "probe",
            RecordedOp::Decode { .. } => "decode",
            RecordedOp::Extract(_) => "extract_area",
            RecordedOp::Shrink(..) => "shrink",
            RecordedOp::Affine { .. } => "affine",
            RecordedOp::Embed { .. } => "embed",
            RecordedOp::Colourspace(_) => "colourspace",
            RecordedOp::Flatten(_) => "flatten",
            RecordedOp::Blur(_) => "gaussian_blur",
            RecordedOp::Save { .. } => "jpeg_save",
        })
        .collect()
}

mod stage_order_tests {
    use super::*;

    #[test]
    fn test_alpha_image_normalizes_before_flatten() {
        let engine = Engine::with_backend(MockBackend::new(64, 48, 4, Interpretation::Multiband));
        let report = engine.resize_with_report(PNG_BYTES, &Options::new()).unwrap();

        let ops = engine.backend().get_operations();
        assert_eq!(
            op_names(&ops),
            vec!["probe", "decode", "colourspace", "flatten", "jpeg_save"]
        );
        match &ops[3] {
            RecordedOp::Flatten(input) => {
                assert_eq!(input.interpretation, Interpretation::Srgb);
                assert_eq!(input.bands, 4);
            }
            other => panic!("expected flatten, got {other:?}"),
        }
        assert_eq!(report.stages.last().unwrap().bands, 3);
    }

    #[test]
    fn test_grey_alpha_flattens_after_expansion() {
        let engine = Engine::with_backend(MockBackend::new(10, 10, 2, Interpretation::Bw));
        engine.resize(PNG_BYTES, &Options::new()).unwrap();
        let names = op_names(&engine.backend().get_operations());
        assert_eq!(names[2..], ["colourspace", "flatten", "jpeg_save"]);
    }

    #[test]
    fn test_cmyk_is_converted_not_flattened() {
        let engine = Engine::with_backend(MockBackend::new(100, 100, 4, Interpretation::Cmyk));
        engine.resize(JPEG_BYTES, &Options::new()).unwrap();
        let names = op_names(&engine.backend().get_operations());
        assert!(names.contains(&"colourspace"));
        assert!(!names.contains(&"flatten"));
    }

    #[test]
    fn test_full_chain_order() {
        let engine = Engine::with_backend(MockBackend::new(1000, 700, 3, Interpretation::Srgb));
        let opts = Options::new()
            .width(300)
            .height(300)
            .embed(Extend::White)
            .blur(0.8)
            .quality(70);
        engine.resize(PNG_BYTES, &opts).unwrap();

        let ops = engine.backend().get_operations();
        assert_eq!(
            op_names(&ops),
            vec![
                "probe",
                "decode",
                "shrink",
                "affine",
                "embed",
                "colourspace",
                "gaussian_blur",
                "jpeg_save"
            ]
        );
        assert_eq!(ops.last(), Some(&RecordedOp::Save { quality: 70 }));
    }
}

mod geometry_tests {
    use super::*;

    #[test]
    fn test_jpeg_decode_shrink_replaces_box_shrink() {
        let engine = Engine::with_backend(MockBackend::new(1000, 1000, 3, Interpretation::Srgb));
        let report = engine
            .resize_with_report(JPEG_BYTES, &Options::new().width(250))
            .unwrap();

        let ops = engine.backend().get_operations();
        assert_eq!(ops[1], RecordedOp::Decode { shrink: 4 });
        assert!(!op_names(&ops).contains(&"shrink"));
        assert!(!op_names(&ops).contains(&"affine"));
        assert_eq!((report.width, report.height), (250, 250));
    }

    #[test]
    fn test_png_uses_box_shrink() {
        let engine = Engine::with_backend(MockBackend::new(1000, 1000, 3, Interpretation::Srgb));
        engine.resize(PNG_BYTES, &Options::new().width(250)).unwrap();

        let ops = engine.backend().get_operations();
        assert_eq!(ops[1], RecordedOp::Decode { shrink: 1 });
        assert_eq!(ops[2], RecordedOp::Shrink(4, 4));
    }

    #[test]
    fn test_residual_measured_after_decode_rounding() {
        // 1001 / 8 rounds up to 126 on decode, so the residual must correct it
        let engine = Engine::with_backend(MockBackend::new(1001, 1001, 3, Interpretation::Srgb));
        let report = engine
            .resize_with_report(JPEG_BYTES, &Options::new().width(125).height(125))
            .unwrap();

        let ops = engine.backend().get_operations();
        assert_eq!(ops[1], RecordedOp::Decode { shrink: 8 });
        match ops[2] {
            RecordedOp::Affine { scale, .. } => assert!((scale - 125.0 / 126.0).abs() < 1e-9),
            ref other => panic!("expected affine, got {other:?}"),
        }
        assert_eq!((report.width, report.height), (125, 125));
    }

    #[test]
    fn test_crop_decodes_full_size() {
        let engine = Engine::with_backend(MockBackend::new(1000, 1000, 3, Interpretation::Srgb));
        let opts = Options::new()
            .crop(CropRect::new(100, 200, 400, 200))
            .width(100);
        let report = engine.resize_with_report(JPEG_BYTES, &opts).unwrap();

        let ops = engine.backend().get_operations();
        assert_eq!(ops[1], RecordedOp::Decode { shrink: 1 });
        assert_eq!(ops[2], RecordedOp::Extract(CropRect::new(100, 200, 400, 200)));
        assert_eq!(ops[3], RecordedOp::Shrink(4, 4));
        assert_eq!((report.width, report.height), (100, 50));
    }

    fn cover_trim(gravity: Gravity) -> Option<CropRect> {
        let engine = Engine::with_backend(MockBackend::new(400, 200, 3, Interpretation::Srgb));
        let opts = Options::new()
            .width(100)
            .height(100)
            .fit(ResizeFit::Cover)
            .embed(Extend::Black)
            .gravity(gravity);
        let report = engine.resize_with_report(PNG_BYTES, &opts).unwrap();
        assert_eq!((report.width, report.height), (100, 100));
        engine.backend().get_operations().into_iter().find_map(|op| match op {
            RecordedOp::Extract(rect) => Some(rect),
            _ => None,
        })
    }

    #[test]
    fn test_cover_embed_trims_by_gravity() {
        // 400x200 shrinks by 2 to 200x100, then 100 columns are trimmed
        assert_eq!(cover_trim(Gravity::CENTRE), Some(CropRect::new(0, 50, 100, 100)));
        assert_eq!(cover_trim(Gravity::EAST), Some(CropRect::new(0, 100, 100, 100)));
        assert_eq!(cover_trim(Gravity::WEST), Some(CropRect::new(0, 0, 100, 100)));
        // vertical gravity has nothing to trim on this axis
        assert_eq!(cover_trim(Gravity::NORTH), Some(CropRect::new(0, 50, 100, 100)));
    }

    #[test]
    fn test_embed_centres_letterbox() {
        let engine = Engine::with_backend(MockBackend::new(400, 200, 3, Interpretation::Srgb));
        engine
            .resize(
                PNG_BYTES,
                &Options::new().width(100).height(100).embed(Extend::Black),
            )
            .unwrap();

        let ops = engine.backend().get_operations();
        assert!(ops.contains(&RecordedOp::Embed {
            left: 0,
            top: 25,
            width: 100,
            height: 100
        }));
    }
}

mod failure_tests {
    use super::*;

    fn failing(op: &'static str) -> Engine<MockBackend> {
        Engine::with_backend(MockBackend::new(1000, 700, 4, Interpretation::Srgb).failing_at(op))
    }

    fn opts() -> Options {
        Options::new().width(300).height(300).embed(Extend::White).blur(1.0)
    }

    #[test]
    fn test_decode_failures() {
        for op in ["probe", "decode"] {
            let engine = failing(op);
            let err = engine.resize(PNG_BYTES, &opts()).unwrap_err();
            assert!(matches!(err, LazyResizeError::DecodeFailed { .. }), "{op}: {err}");
            assert!(err.to_string().contains("injected failure"));
        }
    }

    #[test]
    fn test_transform_failures_name_their_stage() {
        let cases = [
            ("shrink", Stage::Shrink),
            ("affine", Stage::Affine),
            ("embed", Stage::Embed),
            ("colourspace", Stage::Colourspace),
            ("flatten", Stage::Flatten),
            ("gaussian_blur", Stage::Blur),
        ];
        for (op, stage) in cases {
            let engine = failing(op);
            let err = engine.resize(PNG_BYTES, &opts()).unwrap_err();
            match &err {
                LazyResizeError::TransformFailed { stage: name, message } => {
                    assert_eq!(name, stage.as_str());
                    assert!(message.contains("injected failure"));
                }
                other => panic!("{op}: unexpected error {other}"),
            }
            assert!(err.is_transform_failure());
        }
    }

    #[test]
    fn test_encode_failure() {
        let err = failing("jpeg_save").resize(PNG_BYTES, &opts()).unwrap_err();
        assert!(matches!(err, LazyResizeError::EncodeFailed { .. }));
        assert!(err.is_transform_failure());
    }

    #[test]
    fn test_failure_stops_the_chain() {
        let engine = failing("colourspace");
        engine.resize(PNG_BYTES, &opts()).unwrap_err();
        let names = op_names(&engine.backend().get_operations());
        assert_eq!(names.last(), Some(&"colourspace"));
        assert!(!names.contains(&"flatten"));
        assert!(!names.contains(&"jpeg_save"));
    }

    #[test]
    fn test_unsupported_input_never_reaches_backend() {
        let engine = Engine::with_backend(MockBackend::new(10, 10, 3, Interpretation::Srgb));
        let err = engine.resize(b"BM\x00\x00", &Options::new()).unwrap_err();
        assert!(matches!(err, LazyResizeError::UnsupportedFormat { .. }));
        assert!(engine.backend().get_operations().is_empty());
    }
}

mod release_tests {
    use super::*;

    #[test]
    fn test_release_once_per_successful_call() {
        let engine = Engine::with_backend(MockBackend::new(200, 200, 3, Interpretation::Srgb));
        engine.resize(JPEG_BYTES, &Options::new().width(50)).unwrap();
        assert_eq!(engine.backend().releases(), 1);
        engine.resize(JPEG_BYTES, &Options::new().width(60)).unwrap();
        assert_eq!(engine.backend().releases(), 2);
    }

    #[test]
    fn test_release_once_per_failing_call() {
        for op in ["decode", "affine", "flatten", "jpeg_save"] {
            let engine = Engine::with_backend(
                MockBackend::new(1000, 700, 4, Interpretation::Srgb).failing_at(op),
            );
            assert!(engine.resize(PNG_BYTES, &Options::new().width(300)).is_err());
            assert_eq!(engine.backend().releases(), 1, "{op}");
        }
    }

    #[test]
    fn test_release_on_rejected_input() {
        let engine = Engine::with_backend(MockBackend::new(10, 10, 3, Interpretation::Srgb));
        assert!(engine.resize(&[], &Options::new()).is_err());
        assert_eq!(engine.backend().releases(), 1);
    }

    #[test]
    fn test_handle_operations_release_too() {
        let engine = Engine::with_backend(MockBackend::new(100, 100, 3, Interpretation::Srgb));
        let img = engine.load(JPEG_BYTES).unwrap();
        let img = engine.crop_fixed(img, 0, 0, 50, 50).unwrap();
        engine.save_jpeg(img, 0).unwrap();
        assert_eq!(engine.backend().releases(), 3);
        assert!(engine
            .backend()
            .get_operations()
            .contains(&RecordedOp::Save { quality: 100 }));
    }
}
