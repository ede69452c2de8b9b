#![no_main]

use arbitrary::Arbitrary;
use lazy_resize::{resize, CropRect, Extend, Interpolator, Options, ResizeFit};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Request {
    width: u16,
    height: u16,
    cover: bool,
    enlarge: bool,
    crop: Option<(u16, u16, u16, u16)>,
    embed: Option<bool>,
    interpolator: u8,
    blur: u8,
    quality: u8,
}

// Small fixed PNG so every run reaches the transform stages.
fn source() -> Vec<u8> {
    use image::{DynamicImage, ImageFormat, RgbaImage};
    let img = RgbaImage::from_fn(48, 32, |x, y| image::Rgba([x as u8 * 5, y as u8 * 7, 90, 200]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .unwrap_or_default();
    out
}

fuzz_target!(|req: Request| {
    let mut opts = Options::new()
        .width(req.width as u32 % 512)
        .height(req.height as u32 % 512)
        .fit(if req.cover { ResizeFit::Cover } else { ResizeFit::Contain })
        .enlarge(req.enlarge)
        .interpolator(match req.interpolator % 3 {
            0 => Interpolator::Bicubic,
            1 => Interpolator::Bilinear,
            _ => Interpolator::Nohalo,
        })
        .blur(req.blur as f32 / 32.0)
        .quality(req.quality);
    if let Some((top, left, width, height)) = req.crop {
        opts = opts.crop(CropRect::new(top as u32, left as u32, width as u32, height as u32));
    }
    if let Some(white) = req.embed {
        opts = opts.embed(if white { Extend::White } else { Extend::Black });
    }

    if let Ok(jpeg) = resize(&source(), &opts) {
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
});
