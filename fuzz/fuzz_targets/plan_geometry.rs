#![no_main]

use arbitrary::Arbitrary;
use lazy_resize::engine::{plan, validate_crop};
use lazy_resize::{CropRect, Options, ResizeFit};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    in_width: u32,
    in_height: u32,
    width: u32,
    height: u32,
    cover: bool,
    enlarge: bool,
    crop: (u32, u32, u32, u32),
}

fuzz_target!(|input: Input| {
    let opts = Options::new()
        .width(input.width)
        .height(input.height)
        .fit(if input.cover { ResizeFit::Cover } else { ResizeFit::Contain })
        .enlarge(input.enlarge);

    let p = plan(input.in_width, input.in_height, &opts).with_decode_shrink();
    assert!(p.shrink >= 1);
    assert!(p.residual >= 0.0);
    assert!(matches!(p.decode_shrink, 1 | 2 | 4 | 8));

    let (top, left, width, height) = input.crop;
    let rect = Some(CropRect::new(top, left, width, height));
    let once = validate_crop(input.in_width, input.in_height, rect);
    assert_eq!(once, validate_crop(input.in_width, input.in_height, once));
});
