#![no_main]

use lazy_resize::{resize, resize_via_legacy_decoder, Options};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let opts = Options::new().width(64);
    let _ = resize(data, &opts);
    let _ = resize_via_legacy_decoder(data, &opts);
});
