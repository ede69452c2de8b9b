// src/engine/gravity.rs
//
// Crop origin for gravity-anchored crops.

use crate::ops::Gravity;

/// Directional rules in the order they are applied. A later rule overrides an
/// earlier one on the same axis, so NORTH|SOUTH anchors south and EAST|WEST
/// anchors west.
pub const GRAVITY_EVALUATION_ORDER: [Gravity; 4] =
    [Gravity::NORTH, Gravity::EAST, Gravity::SOUTH, Gravity::WEST];

/// Compute `(left, top)` for cutting an `out_width` x `out_height` box out of
/// an `in_width` x `in_height` image.
///
/// Without a directional flag the box is centred. The `+ 1` makes odd
/// remainders round the origin up, i.e. the extra pixel is trimmed from the
/// top/left side. That bias is intended.
///
/// No bounds checking: a box larger than the image yields negative offsets.
pub fn resolve_gravity(
    in_width: u32,
    in_height: u32,
    out_width: u32,
    out_height: u32,
    gravity: Gravity,
) -> (i64, i64) {
    let (in_w, in_h) = (in_width as i64, in_height as i64);
    let (out_w, out_h) = (out_width as i64, out_height as i64);

    let mut left = (in_w - out_w + 1) / 2;
    let mut top = (in_h - out_h + 1) / 2;

    for rule in GRAVITY_EVALUATION_ORDER {
        if !gravity.contains(rule) {
            continue;
        }
        if rule == Gravity::NORTH {
            top = 0;
        } else if rule == Gravity::EAST {
            left = in_w - out_w;
        } else if rule == Gravity::SOUTH {
            top = in_h - out_h;
        } else if rule == Gravity::WEST {
            left = 0;
        }
    }

    (left, top)
}
