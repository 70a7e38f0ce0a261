use ndarray::{Array, Array2, ArrayBase, ArrayView2, Data, Dimension, Zip};

use crate::consts::{EPSILON, GAMMA_EXPONENT, SRGB_LINEAR_SLOPE, SRGB_LINEAR_THRESHOLD};

/// Largest value representable at `bit_depth`: `2^bit_depth - 1`.
#[inline]
pub fn max_value(bit_depth: u8) -> f64 {
    2f64.powi(bit_depth as i32) - 1.0
}

/// Re-normalise a channel to a target brightness (mean) and contrast (std):
/// `((x - mean) / std) * target_std + target_mean`, clipped to
/// `[0, 2^bit_depth - 1]`.
///
/// Pixels whose reference std is zero are treated as having a tiny std.
pub fn normalize_to_target(
    plane: ArrayView2<f32>,
    mean: ArrayView2<f64>,
    std: ArrayView2<f64>,
    target_mean: f64,
    target_std: f64,
    bit_depth: u8,
) -> Array2<f32> {
    let high = max_value(bit_depth);
    let mut out = Array2::<f32>::zeros(plane.dim());
    Zip::from(&mut out)
        .and(&plane)
        .and(&mean)
        .and(&std)
        .for_each(|o, &x, &m, &s| {
            let v = ((x as f64 - m) / s.max(EPSILON)) * target_std + target_mean;
            *o = v.clamp(0.0, high) as f32;
        });
    out
}

/// sRGB-style gamma on an image expressed at `bit_depth`.
///
/// The image is scaled to [0, 1]. If every value lies below the linear
/// threshold the whole image takes the linear segment, otherwise every value
/// takes `1.055 * x^(1/1.5) - 0.055`. The result is rescaled and clipped.
pub fn gamma_correct<S, D>(image: &ArrayBase<S, D>, bit_depth: u8) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let high = max_value(bit_depth) as f32;
    let all_linear = image.iter().all(|&v| v / high < SRGB_LINEAR_THRESHOLD);
    image.mapv(|v| {
        let x = v / high;
        let y = if all_linear {
            SRGB_LINEAR_SLOPE * x
        } else {
            1.055 * x.powf(1.0 / GAMMA_EXPONENT) - 0.055
        };
        (y * high).clamp(0.0, high)
    })
}
