use ndarray::{Array, Array3, Dimension};

use crate::error::{CorrectError, Result};
use crate::io::image_io::OutputImage;

use super::levels::max_value;

/// Rescaling of intensities onto the full range of an output bit depth.
pub trait Bytescale {
    type Output;

    fn bytescale(&self, bit_depth: u8) -> Self::Output;
}

/// 8-bit data is already in output range and passes through untouched.
impl<D: Dimension> Bytescale for Array<u8, D> {
    type Output = Array<u8, D>;

    fn bytescale(&self, _bit_depth: u8) -> Self::Output {
        self.clone()
    }
}

/// Linear map of `[min, max]` onto `[0, 2^bit_depth - 1]`, clipped.
/// A constant image uses a unit scale.
impl<D: Dimension> Bytescale for Array<f32, D> {
    type Output = Array<f32, D>;

    fn bytescale(&self, bit_depth: u8) -> Self::Output {
        let high = max_value(bit_depth);
        let (lo, hi) = self
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if !lo.is_finite() || !hi.is_finite() {
            return self.mapv(|_| 0.0);
        }
        let mut range = (hi - lo) as f64;
        if range == 0.0 {
            range = 1.0;
        }
        let scale = high / range;
        self.mapv(|v| ((v - lo) as f64 * scale).clamp(0.0, high) as f32)
    }
}

/// Round already-scaled intensities to integers of the output bit depth.
pub fn quantize(data: &Array3<f32>, bit_depth: u8) -> Result<OutputImage> {
    let high = max_value(bit_depth) as f32;
    match bit_depth {
        8 => Ok(OutputImage::Eight(
            data.mapv(|v| (v.clamp(0.0, high) + 0.5) as u8),
        )),
        16 => Ok(OutputImage::Sixteen(
            data.mapv(|v| (v.clamp(0.0, high) + 0.5) as u16),
        )),
        other => Err(CorrectError::Config(format!(
            "unsupported output bit depth {other}; use 8 or 16"
        ))),
    }
}
