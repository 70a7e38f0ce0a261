use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{CorrectError, Result};

/// Static colour balance: per-channel offsets followed by a 3x3 gain matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualBalance {
    pub subtractors_rgb: [f64; 3],
    pub colour_correction_matrix_rgb: [[f64; 3]; 3],
}

impl Default for ManualBalance {
    fn default() -> Self {
        Self {
            subtractors_rgb: [0.0; 3],
            colour_correction_matrix_rgb: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl ManualBalance {
    fn matrix(&self) -> Matrix3<f64> {
        let m = &self.colour_correction_matrix_rgb;
        Matrix3::new(
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
        )
    }

    /// Balance an image laid out as (height, width, channels).
    ///
    /// RGB pixels become `M * (p - s)`; single-channel images use the red
    /// entries, `(p - s[0]) * M[0][0]`. No clipping is applied.
    pub fn apply(&self, data: &Array3<f32>) -> Result<Array3<f32>> {
        match data.dim().2 {
            1 => {
                let s = self.subtractors_rgb[0];
                let g = self.colour_correction_matrix_rgb[0][0];
                Ok(data.mapv(|v| ((v as f64 - s) * g) as f32))
            }
            3 => {
                let m = self.matrix();
                let s = Vector3::from(self.subtractors_rgb);
                let mut out = data.clone();
                let balance = |mut row: ndarray::ArrayViewMut2<f32>| {
                    for mut px in row.axis_iter_mut(Axis(0)) {
                        let p = Vector3::new(px[0] as f64, px[1] as f64, px[2] as f64);
                        let q = m * (p - s);
                        px[0] = q[0] as f32;
                        px[1] = q[1] as f32;
                        px[2] = q[2] as f32;
                    }
                };
                let (h, w, _) = data.dim();
                if h * w >= PARALLEL_PIXEL_THRESHOLD {
                    out.axis_iter_mut(Axis(0)).into_par_iter().for_each(balance);
                } else {
                    out.axis_iter_mut(Axis(0)).for_each(balance);
                }
                Ok(out)
            }
            n => Err(CorrectError::Config(format!(
                "manual balance needs 1 or 3 channels, image has {n}"
            ))),
        }
    }
}
