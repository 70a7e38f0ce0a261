use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CorrectError, Result};

/// Row-major matrix block as written in ROS `camera_info` YAML files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YamlMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl YamlMatrix {
    fn matrix3(&self, name: &str) -> Result<Matrix3<f64>> {
        if self.cols < 3 || self.rows < 3 || self.data.len() < self.rows * self.cols {
            return Err(CorrectError::Config(format!(
                "{name} must be at least 3x3, got {}x{} with {} values",
                self.rows,
                self.cols,
                self.data.len()
            )));
        }
        // Leading 3x3 block; the projection matrix is 3x4.
        Ok(Matrix3::from_fn(|r, c| self.data[r * self.cols + c]))
    }
}

/// Monocular camera calibration in ROS `camera_info` format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub image_width: usize,
    pub image_height: usize,
    #[serde(default)]
    pub camera_name: Option<String>,
    pub camera_matrix: YamlMatrix,
    #[serde(default = "default_distortion_model")]
    pub distortion_model: String,
    pub distortion_coefficients: YamlMatrix,
    #[serde(default)]
    pub rectification_matrix: Option<YamlMatrix>,
    #[serde(default)]
    pub projection_matrix: Option<YamlMatrix>,
}

fn default_distortion_model() -> String {
    "plumb_bob".to_string()
}

impl CameraCalibration {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CorrectError::MissingFile(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

/// Per-pixel source coordinates for undistorting and rectifying an image.
#[derive(Clone, Debug)]
pub struct RectificationMaps {
    pub map_x: Array2<f32>,
    pub map_y: Array2<f32>,
}

impl RectificationMaps {
    /// Build maps for `calibration` at its own image size.
    ///
    /// Supports the `plumb_bob` / `radtan` model (k1, k2, p1, p2[, k3]).
    pub fn new(calibration: &CameraCalibration) -> Result<Self> {
        let model = calibration.distortion_model.to_ascii_lowercase();
        if model != "plumb_bob" && model != "radtan" && model != "rational_polynomial" {
            return Err(CorrectError::Config(format!(
                "distortion model '{}' is not supported",
                calibration.distortion_model
            )));
        }

        let k = calibration.camera_matrix.matrix3("camera_matrix")?;
        let r = match &calibration.rectification_matrix {
            Some(m) => m.matrix3("rectification_matrix")?,
            None => Matrix3::identity(),
        };
        let p = match &calibration.projection_matrix {
            Some(m) => m.matrix3("projection_matrix")?,
            None => k,
        };
        let inv = (p * r)
            .try_inverse()
            .ok_or_else(|| CorrectError::Config("projection * rectification is singular".into()))?;

        let d = &calibration.distortion_coefficients.data;
        let coeff = |i: usize| d.get(i).copied().unwrap_or(0.0);
        let (k1, k2, p1, p2, k3) = (coeff(0), coeff(1), coeff(2), coeff(3), coeff(4));
        let (fx, fy, cx, cy) = (k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]);

        let (h, w) = (calibration.image_height, calibration.image_width);
        let mut map_x = Array2::<f32>::zeros((h, w));
        let mut map_y = Array2::<f32>::zeros((h, w));
        for v in 0..h {
            for u in 0..w {
                let ray = inv * Vector3::new(u as f64, v as f64, 1.0);
                let x = ray[0] / ray[2];
                let y = ray[1] / ray[2];
                let r2 = x * x + y * y;
                let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
                let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
                let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
                map_x[[v, u]] = (fx * xd + cx) as f32;
                map_y[[v, u]] = (fy * yd + cy) as f32;
            }
        }
        debug!(width = w, height = h, "Built rectification maps");
        Ok(Self { map_x, map_y })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.map_x.dim()
    }

    /// Resample an image laid out as (height, width, channels) through the
    /// maps. Samples falling outside the source image are zero.
    pub fn remap(&self, image: &Array3<f32>) -> Result<Array3<f32>> {
        let (h, w, c) = image.dim();
        if (h, w) != self.dim() {
            let (mh, mw) = self.dim();
            return Err(CorrectError::ShapeMismatch {
                expected: (mh, mw, c),
                actual: (h, w, c),
            });
        }
        let mut out = Array3::<f32>::zeros((h, w, c));
        out.axis_iter_mut(Axis(2))
            .into_par_iter()
            .zip(image.axis_iter(Axis(2)).into_par_iter())
            .for_each(|(mut dst, src)| {
                for ((row, col), value) in dst.indexed_iter_mut() {
                    *value = bilinear_sample(&src, self.map_x[[row, col]], self.map_y[[row, col]]);
                }
            });
        Ok(out)
    }
}

/// Bilinear interpolation at a sub-pixel position; neighbours outside the
/// image contribute 0.
fn bilinear_sample(data: &ArrayView2<f32>, x: f32, y: f32) -> f32 {
    if !x.is_finite() || !y.is_finite() {
        return 0.0;
    }
    let (h, w) = data.dim();
    let at = |r: isize, c: isize| -> f32 {
        if r >= 0 && c >= 0 && (r as usize) < h && (c as usize) < w {
            data[[r as usize, c as usize]]
        } else {
            0.0
        }
    };
    let (xf, yf) = (x.floor(), y.floor());
    let (fx, fy) = (x - xf, y - yf);
    let (x0, y0) = (xf as isize, yf as isize);

    let top = at(y0, x0) * (1.0 - fx) + at(y0, x0 + 1) * fx;
    let bottom = at(y0 + 1, x0) * (1.0 - fx) + at(y0 + 1, x0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}
