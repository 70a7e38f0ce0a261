use ndarray::{Array2, Array3, ArrayD, ArrayView2, Axis, Ix2, Ix3};

use crate::error::{CorrectError, Result};

/// A single source photo as a pixel intensity array.
///
/// Data is always stored as (height, width, channels); mono and Bayer
/// mosaics have one channel. Intensities keep the sensor's native scale
/// (e.g. 0..4095 for a 12-bit camera), not [0, 1].
#[derive(Clone, Debug)]
pub struct RawImage {
    /// Filename stem the image is keyed by.
    pub stem: String,
    pub data: Array3<f32>,
}

impl RawImage {
    pub fn new(stem: impl Into<String>, data: Array3<f32>) -> Self {
        Self {
            stem: stem.into(),
            data,
        }
    }

    /// Build from a single-plane array (mono or Bayer mosaic).
    pub fn from_plane(stem: impl Into<String>, plane: Array2<f32>) -> Self {
        Self::new(stem, plane.insert_axis(Axis(2)))
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    /// View of a single channel plane.
    pub fn channel(&self, index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(2), index)
    }
}

/// Normalise a dynamic-rank array to (height, width, channels).
///
/// 2D arrays gain a trailing channel axis; 3D arrays pass through.
pub fn to_hwc(data: ArrayD<f32>) -> Result<Array3<f32>> {
    match data.ndim() {
        2 => Ok(data.into_dimensionality::<Ix2>()?.insert_axis(Axis(2))),
        3 => Ok(data.into_dimensionality::<Ix3>()?),
        n => Err(CorrectError::Config(format!(
            "expected a 2D or 3D image array, got {n} dimensions"
        ))),
    }
}
