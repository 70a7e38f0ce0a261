use ndarray::{Array2, ArrayView2, Zip};
use rayon::prelude::*;

use crate::consts::{DEFAULT_TRIM_RATIO, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{CorrectError, Result};

use super::moments::mean_std;
use super::robust::{median, trimmed_mean_std};

/// How the images of one distance bin are reduced to a single sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SmoothingPolicy {
    Mean,
    /// Drops `ratio / 2` of the samples from each tail before averaging.
    MeanTrimmed { ratio: f64 },
    Median,
}

impl Default for SmoothingPolicy {
    fn default() -> Self {
        Self::MeanTrimmed {
            ratio: DEFAULT_TRIM_RATIO,
        }
    }
}

impl std::fmt::Display for SmoothingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mean => write!(f, "Mean"),
            Self::MeanTrimmed { ratio } => write!(f, "Trimmed mean (ratio {ratio})"),
            Self::Median => write!(f, "Median"),
        }
    }
}

impl SmoothingPolicy {
    /// Reduce the samples of one pixel. `values` may be reordered.
    pub fn reduce(&self, values: &mut [f32]) -> f32 {
        match *self {
            Self::Mean => mean_std(values).0 as f32,
            Self::MeanTrimmed { ratio } => trimmed_mean_std(values, ratio).0 as f32,
            Self::Median => median(values),
        }
    }
}

/// Per-pixel arithmetic mean of equally shaped planes.
pub fn mean_plane(planes: &[ArrayView2<f32>]) -> Result<Array2<f32>> {
    let first = planes.first().ok_or(CorrectError::EmptySequence)?;
    let mut sum = Array2::<f64>::zeros(first.dim());
    for plane in planes {
        check_dim(first, plane)?;
        Zip::from(&mut sum)
            .and(plane)
            .for_each(|s, &v| *s += v as f64);
    }
    let n = planes.len() as f64;
    Ok(sum.mapv(|s| (s / n) as f32))
}

/// Reduce a set of planes to one representative plane under `policy`.
///
/// Parallelizes at the row level for large planes.
pub fn sample_planes(planes: &[ArrayView2<f32>], policy: SmoothingPolicy) -> Result<Array2<f32>> {
    if policy == SmoothingPolicy::Mean {
        return mean_plane(planes);
    }
    let first = planes.first().ok_or(CorrectError::EmptySequence)?;
    for plane in planes {
        check_dim(first, plane)?;
    }

    let (h, w) = first.dim();
    let n = planes.len();
    let reduce_row = |row: usize| {
        let mut pixel_values = vec![0.0f32; n];
        let mut row_result = vec![0.0f32; w];
        for (col, result) in row_result.iter_mut().enumerate() {
            for (i, plane) in planes.iter().enumerate() {
                pixel_values[i] = plane[[row, col]];
            }
            *result = policy.reduce(&mut pixel_values);
        }
        row_result
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        (0..h).into_par_iter().map(reduce_row).collect()
    } else {
        (0..h).map(reduce_row).collect()
    };

    let values: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((h, w), values)?)
}

fn check_dim(first: &ArrayView2<f32>, plane: &ArrayView2<f32>) -> Result<()> {
    if plane.dim() != first.dim() {
        return Err(CorrectError::ShapeMismatch {
            expected: (first.nrows(), first.ncols(), 1),
            actual: (plane.nrows(), plane.ncols(), 1),
        });
    }
    Ok(())
}
