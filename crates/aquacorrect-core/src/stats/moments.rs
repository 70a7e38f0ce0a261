use ndarray::{Array2, ArrayView2, Zip};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{CorrectError, Result};
use crate::io::memmap::ArrayStack;

/// Streaming per-pixel mean and population standard deviation (Welford).
///
/// Planes are pushed one at a time so a stack of any length can be reduced
/// while only the accumulators stay resident.
#[derive(Clone, Debug)]
pub struct RunningMoments {
    count: usize,
    mean: Array2<f64>,
    m2: Array2<f64>,
}

impl RunningMoments {
    pub fn new(dim: (usize, usize)) -> Self {
        Self {
            count: 0,
            mean: Array2::zeros(dim),
            m2: Array2::zeros(dim),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn push(&mut self, plane: ArrayView2<f32>) -> Result<()> {
        if plane.dim() != self.mean.dim() {
            let (h, w) = self.mean.dim();
            return Err(CorrectError::ShapeMismatch {
                expected: (h, w, 1),
                actual: (plane.nrows(), plane.ncols(), 1),
            });
        }
        self.count += 1;
        let n = self.count as f64;
        let update = |m: &mut f64, m2: &mut f64, &x: &f32| {
            let x = x as f64;
            let delta = x - *m;
            *m += delta / n;
            *m2 += delta * (x - *m);
        };

        let zip = Zip::from(&mut self.mean).and(&mut self.m2).and(&plane);
        if plane.len() >= PARALLEL_PIXEL_THRESHOLD {
            zip.par_for_each(update);
        } else {
            zip.for_each(update);
        }
        Ok(())
    }

    pub fn mean(&self) -> &Array2<f64> {
        &self.mean
    }

    /// Consume the accumulator, returning `(mean, std)`.
    pub fn finish(self) -> Result<(Array2<f64>, Array2<f64>)> {
        if self.count == 0 {
            return Err(CorrectError::EmptySequence);
        }
        let n = self.count as f64;
        let std = self.m2.mapv(|m2| (m2 / n).max(0.0).sqrt());
        Ok((self.mean, std))
    }
}

/// Per-pixel mean and std of one channel across every item of a stack.
pub fn channel_mean_std(stack: &ArrayStack, channel: usize) -> Result<(Array2<f64>, Array2<f64>)> {
    let (h, w, _) = stack.item_dim();
    let mut moments = RunningMoments::new((h, w));
    for i in 0..stack.len() {
        moments.push(stack.channel(i, channel)?)?;
    }
    moments.finish()
}

/// Per-pixel mean of one channel across every item of a stack.
pub fn channel_mean(stack: &ArrayStack, channel: usize) -> Result<Array2<f64>> {
    let (h, w, _) = stack.item_dim();
    if stack.is_empty() {
        return Err(CorrectError::EmptySequence);
    }
    let mut sum = Array2::<f64>::zeros((h, w));
    for i in 0..stack.len() {
        let plane = stack.channel(i, channel)?;
        Zip::from(&mut sum)
            .and(&plane)
            .for_each(|s, &v| *s += v as f64);
    }
    let n = stack.len() as f64;
    sum.mapv_inplace(|s| s / n);
    Ok(sum)
}

/// Mean over every element of each stack item, in item order.
pub fn item_means(stack: &ArrayStack) -> Result<Vec<f64>> {
    (0..stack.len())
        .into_par_iter()
        .map(|i| {
            let item = stack.item(i)?;
            let sum: f64 = item.iter().map(|&v| v as f64).sum();
            Ok(sum / item.len() as f64)
        })
        .collect()
}

/// Population mean and std of a flat sample.
pub fn mean_std(values: &[f32]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, var.sqrt())
}
