use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use rayon::prelude::*;

use crate::consts::{DISTANCE_BIN_WIDTH_M, STACK_BATCH_SIZE};
use crate::error::{CorrectError, Result};
use crate::io::memmap::ArrayStack;
use crate::stats::{mean_plane, sample_planes, SmoothingPolicy};

use super::curve::{fit, AttenuationCoefficients, FitOutcome};

/// Lower bin edges `min, min + 0.1, ...` strictly below `max`.
pub fn bin_edges(min: f64, max: f64) -> Vec<f64> {
    if !(max > min) {
        return Vec::new();
    }
    let count = ((max - min) / DISTANCE_BIN_WIDTH_M).ceil() as usize;
    (0..count)
        .map(|k| min + k as f64 * DISTANCE_BIN_WIDTH_M)
        .collect()
}

/// Group item indices by mean distance.
///
/// Group `k` holds the items with `edges[k] <= d < edges[k + 1]`; items
/// below the first edge or at/above the last edge belong to no group.
pub fn assign_bins(mean_distances: &[f64], edges: &[f64]) -> Vec<Vec<usize>> {
    let groups = edges.len().saturating_sub(1);
    let mut bins = vec![Vec::new(); groups];
    for (i, &d) in mean_distances.iter().enumerate() {
        // Index of the first edge strictly greater than d.
        let upper = edges.partition_point(|&e| e <= d);
        if upper >= 1 && upper <= groups {
            bins[upper - 1].push(i);
        }
    }
    bins
}

/// Representative samples of one channel, one pair per non-empty bin.
#[derive(Clone, Debug)]
pub struct BinSamples {
    pub images: Vec<Array2<f32>>,
    pub distances: Vec<Array2<f32>>,
}

impl BinSamples {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Reduce every non-empty bin to one image sample (per `policy`) and one
/// distance sample (always the mean).
pub fn bin_samples(
    images: &ArrayStack,
    distances: &ArrayStack,
    channel: usize,
    bins: &[Vec<usize>],
    policy: SmoothingPolicy,
    on_progress: impl Fn(usize),
) -> Result<BinSamples> {
    let mut samples = BinSamples {
        images: Vec::new(),
        distances: Vec::new(),
    };
    for (done, members) in bins.iter().enumerate() {
        if !members.is_empty() {
            let image_planes = members
                .iter()
                .map(|&i| images.channel(i, channel))
                .collect::<Result<Vec<_>>>()?;
            let distance_planes = members
                .iter()
                .map(|&i| distances.channel(i, 0))
                .collect::<Result<Vec<_>>>()?;
            samples.images.push(sample_planes(&image_planes, policy)?);
            samples.distances.push(mean_plane(&distance_planes)?);
        }
        on_progress(done + 1);
    }
    Ok(samples)
}

/// Fitted coefficients of one channel.
#[derive(Clone, Debug)]
pub struct ChannelFit {
    /// (height, width, 3) holding `a, b, c` per pixel.
    pub parameters: Array3<f64>,
    /// Pixels that fell back to unoptimised coefficients.
    pub fallbacks: usize,
}

/// Fit the exponential model independently at every pixel.
///
/// Rows are fitted in parallel and reassembled in pixel order.
/// `on_progress` receives the number of pixels done.
pub fn fit_channel(samples: &BinSamples, on_progress: impl Fn(usize) + Send + Sync) -> Result<ChannelFit> {
    let first = samples.images.first().ok_or(CorrectError::EmptySequence)?;
    let (h, w) = first.dim();
    let n = samples.len();
    let done = AtomicUsize::new(0);

    let rows: Vec<Vec<FitOutcome>> = (0..h)
        .into_par_iter()
        .map(|row| {
            let mut x = vec![0.0f64; n];
            let mut y = vec![0.0f64; n];
            let outcomes = (0..w)
                .map(|col| {
                    for k in 0..n {
                        x[k] = samples.distances[k][[row, col]] as f64;
                        y[k] = samples.images[k][[row, col]] as f64;
                    }
                    fit(&x, &y)
                })
                .collect();
            let finished = done.fetch_add(w, Ordering::Relaxed) + w;
            on_progress(finished);
            outcomes
        })
        .collect();

    let mut parameters = Array3::<f64>::zeros((h, w, 3));
    let mut fallbacks = 0;
    for (row, outcomes) in rows.into_iter().enumerate() {
        for (col, outcome) in outcomes.into_iter().enumerate() {
            if !outcome.is_fitted() {
                fallbacks += 1;
            }
            let p = outcome.coefficients();
            parameters[[row, col, 0]] = p.a;
            parameters[[row, col, 1]] = p.b;
            parameters[[row, col, 2]] = p.c;
        }
    }
    Ok(ChannelFit {
        parameters,
        fallbacks,
    })
}

/// Per-pixel model value at `target` distance: `a * exp(b * target) + c`.
pub fn correction_gains(parameters: ArrayView3<f64>, target: ArrayView2<f64>) -> Array2<f64> {
    let mut gains = Array2::<f64>::zeros(target.dim());
    Zip::from(&mut gains)
        .and(parameters.lanes(Axis(2)))
        .and(&target)
        .for_each(|g, p, &t| {
            *g = AttenuationCoefficients::new(p[0], p[1], p[2]).evaluate(t);
        });
    gains
}

/// Rescale one raw channel to the target distance:
/// `gain / (a * exp(b * d) + c) * raw`.
pub fn attenuation_correct(
    raw: ArrayView2<f32>,
    distance: ArrayView2<f32>,
    parameters: ArrayView3<f64>,
    gains: ArrayView2<f64>,
) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros(raw.dim());
    Zip::from(&mut out)
        .and(&raw)
        .and(&distance)
        .and(parameters.lanes(Axis(2)))
        .and(&gains)
        .for_each(|o, &r, &d, p, &g| {
            let model = AttenuationCoefficients::new(p[0], p[1], p[2]).evaluate(d as f64);
            *o = (g / model * r as f64) as f32;
        });
    out
}

/// Correct one channel of every stack item in place.
///
/// Items are corrected in parallel batches; each worker returns an owned
/// plane and this function alone writes the batch back to the stack.
pub fn apply_corrections(
    images: &mut ArrayStack,
    distances: &ArrayStack,
    channel: usize,
    parameters: ArrayView3<f64>,
    gains: ArrayView2<f64>,
    on_progress: impl Fn(usize),
) -> Result<()> {
    let total = images.len();
    let mut start = 0;
    while start < total {
        let end = (start + STACK_BATCH_SIZE).min(total);
        let corrected = {
            let stack: &ArrayStack = images;
            (start..end)
                .into_par_iter()
                .map(|i| {
                    let raw = stack.channel(i, channel)?;
                    let distance = distances.channel(i, 0)?;
                    Ok((i, attenuation_correct(raw, distance, parameters, gains)))
                })
                .collect::<Result<Vec<(usize, Array2<f32>)>>>()?
        };
        for (i, plane) in corrected {
            images.write_channel(i, channel, plane.view())?;
        }
        on_progress(end);
        start = end;
    }
    images.flush()
}

/// Copy a per-channel (height, width) plane into a (channels, height, width)
/// array.
pub fn set_channel<T: Clone>(target: &mut Array3<T>, channel: usize, plane: ArrayView2<T>) {
    target.index_axis_mut(Axis(0), channel).assign(&plane);
}
