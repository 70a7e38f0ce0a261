//! Per-image distance matrices and altitude admissibility.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::consts::MIN_ADMISSIBLE_IMAGES;
use crate::error::{CorrectError, Result};
use crate::io::navigation::read_altitudes;
use crate::io::npy::{read_npy, write_npy};

/// Admissible distance band, in metres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AltitudeFilter {
    pub min_m: f64,
    pub max_m: f64,
}

impl Default for AltitudeFilter {
    fn default() -> Self {
        Self {
            min_m: 0.0,
            max_m: 12.0,
        }
    }
}

impl AltitudeFilter {
    /// Closed-band containment: `min <= altitude <= max`.
    pub fn admits_altitude(&self, altitude: f64) -> bool {
        self.min_m <= altitude && altitude <= self.max_m
    }

    /// Whether `[lo, hi]` overlaps the band at all.
    pub fn overlaps(&self, lo: f64, hi: f64) -> bool {
        !(lo > self.max_m || hi < self.min_m)
    }
}

/// Where per-image distances come from, resolved once from configuration.
#[derive(Clone, Debug, PartialEq)]
pub enum DistanceSource {
    /// No distance information; only raw statistics are estimated.
    None,
    /// One altitude per image, row i of the CSV belonging to image i.
    Altitude { csv: PathBuf },
    /// Per-pixel depth arrays, `.npy` files whose stem contains the image stem.
    DepthMap { dir: PathBuf },
}

impl std::fmt::Display for DistanceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Altitude { .. } => write!(f, "altitude"),
            Self::DepthMap { .. } => write!(f, "depth_map"),
        }
    }
}

/// Distance matrices written for a working image list.
#[derive(Clone, Debug, Default)]
pub struct DistanceMatrices {
    /// One `.npy` per image, in image order. May be shorter than the image
    /// list when distances ran out.
    pub files: Vec<PathBuf>,
    /// Indices (into `files`) of images inside the admissible band.
    pub admissible: Vec<usize>,
}

impl DistanceMatrices {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Indices of altitudes inside the filter band, edges included.
pub fn admissible_altitudes(altitudes: &[f64], filter: &AltitudeFilter) -> Vec<usize> {
    altitudes
        .iter()
        .enumerate()
        .filter(|&(_, &a)| filter.admits_altitude(a))
        .map(|(i, _)| i)
        .collect()
}

/// Fail unless at least three images can be used for fitting.
pub fn ensure_sufficient(admissible: &[usize]) -> Result<()> {
    if admissible.len() < MIN_ADMISSIBLE_IMAGES {
        return Err(CorrectError::InsufficientImages {
            found: admissible.len(),
            required: MIN_ADMISSIBLE_IMAGES,
        });
    }
    Ok(())
}

/// Bilinear resize that keeps values within the source range.
///
/// Pixel centres are aligned (half-pixel convention), edges are clamped.
pub fn resize_bilinear(src: ArrayView2<f32>, dim: (usize, usize)) -> Array2<f32> {
    let (sh, sw) = src.dim();
    let (dh, dw) = dim;
    if (sh, sw) == (dh, dw) {
        return src.to_owned();
    }
    if sh == 0 || sw == 0 {
        return Array2::zeros(dim);
    }
    let (lo, hi) = src
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let scale_y = sh as f64 / dh as f64;
    let scale_x = sw as f64 / dw as f64;
    let source_coord = |i: usize, scale: f64, n: usize| -> (usize, usize, f64) {
        let s = ((i as f64 + 0.5) * scale - 0.5).clamp(0.0, (n - 1) as f64);
        let i0 = s.floor() as usize;
        let i1 = (i0 + 1).min(n - 1);
        (i0, i1, s - i0 as f64)
    };

    Array2::from_shape_fn(dim, |(row, col)| {
        let (y0, y1, fy) = source_coord(row, scale_y, sh);
        let (x0, x1, fx) = source_coord(col, scale_x, sw);
        let top = src[[y0, x0]] as f64 * (1.0 - fx) + src[[y0, x1]] as f64 * fx;
        let bottom = src[[y1, x0]] as f64 * (1.0 - fx) + src[[y1, x1]] as f64 * fx;
        let v = (top * (1.0 - fy) + bottom * fy) as f32;
        // No finite source values leaves nothing to clamp to.
        if lo <= hi {
            v.clamp(lo, hi)
        } else {
            v
        }
    })
}

/// First `.npy` in `dir` whose stem contains `image_stem`.
pub fn find_depth_map(dir: &Path, image_stem: &str) -> Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("npy"))
        .filter(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.contains(image_stem))
        })
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Write one distance matrix per image into `out_dir` and determine which
/// images are admissible for parameter estimation.
///
/// `stems` is the working image list in order; `dim` is (height, width).
/// Altitude rows beyond the image list are ignored; images beyond the last
/// available distance get no matrix. Fewer than three admissible images is
/// an error.
pub fn generate_distance_matrices(
    source: &DistanceSource,
    stems: &[String],
    dim: (usize, usize),
    filter: &AltitudeFilter,
    out_dir: &Path,
    on_progress: impl Fn(usize),
) -> Result<DistanceMatrices> {
    let mut matrices = DistanceMatrices::default();
    match source {
        DistanceSource::None => {
            info!("Null distance matrix created");
            return Ok(matrices);
        }
        DistanceSource::Altitude { csv } => {
            if !csv.exists() {
                return Err(CorrectError::MissingFile(csv.clone()));
            }
            fs::create_dir_all(out_dir)?;
            let altitudes = read_altitudes(csv)?;
            for (i, (stem, &altitude)) in stems.iter().zip(&altitudes).enumerate() {
                let path = out_dir.join(format!("{stem}.npy"));
                write_npy(&path, &Array2::<f32>::from_elem(dim, altitude as f32))?;
                matrices.files.push(path);
                if filter.admits_altitude(altitude) {
                    matrices.admissible.push(i);
                }
                on_progress(i + 1);
            }
        }
        DistanceSource::DepthMap { dir } => {
            if !dir.is_dir() {
                return Err(CorrectError::MissingFile(dir.clone()));
            }
            fs::create_dir_all(out_dir)?;
            for (i, stem) in stems.iter().enumerate() {
                let Some(depth_path) = find_depth_map(dir, stem)? else {
                    warn!(image = %stem, "No depth map found; remaining images get no distance matrix");
                    break;
                };
                let depth = read_npy::<f32>(&depth_path)?.into_dimensionality::<ndarray::Ix2>()?;
                let resized = resize_bilinear(depth.view(), dim);
                let (lo, hi) = resized
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                        (lo.min(v), hi.max(v))
                    });
                if lo > hi {
                    return Err(CorrectError::Npy {
                        path: depth_path,
                        reason: "depth map has no finite values".into(),
                    });
                }
                let path = out_dir.join(format!("{stem}.npy"));
                write_npy(&path, &resized)?;
                matrices.files.push(path);
                if filter.overlaps(lo as f64, hi as f64) {
                    matrices.admissible.push(i);
                }
                on_progress(i + 1);
            }
        }
    }

    if matrices.files.len() < stems.len() {
        warn!(
            distances = matrices.files.len(),
            images = stems.len(),
            "Fewer distances than images"
        );
    }
    info!(
        source = %source,
        admissible = matrices.admissible.len(),
        total = matrices.files.len(),
        "Images filtered as per altitude range"
    );
    ensure_sufficient(&matrices.admissible)?;
    Ok(matrices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_preserves_range() {
        let src = Array2::from_shape_vec((2, 2), vec![2.0f32, 3.0, 2.5, 2.0]).unwrap();
        let out = resize_bilinear(src.view(), (5, 7));
        assert_eq!(out.dim(), (5, 7));
        assert!(out.iter().all(|&v| (2.0..=3.0).contains(&v)));
    }

    #[test]
    fn resize_of_nan_map_keeps_nan() {
        let src = Array2::from_elem((2, 2), f32::NAN);
        let out = resize_bilinear(src.view(), (4, 4));
        assert_eq!(out.dim(), (4, 4));
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn resize_to_same_shape_is_copy() {
        let src = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f32);
        assert_eq!(resize_bilinear(src.view(), (3, 4)), src);
    }
}
