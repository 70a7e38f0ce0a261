use std::str::FromStr;

use ndarray::{Array3, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::CorrectError;

/// Debayering (demosaicing) algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebayerMethod {
    /// Simple bilinear interpolation, fastest.
    Bilinear,
    /// Malvar-He-Cutler gradient-corrected, sharper edges.
    #[default]
    MalvarHeCutler,
}

impl std::fmt::Display for DebayerMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bilinear => write!(f, "Bilinear"),
            Self::MalvarHeCutler => write!(f, "Malvar-He-Cutler"),
        }
    }
}

/// Colour filter layout of a 2x2 Bayer cell, named from (0,0) row-wise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BayerPattern {
    Rggb,
    Grbg,
    Gbrg,
    Bggr,
}

impl BayerPattern {
    /// Returns `(row_parity, col_parity)` of the red pixel within the 2x2 cell.
    fn red_position(self) -> (usize, usize) {
        match self {
            Self::Rggb => (0, 0),
            Self::Grbg => (0, 1),
            Self::Gbrg => (1, 0),
            Self::Bggr => (1, 1),
        }
    }
}

/// Sensor type of a camera: a plain intensity sensor or a Bayer mosaic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorLayout {
    Mono,
    Bayer(BayerPattern),
}

impl SensorLayout {
    pub fn is_bayer(&self) -> bool {
        matches!(self, Self::Bayer(_))
    }
}

impl FromStr for SensorLayout {
    type Err = CorrectError;

    /// Case-insensitive: `rggb`, `grbg`, `gbrg`, `bggr`, `mono`, `grayscale`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rggb" => Ok(Self::Bayer(BayerPattern::Rggb)),
            "grbg" => Ok(Self::Bayer(BayerPattern::Grbg)),
            "gbrg" => Ok(Self::Bayer(BayerPattern::Gbrg)),
            "bggr" => Ok(Self::Bayer(BayerPattern::Bggr)),
            "mono" | "grayscale" | "greyscale" => Ok(Self::Mono),
            _ => Err(CorrectError::UnsupportedBayerPattern(s.to_string())),
        }
    }
}

impl std::fmt::Display for SensorLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mono => write!(f, "mono"),
            Self::Bayer(BayerPattern::Rggb) => write!(f, "rggb"),
            Self::Bayer(BayerPattern::Grbg) => write!(f, "grbg"),
            Self::Bayer(BayerPattern::Gbrg) => write!(f, "gbrg"),
            Self::Bayer(BayerPattern::Bggr) => write!(f, "bggr"),
        }
    }
}

/// Reconstruct colour for an image laid out as (height, width, channels).
///
/// Single-channel Bayer mosaics become 3-channel RGB; mono sensors and
/// images that already carry several channels are returned unchanged.
pub fn debayer_image(data: &Array3<f32>, layout: SensorLayout, method: DebayerMethod) -> Array3<f32> {
    match layout {
        SensorLayout::Bayer(pattern) if data.dim().2 == 1 => {
            let raw = data.index_axis(ndarray::Axis(2), 0);
            debayer(raw, pattern, method)
        }
        _ => data.clone(),
    }
}

/// Debayer a raw Bayer mosaic into (height, width, 3) RGB.
pub fn debayer(raw: ArrayView2<f32>, pattern: BayerPattern, method: DebayerMethod) -> Array3<f32> {
    match method {
        DebayerMethod::Bilinear => debayer_bilinear(raw, pattern),
        DebayerMethod::MalvarHeCutler => debayer_mhc(raw, pattern),
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Clamped indexing into the raw Bayer mosaic.
#[inline]
fn px(raw: &ArrayView2<f32>, row: isize, col: isize) -> f32 {
    let (h, w) = raw.dim();
    let r = row.clamp(0, h as isize - 1) as usize;
    let c = col.clamp(0, w as isize - 1) as usize;
    raw[[r, c]]
}

// ---------------------------------------------------------------------------
// Bilinear demosaicing
// ---------------------------------------------------------------------------

fn debayer_bilinear(raw: ArrayView2<f32>, pattern: BayerPattern) -> Array3<f32> {
    let (h, w) = raw.dim();
    let (r_row, r_col) = pattern.red_position();
    let mut rgb = Array3::<f32>::zeros((h, w, 3));

    for row in 0..h {
        let ri = row as isize;
        let is_red_row = (row % 2) == r_row;
        for col in 0..w {
            let ci = col as isize;
            let is_red_col = (col % 2) == r_col;

            let (red, green, blue) = match (is_red_row, is_red_col) {
                // Red pixel position
                (true, true) => (
                    raw[[row, col]],
                    avg_cross(&raw, ri, ci),
                    avg_diagonal(&raw, ri, ci),
                ),
                // Green on red row
                (true, false) => (
                    avg_horizontal(&raw, ri, ci),
                    raw[[row, col]],
                    avg_vertical(&raw, ri, ci),
                ),
                // Green on blue row
                (false, true) => (
                    avg_vertical(&raw, ri, ci),
                    raw[[row, col]],
                    avg_horizontal(&raw, ri, ci),
                ),
                // Blue pixel position
                (false, false) => (
                    avg_diagonal(&raw, ri, ci),
                    avg_cross(&raw, ri, ci),
                    raw[[row, col]],
                ),
            };
            rgb[[row, col, 0]] = red;
            rgb[[row, col, 1]] = green;
            rgb[[row, col, 2]] = blue;
        }
    }
    rgb
}

/// Average of 4 cross (cardinal) neighbours.
#[inline]
fn avg_cross(raw: &ArrayView2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r - 1, c) + px(raw, r + 1, c) + px(raw, r, c - 1) + px(raw, r, c + 1)) * 0.25
}

/// Average of 4 diagonal neighbours.
#[inline]
fn avg_diagonal(raw: &ArrayView2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r - 1, c - 1)
        + px(raw, r - 1, c + 1)
        + px(raw, r + 1, c - 1)
        + px(raw, r + 1, c + 1))
        * 0.25
}

#[inline]
fn avg_horizontal(raw: &ArrayView2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r, c - 1) + px(raw, r, c + 1)) * 0.5
}

#[inline]
fn avg_vertical(raw: &ArrayView2<f32>, r: isize, c: isize) -> f32 {
    (px(raw, r - 1, c) + px(raw, r + 1, c)) * 0.5
}

// ---------------------------------------------------------------------------
// Malvar-He-Cutler (MHC) demosaicing
// ---------------------------------------------------------------------------
//
// Reference: "High-quality linear interpolation for demosaicing of
// Bayer-patterned color images", Malvar, He, Cutler (2004).
//
// Kernels are scaled by 2 from the paper values and divided by 16.

/// Green at a red or blue location.
const MHC_G_AT_RB: [[i32; 5]; 5] = [
    [0, 0, -2, 0, 0],
    [0, 0, 4, 0, 0],
    [-2, 4, 8, 4, -2],
    [0, 0, 4, 0, 0],
    [0, 0, -2, 0, 0],
];

/// Red at green in a red row / Blue at green in a blue row.
const MHC_RB_AT_G_SAME_ROW: [[i32; 5]; 5] = [
    [0, 0, 1, 0, 0],
    [0, -2, 0, -2, 0],
    [-2, 8, 10, 8, -2],
    [0, -2, 0, -2, 0],
    [0, 0, 1, 0, 0],
];

/// Red at green in a blue row / Blue at green in a red row.
const MHC_RB_AT_G_DIFF_ROW: [[i32; 5]; 5] = [
    [0, 0, -2, 0, 0],
    [0, -2, 8, -2, 0],
    [1, 0, 10, 0, 1],
    [0, -2, 8, -2, 0],
    [0, 0, -2, 0, 0],
];

/// Red at blue / Blue at red (diagonal).
const MHC_RB_AT_BR: [[i32; 5]; 5] = [
    [0, 0, -3, 0, 0],
    [0, 4, 0, 4, 0],
    [-3, 0, 12, 0, -3],
    [0, 4, 0, 4, 0],
    [0, 0, -3, 0, 0],
];

const MHC_DIVISOR: f32 = 16.0;

/// Apply a 5x5 kernel centred at (r,c). Intensities are not normalised, so
/// only negative overshoot is clipped.
#[inline]
fn apply_kernel(raw: &ArrayView2<f32>, r: isize, c: isize, kernel: &[[i32; 5]; 5]) -> f32 {
    let mut sum = 0.0_f32;
    for (kr, krow) in kernel.iter().enumerate() {
        for (kc, &kval) in krow.iter().enumerate() {
            if kval != 0 {
                sum += kval as f32 * px(raw, r + kr as isize - 2, c + kc as isize - 2);
            }
        }
    }
    (sum / MHC_DIVISOR).max(0.0)
}

fn debayer_mhc(raw: ArrayView2<f32>, pattern: BayerPattern) -> Array3<f32> {
    let (h, w) = raw.dim();
    let (r_row, r_col) = pattern.red_position();
    let mut rgb = Array3::<f32>::zeros((h, w, 3));

    for row in 0..h {
        let ri = row as isize;
        let is_red_row = (row % 2) == r_row;
        for col in 0..w {
            let ci = col as isize;
            let is_red_col = (col % 2) == r_col;

            let (red, green, blue) = match (is_red_row, is_red_col) {
                (true, true) => (
                    raw[[row, col]],
                    apply_kernel(&raw, ri, ci, &MHC_G_AT_RB),
                    apply_kernel(&raw, ri, ci, &MHC_RB_AT_BR),
                ),
                // Green on red row (red neighbours are left/right)
                (true, false) => (
                    apply_kernel(&raw, ri, ci, &MHC_RB_AT_G_SAME_ROW),
                    raw[[row, col]],
                    apply_kernel(&raw, ri, ci, &MHC_RB_AT_G_DIFF_ROW),
                ),
                // Green on blue row (blue neighbours are left/right)
                (false, true) => (
                    apply_kernel(&raw, ri, ci, &MHC_RB_AT_G_DIFF_ROW),
                    raw[[row, col]],
                    apply_kernel(&raw, ri, ci, &MHC_RB_AT_G_SAME_ROW),
                ),
                (false, false) => (
                    apply_kernel(&raw, ri, ci, &MHC_RB_AT_BR),
                    apply_kernel(&raw, ri, ci, &MHC_G_AT_RB),
                    raw[[row, col]],
                ),
            };
            rgb[[row, col, 0]] = red;
            rgb[[row, col, 1]] = green;
            rgb[[row, col, 2]] = blue;
        }
    }
    rgb
}
