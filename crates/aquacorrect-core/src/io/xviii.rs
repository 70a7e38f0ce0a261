use std::fs;
use std::path::Path;

use ndarray::Array2;

use crate::consts::XVIII_SCALE;
use crate::error::{CorrectError, Result};
use crate::frame::RawImage;
use crate::io::image_io::file_stem;

/// Bytes holding four packed 18-bit samples.
const CHUNK_BYTES: usize = 12;
const SAMPLES_PER_CHUNK: usize = 4;

/// Unpack an XVIII binary frame into a Bayer mosaic scaled to 16 bits.
///
/// Every 12-byte chunk carries four 18-bit samples in a scrambled byte order.
pub fn decode_xviii(binary: &[u8], height: usize, width: usize) -> Result<Array2<f32>> {
    if width % SAMPLES_PER_CHUNK != 0 {
        return Err(CorrectError::InvalidRaw(format!(
            "width {width} is not a multiple of {SAMPLES_PER_CHUNK}"
        )));
    }
    let needed = height * (width / SAMPLES_PER_CHUNK) * CHUNK_BYTES;
    if binary.len() < needed {
        return Err(CorrectError::InvalidRaw(format!(
            "expected at least {needed} bytes for {width}x{height}, got {}",
            binary.len()
        )));
    }

    #[inline]
    fn sample(hi: u8, mid: u8, lo: u8) -> f32 {
        (((hi as u32) << 16) | ((mid as u32) << 8) | lo as u32) as f32 / XVIII_SCALE
    }

    let mut bayer = Array2::<f32>::zeros((height, width));
    let mut offset = 0;
    for row in 0..height {
        for col in (0..width).step_by(SAMPLES_PER_CHUNK) {
            let c = &binary[offset..offset + CHUNK_BYTES];
            bayer[[row, col]] = sample(c[3], c[2], c[1]);
            bayer[[row, col + 1]] = sample(c[0], c[7], c[6]);
            bayer[[row, col + 2]] = sample(c[5], c[4], c[11]);
            bayer[[row, col + 3]] = sample(c[10], c[9], c[8]);
            offset += CHUNK_BYTES;
        }
    }
    Ok(bayer)
}

/// Read and decode an XVIII `.raw` file.
pub fn load_xviii(path: &Path, height: usize, width: usize) -> Result<RawImage> {
    let binary = fs::read(path)?;
    let plane = decode_xviii(&binary, height, width)?;
    Ok(RawImage::from_plane(file_stem(path), plane))
}
