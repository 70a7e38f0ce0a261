use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::Array3;

use crate::error::{CorrectError, Result};
use crate::frame::RawImage;

/// Corrected image ready to be encoded, at the configured output bit depth.
#[derive(Clone, Debug)]
pub enum OutputImage {
    Eight(Array3<u8>),
    Sixteen(Array3<u16>),
}

impl OutputImage {
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            Self::Eight(data) => data.dim(),
            Self::Sixteen(data) => data.dim(),
        }
    }
}

/// File stem used to key an image throughout the pipeline.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Decode a TIFF/JPEG/PNG into a `RawImage`, keeping native intensity values.
///
/// Grey images yield one channel, colour images three (alpha is dropped).
pub fn load_image(path: &Path) -> Result<RawImage> {
    let img = image::open(path)?;
    let h = img.height() as usize;
    let w = img.width() as usize;

    let (values, channels): (Vec<f32>, usize) = match img {
        DynamicImage::ImageLuma8(buf) => (buf.into_raw().into_iter().map(f32::from).collect(), 1),
        DynamicImage::ImageLuma16(buf) => (buf.into_raw().into_iter().map(f32::from).collect(), 1),
        DynamicImage::ImageRgb8(buf) => (buf.into_raw().into_iter().map(f32::from).collect(), 3),
        DynamicImage::ImageRgb16(buf) => (buf.into_raw().into_iter().map(f32::from).collect(), 3),
        other if other.color().has_color() => (
            other.to_rgb16().into_raw().into_iter().map(f32::from).collect(),
            3,
        ),
        other => (
            other.to_luma16().into_raw().into_iter().map(f32::from).collect(),
            1,
        ),
    };

    let data = Array3::from_shape_vec((h, w, channels), values)?;
    Ok(RawImage::new(file_stem(path), data))
}

/// Encode an output image; the format follows the file extension.
pub fn save_output_image(image: &OutputImage, path: &Path) -> Result<()> {
    let (h, w, c) = image.dim();
    let (w32, h32) = (w as u32, h as u32);
    let mismatch = || CorrectError::Config(format!("buffer size does not match {w}x{h}x{c}"));

    match (image, c) {
        (OutputImage::Eight(data), 1) => {
            let img = GrayImage::from_raw(w32, h32, data.iter().copied().collect())
                .ok_or_else(mismatch)?;
            img.save(path)?;
        }
        (OutputImage::Eight(data), 3) => {
            let img = RgbImage::from_raw(w32, h32, data.iter().copied().collect())
                .ok_or_else(mismatch)?;
            img.save(path)?;
        }
        (OutputImage::Sixteen(data), 1) => {
            let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(
                w32,
                h32,
                data.iter().copied().collect(),
            )
            .ok_or_else(mismatch)?;
            img.save(path)?;
        }
        (OutputImage::Sixteen(data), 3) => {
            let img = ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(
                w32,
                h32,
                data.iter().copied().collect(),
            )
            .ok_or_else(mismatch)?;
            img.save(path)?;
        }
        (_, n) => {
            return Err(CorrectError::Config(format!(
                "cannot encode an image with {n} channels"
            )))
        }
    }
    Ok(())
}
