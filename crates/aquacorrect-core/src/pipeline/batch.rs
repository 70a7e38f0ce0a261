use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Ix2;
use rayon::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::frame::to_hwc;
use crate::io::image_io::{file_stem, save_output_image};
use crate::io::npy::read_npy;

use super::corrector::ImageCorrector;

/// Correct every intermediate image in parallel and write it to `out_dir`
/// as `<stem>.<format>`.
///
/// `distances`, when given, pairs with `images` by index. Returns the
/// written file names in input order.
pub fn correct_images(
    corrector: &ImageCorrector<'_>,
    images: &[PathBuf],
    distances: Option<&[PathBuf]>,
    out_dir: &Path,
    format: &str,
    on_progress: impl Fn(usize) + Send + Sync,
) -> Result<Vec<String>> {
    let done = AtomicUsize::new(0);
    images
        .par_iter()
        .enumerate()
        .map(|(i, image_path)| {
            let raw = to_hwc(read_npy::<f32>(image_path)?)?;
            let distance = match distances.and_then(|d| d.get(i)) {
                Some(path) => Some(read_npy::<f32>(path)?.into_dimensionality::<Ix2>()?),
                None => None,
            };
            let developed = corrector.develop(&raw, distance.as_ref().map(|d| d.view()))?;

            let file_name = format!("{}.{format}", file_stem(image_path));
            save_output_image(&developed, &out_dir.join(&file_name))?;
            debug!(file = %file_name, "Corrected image written");

            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            on_progress(finished);
            Ok(file_name)
        })
        .collect()
}
