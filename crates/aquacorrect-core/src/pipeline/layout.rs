use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::attenuation::parameters::RAW_MEAN_FILE;
use crate::distance::DistanceSource;
use crate::error::{CorrectError, Result};

use super::config::CorrectionMethod;

/// Default name of the output root below the configuration directory.
pub const OUTPUT_ROOT_NAME: &str = "attenuation_correction";

/// Per-camera directories of one correction configuration.
#[derive(Clone, Debug)]
pub struct OutputLayout {
    pub root: PathBuf,
    /// Intermediate `.npy` copies of the source images.
    pub bayer_dir: PathBuf,
    pub distance_dir: PathBuf,
    pub params_dir: PathBuf,
    pub memmap_dir: PathBuf,
    /// Where corrected images and the manifest are written.
    pub developed_dir: PathBuf,
}

/// Sub-directory naming the correction variant.
pub fn sub_directory_name(method: &CorrectionMethod) -> &'static str {
    match method {
        CorrectionMethod::ColourCorrection(cc) => match cc.distance {
            DistanceSource::None => "greyworld_corrected",
            DistanceSource::Altitude { .. } => "altitude_corrected",
            DistanceSource::DepthMap { .. } => "depth_map_corrected",
        },
        CorrectionMethod::ManualBalance(_) => "manually_corrected",
    }
}

/// Leaf folder naming the output targets: `m<brightness>_std<contrast>`
/// for colour correction, `developed_<HHMM>` (local time) for manual balance.
pub fn output_folder_name(method: &CorrectionMethod) -> String {
    match method {
        CorrectionMethod::ColourCorrection(cc) => format!("m{}_std{}", cc.brightness, cc.contrast),
        CorrectionMethod::ManualBalance(_) => format!("developed_{}", Local::now().format("%H%M")),
    }
}

impl OutputLayout {
    pub fn new(root: &Path, camera: &str, method: &CorrectionMethod) -> Self {
        let sub = sub_directory_name(method);
        let folder = output_folder_name(method);
        Self {
            root: root.to_path_buf(),
            bayer_dir: root.join(format!("bayer_{camera}")).join(sub).join(&folder),
            distance_dir: root.join(format!("distance_{camera}")).join(sub).join(&folder),
            params_dir: root.join(format!("params_{camera}")).join(sub),
            memmap_dir: root.join(format!("memmaps_{camera}")),
            developed_dir: root.join(format!("developed_{camera}")).join(sub).join(&folder),
        }
    }

    /// Create the directories shared by both phases.
    pub fn create_common(&self) -> Result<()> {
        for dir in [&self.bayer_dir, &self.distance_dir, &self.memmap_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Parse refuses to overwrite parameters unless `force` is set.
    pub fn prepare_parse(&self, force: bool) -> Result<()> {
        if has_files(&self.params_dir, Some("npy"))? {
            if !force {
                return Err(CorrectError::ParametersExist(self.params_dir.clone()));
            }
            warn!(dir = %self.params_dir.display(), "Overwriting existing parameters for current configuration");
        }
        fs::create_dir_all(&self.params_dir)?;
        Ok(())
    }

    /// Process needs prior parse output and refuses to overwrite corrected
    /// images unless `force` is set.
    pub fn prepare_process(&self, needs_parameters: bool, force: bool) -> Result<()> {
        if needs_parameters {
            if !self.params_dir.join(RAW_MEAN_FILE).exists() {
                return Err(CorrectError::MissingParseOutput(self.params_dir.clone()));
            }
            info!(dir = %self.params_dir.display(), "Found correction parameters for current configuration");
        }
        if has_files(&self.developed_dir, None)? {
            if !force {
                return Err(CorrectError::OutputsExist(self.developed_dir.clone()));
            }
            warn!(dir = %self.developed_dir.display(), "Overwriting existing corrected images for current configuration");
        }
        fs::create_dir_all(&self.developed_dir)?;
        Ok(())
    }
}

/// Whether `dir` holds any file (with `extension`, if given).
fn has_files(dir: &Path, extension: Option<&str>) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = match extension {
            Some(ext) => path.extension().and_then(|e| e.to_str()) == Some(ext),
            None => true,
        };
        if matches {
            return Ok(true);
        }
    }
    Ok(false)
}
