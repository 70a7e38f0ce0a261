use std::fs;
use std::path::Path;

use ndarray::{Array3, Array4, Ix3, Ix4};
use tracing::info;

use crate::error::{CorrectError, Result};
use crate::io::npy::{read_npy, write_npy};

pub const ATTENUATION_PARAMETERS_FILE: &str = "attenuation_parameters.npy";
pub const CORRECTION_GAINS_FILE: &str = "correction_gains.npy";
pub const CORRECTED_MEAN_FILE: &str = "image_corrected_mean.npy";
pub const CORRECTED_STD_FILE: &str = "image_corrected_std.npy";
pub const RAW_MEAN_FILE: &str = "image_raw_mean.npy";
pub const RAW_STD_FILE: &str = "image_raw_std.npy";

/// Distance-model outputs of the parse phase.
#[derive(Clone, Debug)]
pub struct AttenuationModel {
    /// (channels, height, width, 3).
    pub parameters: Array4<f64>,
    /// (channels, height, width).
    pub gains: Array3<f64>,
    pub corrected_mean: Array3<f64>,
    pub corrected_std: Array3<f64>,
}

/// Everything the process phase needs from the parse phase.
#[derive(Clone, Debug)]
pub struct ParameterSet {
    /// (channels, height, width).
    pub raw_mean: Array3<f64>,
    pub raw_std: Array3<f64>,
    /// Present only when a distance metric was used.
    pub attenuation: Option<AttenuationModel>,
}

impl ParameterSet {
    /// (channels, height, width) of the per-pixel statistics.
    pub fn dim(&self) -> (usize, usize, usize) {
        self.raw_mean.dim()
    }

    /// Write every array under its fixed file name in `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        if let Some(model) = &self.attenuation {
            write_npy(&dir.join(ATTENUATION_PARAMETERS_FILE), &model.parameters)?;
            write_npy(&dir.join(CORRECTION_GAINS_FILE), &model.gains)?;
            write_npy(&dir.join(CORRECTED_MEAN_FILE), &model.corrected_mean)?;
            write_npy(&dir.join(CORRECTED_STD_FILE), &model.corrected_std)?;
        }
        write_npy(&dir.join(RAW_MEAN_FILE), &self.raw_mean)?;
        write_npy(&dir.join(RAW_STD_FILE), &self.raw_std)?;
        info!(dir = %dir.display(), attenuation = self.attenuation.is_some(), "Correction parameters saved");
        Ok(())
    }

    /// Load a parameter set written by [`ParameterSet::save`].
    ///
    /// The raw statistics are mandatory; the attenuation model is loaded if
    /// its parameter file is present.
    pub fn load(dir: &Path) -> Result<Self> {
        let raw_mean_path = dir.join(RAW_MEAN_FILE);
        if !raw_mean_path.exists() {
            return Err(CorrectError::MissingParseOutput(dir.to_path_buf()));
        }
        let raw_mean = load3(&raw_mean_path)?;
        let raw_std = load3(&dir.join(RAW_STD_FILE))?;

        let parameters_path = dir.join(ATTENUATION_PARAMETERS_FILE);
        let attenuation = if parameters_path.exists() {
            let parameters = read_npy::<f64>(&parameters_path)?.into_dimensionality::<Ix4>()?;
            Some(AttenuationModel {
                parameters,
                gains: load3(&dir.join(CORRECTION_GAINS_FILE))?,
                corrected_mean: load3(&dir.join(CORRECTED_MEAN_FILE))?,
                corrected_std: load3(&dir.join(CORRECTED_STD_FILE))?,
            })
        } else {
            None
        };

        let set = Self {
            raw_mean,
            raw_std,
            attenuation,
        };
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<()> {
        let dim = self.dim();
        let check = |actual: (usize, usize, usize)| {
            if actual == dim {
                Ok(())
            } else {
                Err(CorrectError::ShapeMismatch {
                    expected: dim,
                    actual,
                })
            }
        };
        check(self.raw_std.dim())?;
        if let Some(model) = &self.attenuation {
            let (c, h, w, k) = model.parameters.dim();
            if k != 3 {
                return Err(CorrectError::Config(format!(
                    "attenuation parameters must hold 3 coefficients per pixel, found {k}"
                )));
            }
            check((c, h, w))?;
            check(model.gains.dim())?;
            check(model.corrected_mean.dim())?;
            check(model.corrected_std.dim())?;
        }
        Ok(())
    }
}

fn load3(path: &Path) -> Result<Array3<f64>> {
    if !path.exists() {
        return Err(CorrectError::MissingFile(path.to_path_buf()));
    }
    Ok(read_npy::<f64>(path)?.into_dimensionality::<Ix3>()?)
}
