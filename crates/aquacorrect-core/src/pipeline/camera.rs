use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::SensorLayout;
use crate::error::{CorrectError, Result};
use crate::frame::RawImage;
use crate::io::image_io::load_image;
use crate::io::xviii::load_xviii;

/// A physical camera of the survey vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraEntry {
    pub name: String,
    /// Sensor type: a Bayer pattern (`rggb`, ...) or `mono`/`grayscale`.
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub bit_depth: u8,
    /// Image file extension without the dot: `tif`, `jpg`, `png` or `raw`.
    pub extension: String,
    /// Image directory, relative to the configuration directory if not
    /// absolute.
    pub path: PathBuf,
    pub image_height: usize,
    pub image_width: usize,
    #[serde(default = "default_channels")]
    pub image_channels: usize,
    /// ROS `camera_info` YAML used for undistortion.
    #[serde(default)]
    pub calibration: Option<PathBuf>,
}

fn default_channels() -> usize {
    1
}

impl CameraEntry {
    pub fn layout(&self) -> Result<SensorLayout> {
        self.sensor_type.parse()
    }

    /// (height, width, channels) of the decoded images.
    pub fn image_dim(&self) -> (usize, usize, usize) {
        (self.image_height, self.image_width, self.image_channels)
    }

    /// Every file below the image directory with this camera's extension,
    /// searched recursively and sorted by path.
    pub fn image_list(&self, base_dir: &Path) -> Result<Vec<PathBuf>> {
        let root = if self.path.is_absolute() {
            self.path.clone()
        } else {
            base_dir.join(&self.path)
        };
        if !root.is_dir() {
            return Err(CorrectError::MissingFile(root));
        }
        let mut images = Vec::new();
        collect_with_extension(&root, &self.extension, &mut images)?;
        images.sort();
        Ok(images)
    }

    /// Decode one source image according to this camera's format.
    pub fn load(&self, path: &Path) -> Result<RawImage> {
        if self.extension.eq_ignore_ascii_case("raw") {
            load_xviii(path, self.image_height, self.image_width)
        } else {
            load_image(path)
        }
    }
}

fn collect_with_extension(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_with_extension(&path, extension, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        {
            out.push(path);
        }
    }
    Ok(())
}
