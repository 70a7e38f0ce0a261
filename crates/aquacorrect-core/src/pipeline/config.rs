use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::{DebayerMethod, ManualBalance, SensorLayout};
use crate::consts::{DEFAULT_TRIM_RATIO, WORKING_BIT_DEPTH};
use crate::distance::{AltitudeFilter, DistanceSource};
use crate::error::{CorrectError, Result};
use crate::stats::SmoothingPolicy;

use super::camera::CameraEntry;

/// Value of `image_file_list` meaning "use every image of the camera".
pub const ALL_IMAGES: &str = "none";

/// Complete correction configuration, as read from the TOML file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrectConfig {
    /// Schema version; files without one are rejected.
    pub version: u32,
    #[serde(default)]
    pub method: MethodKind,
    #[serde(default)]
    pub colour_correction: ColourCorrectionConfig,
    #[serde(default)]
    pub output_settings: OutputSettings,
    #[serde(default)]
    pub cameras: Vec<CameraCorrectionConfig>,
    #[serde(default)]
    pub camera_system: Vec<CameraEntry>,
}

impl Default for CorrectConfig {
    fn default() -> Self {
        Self {
            version: 1,
            method: MethodKind::default(),
            colour_correction: ColourCorrectionConfig::default(),
            output_settings: OutputSettings::default(),
            cameras: Vec::new(),
            camera_system: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    #[default]
    ColourCorrection,
    ManualBalance,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    None,
    #[default]
    Altitude,
    DepthMap,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Smoothing {
    Mean,
    #[default]
    MeanTrimmed,
    Median,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ColourCorrectionConfig {
    pub distance_metric: DistanceMetric,
    /// Navigation CSV with `relative_path` and `altitude [m]`; a directory
    /// is searched for `csv/ekf/auv_ekf_<camera>.csv`.
    pub metric_path: PathBuf,
    /// Directory of per-image depth `.npy` arrays.
    pub depth_map_path: PathBuf,
    pub smoothing: Smoothing,
    /// Total fraction of samples discarded by `mean_trimmed`.
    pub trim_ratio: f64,
    /// Distance the images are corrected to; the mean per-pixel distance
    /// of the admissible images when absent.
    pub target_altitude_m: Option<f64>,
    pub altitude_filter: AltitudeFilter,
}

impl Default for ColourCorrectionConfig {
    fn default() -> Self {
        Self {
            distance_metric: DistanceMetric::default(),
            metric_path: PathBuf::from("json_renav"),
            depth_map_path: PathBuf::from("depth_map"),
            smoothing: Smoothing::default(),
            trim_ratio: DEFAULT_TRIM_RATIO,
            target_altitude_m: None,
            altitude_filter: AltitudeFilter::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub undistort: bool,
    /// Output image format (file extension): `png`, `jpg` or `tif`.
    pub compression_parameter: String,
    pub bit_depth: u8,
    pub debayer: DebayerMethod,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            undistort: false,
            compression_parameter: "png".to_string(),
            bit_depth: WORKING_BIT_DEPTH,
            debayer: DebayerMethod::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrightnessContrast {
    /// Target mean of the corrected image, at 8 bits.
    pub brightness: f64,
    /// Target standard deviation of the corrected image, at 8 bits.
    pub contrast: f64,
}

impl Default for BrightnessContrast {
    fn default() -> Self {
        Self {
            brightness: 30.0,
            contrast: 3.0,
        }
    }
}

/// Per-camera correction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CameraCorrectionConfig {
    pub camera_name: String,
    /// Text file of image names to restrict processing to, or `none`.
    #[serde(default = "default_image_file_list")]
    pub image_file_list: String,
    #[serde(default)]
    pub colour_correction: BrightnessContrast,
    #[serde(default)]
    pub manual_balance: ManualBalance,
}

fn default_image_file_list() -> String {
    ALL_IMAGES.to_string()
}

/// Correction method with exactly the settings it needs.
#[derive(Clone, Debug, PartialEq)]
pub enum CorrectionMethod {
    ColourCorrection(ColourCorrection),
    ManualBalance(ManualBalance),
}

impl CorrectionMethod {
    pub fn is_colour_correction(&self) -> bool {
        matches!(self, Self::ColourCorrection(_))
    }
}

impl std::fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ColourCorrection(cc) => write!(f, "colour correction ({})", cc.distance),
            Self::ManualBalance(_) => write!(f, "manual balance"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColourCorrection {
    pub distance: DistanceSource,
    pub smoothing: SmoothingPolicy,
    pub altitude_filter: AltitudeFilter,
    pub target_altitude_m: Option<f64>,
    pub brightness: f64,
    pub contrast: f64,
}

/// How corrected images are written.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputTarget {
    pub format: String,
    pub bit_depth: u8,
    pub debayer: DebayerMethod,
    /// Calibration file when undistortion is requested.
    pub undistort: Option<PathBuf>,
}

/// Everything needed to correct one camera, validated and with paths made
/// absolute against the configuration directory.
#[derive(Clone, Debug)]
pub struct CameraSettings {
    pub camera: CameraEntry,
    pub layout: SensorLayout,
    pub method: CorrectionMethod,
    /// User subset of image names.
    pub image_file_list: Option<PathBuf>,
    /// Navigation CSV used for altitudes and for trimming to the user subset.
    pub navigation_csv: Option<PathBuf>,
    pub output: OutputTarget,
    pub config_dir: PathBuf,
}

impl CorrectConfig {
    /// Names of the cameras that have correction settings.
    pub fn camera_names(&self) -> Vec<String> {
        self.cameras.iter().map(|c| c.camera_name.clone()).collect()
    }

    /// Validate the configuration for `camera_name` and resolve it into
    /// typed settings. Relative paths are taken from `config_dir`.
    pub fn resolve(&self, camera_name: &str, config_dir: &Path) -> Result<CameraSettings> {
        let camera = self
            .camera_system
            .iter()
            .find(|c| c.name == camera_name)
            .cloned()
            .ok_or_else(|| {
                CorrectError::Config(format!("camera '{camera_name}' is not in camera_system"))
            })?;
        let per_camera = self
            .cameras
            .iter()
            .find(|c| c.camera_name == camera_name)
            .ok_or_else(|| {
                CorrectError::Config(format!("no correction settings for camera '{camera_name}'"))
            })?;

        let layout = camera.layout()?;
        if camera.image_height == 0 || camera.image_width == 0 {
            return Err(CorrectError::Config(format!(
                "camera '{camera_name}' has an empty image size"
            )));
        }
        if camera.image_channels != 1 && camera.image_channels != 3 {
            return Err(CorrectError::Config(format!(
                "camera '{camera_name}' must have 1 or 3 channels, got {}",
                camera.image_channels
            )));
        }

        let output = self.output_target(&camera, config_dir)?;
        let cc = &self.colour_correction;
        let navigation_csv = resolve_metric_csv(&config_dir.join(&cc.metric_path), camera_name);

        let (method, navigation_csv, image_file_list) = match self.method {
            MethodKind::ColourCorrection => {
                if !(cc.altitude_filter.max_m > cc.altitude_filter.min_m) {
                    return Err(CorrectError::Config(format!(
                        "altitude_filter max_m ({}) must exceed min_m ({})",
                        cc.altitude_filter.max_m, cc.altitude_filter.min_m
                    )));
                }
                if !(0.0..1.0).contains(&cc.trim_ratio) {
                    return Err(CorrectError::Config(format!(
                        "trim_ratio must be in [0, 1), got {}",
                        cc.trim_ratio
                    )));
                }
                let smoothing = match cc.smoothing {
                    Smoothing::Mean => SmoothingPolicy::Mean,
                    Smoothing::MeanTrimmed => SmoothingPolicy::MeanTrimmed {
                        ratio: cc.trim_ratio,
                    },
                    Smoothing::Median => SmoothingPolicy::Median,
                };
                let distance = match cc.distance_metric {
                    DistanceMetric::None => DistanceSource::None,
                    DistanceMetric::Altitude => DistanceSource::Altitude {
                        csv: navigation_csv.clone(),
                    },
                    DistanceMetric::DepthMap => DistanceSource::DepthMap {
                        dir: config_dir.join(&cc.depth_map_path),
                    },
                };
                let image_file_list = (!per_camera.image_file_list.eq_ignore_ascii_case(ALL_IMAGES))
                    .then(|| config_dir.join(&per_camera.image_file_list));
                let method = CorrectionMethod::ColourCorrection(ColourCorrection {
                    distance,
                    smoothing,
                    altitude_filter: cc.altitude_filter,
                    target_altitude_m: cc.target_altitude_m,
                    brightness: per_camera.colour_correction.brightness,
                    contrast: per_camera.colour_correction.contrast,
                });
                (method, Some(navigation_csv), image_file_list)
            }
            MethodKind::ManualBalance => (
                CorrectionMethod::ManualBalance(per_camera.manual_balance.clone()),
                None,
                None,
            ),
        };

        Ok(CameraSettings {
            camera,
            layout,
            method,
            image_file_list,
            navigation_csv,
            output,
            config_dir: config_dir.to_path_buf(),
        })
    }

    fn output_target(&self, camera: &CameraEntry, config_dir: &Path) -> Result<OutputTarget> {
        let settings = &self.output_settings;
        let format = settings.compression_parameter.to_ascii_lowercase();
        if !matches!(format.as_str(), "png" | "jpg" | "jpeg" | "tif" | "tiff") {
            return Err(CorrectError::Config(format!(
                "unsupported output format '{}'",
                settings.compression_parameter
            )));
        }
        match settings.bit_depth {
            8 => {}
            16 if !matches!(format.as_str(), "jpg" | "jpeg") => {}
            16 => {
                return Err(CorrectError::Config(
                    "JPEG output cannot hold 16-bit images".into(),
                ))
            }
            other => {
                return Err(CorrectError::Config(format!(
                    "output bit_depth must be 8 or 16, got {other}"
                )))
            }
        }
        let undistort = settings.undistort.then(|| {
            camera
                .calibration
                .as_ref()
                .map(|p| config_dir.join(p))
                .unwrap_or_else(|| {
                    config_dir
                        .join("calibration")
                        .join(format!("mono{}.yaml", camera.name))
                })
        });
        Ok(OutputTarget {
            format,
            bit_depth: settings.bit_depth,
            debayer: settings.debayer,
            undistort,
        })
    }
}

/// A metric path naming a directory points at the per-camera EKF export.
fn resolve_metric_csv(metric_path: &Path, camera_name: &str) -> PathBuf {
    if metric_path.is_dir() {
        metric_path
            .join("csv")
            .join("ekf")
            .join(format!("auv_ekf_{camera_name}.csv"))
    } else {
        metric_path.to_path_buf()
    }
}
