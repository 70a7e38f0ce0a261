use std::fs;
use std::path::{Path, PathBuf};

use aquacorrect_core::attenuation::exp_curve;
use aquacorrect_core::color::ManualBalance;
use aquacorrect_core::pipeline::camera::CameraEntry;
use aquacorrect_core::pipeline::config::{
    BrightnessContrast, CameraCorrectionConfig, DistanceMetric, MethodKind, ALL_IMAGES,
};
use aquacorrect_core::pipeline::CorrectConfig;
use image::{ImageBuffer, Luma};

pub const CAMERA: &str = "cam0";
pub const HEIGHT: usize = 16;
pub const WIDTH: usize = 16;
/// Relative image directory inside a survey fixture.
pub const IMAGE_DIR: &str = "raw/cam0";
pub const NAV_CSV: &str = "nav/auv_ekf_cam0.csv";

/// Attenuation of the synthetic scene: `A * exp(B * altitude)`.
pub const SCENE_A: f64 = 40_000.0;
pub const SCENE_B: f64 = -0.4;

/// Write a 16-bit greyscale TIFF from row-major values.
pub fn write_tiff16(path: &Path, width: usize, height: usize, values: &[u16]) {
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(width as u32, height as u32, values.to_vec()).unwrap();
    img.save(path).unwrap();
}

/// A flat-bottom scene seen from `altitude`, with a fixed spatial texture
/// so that per-pixel statistics are not degenerate.
pub fn scene_pixels(altitude: f64, width: usize, height: usize) -> Vec<u16> {
    let level = exp_curve(altitude, SCENE_A, SCENE_B, 0.0);
    (0..height * width)
        .map(|i| {
            let (r, c) = (i / width, i % width);
            let texture = 0.8 + 0.05 * ((r * 3 + c * 5) % 9) as f64;
            (level * texture).round().clamp(0.0, 65_535.0) as u16
        })
        .collect()
}

/// Survey fixture on disk: TIFF images, a navigation CSV and a config.
pub struct Survey {
    pub root: PathBuf,
    pub altitudes: Vec<f64>,
    pub config: CorrectConfig,
}

impl Survey {
    /// Images `img_000.tif`, `img_001.tif`, ... with one navigation row each.
    pub fn create(root: &Path, altitudes: &[f64]) -> Self {
        let image_dir = root.join(IMAGE_DIR);
        fs::create_dir_all(&image_dir).unwrap();
        fs::create_dir_all(root.join("nav")).unwrap();

        let mut csv = String::from("timestamp,relative_path,altitude [m]\n");
        for (i, &altitude) in altitudes.iter().enumerate() {
            let name = image_name(i);
            write_tiff16(
                &image_dir.join(&name),
                WIDTH,
                HEIGHT,
                &scene_pixels(altitude, WIDTH, HEIGHT),
            );
            csv.push_str(&format!("{},{IMAGE_DIR}/{name},{altitude}\n", 1000 + i));
        }
        fs::write(root.join(NAV_CSV), csv).unwrap();

        Self {
            root: root.to_path_buf(),
            altitudes: altitudes.to_vec(),
            config: survey_config("rggb"),
        }
    }

    pub fn output_root(&self) -> PathBuf {
        self.root.join("attenuation_correction")
    }

    /// Remove the navigation row of one image, leaving the image in place.
    pub fn drop_navigation_row(&self, image: &str) {
        let path = self.root.join(NAV_CSV);
        let kept: Vec<String> = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .filter(|l| !l.contains(&format!("/{image},")))
            .map(str::to_string)
            .collect();
        fs::write(path, kept.join("\n") + "\n").unwrap();
    }
}

pub fn image_name(index: usize) -> String {
    format!("img_{index:03}.tif")
}

/// Colour-correction config for the survey fixture, altitude metric.
pub fn survey_config(sensor_type: &str) -> CorrectConfig {
    let mut config = CorrectConfig::default();
    config.method = MethodKind::ColourCorrection;
    config.colour_correction.distance_metric = DistanceMetric::Altitude;
    config.colour_correction.metric_path = PathBuf::from(NAV_CSV);
    config.colour_correction.altitude_filter.min_m = 0.5;
    config.colour_correction.altitude_filter.max_m = 6.0;
    config.cameras = vec![CameraCorrectionConfig {
        camera_name: CAMERA.to_string(),
        image_file_list: ALL_IMAGES.to_string(),
        colour_correction: BrightnessContrast::default(),
        manual_balance: ManualBalance::default(),
    }];
    config.camera_system = vec![camera_entry(sensor_type)];
    config
}

pub fn camera_entry(sensor_type: &str) -> CameraEntry {
    CameraEntry {
        name: CAMERA.to_string(),
        sensor_type: sensor_type.to_string(),
        bit_depth: 16,
        extension: "tif".to_string(),
        path: PathBuf::from(IMAGE_DIR),
        image_height: HEIGHT,
        image_width: WIDTH,
        image_channels: 1,
        calibration: None,
    }
}

/// Evenly spaced altitudes `start, start + step, ...`.
pub fn altitude_ramp(start: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start + step * i as f64).collect()
}

/// Files in `dir` with `extension`, sorted by name.
pub fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();
    files.sort();
    files
}
