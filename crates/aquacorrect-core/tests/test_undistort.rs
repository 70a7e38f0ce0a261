use std::fs;

use approx::assert_abs_diff_eq;
use ndarray::Array3;
use tempfile::TempDir;

use aquacorrect_core::error::CorrectError;
use aquacorrect_core::geometry::undistort::YamlMatrix;
use aquacorrect_core::geometry::{CameraCalibration, RectificationMaps};

const CALIBRATION_YAML: &str = "\
image_width: 8
image_height: 6
camera_name: mono_cam0
camera_matrix:
  rows: 3
  cols: 3
  data: [20.0, 0.0, 4.0, 0.0, 20.0, 3.0, 0.0, 0.0, 1.0]
distortion_model: plumb_bob
distortion_coefficients:
  rows: 1
  cols: 5
  data: [-0.2, 0.05, 0.001, 0.0, 0.0]
rectification_matrix:
  rows: 3
  cols: 3
  data: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
projection_matrix:
  rows: 3
  cols: 4
  data: [20.0, 0.0, 4.0, 0.0, 0.0, 20.0, 3.0, 0.0, 0.0, 0.0, 1.0, 0.0]
";

fn pinhole(width: usize, height: usize, distortion: Vec<f64>) -> CameraCalibration {
    CameraCalibration {
        image_width: width,
        image_height: height,
        camera_name: None,
        camera_matrix: YamlMatrix {
            rows: 3,
            cols: 3,
            data: vec![10.0, 0.0, 4.0, 0.0, 10.0, 3.0, 0.0, 0.0, 1.0],
        },
        distortion_model: "plumb_bob".to_string(),
        distortion_coefficients: YamlMatrix {
            rows: 1,
            cols: distortion.len(),
            data: distortion,
        },
        rectification_matrix: None,
        projection_matrix: None,
    }
}

fn gradient(height: usize, width: usize, channels: usize) -> Array3<f32> {
    Array3::from_shape_fn((height, width, channels), |(r, c, k)| {
        (r * 10 + c) as f32 + 100.0 * k as f32
    })
}

#[test]
fn test_calibration_yaml_parses() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("mono_cam0.yaml");
    fs::write(&path, CALIBRATION_YAML).unwrap();

    let calibration = CameraCalibration::from_yaml_file(&path).unwrap();
    assert_eq!((calibration.image_width, calibration.image_height), (8, 6));
    assert_eq!(calibration.camera_name.as_deref(), Some("mono_cam0"));
    assert_eq!(calibration.distortion_coefficients.data.len(), 5);
    assert_eq!(calibration.projection_matrix.as_ref().unwrap().cols, 4);

    let maps = RectificationMaps::new(&calibration).unwrap();
    assert_eq!(maps.dim(), (6, 8));
}

#[test]
fn test_missing_calibration_file() {
    let tmp = TempDir::new().unwrap();
    let err = CameraCalibration::from_yaml_file(&tmp.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, CorrectError::MissingFile(_)));
}

#[test]
fn test_zero_distortion_is_identity() {
    let maps = RectificationMaps::new(&pinhole(8, 6, vec![0.0; 5])).unwrap();
    for ((v, u), x) in maps.map_x.indexed_iter() {
        assert_abs_diff_eq!(*x, u as f32, epsilon = 1e-4);
        assert_abs_diff_eq!(maps.map_y[[v, u]], v as f32, epsilon = 1e-4);
    }

    let image = gradient(6, 8, 3);
    let out = maps.remap(&image).unwrap();
    for (a, b) in out.iter().zip(image.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-2);
    }
}

#[test]
fn test_barrel_distortion_pulls_towards_centre() {
    let maps = RectificationMaps::new(&pinhole(8, 6, vec![-0.3, 0.0, 0.0, 0.0])).unwrap();
    // The principal point is fixed; corners sample closer to it.
    assert_abs_diff_eq!(maps.map_x[[3, 4]], 4.0, epsilon = 1e-4);
    assert_abs_diff_eq!(maps.map_y[[3, 4]], 3.0, epsilon = 1e-4);
    assert!(maps.map_x[[0, 0]] > 0.0);
    assert!(maps.map_y[[0, 0]] > 0.0);
}

#[test]
fn test_remap_size_mismatch() {
    let maps = RectificationMaps::new(&pinhole(8, 6, vec![0.0; 5])).unwrap();
    let err = maps.remap(&gradient(4, 4, 1)).unwrap_err();
    assert!(matches!(err, CorrectError::ShapeMismatch { .. }));
}

#[test]
fn test_unsupported_distortion_model() {
    let mut calibration = pinhole(8, 6, vec![0.0; 4]);
    calibration.distortion_model = "equidistant".to_string();
    assert!(matches!(
        RectificationMaps::new(&calibration),
        Err(CorrectError::Config(_))
    ));
}
