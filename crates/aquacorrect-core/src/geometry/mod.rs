pub mod undistort;

pub use undistort::{CameraCalibration, RectificationMaps};
