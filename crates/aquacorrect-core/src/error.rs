use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorrectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Calibration file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Invalid NPY file {path}: {reason}")]
    Npy { path: PathBuf, reason: String },

    #[error("Invalid raw image: {0}")]
    InvalidRaw(String),

    #[error("Image index {index} out of range (total: {total})")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("Image shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bayer pattern not supported ({0})")]
    UnsupportedBayerPattern(String),

    #[error("Required file or directory not found: {0}")]
    MissingFile(PathBuf),

    #[error("Insufficient number of images to compute attenuation parameters: {found} admissible, at least {required} required")]
    InsufficientImages { found: usize, required: usize },

    #[error("Parameters exist for current configuration in {0}; run parse with force to overwrite")]
    ParametersExist(PathBuf),

    #[error("Corrected images exist for current configuration in {0}; run process with force to overwrite")]
    OutputsExist(PathBuf),

    #[error("No correction parameters found in {0}; run parse before process for current configuration")]
    MissingParseOutput(PathBuf),

    #[error("Invalid pipeline state: {0}")]
    State(String),

    #[error("Empty image sequence")]
    EmptySequence,
}

pub type Result<T> = std::result::Result<T, CorrectError>;
