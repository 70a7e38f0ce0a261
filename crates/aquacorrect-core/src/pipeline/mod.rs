pub mod camera;
pub mod config;
pub mod layout;
mod batch;
mod corrector;
mod orchestrator;
mod types;

pub use batch::correct_images;
pub use camera::CameraEntry;
pub use config::{CameraSettings, CorrectConfig, CorrectionMethod};
pub use corrector::ImageCorrector;
pub use layout::{OutputLayout, OUTPUT_ROOT_NAME};
pub use orchestrator::{Corrector, CorrectorState};
pub use types::{NoOpReporter, ParseSummary, Phase, PipelineStage, ProcessSummary, ProgressReporter};
