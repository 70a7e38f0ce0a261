use std::path::PathBuf;

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    DistanceMatrices,
    Decoding,
    LoadingStack,
    Statistics,
    BinSampling,
    CurveFitting,
    ApplyingGains,
    Correcting,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DistanceMatrices => write!(f, "Writing distance matrices"),
            Self::Decoding => write!(f, "Decoding images"),
            Self::LoadingStack => write!(f, "Loading memmap"),
            Self::Statistics => write!(f, "Computing statistics"),
            Self::BinSampling => write!(f, "Sampling distance bins"),
            Self::CurveFitting => write!(f, "Curve fitting"),
            Self::ApplyingGains => write!(f, "Applying attenuation corrections"),
            Self::Correcting => write!(f, "Correcting images"),
        }
    }
}

/// Phase a corrector is being set up for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Parse,
    Process,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// What the parse phase produced for one camera.
#[derive(Clone, Debug)]
pub struct ParseSummary {
    pub camera: String,
    pub images: usize,
    /// Images used for estimation (all images without a distance metric).
    pub admissible: usize,
    /// Non-empty distance bins per fitted channel.
    pub bins: usize,
    /// Pixels (over all channels) left at fallback coefficients.
    pub fallbacks: usize,
    pub channels: usize,
    pub parameters_dir: PathBuf,
}

/// What the process phase produced for one camera.
#[derive(Clone, Debug)]
pub struct ProcessSummary {
    pub camera: String,
    pub images: usize,
    pub output_dir: PathBuf,
    pub manifest: PathBuf,
    pub undistorted: bool,
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// work items in this stage (e.g., image count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// Work items within the current stage have completed; `items_done` is
    /// the running total.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Progress reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
