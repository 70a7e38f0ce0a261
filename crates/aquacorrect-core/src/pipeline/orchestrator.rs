use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{Array2, Array3, Array4, Axis};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::attenuation::estimator::{
    apply_corrections, assign_bins, bin_edges, bin_samples, correction_gains, fit_channel,
    set_channel,
};
use crate::attenuation::{AttenuationModel, ParameterSet};
use crate::distance::{generate_distance_matrices, DistanceMatrices, DistanceSource};
use crate::error::{CorrectError, Result};
use crate::geometry::{CameraCalibration, RectificationMaps};
use crate::io::image_io::file_stem;
use crate::io::manifest::{write_manifest, MANIFEST_FILE_NAME};
use crate::io::memmap::{purge_stale_maps, ArrayStack};
use crate::io::navigation::{read_image_name_list, read_navigation, trim_navigation_csv};
use crate::io::npy::write_npy;
use crate::stats::{channel_mean, channel_mean_std, item_means};

use super::batch::correct_images;
use super::config::{CameraSettings, ColourCorrection, CorrectConfig, CorrectionMethod};
use super::corrector::ImageCorrector;
use super::layout::OutputLayout;
use super::types::{
    NoOpReporter, ParseSummary, Phase, PipelineStage, ProcessSummary, ProgressReporter,
};

/// Lifecycle of a [`Corrector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrectorState {
    Uninitialized,
    Configured(Phase),
    Parsed,
    Processed,
}

impl std::fmt::Display for CorrectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Configured(phase) => write!(f, "configured for {phase}"),
            Self::Parsed => write!(f, "parsed"),
            Self::Processed => write!(f, "processed"),
        }
    }
}

/// Working set produced by [`Corrector::setup`].
struct Session {
    settings: CameraSettings,
    layout: OutputLayout,
    /// Intermediate `.npy` images, in working-list order.
    images: Vec<PathBuf>,
    distances: DistanceMatrices,
}

/// Runs the parse and process phases for one camera.
pub struct Corrector {
    config: CorrectConfig,
    camera_name: String,
    config_dir: PathBuf,
    output_root: PathBuf,
    force: bool,
    reporter: Arc<dyn ProgressReporter>,
    state: CorrectorState,
    session: Option<Session>,
}

impl Corrector {
    /// `config_dir` anchors every relative path of `config`; outputs go
    /// below `output_root`.
    pub fn new(
        config: CorrectConfig,
        camera_name: impl Into<String>,
        config_dir: &Path,
        output_root: &Path,
        force: bool,
    ) -> Self {
        Self {
            config,
            camera_name: camera_name.into(),
            config_dir: config_dir.to_path_buf(),
            output_root: output_root.to_path_buf(),
            force,
            reporter: Arc::new(NoOpReporter),
            state: CorrectorState::Uninitialized,
            session: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state(&self) -> CorrectorState {
        self.state
    }

    pub fn camera_name(&self) -> &str {
        &self.camera_name
    }

    /// Resolved settings, available once set up.
    pub fn settings(&self) -> Option<&CameraSettings> {
        self.session.as_ref().map(|s| &s.settings)
    }

    pub fn layout(&self) -> Option<&OutputLayout> {
        self.session.as_ref().map(|s| &s.layout)
    }

    /// Resolve the camera, build the working image list and directories,
    /// write distance matrices and materialise the intermediate images.
    pub fn setup(&mut self, phase: Phase) -> Result<()> {
        let allowed = match phase {
            Phase::Parse => self.state == CorrectorState::Uninitialized,
            Phase::Process => matches!(
                self.state,
                CorrectorState::Uninitialized | CorrectorState::Parsed
            ),
        };
        if !allowed {
            return Err(CorrectError::State(format!(
                "cannot set up for {phase} while {}",
                self.state
            )));
        }

        let mut settings = self.config.resolve(&self.camera_name, &self.config_dir)?;
        info!(camera = %self.camera_name, method = %settings.method, %phase, "Setting up corrector");

        let mut sources = settings.camera.image_list(&self.config_dir)?;
        if let Some(list) = settings.image_file_list.clone() {
            self.restrict_to_user_list(&mut settings, &mut sources, &list)?;
        }
        if sources.is_empty() {
            return Err(CorrectError::Config(format!(
                "no .{} images found for camera '{}'",
                settings.camera.extension, self.camera_name
            )));
        }

        let layout = OutputLayout::new(&self.output_root, &self.camera_name, &settings.method);
        layout.create_common()?;
        match phase {
            Phase::Parse => layout.prepare_parse(self.force)?,
            Phase::Process => {
                layout.prepare_process(settings.method.is_colour_correction(), self.force)?
            }
        }

        let mut stems: Vec<String> = sources.iter().map(|p| file_stem(p)).collect();
        let distances = match &settings.method {
            CorrectionMethod::ColourCorrection(cc) => {
                let (h, w, _) = settings.camera.image_dim();
                self.reporter
                    .begin_stage(PipelineStage::DistanceMatrices, Some(stems.len()));
                let matrices = generate_distance_matrices(
                    &cc.distance,
                    &stems,
                    (h, w),
                    &cc.altitude_filter,
                    &layout.distance_dir,
                    |done| self.reporter.advance(done),
                )?;
                self.reporter.finish_stage();
                matrices
            }
            CorrectionMethod::ManualBalance(_) => DistanceMatrices::default(),
        };
        if !distances.is_empty() && distances.files.len() < sources.len() {
            warn!(
                images = sources.len(),
                distances = distances.files.len(),
                "Fewer distance matrices than images; dropping images without one"
            );
            sources.truncate(distances.files.len());
            stems.truncate(distances.files.len());
        }

        let images = self.materialise_images(&settings, &layout, &sources, &stems)?;

        self.session = Some(Session {
            settings,
            layout,
            images,
            distances,
        });
        self.state = CorrectorState::Configured(phase);
        Ok(())
    }

    /// Estimate the correction parameters and save them to the parameter
    /// directory.
    pub fn parse(&mut self) -> Result<ParseSummary> {
        if self.state != CorrectorState::Configured(Phase::Parse) {
            return Err(CorrectError::State(format!(
                "parse requires setup for parse, corrector is {}",
                self.state
            )));
        }
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| CorrectError::State("corrector has no session".into()))?;
        let (h, w, channels) = session.settings.camera.image_dim();

        let summary = match &session.settings.method {
            CorrectionMethod::ColourCorrection(cc) => {
                self.estimate_parameters(session, cc)?
            }
            CorrectionMethod::ManualBalance(_) => {
                info!(camera = %self.camera_name, "Manual balance has no parameters to estimate");
                ParseSummary {
                    camera: self.camera_name.clone(),
                    images: session.images.len(),
                    admissible: 0,
                    bins: 0,
                    fallbacks: 0,
                    channels,
                    parameters_dir: session.layout.params_dir.clone(),
                }
            }
        };
        info!(
            camera = %summary.camera,
            height = h,
            width = w,
            channels,
            bins = summary.bins,
            fallbacks = summary.fallbacks,
            "Parse complete"
        );
        self.state = CorrectorState::Parsed;
        Ok(summary)
    }

    /// Correct every image of the working list and write the manifest.
    pub fn process(&mut self) -> Result<ProcessSummary> {
        if self.state != CorrectorState::Configured(Phase::Process) {
            return Err(CorrectError::State(format!(
                "process requires setup for process, corrector is {}",
                self.state
            )));
        }
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| CorrectError::State("corrector has no session".into()))?;
        let settings = &session.settings;
        let layout = &session.layout;

        let parameters = if settings.method.is_colour_correction() {
            Some(ParameterSet::load(&layout.params_dir)?)
        } else {
            None
        };
        let maps = match &settings.output.undistort {
            Some(path) if path.exists() => {
                let calibration = CameraCalibration::from_yaml_file(path)?;
                Some(RectificationMaps::new(&calibration)?)
            }
            Some(path) => {
                warn!(
                    calibration = %path.display(),
                    "Calibration file not found; images will not be undistorted"
                );
                None
            }
            None => None,
        };

        let corrector = ImageCorrector::new(settings, parameters.as_ref(), maps)?;
        let distances =
            (!session.distances.is_empty()).then_some(session.distances.files.as_slice());

        self.reporter
            .begin_stage(PipelineStage::Correcting, Some(session.images.len()));
        let file_names = correct_images(
            &corrector,
            &session.images,
            distances,
            &layout.developed_dir,
            &settings.output.format,
            |done| self.reporter.advance(done),
        )?;
        self.reporter.finish_stage();

        let manifest = layout.developed_dir.join(MANIFEST_FILE_NAME);
        write_manifest(&manifest, &file_names)?;
        info!(
            camera = %self.camera_name,
            images = file_names.len(),
            output = %layout.developed_dir.display(),
            "Images corrected"
        );

        let summary = ProcessSummary {
            camera: self.camera_name.clone(),
            images: file_names.len(),
            output_dir: layout.developed_dir.clone(),
            manifest,
            undistorted: corrector.undistorts(),
        };
        self.state = CorrectorState::Processed;
        Ok(summary)
    }

    /// Keep only the listed images and trim the navigation CSV to match.
    fn restrict_to_user_list(
        &self,
        settings: &mut CameraSettings,
        sources: &mut Vec<PathBuf>,
        list: &Path,
    ) -> Result<()> {
        if !list.exists() {
            return Err(CorrectError::MissingFile(list.to_path_buf()));
        }
        let names = read_image_name_list(list)?;
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        sources.retain(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| wanted.contains(n))
        });
        if sources.len() < names.len() {
            warn!(
                listed = names.len(),
                found = sources.len(),
                "Some listed images were not found in the image directory"
            );
        }
        info!(list = %list.display(), images = sources.len(), "Using user image list");

        if let CorrectionMethod::ColourCorrection(ColourCorrection {
            distance: DistanceSource::Altitude { csv },
            ..
        }) = &mut settings.method
        {
            let trimmed = settings
                .config_dir
                .join(format!("trimmed_csv_{}.csv", self.camera_name));
            let present: Vec<String> = sources
                .iter()
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
                .collect();
            let kept = trim_navigation_csv(&present, csv, &trimmed)?;
            info!(rows = kept, csv = %trimmed.display(), "Navigation trimmed to user image list");

            // Altitudes pair with images by row, so sources follow the trimmed rows.
            let mut by_name: HashMap<String, PathBuf> = sources
                .drain(..)
                .filter_map(|p| {
                    let name = p.file_name().and_then(|n| n.to_str())?.to_string();
                    Some((name, p))
                })
                .collect();
            for record in read_navigation(&trimmed)? {
                if let Some(path) = by_name.remove(record.image_name()) {
                    sources.push(path);
                }
            }
            if !by_name.is_empty() {
                let mut missing: Vec<String> = by_name.into_keys().collect();
                missing.sort();
                warn!(
                    ?missing,
                    "Listed images without a navigation row were dropped"
                );
            }
            *csv = trimmed.clone();
            settings.navigation_csv = Some(trimmed);
        }
        Ok(())
    }

    /// Decode every source image into `<stem>.npy` below the bayer
    /// directory. Existing files are reused unless forcing.
    fn materialise_images(
        &self,
        settings: &CameraSettings,
        layout: &OutputLayout,
        sources: &[PathBuf],
        stems: &[String],
    ) -> Result<Vec<PathBuf>> {
        let expected = settings.camera.image_dim();
        let done = AtomicUsize::new(0);
        let reused = AtomicUsize::new(0);
        self.reporter
            .begin_stage(PipelineStage::Decoding, Some(sources.len()));

        let images = sources
            .par_iter()
            .zip(stems.par_iter())
            .map(|(source, stem)| {
                let target = layout.bayer_dir.join(format!("{stem}.npy"));
                if target.exists() && !self.force {
                    reused.fetch_add(1, Ordering::Relaxed);
                } else {
                    let raw = settings.camera.load(source)?;
                    if raw.data.dim() != expected {
                        return Err(CorrectError::ShapeMismatch {
                            expected,
                            actual: raw.data.dim(),
                        });
                    }
                    if raw.channels() == 1 {
                        write_npy(&target, &raw.channel(0))?;
                    } else {
                        write_npy(&target, &raw.data)?;
                    }
                }
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                self.reporter.advance(finished);
                Ok(target)
            })
            .collect::<Result<Vec<_>>>()?;

        self.reporter.finish_stage();
        info!(
            images = images.len(),
            reused = reused.load(Ordering::Relaxed),
            dir = %layout.bayer_dir.display(),
            "Intermediate images ready"
        );
        Ok(images)
    }

    /// Fit the attenuation model on the admissible images and compute the
    /// statistics the process phase normalises against.
    fn estimate_parameters(&self, session: &Session, cc: &ColourCorrection) -> Result<ParseSummary> {
        let layout = &session.layout;
        let (h, w, channels) = session.settings.camera.image_dim();
        purge_stale_maps(&layout.memmap_dir)?;

        let (image_files, distance_files): (Vec<PathBuf>, Vec<PathBuf>) =
            if session.distances.is_empty() {
                (session.images.clone(), Vec::new())
            } else {
                session
                    .distances
                    .admissible
                    .iter()
                    .map(|&i| (session.images[i].clone(), session.distances.files[i].clone()))
                    .unzip()
            };

        self.reporter
            .begin_stage(PipelineStage::LoadingStack, Some(image_files.len()));
        let mut image_stack =
            ArrayStack::from_npy_files(&layout.memmap_dir, &image_files, |done| {
                self.reporter.advance(done)
            })?;
        self.reporter.finish_stage();
        if image_stack.item_dim() != (h, w, channels) {
            return Err(CorrectError::ShapeMismatch {
                expected: (h, w, channels),
                actual: image_stack.item_dim(),
            });
        }

        self.reporter
            .begin_stage(PipelineStage::Statistics, Some(channels));
        let (raw_mean, raw_std) = stack_statistics(&image_stack, channels, (h, w), |done| {
            self.reporter.advance(done)
        })?;
        self.reporter.finish_stage();

        let mut summary = ParseSummary {
            camera: self.camera_name.clone(),
            images: session.images.len(),
            admissible: image_files.len(),
            bins: 0,
            fallbacks: 0,
            channels,
            parameters_dir: layout.params_dir.clone(),
        };

        if distance_files.is_empty() {
            let parameters = ParameterSet {
                raw_mean,
                raw_std,
                attenuation: None,
            };
            parameters.save(&layout.params_dir)?;
            return Ok(summary);
        }

        let distance_stack =
            ArrayStack::from_npy_files(&layout.memmap_dir, &distance_files, |_| {})?;
        let target = match cc.target_altitude_m {
            Some(altitude) => Array2::from_elem((h, w), altitude),
            None => channel_mean(&distance_stack, 0)?,
        };

        // Bins span the admissible band, not the observed distances.
        let means = item_means(&distance_stack)?;
        let (lo, hi) = (cc.altitude_filter.min_m, cc.altitude_filter.max_m);
        let edges = bin_edges(lo, hi);
        let bins = assign_bins(&means, &edges);
        summary.bins = bins.iter().filter(|b| !b.is_empty()).count();
        if summary.bins == 0 {
            return Err(CorrectError::InsufficientImages {
                found: 0,
                required: 1,
            });
        }
        info!(
            min_m = lo,
            max_m = hi,
            bins = summary.bins,
            "Distance bins assigned"
        );

        let mut parameters = Array4::<f64>::zeros((channels, h, w, 3));
        let mut gains = Array3::<f64>::zeros((channels, h, w));
        for channel in 0..channels {
            self.reporter
                .begin_stage(PipelineStage::BinSampling, Some(bins.len()));
            let samples = bin_samples(
                &image_stack,
                &distance_stack,
                channel,
                &bins,
                cc.smoothing,
                |done| self.reporter.advance(done),
            )?;
            self.reporter.finish_stage();

            self.reporter
                .begin_stage(PipelineStage::CurveFitting, Some(h * w));
            let fitted = fit_channel(&samples, |done| self.reporter.advance(done))?;
            self.reporter.finish_stage();
            if fitted.fallbacks > 0 {
                warn!(
                    channel,
                    pixels = fitted.fallbacks,
                    "Curve fit fell back to unoptimised coefficients"
                );
            }
            summary.fallbacks += fitted.fallbacks;

            let channel_gains = correction_gains(fitted.parameters.view(), target.view());
            parameters
                .index_axis_mut(Axis(0), channel)
                .assign(&fitted.parameters);
            set_channel(&mut gains, channel, channel_gains.view());

            self.reporter
                .begin_stage(PipelineStage::ApplyingGains, Some(image_stack.len()));
            apply_corrections(
                &mut image_stack,
                &distance_stack,
                channel,
                fitted.parameters.view(),
                channel_gains.view(),
                |done| self.reporter.advance(done),
            )?;
            self.reporter.finish_stage();
        }

        self.reporter
            .begin_stage(PipelineStage::Statistics, Some(channels));
        let (corrected_mean, corrected_std) =
            stack_statistics(&image_stack, channels, (h, w), |done| {
                self.reporter.advance(done)
            })?;
        self.reporter.finish_stage();

        let parameters = ParameterSet {
            raw_mean,
            raw_std,
            attenuation: Some(AttenuationModel {
                parameters,
                gains,
                corrected_mean,
                corrected_std,
            }),
        };
        parameters.save(&layout.params_dir)?;
        Ok(summary)
    }
}

/// Per-channel mean and standard deviation as (channels, height, width).
fn stack_statistics(
    stack: &ArrayStack,
    channels: usize,
    dim: (usize, usize),
    on_progress: impl Fn(usize),
) -> Result<(Array3<f64>, Array3<f64>)> {
    let (h, w) = dim;
    let mut mean = Array3::<f64>::zeros((channels, h, w));
    let mut std = Array3::<f64>::zeros((channels, h, w));
    for channel in 0..channels {
        let (m, s) = channel_mean_std(stack, channel)?;
        set_channel(&mut mean, channel, m.view());
        set_channel(&mut std, channel, s.view());
        on_progress(channel + 1);
    }
    Ok((mean, std))
}
