use ndarray::{Array3, ArrayView2, Axis};

use crate::attenuation::estimator::attenuation_correct;
use crate::attenuation::ParameterSet;
use crate::color::debayer_image;
use crate::consts::WORKING_BIT_DEPTH;
use crate::error::{CorrectError, Result};
use crate::filters::bytescale::{quantize, Bytescale};
use crate::filters::levels::{gamma_correct, max_value, normalize_to_target};
use crate::geometry::RectificationMaps;
use crate::io::image_io::OutputImage;

use super::config::{CameraSettings, CorrectionMethod};

/// Per-image correction chain for one camera:
/// `[distance correction + normalisation | manual balance] -> debayer ->
/// [undistort] -> [gamma] -> bytescale`.
///
/// Holds only shared, read-only state so one instance serves every worker.
pub struct ImageCorrector<'a> {
    settings: &'a CameraSettings,
    parameters: Option<&'a ParameterSet>,
    maps: Option<RectificationMaps>,
}

impl<'a> ImageCorrector<'a> {
    /// Colour correction needs the parse-phase parameters; manual balance
    /// ignores them.
    pub fn new(
        settings: &'a CameraSettings,
        parameters: Option<&'a ParameterSet>,
        maps: Option<RectificationMaps>,
    ) -> Result<Self> {
        if settings.method.is_colour_correction() {
            let params = parameters.ok_or_else(|| {
                CorrectError::State("colour correction requires parse-phase parameters".into())
            })?;
            let (h, w, c) = settings.camera.image_dim();
            if params.dim() != (c, h, w) {
                return Err(CorrectError::ShapeMismatch {
                    expected: (c, h, w),
                    actual: params.dim(),
                });
            }
        }
        Ok(Self {
            settings,
            parameters,
            maps,
        })
    }

    pub fn undistorts(&self) -> bool {
        self.maps.is_some()
    }

    /// Run the full chain and quantise to the output bit depth.
    pub fn develop(&self, raw: &Array3<f32>, distance: Option<ArrayView2<f32>>) -> Result<OutputImage> {
        let scaled = self.correct(raw, distance)?;
        quantize(&scaled, self.settings.output.bit_depth)
    }

    /// Run the full chain, returning intensities scaled to the output bit
    /// depth but not yet rounded.
    pub fn correct(&self, raw: &Array3<f32>, distance: Option<ArrayView2<f32>>) -> Result<Array3<f32>> {
        let layout = self.settings.layout;
        let debayer = self.settings.output.debayer;

        let mut image = match &self.settings.method {
            CorrectionMethod::ColourCorrection(cc) => {
                let balanced = self.distance_correct(raw, distance, cc.brightness, cc.contrast)?;
                debayer_image(&balanced, layout, debayer)
            }
            CorrectionMethod::ManualBalance(balance) => {
                balance.apply(&debayer_image(raw, layout, debayer))?
            }
        };

        if let Some(maps) = &self.maps {
            let high = max_value(WORKING_BIT_DEPTH) as f32;
            image.mapv_inplace(|v| v.clamp(0.0, high));
            image = maps.remap(&image)?;
        }

        if self.settings.method.is_colour_correction() {
            image = gamma_correct(&image, WORKING_BIT_DEPTH);
        }

        Ok(image.bytescale(self.settings.output.bit_depth))
    }

    /// Attenuation correction (when a distance map is given) followed by
    /// normalisation to the target brightness and contrast.
    fn distance_correct(
        &self,
        raw: &Array3<f32>,
        distance: Option<ArrayView2<f32>>,
        brightness: f64,
        contrast: f64,
    ) -> Result<Array3<f32>> {
        let params = self
            .parameters
            .ok_or_else(|| CorrectError::State("missing correction parameters".into()))?;
        let (c, h, w) = params.dim();
        if raw.dim() != (h, w, c) {
            return Err(CorrectError::ShapeMismatch {
                expected: (h, w, c),
                actual: raw.dim(),
            });
        }
        if let Some(d) = &distance {
            if d.dim() != (h, w) {
                return Err(CorrectError::ShapeMismatch {
                    expected: (h, w, 1),
                    actual: (d.nrows(), d.ncols(), 1),
                });
            }
        }

        let mut out = Array3::<f32>::zeros((h, w, c));
        for i in 0..c {
            let plane = raw.index_axis(Axis(2), i);
            let normalized = match (&params.attenuation, distance) {
                (Some(model), Some(d)) => {
                    let corrected = attenuation_correct(
                        plane,
                        d,
                        model.parameters.index_axis(Axis(0), i),
                        model.gains.index_axis(Axis(0), i),
                    );
                    normalize_to_target(
                        corrected.view(),
                        model.corrected_mean.index_axis(Axis(0), i),
                        model.corrected_std.index_axis(Axis(0), i),
                        brightness,
                        contrast,
                        WORKING_BIT_DEPTH,
                    )
                }
                _ => normalize_to_target(
                    plane,
                    params.raw_mean.index_axis(Axis(0), i),
                    params.raw_std.index_axis(Axis(0), i),
                    brightness,
                    contrast,
                    WORKING_BIT_DEPTH,
                ),
            };
            out.index_axis_mut(Axis(2), i).assign(&normalized);
        }
        Ok(out)
    }
}
