pub mod curve;
pub mod estimator;
pub mod parameters;

pub use curve::{exp_curve, fit, seed, AttenuationCoefficients, FitOutcome};
pub use parameters::{AttenuationModel, ParameterSet};
