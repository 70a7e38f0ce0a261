/// Minimum pixel count (h*w) to use pixel-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum image count to use image-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// Width of a distance histogram bin, in metres.
pub const DISTANCE_BIN_WIDTH_M: f64 = 0.1;

/// Default fraction of samples discarded (split over both tails) by the
/// trimmed mean.
pub const DEFAULT_TRIM_RATIO: f64 = 0.2;

/// Minimum number of admissible images needed to fit the 3-parameter model.
pub const MIN_ADMISSIBLE_IMAGES: usize = 3;

/// Fallback (a, b, c) used when the algebraic seed or the fit is invalid.
pub const FALLBACK_ATTENUATION: [f64; 3] = [1.01, -0.01, 0.0];

/// Sample positions (as fractions of the bin count) used to seed the decay rate.
pub const SEED_LOW_FRACTION: f64 = 0.3;
pub const SEED_HIGH_FRACTION: f64 = 0.7;

/// Maximum Levenberg-Marquardt iterations per pixel.
pub const FIT_MAX_ITERATIONS: usize = 200;

/// Relative tolerance on the robust cost and parameter step for convergence.
pub const FIT_TOLERANCE: f64 = 1e-12;

/// Initial Levenberg-Marquardt damping factor.
pub const FIT_INITIAL_DAMPING: f64 = 1e-3;

/// Linear-segment threshold of the sRGB transfer curve.
pub const SRGB_LINEAR_THRESHOLD: f32 = 0.003_130_8;

/// Slope of the sRGB linear segment.
pub const SRGB_LINEAR_SLOPE: f32 = 12.92;

/// Exponent denominator of the gamma segment (x^(1/1.5)).
pub const GAMMA_EXPONENT: f32 = 1.5;

/// Bit depth the normalised intensities are expressed in before output scaling.
pub const WORKING_BIT_DEPTH: u8 = 8;

/// Number of images corrected per write-back batch when applying gains to a
/// memory-mapped stack. At 1280x1024 f32, 16 images = 80 MB.
pub const STACK_BATCH_SIZE: usize = 16;

/// XVIII raw sensors pack 18-bit samples; dividing by this maps them to 16 bits.
pub const XVIII_SCALE: f32 = 1024.0;
