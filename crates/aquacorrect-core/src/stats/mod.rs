pub mod moments;
pub mod robust;
pub mod sampling;

pub use moments::{channel_mean, channel_mean_std, item_means, mean_std, RunningMoments};
pub use robust::{median, trimmed_mean_std};
pub use sampling::{mean_plane, sample_planes, SmoothingPolicy};
