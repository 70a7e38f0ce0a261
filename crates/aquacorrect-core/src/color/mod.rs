pub mod balance;
pub mod debayer;

pub use balance::ManualBalance;
pub use debayer::{debayer_image, BayerPattern, DebayerMethod, SensorLayout};
