pub mod attenuation;
pub mod color;
pub mod consts;
pub mod distance;
pub mod error;
pub mod filters;
pub mod frame;
pub mod geometry;
pub mod io;
pub mod pipeline;
pub mod stats;
