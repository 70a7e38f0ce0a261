pub mod bytescale;
pub mod levels;
