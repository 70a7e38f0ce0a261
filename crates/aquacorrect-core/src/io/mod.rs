pub mod image_io;
pub mod manifest;
pub mod memmap;
pub mod navigation;
pub mod npy;
pub mod xviii;
