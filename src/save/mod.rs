//! Saving converted images to disk.

mod encoder;
mod writer;

pub use writer::{FileWriter, ImageParams, ImageWriter, WriteError};
