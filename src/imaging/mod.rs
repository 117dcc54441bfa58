//! Factory-owned images, pixel formats and conversion.
//!
//! Images leave the device as short-lived buffers; everything that
//! crosses a thread boundary is an [`Image`] created here.

mod convert;
mod format;
mod handle;

pub use format::{PixelFormat, UnknownPixelFormat};
pub use handle::{FactoryStats, Image, ImageError, ImageFactory, Provenance};
