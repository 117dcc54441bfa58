//! Image writer interface and the file-backed implementation.

use super::encoder;
use crate::imaging::{Image, PixelFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while saving an image.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(
        "{}: {width}x{height} at {bits_per_pixel} bpp needs {expected} bytes, got {actual}",
        path.display()
    )]
    SizeMismatch {
        path: PathBuf,
        width: u32,
        height: u32,
        bits_per_pixel: u32,
        expected: usize,
        actual: usize,
    },
    #[error("{}: unsupported file type", path.display())]
    UnsupportedFileType { path: PathBuf },
    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Geometry of the pixel data handed to a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParams {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub pixel_format: PixelFormat,
}

impl ImageParams {
    pub fn new(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            bits_per_pixel: pixel_format.bits_per_pixel(),
            pixel_format,
        }
    }

    /// Takes the geometry of an image.
    pub fn of(image: &Image) -> Self {
        Self::new(image.width(), image.height(), image.pixel_format())
    }

    /// Byte length of a tightly packed buffer with these parameters.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * (self.bits_per_pixel / 8) as usize
    }
}

/// Saves pixel data to a path.
///
/// One call writes one complete file. Implementations must be shareable
/// with the consumer thread.
pub trait ImageWriter: Sync {
    fn write(&self, params: &ImageParams, path: &Path, data: &[u8]) -> Result<(), WriteError>;
}

/// Writes images to disk, choosing the encoding from the file extension.
///
/// `.png`, `.jpg`/`.jpeg`, `.bmp` and `.tif`/`.tiff` are encoded; `.raw`
/// stores the pixel bytes verbatim.
#[derive(Debug, Clone)]
pub struct FileWriter {
    create_dirs: bool,
}

impl FileWriter {
    pub fn new() -> Self {
        Self { create_dirs: true }
    }

    /// Fails instead of creating missing parent directories.
    pub fn without_create_dirs() -> Self {
        Self { create_dirs: false }
    }
}

impl Default for FileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for FileWriter {
    fn write(&self, params: &ImageParams, path: &Path, data: &[u8]) -> Result<(), WriteError> {
        let expected = params.expected_len();
        if data.len() != expected {
            return Err(WriteError::SizeMismatch {
                path: path.to_path_buf(),
                width: params.width,
                height: params.height,
                bits_per_pixel: params.bits_per_pixel,
                expected,
                actual: data.len(),
            });
        }

        if self.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| WriteError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }

        encoder::encode(path, params, data)?;

        tracing::debug!(
            path = %path.display(),
            width = params.width,
            height = params.height,
            format = %params.pixel_format,
            "Image written"
        );
        Ok(())
    }
}
