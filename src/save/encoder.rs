//! File encoding for saved images.

use super::{ImageParams, WriteError};
use crate::imaging::PixelFormat;
use image::{ExtendedColorType, ImageFormat};
use std::borrow::Cow;
use std::path::Path;

/// Encodes `data` into `path`, picking the container from the extension.
pub(crate) fn encode(path: &Path, params: &ImageParams, data: &[u8]) -> Result<(), WriteError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    if extension.eq_ignore_ascii_case("raw") {
        return std::fs::write(path, data).map_err(|source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    let format = ImageFormat::from_extension(extension)
        .filter(|f| {
            matches!(
                f,
                ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::Tiff
            )
        })
        .ok_or_else(|| WriteError::UnsupportedFileType {
            path: path.to_path_buf(),
        })?;

    let (pixels, color) = encoder_layout(params.pixel_format, data);

    image::save_buffer_with_format(path, &pixels, params.width, params.height, color, format)
        .map_err(|e| match e {
            image::ImageError::IoError(source) => WriteError::Io {
                path: path.to_path_buf(),
                source,
            },
            source => WriteError::Encode {
                path: path.to_path_buf(),
                source,
            },
        })
}

/// Rearranges pixel data into a layout the encoders accept.
///
/// Encoders store colour as RGB, so BGR orders are swapped; 16-bit
/// samples are handed over in native byte order.
fn encoder_layout(format: PixelFormat, data: &[u8]) -> (Cow<'_, [u8]>, ExtendedColorType) {
    match format {
        PixelFormat::Mono8 => (Cow::Borrowed(data), ExtendedColorType::L8),
        PixelFormat::Mono16 => {
            let native: Vec<u8> = data
                .chunks_exact(2)
                .flat_map(|s| u16::from_le_bytes([s[0], s[1]]).to_ne_bytes())
                .collect();
            (Cow::Owned(native), ExtendedColorType::L16)
        }
        PixelFormat::Rgb8 => (Cow::Borrowed(data), ExtendedColorType::Rgb8),
        PixelFormat::Rgba8 => (Cow::Borrowed(data), ExtendedColorType::Rgba8),
        PixelFormat::Bgr8 => (Cow::Owned(swap_red_blue(data, 3)), ExtendedColorType::Rgb8),
        PixelFormat::Bgra8 => (Cow::Owned(swap_red_blue(data, 4)), ExtendedColorType::Rgba8),
    }
}

fn swap_red_blue(data: &[u8], stride: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    for px in out.chunks_exact_mut(stride) {
        px.swap(0, 2);
    }
    out
}
