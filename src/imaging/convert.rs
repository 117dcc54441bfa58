//! Pixel-format conversion kernels.
//!
//! Every conversion goes through a 16-bit RGBA intermediate. 8-bit
//! samples are widened with `v * 257` and narrowed with `v >> 8`, which is
//! exact for values that started out as 8-bit, so 8-bit round trips are
//! lossless. Colour to monochrome uses Rec. 601 luma weights.

use super::format::PixelFormat;
use super::handle::ImageError;

type Rgba16 = [u16; 4];

/// Converts a tightly packed pixel buffer from one format to another.
pub(crate) fn convert_pixels(
    src: &[u8],
    from: PixelFormat,
    to: PixelFormat,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, ImageError> {
    let expected = from.buffer_len(width, height);
    if src.len() != expected {
        return Err(ImageError::CorruptSource {
            width,
            height,
            format: from,
            expected,
            actual: src.len(),
        });
    }

    if from == to {
        return Ok(src.to_vec());
    }

    let mut out = Vec::with_capacity(to.buffer_len(width, height));
    for pixel in src.chunks_exact(from.bytes_per_pixel()) {
        write_pixel(&mut out, read_pixel(pixel, from), to);
    }
    Ok(out)
}

#[inline]
fn widen(v: u8) -> u16 {
    u16::from(v) * 257
}

#[inline]
fn narrow(v: u16) -> u8 {
    (v >> 8) as u8
}

#[inline]
fn luma(rgba: Rgba16) -> u16 {
    let [r, g, b, _] = rgba.map(u32::from);
    ((r * 299 + g * 587 + b * 114) / 1000) as u16
}

fn read_pixel(px: &[u8], format: PixelFormat) -> Rgba16 {
    match format {
        PixelFormat::Mono8 => {
            let v = widen(px[0]);
            [v, v, v, u16::MAX]
        }
        PixelFormat::Mono16 => {
            let v = u16::from_le_bytes([px[0], px[1]]);
            [v, v, v, u16::MAX]
        }
        PixelFormat::Rgb8 => [widen(px[0]), widen(px[1]), widen(px[2]), u16::MAX],
        PixelFormat::Bgr8 => [widen(px[2]), widen(px[1]), widen(px[0]), u16::MAX],
        PixelFormat::Rgba8 => [widen(px[0]), widen(px[1]), widen(px[2]), widen(px[3])],
        PixelFormat::Bgra8 => [widen(px[2]), widen(px[1]), widen(px[0]), widen(px[3])],
    }
}

fn write_pixel(out: &mut Vec<u8>, rgba: Rgba16, format: PixelFormat) {
    let [r, g, b, a] = rgba.map(narrow);
    match format {
        PixelFormat::Mono8 => out.push(narrow(luma(rgba))),
        PixelFormat::Mono16 => out.extend_from_slice(&luma(rgba).to_le_bytes()),
        PixelFormat::Rgb8 => out.extend_from_slice(&[r, g, b]),
        PixelFormat::Bgr8 => out.extend_from_slice(&[b, g, r]),
        PixelFormat::Rgba8 => out.extend_from_slice(&[r, g, b, a]),
        PixelFormat::Bgra8 => out.extend_from_slice(&[b, g, r, a]),
    }
}
