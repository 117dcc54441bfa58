//! Pixel format enumeration.
//!
//! Names follow the GenICam Pixel Format Naming Convention so that the
//! values read back from a device node map and the values written in
//! configuration files are the same strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel layouts understood by the image factory and the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit monochrome.
    #[serde(rename = "Mono8")]
    Mono8,
    /// 16-bit monochrome, little-endian.
    #[serde(rename = "Mono16")]
    Mono16,
    /// 8-bit red, green, blue.
    #[serde(rename = "RGB8")]
    Rgb8,
    /// 8-bit blue, green, red.
    #[serde(rename = "BGR8")]
    Bgr8,
    /// 8-bit red, green, blue, alpha.
    #[serde(rename = "RGBa8")]
    Rgba8,
    /// 8-bit blue, green, red, alpha.
    #[serde(rename = "BGRa8")]
    Bgra8,
}

impl PixelFormat {
    /// All supported formats.
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::Mono8,
        PixelFormat::Mono16,
        PixelFormat::Rgb8,
        PixelFormat::Bgr8,
        PixelFormat::Rgba8,
        PixelFormat::Bgra8,
    ];

    /// Bits used by one pixel.
    #[inline]
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Mono8 => 8,
            PixelFormat::Mono16 => 16,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 24,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 32,
        }
    }

    /// Bytes used by one pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        (self.bits_per_pixel() / 8) as usize
    }

    /// Number of interleaved channels.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::Mono16 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    /// Expected buffer length for an image of the given dimensions.
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    /// GenICam name of the format.
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Mono16 => "Mono16",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
            PixelFormat::Rgba8 => "RGBa8",
            PixelFormat::Bgra8 => "BGRa8",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a string does not name a supported pixel format.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown pixel format: {0}")]
pub struct UnknownPixelFormat(pub String);

impl FromStr for PixelFormat {
    type Err = UnknownPixelFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPixelFormat(s.to_string()))
    }
}
