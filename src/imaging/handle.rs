//! Factory-owned images and the factory that creates them.
//!
//! An [`Image`] is created by [`ImageFactory::copy`] or
//! [`ImageFactory::convert`] and released by [`ImageFactory::destroy`].
//! Each image carries a lease on the factory ledger, so the outstanding
//! count drops back when an image is destroyed explicitly and also when
//! it is dropped on an error path.

use super::convert::convert_pixels;
use super::format::PixelFormat;
use crate::capture::DeviceBuffer;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while copying or converting images.
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error(
        "corrupt source image: {width}x{height} {format} needs {expected} bytes, got {actual}"
    )]
    CorruptSource {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("image allocation refused: {outstanding} images outstanding (limit {limit})")]
    AllocationFailed { outstanding: usize, limit: usize },
}

/// How a factory-owned image came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Copied out of a device buffer.
    Copy,
    /// Produced by a pixel-format conversion.
    Conversion,
}

#[derive(Debug, Default)]
struct Ledger {
    outstanding: AtomicUsize,
    copies: AtomicU64,
    conversions: AtomicU64,
    destroyed: AtomicU64,
}

/// Releases one outstanding slot when dropped.
struct Lease {
    ledger: Arc<Ledger>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.ledger.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.ledger.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}

/// An image whose lifetime is owned by the application, not the device.
///
/// Safe to move between threads.
pub struct Image {
    data: Vec<u8>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    frame_id: u64,
    timestamp_ns: u64,
    provenance: Provenance,
    _lease: Lease,
}

impl Image {
    /// Returns the pixel data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    #[inline]
    pub fn bits_per_pixel(&self) -> u32 {
        self.pixel_format.bits_per_pixel()
    }

    /// Frame id assigned by the device.
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Device timestamp in nanoseconds.
    #[inline]
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    #[inline]
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("frame_id", &self.frame_id)
            .field("provenance", &self.provenance)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Counters describing factory activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactoryStats {
    /// Images created and not yet destroyed.
    pub outstanding: usize,
    /// Images created by `copy`.
    pub copies: u64,
    /// Images created by `convert`.
    pub conversions: u64,
    /// Images released.
    pub destroyed: u64,
}

impl FactoryStats {
    /// Activity since `earlier` was taken; `outstanding` stays absolute.
    pub fn since(&self, earlier: &FactoryStats) -> FactoryStats {
        FactoryStats {
            outstanding: self.outstanding,
            copies: self.copies.saturating_sub(earlier.copies),
            conversions: self.conversions.saturating_sub(earlier.conversions),
            destroyed: self.destroyed.saturating_sub(earlier.destroyed),
        }
    }
}

/// Creates and releases factory-owned images.
///
/// Cloning a factory shares its ledger.
#[derive(Clone, Default)]
pub struct ImageFactory {
    ledger: Arc<Ledger>,
    limit: Option<usize>,
}

impl ImageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory that refuses to hold more than `limit` images at once.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            ledger: Arc::default(),
            limit: Some(limit),
        }
    }

    /// Copies a device buffer into a factory-owned image.
    pub fn copy(&self, buffer: &DeviceBuffer) -> Result<Image, ImageError> {
        let lease = self.acquire()?;
        self.ledger.copies.fetch_add(1, Ordering::Relaxed);

        Ok(Image {
            data: buffer.data().to_vec(),
            width: buffer.width(),
            height: buffer.height(),
            pixel_format: buffer.pixel_format(),
            frame_id: buffer.frame_id(),
            timestamp_ns: buffer.timestamp_ns(),
            provenance: Provenance::Copy,
            _lease: lease,
        })
    }

    /// Converts an image to `target`, producing a new factory-owned image.
    ///
    /// The source image is left untouched and must still be destroyed.
    pub fn convert(&self, image: &Image, target: PixelFormat) -> Result<Image, ImageError> {
        let data = convert_pixels(
            image.data(),
            image.pixel_format,
            target,
            image.width,
            image.height,
        )?;
        let lease = self.acquire()?;
        self.ledger.conversions.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            frame_id = image.frame_id,
            from = %image.pixel_format,
            to = %target,
            "Converted image"
        );

        Ok(Image {
            data,
            width: image.width,
            height: image.height,
            pixel_format: target,
            frame_id: image.frame_id,
            timestamp_ns: image.timestamp_ns,
            provenance: Provenance::Conversion,
            _lease: lease,
        })
    }

    /// Releases an image.
    pub fn destroy(&self, image: Image) {
        tracing::trace!(
            frame_id = image.frame_id,
            provenance = ?image.provenance,
            "Destroying image"
        );
        drop(image);
    }

    /// Number of images created and not yet released.
    pub fn outstanding(&self) -> usize {
        self.ledger.outstanding.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the factory counters.
    pub fn stats(&self) -> FactoryStats {
        FactoryStats {
            outstanding: self.outstanding(),
            copies: self.ledger.copies.load(Ordering::Relaxed),
            conversions: self.ledger.conversions.load(Ordering::Relaxed),
            destroyed: self.ledger.destroyed.load(Ordering::Relaxed),
        }
    }

    fn acquire(&self) -> Result<Lease, ImageError> {
        let limit = self.limit.unwrap_or(usize::MAX);
        self.ledger
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < limit).then_some(current + 1)
            })
            .map_err(|outstanding| ImageError::AllocationFailed { outstanding, limit })?;

        Ok(Lease {
            ledger: Arc::clone(&self.ledger),
        })
    }
}

impl std::fmt::Debug for ImageFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFactory")
            .field("stats", &self.stats())
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(width: u32, height: u32) -> DeviceBuffer {
        let data = (0..width * height).map(|i| i as u8).collect();
        DeviceBuffer::new(0, data, width, height, PixelFormat::Mono8, 7, 1_000)
    }

    #[test]
    fn test_copy_preserves_metadata() {
        let factory = ImageFactory::new();
        let source = buffer(4, 2);
        let image = factory.copy(&source).unwrap();

        assert_eq!(image.data(), source.data());
        assert_eq!(image.frame_id(), 7);
        assert_eq!(image.timestamp_ns(), 1_000);
        assert_eq!(image.provenance(), Provenance::Copy);
        assert_eq!(factory.outstanding(), 1);

        factory.destroy(image);
        assert_eq!(factory.outstanding(), 0);
    }

    #[test]
    fn test_convert_counts_separately() {
        let factory = ImageFactory::new();
        let copy = factory.copy(&buffer(2, 2)).unwrap();
        let converted = factory.convert(&copy, PixelFormat::Bgr8).unwrap();

        assert_eq!(converted.bits_per_pixel(), 24);
        assert_eq!(converted.data().len(), 12);
        assert_eq!(converted.provenance(), Provenance::Conversion);

        factory.destroy(converted);
        factory.destroy(copy);

        let stats = factory.stats();
        assert_eq!(stats.copies, 1);
        assert_eq!(stats.conversions, 1);
        assert_eq!(stats.destroyed, 2);
        assert_eq!(stats.outstanding, 0);
    }

    #[test]
    fn test_drop_releases_lease() {
        let factory = ImageFactory::new();
        {
            let _image = factory.copy(&buffer(1, 1)).unwrap();
            assert_eq!(factory.outstanding(), 1);
        }
        assert_eq!(factory.outstanding(), 0);
    }

    #[test]
    fn test_allocation_limit() {
        let factory = ImageFactory::with_limit(1);
        let first = factory.copy(&buffer(1, 1)).unwrap();

        assert!(matches!(
            factory.convert(&first, PixelFormat::Rgb8),
            Err(ImageError::AllocationFailed {
                outstanding: 1,
                limit: 1
            })
        ));

        factory.destroy(first);
        assert!(factory.copy(&buffer(1, 1)).is_ok());
    }

    #[test]
    fn test_failed_conversion_allocates_nothing() {
        let factory = ImageFactory::new();
        let corrupt = DeviceBuffer::new(0, vec![0; 3], 2, 2, PixelFormat::Mono8, 1, 0);
        let copy = factory.copy(&corrupt).unwrap();

        assert!(factory.convert(&copy, PixelFormat::Bgr8).is_err());
        assert_eq!(factory.stats().conversions, 0);
        assert_eq!(factory.outstanding(), 1);
    }
}
