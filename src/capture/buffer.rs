//! Device-owned image buffers.

use crate::imaging::PixelFormat;
use std::marker::PhantomData;

/// A frame still owned by the device driver.
///
/// The buffer is only valid until it is handed back with
/// [`Device::requeue_buffer`](super::Device::requeue_buffer), which consumes
/// it. It is deliberately `!Send`: device buffers stay on the thread that
/// streams from the device, and anything that must travel is copied into
/// an [`Image`](crate::imaging::Image) first.
pub struct DeviceBuffer {
    index: usize,
    data: Vec<u8>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    frame_id: u64,
    timestamp_ns: u64,
    _thread_bound: PhantomData<*const ()>,
}

impl DeviceBuffer {
    /// Wraps a filled driver buffer. `index` identifies the slot in the
    /// device's buffer pool.
    pub fn new(
        index: usize,
        data: Vec<u8>,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        frame_id: u64,
        timestamp_ns: u64,
    ) -> Self {
        Self {
            index,
            data,
            width,
            height,
            pixel_format,
            frame_id,
            timestamp_ns,
            _thread_bound: PhantomData,
        }
    }

    /// Slot in the device's buffer pool.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

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
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Splits the buffer into its pool slot and backing storage so a
    /// driver can recycle both.
    pub fn into_storage(self) -> (usize, Vec<u8>) {
        (self.index, self.data)
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("frame_id", &self.frame_id)
            .field("bytes", &self.data.len())
            .finish()
    }
}
