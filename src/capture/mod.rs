//! Camera input.
//!
//! This module defines the seam to the camera transport layer: the
//! [`System`] that discovers devices, the [`Device`] that streams, and the
//! device-owned [`DeviceBuffer`] it hands out. A simulated implementation
//! is provided for running without hardware.

mod buffer;
mod device;
mod session;
mod simulated;

pub use buffer::DeviceBuffer;
pub use device::{Device, DeviceError, DeviceInfo, NodeMap, NodeValue, System};
pub use session::{
    streaming_settings, StreamSession, ACQUISITION_MODE, STREAM_AUTO_NEGOTIATE_PACKET_SIZE,
    STREAM_BUFFER_HANDLING_MODE, STREAM_PACKET_RESEND_ENABLE,
};
pub use simulated::{synthesize_frame, SimulatedCameraConfig, SimulatedDevice, SimulatedSystem};
