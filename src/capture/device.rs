//! Camera device and system abstractions.
//!
//! These traits are the seam to the vendor transport layer. The pipeline
//! only needs stream control, buffer exchange and a handful of node-map
//! reads and writes.

use super::DeviceBuffer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a device or the system that owns it.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("acquisition timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("{operation} failed: {reason}")]
    Protocol {
        operation: &'static str,
        reason: String,
    },
    #[error("node {map}/{name} not found")]
    NodeNotFound { map: NodeMap, name: String },
    #[error("node {map}/{name} rejected value {value}")]
    NodeRejected {
        map: NodeMap,
        name: String,
        value: NodeValue,
    },
    #[error("stream is not running")]
    NotStreaming,
    #[error("device {0} not found")]
    DeviceNotFound(String),
}

impl DeviceError {
    pub(crate) fn protocol(operation: &'static str, reason: impl Into<String>) -> Self {
        DeviceError::Protocol {
            operation,
            reason: reason.into(),
        }
    }
}

/// Which node map a feature lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeMap {
    /// Remote device features (`AcquisitionMode`, `PixelFormat`, ...).
    Device,
    /// Transport-layer stream features (`StreamBufferHandlingMode`, ...).
    TlStream,
}

impl fmt::Display for NodeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeMap::Device => f.write_str("device"),
            NodeMap::TlStream => f.write_str("tl-stream"),
        }
    }
}

/// Value of a node-map feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl NodeValue {
    pub fn str(value: impl Into<String>) -> Self {
        NodeValue::Str(value.into())
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Str(s) => f.write_str(s),
            NodeValue::Bool(b) => write!(f, "{}", b),
            NodeValue::Int(i) => write!(f, "{}", i),
        }
    }
}

/// Identity of a discovered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
    pub ip_address: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.model, self.serial, self.ip_address)
    }
}

/// A streaming camera.
///
/// Buffers returned by [`get_image`](Device::get_image) belong to the device
/// and must be given back through [`requeue_buffer`](Device::requeue_buffer)
/// before the device runs out of free buffers.
pub trait Device {
    /// Identity of this device.
    fn info(&self) -> &DeviceInfo;

    /// Reads a node-map feature.
    fn node_value(&self, map: NodeMap, name: &str) -> Result<NodeValue, DeviceError>;

    /// Writes a node-map feature.
    fn set_node_value(
        &mut self,
        map: NodeMap,
        name: &str,
        value: NodeValue,
    ) -> Result<(), DeviceError>;

    /// Starts streaming.
    fn start_stream(&mut self) -> Result<(), DeviceError>;

    /// Stops streaming.
    fn stop_stream(&mut self) -> Result<(), DeviceError>;

    /// Waits up to `timeout` for the next frame.
    fn get_image(&mut self, timeout: Duration) -> Result<DeviceBuffer, DeviceError>;

    /// Returns a buffer to the device's free list.
    fn requeue_buffer(&mut self, buffer: DeviceBuffer) -> Result<(), DeviceError>;
}

/// Transport-layer system that discovers and opens devices.
pub trait System {
    type Device: Device;

    /// Refreshes the device list, waiting up to `timeout` for responses.
    fn update_devices(&mut self, timeout: Duration) -> Result<(), DeviceError>;

    /// Devices found by the last update.
    fn devices(&self) -> Vec<DeviceInfo>;

    /// Opens a device.
    fn create_device(&mut self, info: &DeviceInfo) -> Result<Self::Device, DeviceError>;

    /// Closes a device opened by this system.
    fn destroy_device(&mut self, device: Self::Device) -> Result<(), DeviceError>;

    /// Shuts the system down.
    fn close(self);
}
