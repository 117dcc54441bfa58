//! Simulated GigE Vision system for running the pipeline without hardware.
//!
//! The simulated device keeps a fixed pool of buffers, so a caller that
//! forgets to requeue runs dry, and it can be scripted to pace frames or
//! fail on a given `GetImage` call.

use super::{Device, DeviceBuffer, DeviceError, DeviceInfo, NodeMap, NodeValue, System};
use super::session::{
    ACQUISITION_MODE, STREAM_AUTO_NEGOTIATE_PACKET_SIZE, STREAM_BUFFER_HANDLING_MODE,
    STREAM_PACKET_RESEND_ENABLE,
};
use crate::imaging::PixelFormat;
use crate::pipeline::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Behaviour of the simulated camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedCameraConfig {
    /// Number of devices reported by discovery.
    pub device_count: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format delivered by the sensor.
    pub pixel_format: PixelFormat,
    /// Time the device takes to deliver each frame.
    pub frame_interval_ms: u64,
    /// Driver buffers in the stream pool.
    pub buffer_count: usize,
    /// 1-based `GetImage` call that times out, if any.
    pub fail_at: Option<u64>,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            width: 640,
            height: 480,
            pixel_format: PixelFormat::Mono8,
            frame_interval_ms: 0,
            buffer_count: 4,
            fail_at: None,
        }
    }
}

impl SimulatedCameraConfig {
    /// Validates the simulated camera parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.buffer_count == 0 {
            return Err(ConfigError::InvalidBufferCount);
        }
        Ok(())
    }
}

/// Produces the deterministic test pattern for one frame.
pub fn synthesize_frame(config: &SimulatedCameraConfig, frame_id: u64) -> Vec<u8> {
    let len = config.pixel_format.buffer_len(config.width, config.height);
    let mut data = vec![0u8; len];
    fill_pattern(&mut data, frame_id);
    data
}

fn fill_pattern(data: &mut [u8], frame_id: u64) {
    let offset = frame_id.wrapping_mul(31);
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i as u64).wrapping_add(offset) as u8;
    }
}

fn device_info(index: u32) -> DeviceInfo {
    DeviceInfo {
        model: "SIM-GV-0640M".to_string(),
        serial: format!("SIM{:06}", index),
        ip_address: format!("169.254.0.{}", 10 + index),
    }
}

/// A simulated camera.
pub struct SimulatedDevice {
    info: DeviceInfo,
    config: SimulatedCameraConfig,
    nodes: HashMap<(NodeMap, String), NodeValue>,
    free: Vec<(usize, Vec<u8>)>,
    streaming: bool,
    get_image_calls: u64,
    frames_delivered: u64,
    requeued: u64,
    streamed_with: HashMap<String, NodeValue>,
    epoch: Instant,
}

impl SimulatedDevice {
    pub fn new(config: SimulatedCameraConfig, index: u32) -> Self {
        let len = config.pixel_format.buffer_len(config.width, config.height);
        let free = (0..config.buffer_count)
            .rev()
            .map(|slot| (slot, vec![0u8; len]))
            .collect();

        let mut nodes = HashMap::new();
        let mut node = |map: NodeMap, name: &str, value: NodeValue| {
            nodes.insert((map, name.to_string()), value);
        };
        node(NodeMap::Device, ACQUISITION_MODE, NodeValue::str("SingleFrame"));
        node(
            NodeMap::Device,
            "PixelFormat",
            NodeValue::str(config.pixel_format.name()),
        );
        node(NodeMap::Device, "Width", NodeValue::Int(config.width.into()));
        node(NodeMap::Device, "Height", NodeValue::Int(config.height.into()));
        node(
            NodeMap::TlStream,
            STREAM_BUFFER_HANDLING_MODE,
            NodeValue::str("OldestFirst"),
        );
        node(
            NodeMap::TlStream,
            STREAM_AUTO_NEGOTIATE_PACKET_SIZE,
            NodeValue::Bool(false),
        );
        node(
            NodeMap::TlStream,
            STREAM_PACKET_RESEND_ENABLE,
            NodeValue::Bool(false),
        );

        Self {
            info: device_info(index),
            config,
            nodes,
            free,
            streaming: false,
            get_image_calls: 0,
            frames_delivered: 0,
            requeued: 0,
            streamed_with: HashMap::new(),
            epoch: Instant::now(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Frames handed out by `get_image`.
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    /// Buffers given back through `requeue_buffer`.
    pub fn requeued(&self) -> u64 {
        self.requeued
    }

    /// Buffers currently held by the caller.
    pub fn buffers_in_flight(&self) -> usize {
        self.config.buffer_count - self.free.len()
    }

    /// Node values captured when the stream last started.
    pub fn settings_seen_while_streaming(&self) -> &HashMap<String, NodeValue> {
        &self.streamed_with
    }
}

impl Device for SimulatedDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn node_value(&self, map: NodeMap, name: &str) -> Result<NodeValue, DeviceError> {
        self.nodes
            .get(&(map, name.to_string()))
            .cloned()
            .ok_or_else(|| DeviceError::NodeNotFound {
                map,
                name: name.to_string(),
            })
    }

    fn set_node_value(
        &mut self,
        map: NodeMap,
        name: &str,
        value: NodeValue,
    ) -> Result<(), DeviceError> {
        let slot = self
            .nodes
            .get_mut(&(map, name.to_string()))
            .ok_or_else(|| DeviceError::NodeNotFound {
                map,
                name: name.to_string(),
            })?;

        if std::mem::discriminant(slot) != std::mem::discriminant(&value) {
            return Err(DeviceError::NodeRejected {
                map,
                name: name.to_string(),
                value,
            });
        }

        *slot = value;
        Ok(())
    }

    fn start_stream(&mut self) -> Result<(), DeviceError> {
        if self.streaming {
            return Err(DeviceError::protocol("StartStream", "stream already running"));
        }
        self.streamed_with = self
            .nodes
            .iter()
            .map(|((_, name), value)| (name.clone(), value.clone()))
            .collect();
        self.streaming = true;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<(), DeviceError> {
        if !self.streaming {
            return Err(DeviceError::NotStreaming);
        }
        self.streaming = false;
        Ok(())
    }

    fn get_image(&mut self, timeout: Duration) -> Result<DeviceBuffer, DeviceError> {
        if !self.streaming {
            return Err(DeviceError::NotStreaming);
        }
        self.get_image_calls += 1;

        let timeout_ms = timeout.as_millis() as u64;
        if self.config.fail_at == Some(self.get_image_calls) {
            return Err(DeviceError::Timeout { timeout_ms });
        }

        let interval = Duration::from_millis(self.config.frame_interval_ms);
        if interval > timeout {
            std::thread::sleep(timeout);
            return Err(DeviceError::Timeout { timeout_ms });
        }
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }

        let (slot, mut data) = self.free.pop().ok_or_else(|| {
            DeviceError::protocol("GetImage", "no free buffers, requeue delivered frames")
        })?;

        let frame_id = self.frames_delivered;
        self.frames_delivered += 1;
        fill_pattern(&mut data, frame_id);

        tracing::trace!(frame_id, slot, "Delivered simulated frame");

        Ok(DeviceBuffer::new(
            slot,
            data,
            self.config.width,
            self.config.height,
            self.config.pixel_format,
            frame_id,
            self.epoch.elapsed().as_nanos() as u64,
        ))
    }

    fn requeue_buffer(&mut self, buffer: DeviceBuffer) -> Result<(), DeviceError> {
        let (slot, data) = buffer.into_storage();
        if slot >= self.config.buffer_count || self.free.iter().any(|(s, _)| *s == slot) {
            return Err(DeviceError::protocol(
                "RequeueBuffer",
                format!("buffer {} does not belong to this stream", slot),
            ));
        }
        self.free.push((slot, data));
        self.requeued += 1;
        Ok(())
    }
}

/// A simulated transport layer exposing `device_count` identical cameras.
pub struct SimulatedSystem {
    config: SimulatedCameraConfig,
    discovered: Vec<DeviceInfo>,
}

impl SimulatedSystem {
    pub fn open(config: SimulatedCameraConfig) -> Self {
        tracing::debug!(devices = config.device_count, "Simulated system opened");
        Self {
            config,
            discovered: Vec::new(),
        }
    }
}

impl System for SimulatedSystem {
    type Device = SimulatedDevice;

    fn update_devices(&mut self, _timeout: Duration) -> Result<(), DeviceError> {
        self.discovered = (0..self.config.device_count).map(device_info).collect();
        Ok(())
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        self.discovered.clone()
    }

    fn create_device(&mut self, info: &DeviceInfo) -> Result<Self::Device, DeviceError> {
        let index = self
            .discovered
            .iter()
            .position(|d| d == info)
            .ok_or_else(|| DeviceError::DeviceNotFound(info.serial.clone()))?;
        Ok(SimulatedDevice::new(self.config.clone(), index as u32))
    }

    fn destroy_device(&mut self, device: Self::Device) -> Result<(), DeviceError> {
        if device.buffers_in_flight() > 0 {
            tracing::warn!(
                in_flight = device.buffers_in_flight(),
                "Destroying device with buffers still held"
            );
        }
        Ok(())
    }

    fn close(self) {
        tracing::debug!("Simulated system closed");
    }
}
