//! Scoped streaming session.
//!
//! Opening a session snapshots the features it is about to change,
//! applies the streaming configuration and starts the stream. Closing it
//! (or dropping it on an error path) stops the stream and writes the
//! snapshot back.

use super::{Device, DeviceBuffer, DeviceError, NodeMap, NodeValue};
use std::time::Duration;

pub const ACQUISITION_MODE: &str = "AcquisitionMode";
pub const STREAM_BUFFER_HANDLING_MODE: &str = "StreamBufferHandlingMode";
pub const STREAM_AUTO_NEGOTIATE_PACKET_SIZE: &str = "StreamAutoNegotiatePacketSize";
pub const STREAM_PACKET_RESEND_ENABLE: &str = "StreamPacketResendEnable";

/// Features applied while streaming.
///
/// `NewestOnly` drops older frames when the host falls behind, and
/// `Continuous` keeps the stream running until it is stopped.
pub fn streaming_settings() -> [(NodeMap, &'static str, NodeValue); 4] {
    [
        (
            NodeMap::Device,
            ACQUISITION_MODE,
            NodeValue::str("Continuous"),
        ),
        (
            NodeMap::TlStream,
            STREAM_BUFFER_HANDLING_MODE,
            NodeValue::str("NewestOnly"),
        ),
        (
            NodeMap::TlStream,
            STREAM_AUTO_NEGOTIATE_PACKET_SIZE,
            NodeValue::Bool(true),
        ),
        (
            NodeMap::TlStream,
            STREAM_PACKET_RESEND_ENABLE,
            NodeValue::Bool(true),
        ),
    ]
}

/// A running stream on a borrowed device.
pub struct StreamSession<'d, D: Device> {
    device: &'d mut D,
    saved: Vec<(NodeMap, &'static str, NodeValue)>,
    streaming: bool,
    closed: bool,
}

impl<'d, D: Device> StreamSession<'d, D> {
    /// Snapshots and applies the streaming settings, then starts the stream.
    pub fn open(device: &'d mut D) -> Result<Self, DeviceError> {
        let settings = streaming_settings();

        let mut saved = Vec::with_capacity(settings.len());
        for (map, name, _) in &settings {
            saved.push((*map, *name, device.node_value(*map, name)?));
        }

        let mut session = Self {
            device,
            saved,
            streaming: false,
            closed: false,
        };

        for (map, name, value) in settings {
            tracing::debug!(%map, name, %value, "Applying stream setting");
            session.device.set_node_value(map, name, value)?;
        }

        session.device.start_stream()?;
        session.streaming = true;
        tracing::info!(device = %session.device.info(), "Stream started");

        Ok(session)
    }

    /// Waits for the next device-owned frame.
    pub fn get_image(&mut self, timeout: Duration) -> Result<DeviceBuffer, DeviceError> {
        self.device.get_image(timeout)
    }

    /// Hands a frame back to the device.
    pub fn requeue_buffer(&mut self, buffer: DeviceBuffer) -> Result<(), DeviceError> {
        self.device.requeue_buffer(buffer)
    }

    /// Stops the stream and restores the snapshot, reporting the first failure.
    pub fn close(mut self) -> Result<(), DeviceError> {
        self.closed = true;
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), DeviceError> {
        let mut first_error = None;

        if self.streaming {
            self.streaming = false;
            match self.device.stop_stream() {
                Ok(()) => tracing::info!("Stream stopped"),
                Err(e) => first_error = Some(e),
            }
        }

        while let Some((map, name, value)) = self.saved.pop() {
            tracing::debug!(%map, name, %value, "Restoring node");
            if let Err(e) = self.device.set_node_value(map, name, value) {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl<D: Device> Drop for StreamSession<'_, D> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.teardown() {
            tracing::warn!(error = %e, "Failed to restore device after aborted stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SimulatedCameraConfig, SimulatedDevice};

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(SimulatedCameraConfig::default(), 0)
    }

    #[test]
    fn test_open_applies_and_close_restores() {
        let mut device = device();
        let initial = device
            .node_value(NodeMap::Device, ACQUISITION_MODE)
            .unwrap();

        let session = StreamSession::open(&mut device).unwrap();
        session.close().unwrap();

        assert!(!device.is_streaming());
        assert_eq!(
            device
                .node_value(NodeMap::Device, ACQUISITION_MODE)
                .unwrap(),
            initial
        );
        assert_eq!(
            device
                .node_value(NodeMap::TlStream, STREAM_PACKET_RESEND_ENABLE)
                .unwrap(),
            NodeValue::Bool(false)
        );
    }

    #[test]
    fn test_drop_restores_without_close() {
        let mut device = device();
        {
            let _session = StreamSession::open(&mut device).unwrap();
        }
        assert_eq!(
            device
                .node_value(NodeMap::TlStream, STREAM_BUFFER_HANDLING_MODE)
                .unwrap(),
            NodeValue::str("OldestFirst")
        );
        assert!(!device.is_streaming());
    }

    #[test]
    fn test_stream_applies_newest_only() {
        let mut device = device();
        let mut session = StreamSession::open(&mut device).unwrap();
        let buffer = session.get_image(Duration::from_millis(100)).unwrap();
        session.requeue_buffer(buffer).unwrap();
        session.close().unwrap();

        let seen = device.settings_seen_while_streaming();
        assert_eq!(seen[ACQUISITION_MODE], NodeValue::str("Continuous"));
        assert_eq!(
            seen[STREAM_BUFFER_HANDLING_MODE],
            NodeValue::str("NewestOnly")
        );
    }
}
