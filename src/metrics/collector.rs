//! Metrics collection and registry.

use crate::imaging::FactoryStats;
use crate::pipeline::StatsSnapshot;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of pipeline state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Frames acquired from the device.
    pub frames_acquired: u64,
    /// Frames written to disk.
    pub frames_saved: u64,
    /// Pixel bytes handed to the writer.
    pub bytes_written: u64,
    /// Images copied out of device buffers.
    pub images_copied: u64,
    /// Images produced by pixel-format conversion.
    pub images_converted: u64,
    /// Images created and not yet released.
    pub images_outstanding: usize,
    /// Largest queue depth observed; never lowers the gauge.
    pub queue_high_water: usize,
    /// Mean writer latency in seconds.
    pub mean_write_seconds: Option<f64>,
    /// Wall time of the current or last run in seconds.
    pub run_seconds: f64,
}

/// Prometheus metrics registry for the acquire-and-save pipeline.
pub struct MetricsRegistry {
    registry: Registry,

    // Throughput
    frames_acquired: IntCounter,
    frames_saved: IntCounter,
    bytes_written: IntCounter,

    // Image factory
    images_copied: IntCounter,
    images_converted: IntCounter,
    images_outstanding: IntGauge,

    // Queue and timing
    queue_high_water: IntGauge,
    mean_write_seconds: Gauge,
    run_seconds: Gauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all pipeline metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_acquired = IntCounter::new(
            "frame_relay_frames_acquired_total",
            "Frames acquired from the camera",
        )?;
        let frames_saved =
            IntCounter::new("frame_relay_frames_saved_total", "Frames written to disk")?;
        let bytes_written = IntCounter::new(
            "frame_relay_bytes_written_total",
            "Pixel bytes handed to the image writer",
        )?;

        let images_copied = IntCounter::new(
            "frame_relay_images_copied_total",
            "Images copied out of device buffers",
        )?;
        let images_converted = IntCounter::new(
            "frame_relay_images_converted_total",
            "Images produced by pixel format conversion",
        )?;
        let images_outstanding = IntGauge::new(
            "frame_relay_images_outstanding",
            "Factory images created and not yet destroyed",
        )?;

        let queue_high_water = IntGauge::new(
            "frame_relay_queue_high_water",
            "Largest number of images waiting in the queue",
        )?;
        let mean_write_seconds = Gauge::new(
            "frame_relay_mean_write_seconds",
            "Mean time spent writing one image",
        )?;
        let run_seconds = Gauge::new("frame_relay_run_seconds", "Wall time of the last run")?;

        registry.register(Box::new(frames_acquired.clone()))?;
        registry.register(Box::new(frames_saved.clone()))?;
        registry.register(Box::new(bytes_written.clone()))?;
        registry.register(Box::new(images_copied.clone()))?;
        registry.register(Box::new(images_converted.clone()))?;
        registry.register(Box::new(images_outstanding.clone()))?;
        registry.register(Box::new(queue_high_water.clone()))?;
        registry.register(Box::new(mean_write_seconds.clone()))?;
        registry.register(Box::new(run_seconds.clone()))?;

        Ok(Self {
            registry,
            frames_acquired,
            frames_saved,
            bytes_written,
            images_copied,
            images_converted,
            images_outstanding,
            queue_high_water,
            mean_write_seconds,
            run_seconds,
        })
    }

    /// Updates all metrics from a snapshot of pipeline state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        // Counters only move forward, so apply the difference.
        advance(&self.frames_acquired, snapshot.frames_acquired);
        advance(&self.frames_saved, snapshot.frames_saved);
        advance(&self.bytes_written, snapshot.bytes_written);
        advance(&self.images_copied, snapshot.images_copied);
        advance(&self.images_converted, snapshot.images_converted);

        self.images_outstanding
            .set(snapshot.images_outstanding as i64);
        self.observe_queue_high_water(snapshot.queue_high_water);
        if let Some(seconds) = snapshot.mean_write_seconds {
            self.mean_write_seconds.set(seconds);
        }
        self.run_seconds.set(snapshot.run_seconds);
    }

    /// Raises the queue high-water gauge to `depth` if it is larger.
    pub fn observe_queue_high_water(&self, depth: usize) {
        let depth = depth as i64;
        if depth > self.queue_high_water.get() {
            self.queue_high_water.set(depth);
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from cumulative pipeline and factory counters.
    ///
    /// The queue depth is only known once a run finishes, so it starts at
    /// zero here.
    pub fn from_counters(stats: &StatsSnapshot, factory: &FactoryStats, run: Duration) -> Self {
        Self {
            frames_acquired: stats.frames_acquired,
            frames_saved: stats.frames_saved,
            bytes_written: stats.bytes_written,
            images_copied: factory.copies,
            images_converted: factory.conversions,
            images_outstanding: factory.outstanding,
            queue_high_water: 0,
            mean_write_seconds: stats.mean_write_time().map(|d| d.as_secs_f64()),
            run_seconds: run.as_secs_f64(),
        }
    }
}
