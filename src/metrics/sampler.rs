//! Live feed of pipeline counters into a [`MetricsRegistry`].

use super::{MetricsRegistry, MetricsSnapshot};
use crate::pipeline::Pipeline;
use crate::save::ImageWriter;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// How often a running pipeline is sampled.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Copies a pipeline's counters into a registry while it runs.
///
/// Counters are cumulative over the pipeline's lifetime, which matches
/// Prometheus counter semantics; failed runs are recorded as well.
pub struct Sampler<'a, W: ImageWriter> {
    registry: &'a MetricsRegistry,
    pipeline: &'a Pipeline<W>,
    started: Instant,
}

impl<'a, W: ImageWriter> Sampler<'a, W> {
    pub fn new(registry: &'a MetricsRegistry, pipeline: &'a Pipeline<W>) -> Self {
        Self {
            registry,
            pipeline,
            started: Instant::now(),
        }
    }

    /// Pushes the current counters into the registry.
    pub fn sample(&self) {
        let snapshot = MetricsSnapshot::from_counters(
            &self.pipeline.stats(),
            &self.pipeline.factory().stats(),
            self.started.elapsed(),
        );
        self.registry.update(&snapshot);
    }

    /// Samples every `interval` until `stop` receives or its sender is
    /// dropped, then takes one final sample.
    pub fn run(&self, stop: Receiver<()>, interval: Duration) {
        loop {
            self.sample();
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.sample();
        tracing::debug!("Metrics sampler stopped");
    }
}
