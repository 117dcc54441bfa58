//! Prometheus metrics for pipeline runs.
//!
//! # Metrics Exposed
//!
//! ## Throughput
//! - `frame_relay_frames_acquired_total` - Frames acquired from the camera
//! - `frame_relay_frames_saved_total` - Frames written to disk
//! - `frame_relay_bytes_written_total` - Pixel bytes handed to the writer
//!
//! ## Image Factory
//! - `frame_relay_images_copied_total` - Images copied out of device buffers
//! - `frame_relay_images_converted_total` - Images produced by conversion
//! - `frame_relay_images_outstanding` - Images not yet destroyed
//!
//! ## Queue and Timing
//! - `frame_relay_queue_high_water` - Largest queue depth observed
//! - `frame_relay_mean_write_seconds` - Mean writer latency
//! - `frame_relay_run_seconds` - Wall time of the last run
//!
//! A [`Sampler`] feeds the registry while a run is in progress. With the
//! `metrics` feature the registry can also be served over HTTP on
//! `/metrics`.

mod collector;
mod sampler;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
pub use sampler::{Sampler, SAMPLE_INTERVAL};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsServerHandle, ServerError};
