//! Producer/consumer acquire-and-save pipeline.
//!
//! ```text
//! [Camera] ─► Producer ─► FrameQueue ─► Consumer ─► Encoder ─► Writer
//! ```
//!
//! The producer owns the device and runs on the calling thread. The
//! consumer runs on a worker thread. Only factory-owned images travel
//! between them, and ownership moves with each image.

mod config;
mod consumer;
mod orchestrator;
mod producer;
mod queue;
mod stats;

pub use config::{AcquisitionConfig, ConfigError, FileConfig, OutputConfig};
pub use consumer::{Consumer, ConsumerError};
pub use orchestrator::{Pipeline, PipelineError, RunReport};
pub use producer::{CancelToken, Producer, ProducerError};
pub use queue::FrameQueue;
pub use stats::{PipelineStats, StatsSnapshot};
