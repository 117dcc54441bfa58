//! Frame Relay Library
//!
//! A multithreaded acquire-and-save pipeline for GenICam-style
//! machine-vision cameras. Saving is usually the slowest stage of an
//! acquisition loop, so it runs on its own thread behind a queue and the
//! camera is never kept waiting on the disk.
//!
//! # Architecture
//!
//! ```text
//! capture → imaging (copy) → pipeline queue → imaging (convert) → save
//! ```
//!
//! # Design Principles
//!
//! - **Thread confinement**: device buffers are `!Send` and go back to the
//!   driver straight after they are copied; only factory-owned images
//!   cross threads
//! - **Explicit release**: every copy and every conversion is destroyed
//!   exactly once, and the factory counts what is outstanding
//! - **Always terminate**: the producer completes the queue on every exit
//!   path, so the consumer drains and stops even after a failure
//! - **Restore on exit**: device settings changed for streaming are put
//!   back however the stream ends
//!
//! # Example
//!
//! ```no_run
//! use frame_relay::{
//!     capture::{SimulatedCameraConfig, SimulatedSystem},
//!     pipeline::{AcquisitionConfig, Pipeline},
//!     save::FileWriter,
//! };
//!
//! let config = AcquisitionConfig {
//!     num_images: 3,
//!     file_name: "out/img".to_string(),
//!     ..Default::default()
//! };
//!
//! let pipeline = Pipeline::new(config, FileWriter::new()).unwrap();
//! let system = SimulatedSystem::open(SimulatedCameraConfig::default());
//! let report = pipeline.run(system).unwrap();
//!
//! assert_eq!(report.files.len(), 3);
//! assert_eq!(pipeline.factory().outstanding(), 0);
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod imaging;
pub mod metrics;
pub mod pipeline;
pub mod save;

// Re-export commonly used types at crate root
pub use capture::{Device, DeviceBuffer, SimulatedCameraConfig, SimulatedSystem, System};
pub use imaging::{Image, ImageFactory, PixelFormat};
pub use pipeline::{AcquisitionConfig, CancelToken, FrameQueue, Pipeline, PipelineError, RunReport};
pub use save::{FileWriter, ImageParams, ImageWriter};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
