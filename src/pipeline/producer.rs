//! Acquisition worker.
//!
//! Streams frames from the device, copies each one out of its driver
//! buffer and enqueues the copy. The driver buffer is requeued right after
//! the copy is in the queue, outside the queue lock.

use super::{AcquisitionConfig, FrameQueue, PipelineStats};
use crate::capture::{Device, DeviceError, StreamSession};
use crate::imaging::{ImageError, ImageFactory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors that stop the producer.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("copying frame {index}: {source}")]
    Copy {
        index: u32,
        #[source]
        source: ImageError,
    },
    #[error("interrupted after {acquired} of {requested} frames")]
    Interrupted { acquired: u32, requested: u32 },
}

/// Cooperative stop request for the producer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Marks the queue complete when the producer leaves, whatever the exit path.
struct CompleteOnExit<'q>(&'q FrameQueue);

impl Drop for CompleteOnExit<'_> {
    fn drop(&mut self) {
        if self.0.mark_complete() {
            tracing::debug!("Queue completed on producer exit");
        }
    }
}

/// Acquires frames into a [`FrameQueue`].
pub struct Producer<'a> {
    queue: &'a FrameQueue,
    factory: &'a ImageFactory,
    config: &'a AcquisitionConfig,
    stats: &'a PipelineStats,
    cancel: CancelToken,
}

impl<'a> Producer<'a> {
    pub fn new(
        queue: &'a FrameQueue,
        factory: &'a ImageFactory,
        config: &'a AcquisitionConfig,
        stats: &'a PipelineStats,
        cancel: CancelToken,
    ) -> Self {
        Self {
            queue,
            factory,
            config,
            stats,
            cancel,
        }
    }

    /// Acquires `num_images` frames and returns how many were enqueued.
    ///
    /// The queue is always complete when this returns, so a consumer
    /// waiting on it can drain and exit even if acquisition failed.
    pub fn run<D: Device>(&self, device: &mut D) -> Result<u32, ProducerError> {
        let _complete = CompleteOnExit(self.queue);
        let requested = self.config.num_images;

        if requested == 0 {
            self.queue.mark_complete();
            tracing::info!("No images requested");
            return Ok(0);
        }

        let mut session = StreamSession::open(device)?;
        tracing::info!(frames = requested, "Getting images");

        for index in 0..requested {
            if self.cancel.is_cancelled() {
                return Err(ProducerError::Interrupted {
                    acquired: index,
                    requested,
                });
            }

            let buffer = session.get_image(self.config.timeout())?;
            tracing::debug!(index, frame_id = buffer.frame_id(), "Got image");

            let image = match self.factory.copy(&buffer) {
                Ok(image) => image,
                Err(source) => {
                    if let Err(e) = session.requeue_buffer(buffer) {
                        tracing::warn!(error = %e, "Failed to requeue buffer after copy failure");
                    }
                    return Err(ProducerError::Copy { index, source });
                }
            };

            self.queue.push(image, index + 1 == requested);
            self.stats.record_acquired();

            session.requeue_buffer(buffer)?;
            tracing::trace!(index, "Requeued buffer");
        }

        session.close()?;
        tracing::info!(frames = requested, "Acquisition finished");
        Ok(requested)
    }
}
