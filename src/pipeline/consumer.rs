//! Saving worker.
//!
//! Drains the queue until it reports done. Only the dequeue happens under
//! the queue lock; conversion, writing and release all run outside it so
//! a slow writer never holds up acquisition.

use super::{AcquisitionConfig, FrameQueue, PipelineStats};
use crate::imaging::{ImageError, ImageFactory, PixelFormat};
use crate::save::{ImageParams, ImageWriter, WriteError};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Errors that stop the consumer.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("converting frame {index} to {format}: {source}")]
    Convert {
        index: u32,
        format: PixelFormat,
        #[source]
        source: ImageError,
    },
    #[error("saving frame {index}: {source}")]
    Write {
        index: u32,
        #[source]
        source: WriteError,
    },
}

/// Converts and saves images taken from a [`FrameQueue`].
pub struct Consumer<'a, W: ImageWriter> {
    queue: &'a FrameQueue,
    factory: &'a ImageFactory,
    writer: &'a W,
    config: &'a AcquisitionConfig,
    stats: &'a PipelineStats,
}

impl<'a, W: ImageWriter> Consumer<'a, W> {
    pub fn new(
        queue: &'a FrameQueue,
        factory: &'a ImageFactory,
        writer: &'a W,
        config: &'a AcquisitionConfig,
        stats: &'a PipelineStats,
    ) -> Self {
        Self {
            queue,
            factory,
            writer,
            config,
            stats,
        }
    }

    /// Saves images until the queue is empty and complete.
    ///
    /// Returns the written paths in the order they were saved.
    pub fn run(&self) -> Result<Vec<PathBuf>, ConsumerError> {
        let target = self.config.pixel_format;
        let mut written = Vec::new();
        let mut index = 0u32;
        let mut done = false;

        while !done {
            let (next, now_done) = self.queue.pop_blocking();
            done = now_done;
            let Some(copy) = next else {
                break;
            };

            let converted = match self.factory.convert(&copy, target) {
                Ok(converted) => converted,
                Err(source) => {
                    self.factory.destroy(copy);
                    return Err(ConsumerError::Convert {
                        index,
                        format: target,
                        source,
                    });
                }
            };
            tracing::debug!(index, format = %target, "Converted image");

            let params = ImageParams::of(&converted);
            let path = self.config.file_path(index);
            let started = Instant::now();
            let result = self.writer.write(&params, &path, converted.data());
            let bytes = converted.data().len();

            self.factory.destroy(converted);
            self.factory.destroy(copy);

            result.map_err(|source| ConsumerError::Write { index, source })?;
            self.stats.record_saved(bytes, started.elapsed());
            tracing::info!(index, path = %path.display(), "Saved image");

            written.push(path);
            index += 1;
        }

        Ok(written)
    }
}
