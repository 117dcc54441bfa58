//! Run orchestration.
//!
//! Opens the first discovered device, runs the consumer on a scoped
//! worker thread and the producer on the calling thread, then joins and
//! tears everything down. The first failure of either worker becomes the
//! run's error. Finding no camera is not a failure: the run ends early
//! with an empty report.

use super::{
    AcquisitionConfig, CancelToken, ConfigError, Consumer, ConsumerError, FrameQueue,
    PipelineStats, Producer, ProducerError, StatsSnapshot,
};
use crate::capture::{Device, DeviceError, DeviceInfo, System};
use crate::imaging::{FactoryStats, ImageFactory};
use crate::save::ImageWriter;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// How long device discovery waits for answers.
const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(100);

/// Errors surfaced by a pipeline run, qualified by the failing stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("system: {0}")]
    System(#[source] DeviceError),
    #[error("producer: {0}")]
    Producer(#[from] ProducerError),
    #[error("consumer: {0}")]
    Consumer(#[from] ConsumerError),
    #[error("consumer: failed to start worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("consumer: worker thread panicked")]
    ConsumerPanicked,
}

/// Summary of a successful run.
///
/// Counts cover this run only, even when the pipeline is run repeatedly.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Device the run streamed from; `None` when no camera was found.
    pub device: Option<DeviceInfo>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub frames_acquired: u32,
    pub files: Vec<PathBuf>,
    pub queue_high_water: usize,
    pub factory: FactoryStats,
    pub stats: StatsSnapshot,
}

impl RunReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// True when discovery found no camera and nothing was attempted.
    pub fn no_device(&self) -> bool {
        self.device.is_none()
    }
}

struct StreamOutcome {
    frames_acquired: u32,
    files: Vec<PathBuf>,
    queue_high_water: usize,
}

/// The acquire-and-save pipeline.
pub struct Pipeline<W: ImageWriter> {
    config: AcquisitionConfig,
    factory: ImageFactory,
    writer: W,
    stats: PipelineStats,
    cancel: CancelToken,
}

impl<W: ImageWriter> Pipeline<W> {
    /// Creates a pipeline after validating `config`.
    pub fn new(config: AcquisitionConfig, writer: W) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            factory: ImageFactory::new(),
            writer,
            stats: PipelineStats::new(),
            cancel: CancelToken::new(),
        })
    }

    /// Uses `factory` for copies and conversions.
    pub fn with_factory(mut self, factory: ImageFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Lets an outside party stop acquisition early.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn factory(&self) -> &ImageFactory {
        &self.factory
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Counters accumulated over every run of this pipeline.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Discovers a device on `system`, runs the pipeline on it and closes
    /// the system again.
    pub fn run<S: System>(&self, mut system: S) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let stats_before = self.stats.snapshot();
        let factory_before = self.factory.stats();

        if let Err(e) = system.update_devices(DISCOVERY_TIMEOUT) {
            system.close();
            return Err(PipelineError::System(e));
        }

        let Some(info) = system.devices().into_iter().next() else {
            tracing::warn!("No camera connected");
            system.close();
            return Ok(RunReport {
                device: None,
                started_at,
                finished_at: Utc::now(),
                frames_acquired: 0,
                files: Vec::new(),
                queue_high_water: 0,
                factory: self.factory.stats().since(&factory_before),
                stats: StatsSnapshot::default(),
            });
        };
        tracing::info!(device = %info, "Using device");

        let mut device = match system.create_device(&info) {
            Ok(device) => device,
            Err(e) => {
                system.close();
                return Err(PipelineError::System(e));
            }
        };

        let outcome = self.stream(&mut device);

        if let Err(e) = system.destroy_device(device) {
            tracing::warn!(error = %e, "Failed to destroy device");
        }
        system.close();

        let outcome = outcome?;
        let report = RunReport {
            device: Some(info),
            started_at,
            finished_at: Utc::now(),
            frames_acquired: outcome.frames_acquired,
            files: outcome.files,
            queue_high_water: outcome.queue_high_water,
            factory: self.factory.stats().since(&factory_before),
            stats: self.stats.snapshot().since(&stats_before),
        };

        tracing::info!(
            frames = report.frames_acquired,
            files = report.files.len(),
            high_water = report.queue_high_water,
            elapsed_ms = report.elapsed().num_milliseconds(),
            "Run complete"
        );
        Ok(report)
    }

    /// Runs both workers against an open device.
    fn stream<D: Device>(&self, device: &mut D) -> Result<StreamOutcome, PipelineError> {
        let queue = FrameQueue::new();
        let producer = Producer::new(
            &queue,
            &self.factory,
            &self.config,
            &self.stats,
            self.cancel.clone(),
        );
        let consumer = Consumer::new(
            &queue,
            &self.factory,
            &self.writer,
            &self.config,
            &self.stats,
        );

        let (produced, consumed) = thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name("consumer".to_string())
                .spawn_scoped(scope, || {
                    let _span = tracing::info_span!("consumer").entered();
                    consumer.run()
                })
                .map_err(PipelineError::Spawn)?;

            let produced = {
                let _span = tracing::info_span!("producer").entered();
                producer.run(device)
            };

            let consumed = match worker.join() {
                Ok(result) => result.map_err(PipelineError::from),
                Err(_) => Err(PipelineError::ConsumerPanicked),
            };
            Ok::<_, PipelineError>((produced, consumed))
        })?;

        let abandoned = queue.drain();
        if !abandoned.is_empty() {
            tracing::warn!(count = abandoned.len(), "Discarding unsaved images");
            abandoned
                .into_iter()
                .for_each(|image| self.factory.destroy(image));
        }

        match (produced, consumed) {
            (Ok(frames_acquired), Ok(files)) => Ok(StreamOutcome {
                frames_acquired,
                files,
                queue_high_water: queue.high_water(),
            }),
            (Err(producer), Ok(_)) => Err(producer.into()),
            (Err(producer), Err(consumer)) => {
                tracing::error!(error = %consumer, "Consumer failed as well");
                Err(producer.into())
            }
            (Ok(_), Err(consumer)) => Err(consumer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SimulatedCameraConfig, SimulatedSystem};
    use crate::save::{ImageParams, WriteError};
    use std::path::Path;

    struct NullWriter;

    impl ImageWriter for NullWriter {
        fn write(&self, _: &ImageParams, _: &Path, _: &[u8]) -> Result<(), WriteError> {
            Ok(())
        }
    }

    struct PanickingWriter;

    impl ImageWriter for PanickingWriter {
        fn write(&self, _: &ImageParams, _: &Path, _: &[u8]) -> Result<(), WriteError> {
            panic!("writer exploded");
        }
    }

    fn small_camera() -> SimulatedCameraConfig {
        SimulatedCameraConfig {
            width: 8,
            height: 8,
            ..Default::default()
        }
    }

    fn config(num_images: u32) -> AcquisitionConfig {
        AcquisitionConfig {
            num_images,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_device_ends_cleanly() {
        let pipeline = Pipeline::new(config(3), NullWriter).unwrap();
        let system = SimulatedSystem::open(SimulatedCameraConfig {
            device_count: 0,
            ..small_camera()
        });

        let report = pipeline.run(system).unwrap();
        assert!(report.no_device());
        assert!(report.files.is_empty());
        assert_eq!(report.frames_acquired, 0);
        assert_eq!(pipeline.stats().frames_acquired, 0);
        assert_eq!(pipeline.factory().stats().copies, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = AcquisitionConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            Pipeline::new(bad, NullWriter),
            Err(PipelineError::Config(ConfigError::InvalidTimeout))
        ));
    }

    #[test]
    fn test_report_counts() {
        let pipeline = Pipeline::new(config(4), NullWriter).unwrap();
        let report = pipeline.run(SimulatedSystem::open(small_camera())).unwrap();

        assert_eq!(report.frames_acquired, 4);
        assert_eq!(report.files.len(), 4);
        assert_eq!(report.factory.copies, 4);
        assert_eq!(report.factory.conversions, 4);
        assert_eq!(report.factory.outstanding, 0);
        assert_eq!(report.stats.frames_saved, 4);
        assert!(report.queue_high_water >= 1);
        assert_eq!(report.device.unwrap().serial, "SIM000000");
    }

    #[test]
    fn test_repeated_runs_report_their_own_counts() {
        let pipeline = Pipeline::new(config(3), NullWriter).unwrap();
        pipeline.run(SimulatedSystem::open(small_camera())).unwrap();
        let second = pipeline.run(SimulatedSystem::open(small_camera())).unwrap();

        assert_eq!(second.frames_acquired, 3);
        assert_eq!(second.stats.frames_acquired, 3);
        assert_eq!(second.stats.frames_saved, 3);
        assert_eq!(second.factory.copies, 3);
        assert_eq!(second.factory.conversions, 3);
        assert_eq!(second.factory.destroyed, 6);
        assert_eq!(second.factory.outstanding, 0);

        assert_eq!(pipeline.stats().frames_saved, 6);
        assert_eq!(pipeline.factory().stats().copies, 6);
    }

    #[test]
    fn test_consumer_panic_reported() {
        let pipeline = Pipeline::new(config(2), PanickingWriter).unwrap();
        let err = pipeline
            .run(SimulatedSystem::open(small_camera()))
            .unwrap_err();

        assert!(matches!(err, PipelineError::ConsumerPanicked));
        assert_eq!(pipeline.factory().outstanding(), 0);
    }

    #[test]
    fn test_error_names_stage() {
        let pipeline = Pipeline::new(config(3), NullWriter).unwrap();
        let err = pipeline
            .run(SimulatedSystem::open(SimulatedCameraConfig {
                fail_at: Some(1),
                ..small_camera()
            }))
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "producer: acquisition timed out after 2000 ms"
        );
    }
}
