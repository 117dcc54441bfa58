//! End-to-end runs of the pipeline against the simulated camera.

use frame_relay::capture::{synthesize_frame, DeviceBuffer, SimulatedCameraConfig, SimulatedSystem};
use frame_relay::imaging::{ImageFactory, PixelFormat};
use frame_relay::pipeline::{AcquisitionConfig, Pipeline, PipelineError, ProducerError};
use frame_relay::save::{FileWriter, ImageParams, ImageWriter, WriteError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Keeps every saved buffer in memory.
#[derive(Default)]
struct RecordingWriter {
    saved: Mutex<Vec<(PathBuf, ImageParams, Vec<u8>)>>,
}

impl ImageWriter for RecordingWriter {
    fn write(&self, params: &ImageParams, path: &Path, data: &[u8]) -> Result<(), WriteError> {
        self.saved
            .lock()
            .push((path.to_path_buf(), *params, data.to_vec()));
        Ok(())
    }
}

/// Writes to disk but fails the call with the given 0-based index.
struct FailingWriter {
    inner: FileWriter,
    fail_on: usize,
    calls: AtomicUsize,
}

impl ImageWriter for FailingWriter {
    fn write(&self, params: &ImageParams, path: &Path, data: &[u8]) -> Result<(), WriteError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(WriteError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.write(params, path, data)
    }
}

/// Counts writes after sleeping for each one.
struct SlowWriter {
    delay: Duration,
    calls: AtomicUsize,
}

impl ImageWriter for SlowWriter {
    fn write(&self, _: &ImageParams, _: &Path, _: &[u8]) -> Result<(), WriteError> {
        std::thread::sleep(self.delay);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn small_camera() -> SimulatedCameraConfig {
    SimulatedCameraConfig {
        width: 16,
        height: 12,
        ..Default::default()
    }
}

fn acquisition(num_images: u32, prefix: &Path, file_type: &str) -> AcquisitionConfig {
    AcquisitionConfig {
        num_images,
        file_name: prefix.to_string_lossy().into_owned(),
        file_type: file_type.to_string(),
        ..Default::default()
    }
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
}

#[test]
fn saves_png_files_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let config = acquisition(3, &out.join("img"), ".png");

    let pipeline = Pipeline::new(config, FileWriter::new()).unwrap();
    let report = pipeline
        .run(SimulatedSystem::open(SimulatedCameraConfig::default()))
        .unwrap();

    let expected: Vec<PathBuf> = (0..3).map(|i| out.join(format!("img{}.png", i))).collect();
    assert_eq!(report.files, expected);
    assert_eq!(files_in(&out), expected);

    for path in &expected {
        let decoded = image::open(path).unwrap();
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 480);
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
    }
    assert_eq!(pipeline.factory().outstanding(), 0);
}

#[test]
fn saved_bytes_match_converted_source() {
    let camera = small_camera();
    let config = AcquisitionConfig {
        num_images: 4,
        pixel_format: PixelFormat::Rgba8,
        ..Default::default()
    };

    let pipeline = Pipeline::new(config, RecordingWriter::default()).unwrap();
    pipeline.run(SimulatedSystem::open(camera.clone())).unwrap();

    let reference = ImageFactory::new();
    let saved = pipeline.writer().saved.lock();
    assert_eq!(saved.len(), 4);

    for (frame_id, (_, params, data)) in saved.iter().enumerate() {
        let buffer = DeviceBuffer::new(
            0,
            synthesize_frame(&camera, frame_id as u64),
            camera.width,
            camera.height,
            camera.pixel_format,
            frame_id as u64,
            0,
        );
        let copy = reference.copy(&buffer).unwrap();
        let expected = reference.convert(&copy, PixelFormat::Rgba8).unwrap();

        assert_eq!(*params, ImageParams::of(&expected));
        assert_eq!(data.as_slice(), expected.data());

        reference.destroy(expected);
        reference.destroy(copy);
    }
    assert_eq!(reference.outstanding(), 0);
}

#[test]
fn slow_writer_does_not_pace_acquisition() {
    let camera = SimulatedCameraConfig {
        frame_interval_ms: 50,
        ..small_camera()
    };
    let config = AcquisitionConfig {
        num_images: 10,
        ..Default::default()
    };
    let writer = SlowWriter {
        delay: Duration::from_millis(200),
        calls: AtomicUsize::new(0),
    };

    let pipeline = Pipeline::new(config, writer).unwrap();
    let started = Instant::now();
    let report = pipeline.run(SimulatedSystem::open(camera)).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(pipeline.writer().calls.load(Ordering::SeqCst), 10);
    assert_eq!(report.files.len(), 10);
    // Serial acquire-then-save would take 10 * 250 ms.
    assert!(elapsed < Duration::from_millis(2600), "took {:?}", elapsed);
    assert!(report.queue_high_water > 1);
}

#[test]
fn acquisition_failure_keeps_queued_frames() {
    let dir = tempfile::tempdir().unwrap();
    let camera = SimulatedCameraConfig {
        fail_at: Some(3),
        ..small_camera()
    };
    let config = acquisition(5, &dir.path().join("frame"), ".png");

    let pipeline = Pipeline::new(config, FileWriter::new()).unwrap();
    let err = pipeline.run(SimulatedSystem::open(camera)).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Producer(ProducerError::Device(_))
    ));
    assert!(err.to_string().starts_with("producer: "));
    assert_eq!(files_in(dir.path()).len(), 2);
    assert_eq!(pipeline.factory().outstanding(), 0);
}

#[test]
fn write_failure_stops_saving() {
    let dir = tempfile::tempdir().unwrap();
    let config = acquisition(4, &dir.path().join("frame"), ".bmp");
    let writer = FailingWriter {
        inner: FileWriter::new(),
        fail_on: 1,
        calls: AtomicUsize::new(0),
    };

    let pipeline = Pipeline::new(config, writer).unwrap();
    let err = pipeline.run(SimulatedSystem::open(small_camera())).unwrap_err();

    assert!(matches!(err, PipelineError::Consumer(_)));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(files_in(dir.path()), vec![dir.path().join("frame0.bmp")]);

    // Acquisition is not cut short by the failed save.
    assert_eq!(pipeline.stats().frames_acquired, 4);
    assert_eq!(pipeline.stats().frames_saved, 1);
    let factory = pipeline.factory().stats();
    assert_eq!(factory.copies, 4);
    assert_eq!(factory.outstanding, 0);
    assert_eq!(factory.destroyed, factory.copies + factory.conversions);
}

#[test]
fn zero_images_is_a_clean_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = acquisition(0, &dir.path().join("frame"), ".png");

    let pipeline = Pipeline::new(config, FileWriter::new()).unwrap();
    let report = pipeline.run(SimulatedSystem::open(small_camera())).unwrap();

    assert!(report.files.is_empty());
    assert_eq!(report.frames_acquired, 0);
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn no_camera_is_a_clean_early_exit() {
    let dir = tempfile::tempdir().unwrap();
    let config = acquisition(3, &dir.path().join("frame"), ".png");
    let camera = SimulatedCameraConfig {
        device_count: 0,
        ..small_camera()
    };

    let pipeline = Pipeline::new(config, FileWriter::new()).unwrap();
    let report = pipeline.run(SimulatedSystem::open(camera)).unwrap();

    assert!(report.no_device());
    assert!(report.files.is_empty());
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn thousand_frames_release_every_image() {
    let camera = SimulatedCameraConfig {
        width: 4,
        height: 4,
        ..Default::default()
    };
    let config = AcquisitionConfig {
        num_images: 1000,
        pixel_format: PixelFormat::Mono8,
        ..Default::default()
    };

    let pipeline = Pipeline::new(config, RecordingWriter::default()).unwrap();
    let report = pipeline.run(SimulatedSystem::open(camera)).unwrap();

    assert_eq!(report.frames_acquired, 1000);
    assert_eq!(report.files.len(), 1000);
    assert_eq!(report.stats.frames_saved, 1000);
    assert_eq!(report.factory.copies, 1000);
    assert_eq!(report.factory.conversions, 1000);
    assert_eq!(report.factory.destroyed, 2000);
    assert_eq!(pipeline.factory().outstanding(), 0);

    let saved = pipeline.writer().saved.lock();
    let names_in_order = saved
        .iter()
        .enumerate()
        .all(|(i, (path, _, _))| path.to_string_lossy().ends_with(&format!("image{}.png", i)));
    assert!(names_in_order);
}
