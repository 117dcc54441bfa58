//! Frame Relay CLI
//!
//! Runs the acquire-and-save pipeline against the simulated camera and
//! writes the converted frames to disk.

use clap::Parser;
use frame_relay::{
    capture::SimulatedSystem,
    imaging::PixelFormat,
    metrics::{MetricsRegistry, Sampler, SAMPLE_INTERVAL},
    pipeline::{CancelToken, FileConfig, Pipeline, PipelineError, RunReport},
    save::FileWriter,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{info, warn};

/// Acquire frames on one thread and save them on another.
#[derive(Debug, Parser)]
#[command(name = "frame-relay", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of images to acquire and save.
    #[arg(short = 'n', long)]
    num_images: Option<u32>,

    /// Per-frame acquisition timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Pixel format to convert to before saving (e.g. BGR8, Mono8).
    #[arg(long)]
    pixel_format: Option<PixelFormat>,

    /// Output path prefix; frame i is written to <FILE_NAME><i><FILE_TYPE>.
    #[arg(long)]
    file_name: Option<String>,

    /// Output file extension, including the dot.
    #[arg(long)]
    file_type: Option<String>,

    /// Simulated sensor width.
    #[arg(long)]
    width: Option<u32>,

    /// Simulated sensor height.
    #[arg(long)]
    height: Option<u32>,

    /// Simulated time between frames in milliseconds.
    #[arg(long)]
    frame_interval_ms: Option<u64>,

    /// Print Prometheus metrics for the run to stdout.
    #[arg(long)]
    print_metrics: bool,
}

impl Cli {
    /// Loads the config file (or defaults) and applies flag overrides.
    fn resolve(&self) -> Result<FileConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        let acquisition = &mut config.acquisition;
        if let Some(n) = self.num_images {
            acquisition.num_images = n;
        }
        if let Some(ms) = self.timeout_ms {
            acquisition.timeout_ms = ms;
        }
        if let Some(format) = self.pixel_format {
            acquisition.pixel_format = format;
        }
        if let Some(name) = &self.file_name {
            acquisition.file_name = name.clone();
        }
        if let Some(ext) = &self.file_type {
            acquisition.file_type = ext.clone();
        }

        let camera = &mut config.camera;
        if let Some(width) = self.width {
            camera.width = width;
        }
        if let Some(height) = self.height {
            camera.height = height;
        }
        if let Some(ms) = self.frame_interval_ms {
            camera.frame_interval_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Frame Relay v{}", frame_relay::VERSION);

    match run(&cli) {
        Ok(report) if report.no_device() => {
            info!("Nothing acquired");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            info!(
                files = report.files.len(),
                elapsed_ms = report.elapsed().num_milliseconds(),
                "Example complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<RunReport, PipelineError> {
    let config = cli.resolve()?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let registry = match MetricsRegistry::new() {
        Ok(registry) => Some(Arc::new(registry)),
        Err(e) => {
            warn!(error = %e, "Metrics disabled");
            None
        }
    };

    #[cfg(feature = "metrics")]
    let server = match (&registry, config.output.metrics_port) {
        (Some(registry), port) if port != 0 => {
            let server = frame_relay::metrics::MetricsServer::new(
                frame_relay::metrics::MetricsServerConfig::with_port(port),
                Arc::clone(registry),
            );
            match server.spawn() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "Metrics server not started");
                    None
                }
            }
        }
        _ => None,
    };

    let pipeline =
        Pipeline::new(config.acquisition.clone(), FileWriter::new())?.with_cancel_token(cancel);
    let system = SimulatedSystem::open(config.camera.clone());

    let result = match &registry {
        Some(registry) => thread::scope(|scope| {
            let (stop, stopped) = mpsc::channel();
            let registry = registry.as_ref();
            let pipeline = &pipeline;
            scope.spawn(move || Sampler::new(registry, pipeline).run(stopped, SAMPLE_INTERVAL));

            let result = pipeline.run(system);
            drop(stop);
            result
        }),
        None => pipeline.run(system),
    };

    if let Some(registry) = &registry {
        if let Ok(report) = &result {
            registry.observe_queue_high_water(report.queue_high_water);
        }
        if cli.print_metrics {
            match registry.encode() {
                Ok(text) => print!("{}", text),
                Err(e) => warn!(error = %e, "Failed to encode metrics"),
            }
        }
    }

    #[cfg(feature = "metrics")]
    {
        if let Some(handle) = server {
            if let Err(e) = handle.shutdown() {
                warn!(error = %e, "Metrics server shutdown failed");
            }
        }
    }

    result
}
