//! Pipeline configuration.
//!
//! Defaults reproduce the stock acquire-and-save run: ten frames, a two
//! second acquisition timeout, BGR8 output written as PNG files.

use crate::capture::SimulatedCameraConfig;
use crate::imaging::PixelFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one acquire-and-save run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Maximum time to wait inside a single `GetImage`, in milliseconds.
    pub timeout_ms: u64,
    /// Frames to acquire and save.
    pub num_images: u32,
    /// Target format for conversion before saving.
    pub pixel_format: PixelFormat,
    /// Path prefix; frame `i` is written to `<file_name><i><file_type>`.
    pub file_name: String,
    /// File extension including the leading dot.
    pub file_type: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            num_images: 10,
            pixel_format: PixelFormat::Bgr8,
            file_name: "Images/Acquisition_MultithreadedAcquisitionAndSave/image".to_string(),
            file_type: ".png".to_string(),
        }
    }
}

impl AcquisitionConfig {
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Output path for the frame at `index`.
    pub fn file_path(&self, index: u32) -> PathBuf {
        PathBuf::from(format!("{}{}{}", self.file_name, index, self.file_type))
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.file_name.is_empty() {
            return Err(ConfigError::EmptyFileName);
        }
        if !self.file_type.starts_with('.') || self.file_type.len() < 2 {
            return Err(ConfigError::InvalidFileType(self.file_type.clone()));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("stream needs at least one buffer")]
    InvalidBufferCount,
    #[error("acquisition timeout must be non-zero")]
    InvalidTimeout,
    #[error("file name prefix is empty")]
    EmptyFileName,
    #[error("invalid file type {0:?} (expected an extension such as \".png\")")]
    InvalidFileType(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub camera: SimulatedCameraConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Metrics server port (0 to disable).
    #[serde(default)]
    pub metrics_port: u16,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.acquisition.validate()?;
        self.camera.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(AcquisitionConfig::default().validate().is_ok());
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_file_path_layout() {
        let config = AcquisitionConfig {
            file_name: "out/img".to_string(),
            file_type: ".png".to_string(),
            ..Default::default()
        };
        assert_eq!(config.file_path(0), PathBuf::from("out/img0.png"));
        assert_eq!(config.file_path(12), PathBuf::from("out/img12.png"));
    }

    #[test]
    fn test_file_type_needs_dot() {
        let config = AcquisitionConfig {
            file_type: "png".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFileType(_))
        ));
    }

    #[test]
    fn test_zero_timeout_invalid() {
        let config = AcquisitionConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout)));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: FileConfig = toml::from_str(
            r#"
            [acquisition]
            num_images = 3
            pixel_format = "RGB8"

            [camera]
            width = 32
            fail_at = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.acquisition.num_images, 3);
        assert_eq!(config.acquisition.pixel_format, PixelFormat::Rgb8);
        assert_eq!(config.acquisition.timeout_ms, 2000);
        assert_eq!(config.camera.width, 32);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.camera.fail_at, Some(2));
        assert_eq!(config.output.metrics_port, 0);
    }

    #[test]
    fn test_from_file_rejects_invalid_camera() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[camera]\nbuffer_count = 0\n").unwrap();

        assert!(matches!(
            FileConfig::from_file(&path),
            Err(ConfigError::InvalidBufferCount)
        ));
    }
}
