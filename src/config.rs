use crate::error::ConfigError;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Default model input width in pixels.
pub const DEFAULT_INPUT_WIDTH: u32 = 224;
/// Default model input height in pixels.
pub const DEFAULT_INPUT_HEIGHT: u32 = 224;
/// RGB, alpha is always dropped.
pub const INPUT_CHANNELS: usize = 3;
/// A winning score strictly above this is reported as high severity.
pub const DEFAULT_HIGH_SEVERITY_THRESHOLD: f32 = 0.8;
/// How long a blocking wait for a response may take.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 30_000;

/// Resampling filter used to bring images to the model geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Fixed spatial shape of the model input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputGeometry {
    pub width: u32,
    pub height: u32,
}

impl InputGeometry {
    /// Number of `f32` values a tensor of this geometry holds.
    pub fn tensor_len(&self) -> usize {
        self.width as usize * self.height as usize * INPUT_CHANNELS
    }
}

impl Default for InputGeometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_INPUT_WIDTH,
            height: DEFAULT_INPUT_HEIGHT,
        }
    }
}

/// Tunables for the classification pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: InputGeometry,
    pub resize_filter: ResizeFilter,
    pub high_severity_threshold: f32,
    pub response_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: InputGeometry::default(),
            resize_filter: ResizeFilter::default(),
            high_severity_threshold: DEFAULT_HIGH_SEVERITY_THRESHOLD,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file. Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.width == 0 || self.input.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "input geometry must be non-zero, got {}x{}",
                self.input.width, self.input.height
            )));
        }
        if !self.high_severity_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "high_severity_threshold must be finite".to_string(),
            ));
        }
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "response_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}
