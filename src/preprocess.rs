//! Image to tensor preprocessing.
//!
//! Decodes an encoded image, resamples it to the model geometry and packs the
//! RGB channels into a flat HWC buffer of `f32` values in `[0, 1]`.

use crate::{
    config::{INPUT_CHANNELS, InputGeometry, PipelineConfig, ResizeFilter},
    error::PreprocessError,
};
use image::{DynamicImage, RgbImage, imageops};
use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

enum ImageData {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// An encoded image handed over by the capture or gallery collaborator.
///
/// Path-backed images are read lazily so the file access happens on the
/// thread that runs the pipeline.
pub struct RawImage {
    data: ImageData,
}

impl RawImage {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            data: ImageData::Path(path.into()),
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: ImageData::Bytes(bytes.into()),
        }
    }

    /// The file this image was created from, if any.
    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            ImageData::Path(path) => Some(path),
            ImageData::Bytes(_) => None,
        }
    }

    fn read(&self) -> Result<Cow<'_, [u8]>, PreprocessError> {
        match &self.data {
            ImageData::Path(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|source| PreprocessError::Read {
                    path: path.clone(),
                    source,
                }),
            ImageData::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }
}

/// Model input: `width * height * 3` values, RGB, pixel-major.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
    geometry: InputGeometry,
    source_size: (u32, u32),
}

impl InputTensor {
    /// Wraps an already packed buffer. The length is checked by the session
    /// before the buffer reaches a classifier.
    pub fn from_vec(data: Vec<f32>, geometry: InputGeometry) -> Self {
        Self {
            data,
            geometry,
            source_size: (geometry.width, geometry.height),
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn geometry(&self) -> InputGeometry {
        self.geometry
    }

    pub fn channels(&self) -> usize {
        INPUT_CHANNELS
    }

    /// Width and height of the decoded image before resampling.
    pub fn source_size(&self) -> (u32, u32) {
        self.source_size
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Turns raw images into model input tensors.
#[derive(Clone, Copy, Debug)]
pub struct Preprocessor {
    geometry: InputGeometry,
    filter: ResizeFilter,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl Preprocessor {
    pub fn new(geometry: InputGeometry, filter: ResizeFilter) -> Self {
        Self { geometry, filter }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.input, config.resize_filter)
    }

    pub fn geometry(&self) -> InputGeometry {
        self.geometry
    }

    pub fn preprocess(&self, raw: &RawImage) -> Result<InputTensor, PreprocessError> {
        let bytes = raw.read()?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;
        self.preprocess_image(&image)
    }

    /// Same as [`Preprocessor::preprocess`] for an image that is already decoded.
    pub fn preprocess_image(&self, image: &DynamicImage) -> Result<InputTensor, PreprocessError> {
        let source_size = (image.width(), image.height());
        if source_size.0 == 0 || source_size.1 == 0 {
            return Err(PreprocessError::Decode("image has no pixels".to_string()));
        }

        let InputGeometry { width, height } = self.geometry;
        if width == 0 || height == 0 {
            return Err(self.resize_error("target geometry is empty"));
        }

        // to_rgb8 drops alpha and scales deeper color types down to 8 bits
        let rgb = image.to_rgb8();
        let resized: RgbImage = if rgb.dimensions() == (width, height) {
            rgb
        } else {
            imageops::resize(&rgb, width, height, self.filter.into())
        };

        let pixels = resized.as_raw();
        if resized.dimensions() != (width, height) || pixels.len() != self.geometry.tensor_len() {
            return Err(self.resize_error(&format!(
                "resampler produced {}x{} ({} values)",
                resized.width(),
                resized.height(),
                pixels.len()
            )));
        }

        let data = pixels.iter().map(|&v| f32::from(v) / 255.0).collect();

        log::debug!(
            "Preprocessed {}x{} image into {}x{}x{} tensor",
            source_size.0,
            source_size.1,
            width,
            height,
            INPUT_CHANNELS
        );

        Ok(InputTensor {
            data,
            geometry: self.geometry,
            source_size,
        })
    }

    fn resize_error(&self, reason: &str) -> PreprocessError {
        PreprocessError::Resize {
            width: self.geometry.width,
            height: self.geometry.height,
            reason: reason.to_string(),
        }
    }
}

/// Preprocesses `raw` with the geometry and filter from `config`.
pub fn preprocess(raw: &RawImage, config: &PipelineConfig) -> Result<InputTensor, PreprocessError> {
    Preprocessor::from_config(config).preprocess(raw)
}
