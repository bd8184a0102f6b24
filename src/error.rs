use std::{path::PathBuf, time::Duration};

/// Boxed error produced by a classifier backend.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while turning a raw image into an input tensor.
#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    /// The image file could not be read.
    #[error("failed to read image '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The image bytes could not be decoded into pixels.
    #[error("failed to decode image: {0}")]
    Decode(String),
    /// The target geometry could not be produced.
    #[error("failed to resize image to {width}x{height}: {reason}")]
    Resize {
        width: u32,
        height: u32,
        reason: String,
    },
}

/// Errors raised while loading the model artifact or its label table.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact '{path}': {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model artifact '{0}' is empty")]
    EmptyArtifact(PathBuf),
    #[error("backend rejected model artifact: {0}")]
    Backend(#[source] BackendError),
    #[error("failed to read label file '{path}': {source}")]
    Labels {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("label file '{0}' contains no labels")]
    NoLabels(PathBuf),
}

/// Errors raised by a single inference call.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("input tensor has {actual} elements, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("model produced {actual} scores for {expected} labels")]
    OutputMismatch { expected: usize, actual: usize },
    #[error("model runtime fault: {0}")]
    Runtime(#[source] BackendError),
}

/// Errors raised while loading a knowledge base document.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("failed to read knowledge base '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse knowledge base: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("fallback entry '{0}' is not defined")]
    MissingFallback(String),
    #[error("rule '{pattern}' points at undefined entry '{entry}'")]
    UnknownEntry { pattern: String, entry: String },
}

/// Errors raised while loading a pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors surfaced by the diagnosis engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No model has been loaded successfully yet.
    #[error("model is not ready (state: {0})")]
    NotReady(&'static str),
    /// Another load or inference is still running.
    #[error("engine is busy (state: {0})")]
    Busy(&'static str),
    #[error("engine worker is disconnected")]
    Disconnected,
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}
