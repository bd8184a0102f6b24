//! ONNX Runtime backend.
//!
//! The artifact is an ONNX model taking one `f32` input of shape
//! `[1, height, width, 3]` and producing one score per class as its first
//! output.

use crate::{
    model::{Classifier, ClassifierBackend},
    preprocess::InputTensor,
};
use ort::{session::Session, value::TensorRef};

#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    #[error("failed to create onnx session: {0}")]
    Session(String),
    #[error("failed to build input tensor: {0}")]
    Input(String),
    #[error("onnx runtime inference failed: {0}")]
    Run(String),
    #[error("model produced no outputs")]
    NoOutput,
    #[error("failed to extract scores: {0}")]
    Output(String),
}

/// Builds [`OnnxClassifier`]s from in-memory ONNX models.
#[derive(Clone, Debug, Default)]
pub struct OnnxBackend {
    intra_threads: Option<usize>,
}

impl OnnxBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the threads ONNX Runtime uses inside a single operator.
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }
}

impl ClassifierBackend for OnnxBackend {
    type Model = OnnxClassifier;
    type Error = OnnxError;

    fn load(&self, artifact: &[u8]) -> Result<Self::Model, Self::Error> {
        let mut builder = Session::builder().map_err(|e| OnnxError::Session(e.to_string()))?;
        if let Some(threads) = self.intra_threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(|e| OnnxError::Session(e.to_string()))?;
        }
        let session = builder
            .commit_from_memory(artifact)
            .map_err(|e| OnnxError::Session(e.to_string()))?;

        log::debug!("Created onnx session from {} byte model", artifact.len());
        Ok(OnnxClassifier { session })
    }
}

/// A classifier running on an ONNX Runtime session.
pub struct OnnxClassifier {
    session: Session,
}

impl Classifier for OnnxClassifier {
    type Error = OnnxError;

    fn classify(&mut self, input: &InputTensor) -> Result<Vec<f32>, Self::Error> {
        let geometry = input.geometry();
        let shape = vec![
            1_i64,
            i64::from(geometry.height),
            i64::from(geometry.width),
            input.channels() as i64,
        ];
        let tensor = TensorRef::from_array_view((shape, input.as_slice()))
            .map_err(|e| OnnxError::Input(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| OnnxError::Run(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(OnnxError::NoOutput);
        }

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| OnnxError::Output(e.to_string()))?;
        Ok(scores.to_vec())
    }
}
