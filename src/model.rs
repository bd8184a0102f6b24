use crate::preprocess::InputTensor;

/// Trait for classifiers that can be driven by a [`crate::ModelSession`].
///
/// A classifier maps one input tensor to one score per label. Implementations
/// are never called concurrently; the session holds them behind `&mut self`.
pub trait Classifier {
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs the model on `input` and returns the raw class scores.
    fn classify(&mut self, input: &InputTensor) -> Result<Vec<f32>, Self::Error>;
}

/// Turns an opaque model artifact into a ready [`Classifier`].
///
/// The artifact format is entirely up to the backend; the session only reads
/// the file and hands over its bytes.
pub trait ClassifierBackend {
    type Model: Classifier + Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    fn load(&self, artifact: &[u8]) -> Result<Self::Model, Self::Error>;
}
