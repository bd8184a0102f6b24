use crate::{
    config::InputGeometry,
    error::{InferenceError, ModelLoadError},
    labels::LabelTable,
    model::{Classifier, ClassifierBackend},
    preprocess::InputTensor,
};
use std::{path::Path, sync::Arc, time::Instant};

/// Per-class scores, index-aligned with the session's [`LabelTable`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for ScoreVector {
    fn from(scores: Vec<f32>) -> Self {
        Self(scores)
    }
}

/// A loaded classifier together with its label table.
///
/// The label table is shared read-only; the classifier itself is only ever
/// driven through `&mut self`, so one session never runs two inferences at
/// the same time.
pub struct ModelSession<C: Classifier> {
    classifier: C,
    labels: Arc<LabelTable>,
    geometry: InputGeometry,
}

impl<C: Classifier> ModelSession<C> {
    pub fn new(classifier: C, labels: LabelTable, geometry: InputGeometry) -> Self {
        Self {
            classifier,
            labels: Arc::new(labels),
            geometry,
        }
    }

    /// Reads the model artifact and the label file and builds a session.
    pub fn load<B>(
        backend: &B,
        model_path: &Path,
        labels_path: &Path,
        geometry: InputGeometry,
    ) -> Result<Self, ModelLoadError>
    where
        B: ClassifierBackend<Model = C>,
    {
        let start_time = Instant::now();

        let artifact = std::fs::read(model_path).map_err(|source| ModelLoadError::Artifact {
            path: model_path.to_path_buf(),
            source,
        })?;
        if artifact.is_empty() {
            return Err(ModelLoadError::EmptyArtifact(model_path.to_path_buf()));
        }

        let classifier = backend
            .load(&artifact)
            .map_err(|e| ModelLoadError::Backend(Box::new(e)))?;
        let labels = LabelTable::from_path(labels_path)?;

        log::info!(
            "Loaded model '{}' ({} bytes) with {} labels in {:?}",
            model_path.display(),
            artifact.len(),
            labels.len(),
            start_time.elapsed()
        );

        Ok(Self::new(classifier, labels, geometry))
    }

    /// Runs one inference. The tensor must match the session geometry and the
    /// model must produce exactly one score per label.
    pub fn infer(&mut self, tensor: &InputTensor) -> Result<ScoreVector, InferenceError> {
        let expected = self.geometry.tensor_len();
        if tensor.len() != expected {
            return Err(InferenceError::ShapeMismatch {
                expected,
                actual: tensor.len(),
            });
        }

        let scores = self
            .classifier
            .classify(tensor)
            .map_err(|e| InferenceError::Runtime(Box::new(e)))?;

        if scores.len() != self.labels.len() {
            return Err(InferenceError::OutputMismatch {
                expected: self.labels.len(),
                actual: scores.len(),
            });
        }

        Ok(ScoreVector(scores))
    }

    pub fn labels(&self) -> &Arc<LabelTable> {
        &self.labels
    }

    pub fn geometry(&self) -> InputGeometry {
        self.geometry
    }
}
