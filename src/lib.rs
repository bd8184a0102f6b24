//! On-device tomato leaf disease classification.
//!
//! The pipeline turns a captured photograph into a [`DiagnosisRecord`]:
//!
//! 1. [`Preprocessor`] decodes the image, resamples it to the model geometry
//!    and packs normalized RGB values into an [`InputTensor`];
//! 2. [`ModelSession`] feeds the tensor to a [`Classifier`] and checks the
//!    resulting [`ScoreVector`] against the [`LabelTable`];
//! 3. [`Interpreter`] picks the winning class, derives confidence and severity
//!    and enriches the result from the [`KnowledgeBase`].
//!
//! [`DiagnosisEngine`] runs these stages on a background worker with an
//! explicit [`PipelineState`] so the caller's thread never blocks.
//!
//! Models are plugged in through [`ClassifierBackend`]. With the `onnx`
//! feature enabled, `onnx::OnnxBackend` runs ONNX models on ONNX Runtime.

pub mod config;
pub mod engine;
pub mod error;
pub mod interpret;
pub mod knowledge;
pub mod labels;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;
pub mod record;
pub mod session;

pub use config::{InputGeometry, PipelineConfig, ResizeFilter};
pub use engine::{
    DiagnosisEngine, DiagnosisResponse, EngineResult, ImageMetadata, LoadSummary, PipelineState,
    RequestId,
};
pub use error::{
    BackendError, ConfigError, EngineError, InferenceError, KnowledgeError, ModelLoadError,
    PreprocessError,
};
pub use interpret::{Interpreter, UNKNOWN_LABEL};
pub use knowledge::{KnowledgeBase, KnowledgeEntry, MatchKind, MatchRule, normalize_label};
pub use labels::LabelTable;
pub use model::{Classifier, ClassifierBackend};
pub use preprocess::{InputTensor, Preprocessor, RawImage, preprocess};
pub use record::{DiagnosisRecord, HistoryEntry, Severity};
pub use session::{ModelSession, ScoreVector};
