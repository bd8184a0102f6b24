use crate::{
    config::{DEFAULT_HIGH_SEVERITY_THRESHOLD, PipelineConfig},
    knowledge::KnowledgeBase,
    labels::LabelTable,
    record::{DiagnosisRecord, RecordContent, Severity},
    session::ScoreVector,
};
use std::sync::Arc;

/// Label reported when the winning index has no name.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Index and value of the highest finite score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TopScore {
    pub index: usize,
    pub score: f32,
}

/// Finds the highest score in one pass. Ties keep the earliest index and
/// non-finite values are ignored.
pub fn top_score(scores: &[f32]) -> Option<TopScore> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, score)| score.is_finite())
        .fold(None, |best: Option<TopScore>, (index, &score)| match best {
            Some(top) if score <= top.score => Some(top),
            _ => Some(TopScore { index, score }),
        })
}

/// `score` as a percentage rounded to one decimal, clamped to `[0, 100]`.
pub fn confidence_percent(score: f32) -> f32 {
    let percent = (f64::from(score) * 1000.0).round() / 10.0;
    percent.clamp(0.0, 100.0) as f32
}

/// Converts raw model scores into diagnosis records.
#[derive(Clone, Debug)]
pub struct Interpreter {
    knowledge: Arc<KnowledgeBase>,
    high_severity_threshold: f32,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Arc::new(KnowledgeBase::builtin()), DEFAULT_HIGH_SEVERITY_THRESHOLD)
    }
}

impl Interpreter {
    pub fn new(knowledge: Arc<KnowledgeBase>, high_severity_threshold: f32) -> Self {
        Self {
            knowledge,
            high_severity_threshold,
        }
    }

    pub fn from_config(knowledge: Arc<KnowledgeBase>, config: &PipelineConfig) -> Self {
        Self::new(knowledge, config.high_severity_threshold)
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Severity tier of a winning score.
    pub fn severity_for(&self, score: f32) -> Severity {
        if score > self.high_severity_threshold {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    pub fn interpret(&self, scores: &ScoreVector, labels: &LabelTable) -> DiagnosisRecord {
        let top = top_score(scores.as_slice());
        let score = top.map_or(0.0, |t| t.score);
        let label = top
            .and_then(|t| labels.get(t.index))
            .unwrap_or(UNKNOWN_LABEL)
            .to_string();

        let resolved = self.knowledge.lookup(&label);
        log::debug!(
            "Top class {:?} ({}) with score {:.4} resolved to '{}'",
            top.map(|t| t.index),
            label,
            score,
            resolved.name
        );

        DiagnosisRecord::new(
            label,
            confidence_percent(score),
            self.severity_for(score),
            RecordContent {
                risk: resolved.entry.severity,
                condition: resolved.name.to_string(),
                description: resolved.entry.description.clone(),
                tags: resolved.entry.tags.iter().cloned().collect(),
                treatments: resolved.entry.treatments.clone(),
            },
        )
    }
}
