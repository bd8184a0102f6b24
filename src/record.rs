//! The diagnosis record handed to display, chat and persistence layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// Coarse risk tier attached to a diagnosis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one successful classification.
///
/// Two severities are carried on purpose:
/// * `severity` is derived from the winning score (threshold policy);
/// * `risk` is the per-disease tier from the knowledge base, which is what
///   history and chat consumers present to the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRecord {
    label: String,
    confidence: f32,
    severity: Severity,
    risk: Severity,
    condition: String,
    description: String,
    tags: BTreeSet<String>,
    treatments: Vec<String>,
    created_at: DateTime<Utc>,
}

/// Knowledge-base content attached to a record.
pub(crate) struct RecordContent {
    pub risk: Severity,
    pub condition: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub treatments: Vec<String>,
}

impl DiagnosisRecord {
    pub(crate) fn new(
        label: String,
        confidence: f32,
        severity: Severity,
        content: RecordContent,
    ) -> Self {
        Self {
            label,
            confidence,
            severity,
            risk: content.risk,
            condition: content.condition,
            description: content.description,
            tags: content.tags,
            treatments: content.treatments,
            created_at: Utc::now(),
        }
    }

    /// Class name predicted by the model.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Winning score as a percentage with one decimal.
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn risk(&self) -> Severity {
        self.risk
    }

    /// Name of the knowledge-base entry the label resolved to.
    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn treatments(&self) -> &[String] {
        &self.treatments
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Context line used to seed the assistant conversation.
    pub fn chat_context(&self) -> String {
        format!(
            "Tomato Plant Disease: {}, Severity: {}, Description: {}",
            self.label, self.risk, self.description
        )
    }

    /// Projection stored by the history collaborator. The creation time is
    /// left for the store to assign.
    pub fn to_history_entry(&self, user_id: impl Into<String>) -> HistoryEntry {
        HistoryEntry {
            user_id: user_id.into(),
            label: self.label.clone(),
            confidence: self.confidence,
            severity: self.severity,
            risk: self.risk,
            description: self.description.clone(),
            tags: self.tags.iter().cloned().collect(),
            treatments: self.treatments.clone(),
            created_at: None,
        }
    }
}

/// Persisted form of a diagnosis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub user_id: String,
    pub label: String,
    pub confidence: f32,
    pub severity: Severity,
    pub risk: Severity,
    pub description: String,
    pub tags: Vec<String>,
    pub treatments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
