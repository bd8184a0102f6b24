//! Static reference content about tomato leaf conditions.
//!
//! Labels are resolved to entries through an ordered rule table. Rules are
//! evaluated top to bottom against the normalized label and the first match
//! wins; when nothing matches the fallback entry is used. The table is plain
//! data, so it can be replaced from a JSON document without code changes.

use crate::{error::KnowledgeError, record::Severity};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

/// Reference content for one condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub treatments: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The whole label equals the pattern, ignoring case.
    Exact,
    /// The label contains the pattern, ignoring case.
    Contains,
}

/// Maps labels matching `pattern` to the entry named `entry`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    pub kind: MatchKind,
    pub pattern: String,
    pub entry: String,
}

impl MatchRule {
    pub fn exact(pattern: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Exact,
            pattern: pattern.into(),
            entry: entry.into(),
        }
    }

    pub fn contains(pattern: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Contains,
            pattern: pattern.into(),
            entry: entry.into(),
        }
    }

    fn matches(&self, label: &str) -> bool {
        let pattern = normalize_label(&self.pattern);
        match self.kind {
            MatchKind::Exact => label == pattern,
            MatchKind::Contains => !pattern.is_empty() && label.contains(&pattern),
        }
    }
}

/// Lower-cases `label` and collapses runs of `_`, `-` and whitespace into a
/// single space, so `Tomato___Late_blight` reads as `tomato late blight`.
pub fn normalize_label(label: &str) -> String {
    label
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// An entry together with the name it is stored under.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedEntry<'a> {
    pub name: &'a str,
    pub entry: &'a KnowledgeEntry,
}

/// On-disk layout of a knowledge base.
#[derive(Deserialize)]
struct KnowledgeDocument {
    fallback: String,
    entries: BTreeMap<String, KnowledgeEntry>,
    #[serde(default)]
    rules: Vec<MatchRule>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KnowledgeBase {
    fallback: String,
    entries: BTreeMap<String, KnowledgeEntry>,
    rules: Vec<MatchRule>,
    #[serde(skip)]
    fallback_entry: KnowledgeEntry,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnowledgeBase {
    /// Builds a knowledge base, checking that the fallback and every rule
    /// target refer to defined entries.
    pub fn new(
        fallback: impl Into<String>,
        entries: BTreeMap<String, KnowledgeEntry>,
        rules: Vec<MatchRule>,
    ) -> Result<Self, KnowledgeError> {
        let fallback = fallback.into();
        let Some(fallback_entry) = entries.get(&fallback).cloned() else {
            return Err(KnowledgeError::MissingFallback(fallback));
        };
        if let Some(rule) = rules.iter().find(|r| !entries.contains_key(&r.entry)) {
            return Err(KnowledgeError::UnknownEntry {
                pattern: rule.pattern.clone(),
                entry: rule.entry.clone(),
            });
        }
        Ok(Self {
            fallback,
            entries,
            rules,
            fallback_entry,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, KnowledgeError> {
        let doc: KnowledgeDocument = serde_json::from_str(content)?;
        Self::new(doc.fallback, doc.entries, doc.rules)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Resolves a model label to its reference entry. Never fails: labels no
    /// rule recognises get the fallback entry.
    pub fn lookup(&self, label: &str) -> ResolvedEntry<'_> {
        let label = normalize_label(label);
        self.rules
            .iter()
            .filter(|rule| rule.matches(&label))
            .find_map(|rule| self.resolve(&rule.entry))
            .unwrap_or_else(|| self.fallback_entry())
    }

    pub fn fallback_entry(&self) -> ResolvedEntry<'_> {
        ResolvedEntry {
            name: &self.fallback,
            entry: &self.fallback_entry,
        }
    }

    pub fn entry(&self, name: &str) -> Option<&KnowledgeEntry> {
        self.entries.get(name)
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    fn resolve(&self, name: &str) -> Option<ResolvedEntry<'_>> {
        self.entries
            .get_key_value(name)
            .map(|(name, entry)| ResolvedEntry { name, entry })
    }

    /// Tomato conditions known to the shipped classifier, including the
    /// spellings used by older label sets.
    pub fn builtin() -> Self {
        let blight_tags = ["Concentric Rings", "Yellow Halo", "Defoliation"];
        let blight_treatments = [
            "Apply Chlorothalonil or Copper fungicide.",
            "Remove infected lower leaves immediately.",
            "Avoid overhead watering to reduce moisture.",
            "Stake plants to improve air circulation.",
        ];

        let unknown = entry(
            Severity::Low,
            "Unable to identify a specific disease. However, monitor the plant closely for any changes.",
            &["Unknown Condition"],
            &[
                "Consult an agricultural officer.",
                "Isolate the plant if possible.",
            ],
        );

        let entries = [
            (
                "Early Blight",
                entry(
                    Severity::High,
                    "Fungal infection causing concentric rings on older leaves. Needs fungicide.",
                    &blight_tags,
                    &blight_treatments,
                ),
            ),
            (
                "Late Blight",
                entry(
                    Severity::High,
                    "Severe water-soaked spots. Requires immediate removal of infected parts.",
                    &["Water-soaked Spots", "Rapid Spread", "Leaf Collapse"],
                    &[
                        "Remove and destroy infected plant parts immediately.",
                        "Apply Chlorothalonil or Copper fungicide.",
                        "Avoid overhead watering to reduce moisture.",
                        "Keep plants well spaced for air circulation.",
                    ],
                ),
            ),
            (
                "Blight",
                entry(
                    Severity::High,
                    "Fungal infection causing concentric rings on older leaves. Can lead to severe defoliation if untreated.",
                    &blight_tags,
                    &blight_treatments,
                ),
            ),
            (
                "Bacterial Spot",
                entry(
                    Severity::Medium,
                    "Small water-soaked spots on leaves and fruits. Often spreads through splashing rain.",
                    &["Water-soaked Spots", "Fruit Rot", "Leaf Drop"],
                    &[
                        "Spray copper-based bactericides.",
                        "Remove infected plant debris.",
                        "Practice crop rotation (2-3 years).",
                        "Use pathogen-free seeds.",
                    ],
                ),
            ),
            (
                "Healthy",
                entry(
                    Severity::Low,
                    "Your tomato plant looks vigorous and disease-free! The leaves are green and the stem is strong.",
                    &["Vigorous Growth", "No Lesions", "Good Color"],
                    &[
                        "Water regularly at the base of the plant.",
                        "Apply tomato-specific fertilizer (High K).",
                        "Prune suckers for better fruit size.",
                        "Monitor for pests like hornworms.",
                    ],
                ),
            ),
            ("Unknown", unknown.clone()),
        ]
        .into_iter()
        .map(|(name, entry)| (name.to_string(), entry))
        .collect();

        // order matters: specific blights before the generic one, healthy
        // before anything that might appear in a compound label
        let rules = vec![
            MatchRule::contains("early blight", "Early Blight"),
            MatchRule::contains("late blight", "Late Blight"),
            MatchRule::contains("bacterial", "Bacterial Spot"),
            MatchRule::contains("healthy", "Healthy"),
            MatchRule::contains("blight", "Blight"),
            MatchRule::contains("phylosticta", "Bacterial Spot"),
        ];

        Self {
            fallback: "Unknown".to_string(),
            entries,
            rules,
            fallback_entry: unknown,
        }
    }
}

fn entry(
    severity: Severity,
    description: &str,
    tags: &[&str],
    treatments: &[&str],
) -> KnowledgeEntry {
    KnowledgeEntry {
        severity,
        description: description.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        treatments: treatments.iter().map(|t| t.to_string()).collect(),
    }
}
