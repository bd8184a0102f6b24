use crate::error::ModelLoadError;
use std::path::Path;

/// Ordered class names, index-aligned with the model output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a newline-delimited label list. Blank lines are dropped and the
    /// remaining lines keep their order.
    pub fn parse(content: &str) -> Self {
        Self {
            labels: content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Reads a label file. A file without any label is rejected.
    pub fn from_path(path: &Path) -> Result<Self, ModelLoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Labels {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&content);
        if table.is_empty() {
            return Err(ModelLoadError::NoLabels(path.to_path_buf()));
        }
        Ok(table)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
