//! Class index to sentiment label table

use sentistream_core::{Error, Result, SentimentLabel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Number of classes every sentiment model must produce
pub const NUM_CLASSES: usize = 5;

/// Bijective mapping from model output index to [`SentimentLabel`].
///
/// Serialized as a map with index keys, e.g. `{0: "Very Negative", 1: "Negative", ...}`.
/// Keys are read as strings so the same table works from YAML, JSON and
/// environment-layered configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct LabelMap {
    labels: Vec<SentimentLabel>,
}

impl LabelMap {
    /// Build from labels listed in class-index order
    pub fn new(labels: Vec<SentimentLabel>) -> Result<Self> {
        let map = Self { labels };
        map.validate()?;
        Ok(map)
    }

    /// Build from explicit `(index, label)` entries
    pub fn from_entries(entries: impl IntoIterator<Item = (usize, SentimentLabel)>) -> Result<Self> {
        let mut by_index = BTreeMap::new();
        for (index, label) in entries {
            if by_index.insert(index, label).is_some() {
                return Err(Error::label_map(format!(
                    "class index {} is mapped more than once",
                    index
                )));
            }
        }

        // Indices must be exactly 0..n with no holes
        for (expected, index) in by_index.keys().enumerate() {
            if *index != expected {
                return Err(Error::label_map(format!(
                    "class indices must be contiguous from 0, missing index {}",
                    expected
                )));
            }
        }

        Self::new(by_index.into_values().collect())
    }

    /// Check the table is total and bijective over exactly [`NUM_CLASSES`] indices
    pub fn validate(&self) -> Result<()> {
        if self.labels.len() != NUM_CLASSES {
            return Err(Error::label_map(format!(
                "label map must have exactly {} entries, found {}",
                NUM_CLASSES,
                self.labels.len()
            )));
        }

        let mut seen = HashSet::with_capacity(self.labels.len());
        for label in &self.labels {
            if !seen.insert(*label) {
                return Err(Error::label_map(format!(
                    "label '{}' is assigned to more than one class index",
                    label
                )));
            }
        }

        Ok(())
    }

    /// Label for a predicted class index.
    ///
    /// An index outside the table is a model/configuration mismatch and is
    /// reported, never replaced by a guessed label.
    pub fn label(&self, index: usize) -> Result<SentimentLabel> {
        self.labels.get(index).copied().ok_or_else(|| {
            Error::label_map(format!(
                "predicted class index {} has no label (label map has {} entries)",
                index,
                self.labels.len()
            ))
        })
    }

    /// Number of classes in the table
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in class-index order
    pub fn labels(&self) -> &[SentimentLabel] {
        &self.labels
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        Self {
            labels: SentimentLabel::ALL.to_vec(),
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for LabelMap {
    type Error = Error;

    fn try_from(raw: BTreeMap<String, String>) -> Result<Self> {
        let entries = raw
            .into_iter()
            .map(|(index, label)| {
                let index = index.trim().parse::<usize>().map_err(|_| {
                    Error::label_map(format!("label map key '{}' is not a class index", index))
                })?;
                let label = label.parse::<SentimentLabel>().map_err(|e| {
                    Error::label_map(format!("class index {}: {}", index, e))
                })?;
                Ok((index, label))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_entries(entries)
    }
}

impl From<LabelMap> for BTreeMap<String, String> {
    fn from(map: LabelMap) -> Self {
        map.labels
            .iter()
            .enumerate()
            .map(|(index, label)| (index.to_string(), label.as_str().to_string()))
            .collect()
    }
}
