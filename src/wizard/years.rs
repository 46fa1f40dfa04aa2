use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use super::bundle::{Attachment, FileBundle, Slot};

pub const MIN_YEARS: usize = 1;
pub const MAX_YEARS: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum YearError {
    #[error("Year index {index} is out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Enter a year label before attaching files")]
    EmptyLabel,

    #[error("Year {0} is not in the current year list")]
    UnknownYear(String),
}

/// Year labels in display order plus the bundle attached to each label.
///
/// The label is the map key, so renaming re-keys the bundle and duplicate
/// labels share one bundle.
#[derive(Debug, Clone, Serialize)]
pub struct YearGroupManager {
    labels: Vec<String>,
    bundles: BTreeMap<String, FileBundle>,
}

impl Default for YearGroupManager {
    fn default() -> Self {
        Self {
            labels: vec![String::new(); MIN_YEARS],
            bundles: BTreeMap::new(),
        }
    }
}

impl YearGroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn bundle(&self, label: &str) -> Option<&FileBundle> {
        self.bundles.get(label)
    }

    /// Resizes the label list to `n` clamped to `[1, 10]` and returns the
    /// applied count.
    pub fn set_year_count(&mut self, n: usize) -> usize {
        let n = n.clamp(MIN_YEARS, MAX_YEARS);
        self.labels.resize(n, String::new());
        self.prune();
        n
    }

    pub fn rename_year(&mut self, index: usize, new_label: &str) -> Result<(), YearError> {
        let len = self.labels.len();
        let slot = self
            .labels
            .get_mut(index)
            .ok_or(YearError::IndexOutOfRange { index, len })?;
        let old = std::mem::replace(slot, new_label.to_string());

        let source = if old.is_empty() {
            None
        } else {
            self.bundles.remove(&old)
        };

        match source {
            Some(bundle) => {
                // Populated sources win a collision, empty ones yield to it.
                if !new_label.is_empty()
                    && (!bundle.is_empty() || !self.bundles.contains_key(new_label))
                {
                    self.bundles.insert(new_label.to_string(), bundle);
                }
            }
            None => {
                if !new_label.is_empty() {
                    self.bundles.entry(new_label.to_string()).or_default();
                }
            }
        }

        self.prune();
        Ok(())
    }

    pub fn set_file(
        &mut self,
        label: &str,
        slot: Slot,
        file: Option<Attachment>,
    ) -> Result<(), YearError> {
        if label.is_empty() {
            return Err(YearError::EmptyLabel);
        }
        if !self.labels.iter().any(|l| l == label) {
            return Err(YearError::UnknownYear(label.to_string()));
        }
        self.bundles
            .entry(label.to_string())
            .or_default()
            .set(slot, file);
        Ok(())
    }

    /// At least one listed year has its primary file.
    pub fn is_ready(&self) -> bool {
        self.labels
            .iter()
            .filter(|label| !label.is_empty())
            .any(|label| self.bundles.get(label).is_some_and(FileBundle::is_ready))
    }

    /// Non-empty labels in list order, each visited once, with their bundles.
    pub fn groups(&self) -> Vec<(&str, &FileBundle)> {
        let mut seen = HashSet::new();
        self.labels
            .iter()
            .filter(|label| !label.is_empty() && seen.insert(label.as_str()))
            .filter_map(|label| self.bundles.get(label).map(|b| (label.as_str(), b)))
            .collect()
    }

    fn prune(&mut self) {
        let labels = &self.labels;
        self.bundles
            .retain(|key, _| !key.is_empty() && labels.iter().any(|l| l == key));
    }
}
