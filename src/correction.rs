//! Append-only record of proofreading corrections.
//!
//! The log keeps the merge history, the separation history and the training
//! examples derived from both. Every merge event has exactly one MERGE
//! example and every separation event exactly one SEPARATE example, so the
//! sequence of targets also records the order the corrections were given in,
//! and the i-th separation is the i-th exclusion tag when the graph is rebuilt.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProofreadError, Result};

/// Training label of a correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Merge,
    Separate,
}

impl Label {
    /// Numeric target: MERGE = 0, SEPARATE = 1.
    pub fn target(self) -> u8 {
        match self {
            Label::Merge => 0,
            Label::Separate => 1,
        }
    }
}

/// Segment `s1` was merged into segment `s0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeEvent {
    pub s0: u64,
    pub s1: u64,
}

/// Fragments `f0` and `f1` must never share a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparationEvent {
    pub f0: u64,
    pub f1: u64,
}

/// A recorded correction, in the order it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    Merge(MergeEvent),
    /// The `tag`-th separation.
    Separation { tag: usize, event: SeparationEvent },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionLog {
    merges: Vec<MergeEvent>,
    separations: Vec<SeparationEvent>,
    features: Vec<Vec<f64>>,
    targets: Vec<Label>,
}

impl CorrectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `s1` was merged into `s0`, with the pair's features
    /// computed before the merge.
    pub fn record_merge(&mut self, features: Vec<f64>, s0: u64, s1: u64) {
        self.features.push(features);
        self.targets.push(Label::Merge);
        self.merges.push(MergeEvent { s0, s1 });
    }

    /// Record that fragments `f0` and `f1` belong to different segments.
    pub fn record_separation(&mut self, features: Vec<f64>, f0: u64, f1: u64) {
        self.features.push(features);
        self.targets.push(Label::Separate);
        self.separations.push(SeparationEvent { f0, f1 });
    }

    pub fn merges(&self) -> &[MergeEvent] {
        &self.merges
    }

    pub fn separations(&self) -> &[SeparationEvent] {
        &self.separations
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn targets(&self) -> &[Label] {
        &self.targets
    }

    /// Number of training examples.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Merges and separations interleaved in the order they were recorded.
    ///
    /// Assumes a log that passes [`CorrectionLog::validate`].
    pub fn history(&self) -> impl Iterator<Item = Correction> + '_ {
        let mut merges = self.merges.iter();
        let mut separations = self.separations.iter().enumerate();
        self.targets.iter().filter_map(move |label| match label {
            Label::Merge => merges.next().map(|&event| Correction::Merge(event)),
            Label::Separate => separations
                .next()
                .map(|(tag, &event)| Correction::Separation { tag, event }),
        })
    }

    /// Check the pairing between events and training examples.
    pub fn validate(&self) -> Result<()> {
        if self.features.len() != self.targets.len() {
            return Err(ProofreadError::other(format!(
                "correction log has {} feature vectors but {} targets",
                self.features.len(),
                self.targets.len()
            )));
        }
        let merge_labels = self.targets.iter().filter(|&&t| t == Label::Merge).count();
        if merge_labels != self.merges.len() {
            return Err(ProofreadError::other(format!(
                "correction log has {} merges but {merge_labels} MERGE examples",
                self.merges.len()
            )));
        }
        let separate_labels = self.targets.len() - merge_labels;
        if separate_labels != self.separations.len() {
            return Err(ProofreadError::other(format!(
                "correction log has {} separations but {separate_labels} SEPARATE examples",
                self.separations.len()
            )));
        }
        Ok(())
    }

    /// Write the log as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Read and validate a log written by [`CorrectionLog::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let log: CorrectionLog = serde_json::from_str(&fs::read_to_string(path)?)?;
        log.validate()?;
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_pair_events_with_examples() {
        let mut log = CorrectionLog::new();
        log.record_merge(vec![1.0], 1, 2);
        log.record_separation(vec![2.0], 2, 3);
        log.record_merge(vec![3.0], 3, 4);

        assert_eq!(log.len(), 3);
        assert_eq!(log.merges(), &[MergeEvent { s0: 1, s1: 2 }, MergeEvent { s0: 3, s1: 4 }]);
        assert_eq!(log.separations(), &[SeparationEvent { f0: 2, f1: 3 }]);
        assert_eq!(
            log.targets(),
            &[Label::Merge, Label::Separate, Label::Merge]
        );
        assert!(log.validate().is_ok());
    }

    #[test]
    fn test_history_interleaves_in_recorded_order() {
        let mut log = CorrectionLog::new();
        log.record_merge(vec![0.0], 1, 2);
        log.record_separation(vec![0.0], 1, 2);
        log.record_merge(vec![0.0], 1, 2);
        log.record_separation(vec![0.0], 3, 4);

        let history: Vec<Correction> = log.history().collect();
        assert_eq!(
            history,
            vec![
                Correction::Merge(MergeEvent { s0: 1, s1: 2 }),
                Correction::Separation { tag: 0, event: SeparationEvent { f0: 1, f1: 2 } },
                Correction::Merge(MergeEvent { s0: 1, s1: 2 }),
                Correction::Separation { tag: 1, event: SeparationEvent { f0: 3, f1: 4 } },
            ]
        );
    }

    #[test]
    fn test_label_targets() {
        assert_eq!(Label::Merge.target(), 0);
        assert_eq!(Label::Separate.target(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.json");
        let mut log = CorrectionLog::new();
        log.record_merge(vec![1.0, 0.5], 1, 2);
        log.record_separation(vec![2.0, 0.1], 2, 3);
        log.save(&path).unwrap();

        assert_eq!(CorrectionLog::load(&path).unwrap(), log);
    }

    #[test]
    fn test_load_rejects_unpaired_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.json");
        fs::write(
            &path,
            r#"{"merges": [{"s0": 1, "s1": 2}], "separations": [], "features": [[1.0]], "targets": ["separate"]}"#,
        )
        .unwrap();

        assert!(CorrectionLog::load(&path).is_err());
    }
}
