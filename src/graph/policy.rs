//! Merge priority functions.
//!
//! A policy scores a pair of adjacent live nodes; the agglomeration loop
//! merges the lowest score first and stops at the serving threshold. Policies
//! are immutable and shared through `Arc`, so installing a new one never
//! touches a graph that is still in use.

use std::fmt::Debug;
use std::sync::Arc;

use log::warn;

use crate::classifier::Classifier;
use crate::features::FeatureExtractor;
use crate::graph::rag::Rag;

/// Trait for merge priority functions.
pub trait MergePolicy: Debug + Send + Sync {
    /// Priority of merging live nodes `a` and `b`; lower merges first.
    fn priority(&self, rag: &Rag, a: u64, b: u64) -> f64;

    /// Short name for diagnostics.
    fn name(&self) -> &str;
}

/// Mean normalized image intensity along the shared boundary.
///
/// Without an image there is no evidence for merging and every pair scores
/// `1.0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundaryMean;

impl MergePolicy for BoundaryMean {
    fn priority(&self, rag: &Rag, a: u64, b: u64) -> f64 {
        if !rag.has_image() {
            return 1.0;
        }
        rag.edge(a, b)
            .map_or(f64::INFINITY, |edge| edge.mean_intensity())
    }

    fn name(&self) -> &str {
        "boundary-mean"
    }
}

/// Probability that a pair should stay separate, as predicted by a trained
/// classifier from the pair's feature vector.
#[derive(Debug, Clone)]
pub struct ClassifierProbability {
    extractor: Arc<dyn FeatureExtractor>,
    classifier: Arc<dyn Classifier>,
}

impl ClassifierProbability {
    pub fn new(extractor: Arc<dyn FeatureExtractor>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            extractor,
            classifier,
        }
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }
}

impl MergePolicy for ClassifierProbability {
    fn priority(&self, rag: &Rag, a: u64, b: u64) -> f64 {
        match self.extractor.compute(rag, a, b) {
            Ok(features) => self.classifier.predict_probability(&features),
            Err(e) => {
                warn!("no merge priority for {a} and {b}: {e}");
                f64::INFINITY
            }
        }
    }

    fn name(&self) -> &str {
        "classifier-probability"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::Label;
    use crate::error::Result;
    use crate::features::DefaultFeatures;
    use crate::volume::{ImageVolume, LabelVolume};

    /// Predicts SEPARATE whenever the contact is larger than one face.
    #[derive(Debug)]
    struct ContactRule;

    impl Classifier for ContactRule {
        fn fit(&mut self, _features: &[Vec<f64>], _targets: &[Label]) -> Result<()> {
            Ok(())
        }

        fn predict_probability(&self, features: &[f64]) -> f64 {
            if features[0] > 1.0 { 0.9 } else { 0.1 }
        }

        fn is_trained(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_boundary_mean_without_image() {
        let labels = LabelVolume::new(vec![1, 2], vec![1, 2]).unwrap();
        let rag = Rag::new(&labels, &ImageVolume::empty(), 0).unwrap();
        assert_eq!(BoundaryMean.priority(&rag, 1, 2), 1.0);
    }

    #[test]
    fn test_classifier_probability_policy() {
        // 1|2 touch on two faces, 2|3 on one.
        let labels = LabelVolume::new(vec![2, 3], vec![1, 2, 3, 1, 2, 0]).unwrap();
        let mut rag = Rag::new(&labels, &ImageVolume::empty(), 0).unwrap();
        let policy = ClassifierProbability::new(Arc::new(DefaultFeatures), Arc::new(ContactRule));
        assert_eq!(policy.priority(&rag, 1, 2), 0.9);
        assert_eq!(policy.priority(&rag, 2, 3), 0.1);
        assert_eq!(policy.priority(&rag, 1, 3), f64::INFINITY);

        rag.set_policy(Arc::new(policy));
        assert_eq!(rag.policy().name(), "classifier-probability");
        assert_eq!(rag.agglomerate(0.5).unwrap(), 1);
        assert_eq!(rag.find(3).unwrap(), 2);
        assert_ne!(rag.find(1).unwrap(), 2);
    }
}
