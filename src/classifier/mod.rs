//! Binary classifiers over pair feature vectors.

pub mod forest;
pub mod tree;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::correction::Label;
use crate::error::{ProofreadError, Result};

pub use forest::RandomForest;
pub use tree::{DecisionTree, TreeParams};

/// A trainable MERGE/SEPARATE classifier.
pub trait Classifier: Debug + Send + Sync {
    /// Train on paired feature vectors and labels, replacing any previous fit.
    fn fit(&mut self, features: &[Vec<f64>], targets: &[Label]) -> Result<()>;

    /// Probability that the pair should stay separate.
    fn predict_probability(&self, features: &[f64]) -> f64;

    fn is_trained(&self) -> bool;
}

/// Produces a fresh, untrained classifier for each relearn.
pub type ClassifierFactory = Arc<dyn Fn() -> Box<dyn Classifier> + Send + Sync>;

/// Model metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: String,
    pub trained_at: DateTime<Utc>,
    pub training_examples: usize,
    pub separate_examples: usize,
    pub hyperparameters: BTreeMap<String, f64>,
}

impl ModelMetadata {
    pub fn new(model_type: impl Into<String>, hyperparameters: BTreeMap<String, f64>) -> Self {
        Self {
            model_type: model_type.into(),
            trained_at: Utc::now(),
            training_examples: 0,
            separate_examples: 0,
            hyperparameters,
        }
    }
}

/// Validate a training set and return its feature dimension.
pub fn check_training_set(features: &[Vec<f64>], targets: &[Label]) -> Result<usize> {
    if features.is_empty() {
        return Err(ProofreadError::InsufficientTrainingData {
            min_samples: 1,
            actual: 0,
        });
    }
    if features.len() != targets.len() {
        return Err(ProofreadError::model(format!(
            "{} feature vectors but {} labels",
            features.len(),
            targets.len()
        )));
    }
    let n_features = features[0].len();
    if let Some(bad) = features.iter().position(|f| f.len() != n_features) {
        return Err(ProofreadError::model(format!(
            "feature vector {bad} has {} values, expected {n_features}",
            features[bad].len()
        )));
    }
    Ok(n_features)
}
