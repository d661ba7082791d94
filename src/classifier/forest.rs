//! Bagged ensemble of decision trees.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::classifier::tree::{DecisionTree, TreeParams};
use crate::classifier::{Classifier, ClassifierFactory, ModelMetadata, check_training_set};
use crate::config::ForestConfig;
use crate::correction::Label;
use crate::error::{ProofreadError, Result};

/// Random forest predicting the probability of SEPARATE.
///
/// Trees are fitted in parallel, each from its own RNG seeded from the
/// forest seed and the tree index, so a fixed seed gives a fixed model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    config: ForestConfig,
    seed: u64,
    metadata: ModelMetadata,
}

fn tree_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl RandomForest {
    pub fn new(config: ForestConfig, seed: u64) -> Self {
        let mut hyperparameters = BTreeMap::new();
        hyperparameters.insert("n_trees".to_string(), config.n_trees as f64);
        hyperparameters.insert("max_depth".to_string(), config.max_depth as f64);
        hyperparameters.insert(
            "min_samples_split".to_string(),
            config.min_samples_split as f64,
        );
        hyperparameters.insert("feature_fraction".to_string(), config.feature_fraction);

        Self {
            trees: Vec::new(),
            config,
            seed,
            metadata: ModelMetadata::new("RandomForest", hyperparameters),
        }
    }

    /// A factory producing fresh, untrained forests with this configuration.
    pub fn factory(config: ForestConfig, seed: u64) -> ClassifierFactory {
        Arc::new(move || -> Box<dyn Classifier> {
            Box::new(RandomForest::new(config.clone(), seed))
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Save the trained model as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            ProofreadError::model(format!("saving {} failed: {e}", path.display()))
        })?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a model written by [`RandomForest::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            ProofreadError::model(format!("loading {} failed: {e}", path.display()))
        })
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[Label]) -> Result<()> {
        let n_features = check_training_set(features, targets)?;
        let targets: Vec<f64> = targets.iter().map(|label| f64::from(label.target())).collect();
        let max_features = ((n_features as f64 * self.config.feature_fraction).ceil() as usize)
            .clamp(1, n_features.max(1));
        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            max_features,
        };
        let n_samples = features.len();
        let seed = self.seed;
        let bootstrap = self.config.bootstrap;

        let trees = (0..self.config.n_trees)
            .into_par_iter()
            .map(|index| {
                let mut rng = StdRng::seed_from_u64(tree_seed(seed, index));
                let indices: Vec<usize> = if bootstrap {
                    (0..n_samples).map(|_| rng.random_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                DecisionTree::fit(features, &targets, &indices, &params, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.metadata.trained_at = chrono::Utc::now();
        self.metadata.training_examples = n_samples;
        self.metadata.separate_examples = targets.iter().filter(|&&t| t > 0.5).count();
        Ok(())
    }

    fn predict_probability(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        self.trees.iter().map(|tree| tree.predict(features)).sum::<f64>() / self.trees.len() as f64
    }

    fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }
}
