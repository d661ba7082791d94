//! Regression tree fitted to 0/1 targets.
//!
//! Leaves store the mean target of their samples, which for MERGE = 0 and
//! SEPARATE = 1 is the fraction of SEPARATE examples.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ProofreadError, Result};

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Number of features drawn as split candidates at each node.
    pub max_features: usize,
}

/// Simple decision tree implementation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<Box<TreeNode>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeNode {
    /// Feature index for split (-1 for leaf).
    feature_idx: i32,
    /// Threshold value for split.
    threshold: f64,
    /// Prediction value (for leaf nodes).
    value: f64,
    /// Left child.
    left: Option<Box<TreeNode>>,
    /// Right child.
    right: Option<Box<TreeNode>>,
}

impl TreeNode {
    fn leaf(value: f64) -> Box<Self> {
        Box::new(TreeNode {
            feature_idx: -1,
            threshold: 0.0,
            value,
            left: None,
            right: None,
        })
    }
}

/// Best split found at a node: feature, threshold, left and right samples.
type Split = (usize, f64, Vec<usize>, Vec<usize>);

impl DecisionTree {
    /// Create a new empty decision tree.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Fit a tree to the samples selected by `indices`.
    ///
    /// `indices` may repeat samples (bootstrap resampling).
    pub fn fit<R: Rng + ?Sized>(
        features: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Result<Self> {
        if features.len() != targets.len() {
            return Err(ProofreadError::model(format!(
                "{} feature vectors but {} targets",
                features.len(),
                targets.len()
            )));
        }
        if indices.iter().any(|&i| i >= features.len()) {
            return Err(ProofreadError::model("sample index out of range"));
        }

        let root = Self::build_tree(features, targets, indices, 0, params, rng);
        Ok(Self { root: Some(root) })
    }

    /// Make a prediction for given features.
    pub fn predict(&self, features: &[f64]) -> f64 {
        if let Some(ref root) = self.root {
            Self::predict_node(root, features)
        } else {
            0.0
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    /// Recursively build the decision tree.
    ///
    /// Stops splitting when the node is pure, too small, at maximum depth,
    /// or when no split reduces the target variance.
    fn build_tree<R: Rng + ?Sized>(
        features: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        depth: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> Box<TreeNode> {
        let value = if indices.is_empty() {
            0.0
        } else {
            indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64
        };
        let pure = indices.iter().all(|&i| targets[i] == value);
        if pure || depth >= params.max_depth || indices.len() < params.min_samples_split {
            return TreeNode::leaf(value);
        }

        match Self::find_best_split(features, targets, indices, params, rng) {
            Some((feature_idx, threshold, left_indices, right_indices)) => {
                let left = Self::build_tree(
                    features,
                    targets,
                    &left_indices,
                    depth + 1,
                    params,
                    rng,
                );
                let right = Self::build_tree(
                    features,
                    targets,
                    &right_indices,
                    depth + 1,
                    params,
                    rng,
                );
                Box::new(TreeNode {
                    feature_idx: feature_idx as i32,
                    threshold,
                    value,
                    left: Some(left),
                    right: Some(right),
                })
            }
            None => TreeNode::leaf(value),
        }
    }

    /// Find the split with the largest variance reduction over a random
    /// subset of features.
    fn find_best_split<R: Rng + ?Sized>(
        features: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Option<Split> {
        let n_features = features[indices[0]].len();
        if n_features == 0 {
            return None;
        }
        let amount = params.max_features.clamp(1, n_features);
        let mut candidates = rand::seq::index::sample(rng, n_features, amount).into_vec();
        candidates.sort_unstable();

        let total: f64 = indices.iter().map(|&i| targets[i]).sum();
        let parent_gain = total * total / indices.len() as f64;
        let mut best_gain = parent_gain + 1e-12;
        let mut best: Option<(usize, f64, usize)> = None;
        let mut best_order: Vec<(f64, usize)> = Vec::new();

        for feature_idx in candidates {
            let mut values: Vec<(f64, usize)> = indices
                .iter()
                .map(|&i| (features[i][feature_idx], i))
                .collect();
            values.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            let mut improved = false;
            for split in 1..values.len() {
                left_sum += targets[values[split - 1].1];
                if values[split - 1].0 == values[split].0 {
                    continue;
                }
                let gain = Self::calculate_gain(left_sum, split, total - left_sum, values.len() - split);
                if gain > best_gain {
                    best_gain = gain;
                    let threshold = (values[split - 1].0 + values[split].0) / 2.0;
                    best = Some((feature_idx, threshold, split));
                    improved = true;
                }
            }
            if improved {
                best_order = values;
            }
        }

        best.map(|(feature_idx, threshold, split)| {
            let left = best_order[..split].iter().map(|&(_, i)| i).collect();
            let right = best_order[split..].iter().map(|&(_, i)| i).collect();
            (feature_idx, threshold, left, right)
        })
    }

    /// Sum-of-squares gain of a split; larger means lower child variance.
    fn calculate_gain(left_sum: f64, left_len: usize, right_sum: f64, right_len: usize) -> f64 {
        if left_len == 0 || right_len == 0 {
            return f64::NEG_INFINITY;
        }
        left_sum * left_sum / left_len as f64 + right_sum * right_sum / right_len as f64
    }

    /// Predict using a tree node.
    fn predict_node(node: &TreeNode, features: &[f64]) -> f64 {
        if node.feature_idx < 0 {
            return node.value;
        }

        let feature_value = features
            .get(node.feature_idx as usize)
            .copied()
            .unwrap_or(0.0);

        let child = if feature_value <= node.threshold {
            &node.left
        } else {
            &node.right
        };
        match child {
            Some(child) => Self::predict_node(child, features),
            None => node.value,
        }
    }
}
