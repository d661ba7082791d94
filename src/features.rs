//! Feature vectors for pairs of graph nodes.

use std::fmt::Debug;

use crate::error::{ProofreadError, Result};
use crate::graph::Rag;

/// Computes the feature vector of an ordered pair of live nodes.
pub trait FeatureExtractor: Debug + Send + Sync {
    /// Features of the pair `(a, b)` in the current graph state.
    ///
    /// Fails with [`ProofreadError::FeatureExtraction`] when either node is
    /// not live or the two are not adjacent.
    fn compute(&self, rag: &Rag, a: u64, b: u64) -> Result<Vec<f64>>;

    /// Names of the features, in vector order.
    fn feature_names(&self) -> &[&'static str];
}

/// Contact, size and intensity statistics of a node pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFeatures;

const DEFAULT_FEATURE_NAMES: [&str; 6] = [
    "contact",
    "boundary_mean",
    "log_min_size",
    "log_max_size",
    "mean_difference",
    "contact_ratio",
];

impl FeatureExtractor for DefaultFeatures {
    fn compute(&self, rag: &Rag, a: u64, b: u64) -> Result<Vec<f64>> {
        let (node_a, node_b) = match (rag.node(a), rag.node(b)) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                let missing = if rag.contains(a) { b } else { a };
                return Err(ProofreadError::feature_extraction(format!(
                    "node {missing} is not in the graph"
                )));
            }
        };
        let edge = rag.edge(a, b).ok_or_else(|| {
            ProofreadError::feature_extraction(format!("nodes {a} and {b} are not adjacent"))
        })?;

        let min_size = node_a.size.min(node_b.size);
        let max_size = node_a.size.max(node_b.size);
        let contact = edge.contact as f64;
        Ok(vec![
            contact,
            edge.mean_intensity(),
            (1.0 + min_size as f64).ln(),
            (1.0 + max_size as f64).ln(),
            (node_a.mean_intensity() - node_b.mean_intensity()).abs(),
            contact / min_size.max(1) as f64,
        ])
    }

    fn feature_names(&self) -> &[&'static str] {
        &DEFAULT_FEATURE_NAMES
    }
}
