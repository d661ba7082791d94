//! Region adjacency graph, union-find merge forest and merge policies.

pub mod forest;
pub mod policy;
pub mod queue;
pub mod rag;

pub use forest::MergeForest;
pub use policy::{BoundaryMean, ClassifierProbability, MergePolicy};
pub use queue::{MergeQueue, QueueEntry};
pub use rag::{EdgeData, NodeData, Rag, ReplayStep};
