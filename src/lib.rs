//! # Proofreader
//!
//! Interactive proofreading of image segmentations.
//!
//! ## Features
//!
//! - Region adjacency graph with union-find merges and separation by replay
//! - Online-learned merge policy from human corrections
//! - Message-driven proofreading sessions over TCP or in-process channels
//! - A simulated proofreader that replays ground truth
//!
//! ## Example
//!
//! ```
//! use proofreader::prelude::*;
//!
//! let labels = LabelVolume::new(vec![1, 4], vec![1, 2, 3, 4]).unwrap();
//! let mut session =
//!     ProofreadingSession::new(&labels, &ImageVolume::empty(), SessionConfig::default()).unwrap();
//!
//! session.handle_merge(&[1, 2]).unwrap();
//! session.handle_separate(2, 3).unwrap();
//! session.handle_merge(&[3, 4]).unwrap();
//!
//! let table = session.produce_lookup_table(0.5).unwrap();
//! assert_eq!(table.segments, vec![1, 1, 3, 3]);
//! ```

pub mod classifier;
pub mod cli;
pub mod config;
pub mod correction;
pub mod error;
pub mod features;
pub mod graph;
pub mod protocol;
pub mod session;
pub mod simulator;
pub mod volume;

pub mod prelude {
    pub use crate::classifier::{Classifier, ClassifierFactory, RandomForest};
    pub use crate::config::{ForestConfig, RelearnMode, SessionConfig, SimulatorConfig};
    pub use crate::correction::{CorrectionLog, Label};
    pub use crate::error::{ProofreadError, Result};
    pub use crate::features::{DefaultFeatures, FeatureExtractor};
    pub use crate::graph::{BoundaryMean, ClassifierProbability, MergePolicy, Rag};
    pub use crate::protocol::{Channel, Envelope, LookupTable, MemoryChannel, TcpChannel};
    pub use crate::session::{ProofreadingSession, SeparationOutcome, SessionState, SessionStats};
    pub use crate::simulator::{Simulator, best_segmentation, proofread};
    pub use crate::volume::{ImageVolume, LabelVolume};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
