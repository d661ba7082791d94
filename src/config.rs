//! Configuration for sessions, the simulator and the merge classifier.
//!
//! Every field has a default, so a config file only needs the keys it wants
//! to change. Command-line flags are applied on top of a loaded file.

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{ProofreadError, Result};

/// When a `request` for a lookup table retrains the merge classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelearnMode {
    /// Retrain before every lookup table.
    Always,
    /// Retrain once `relearn_threshold` corrections have accumulated.
    Threshold,
}

/// Hyperparameters of the random forest merge classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees in the ensemble.
    pub n_trees: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Minimum samples required to split a node.
    pub min_samples_split: usize,
    /// Fraction of features considered at each split.
    pub feature_fraction: f64,
    /// Fit each tree on a bootstrap resample of the examples.
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 12,
            min_samples_split: 2,
            feature_fraction: 0.7,
            bootstrap: true,
        }
    }
}

/// Configuration of a proofreading session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Address the session binds to.
    pub host: String,
    /// Port the session binds to.
    pub port: u16,
    /// Corrections between retrains in [`RelearnMode::Threshold`].
    pub relearn_threshold: usize,
    pub relearn_mode: RelearnMode,
    /// Terminate on unrecognized commands instead of ignoring them.
    pub strict_commands: bool,
    /// Label of the background pseudo-fragment.
    pub boundary_body: u64,
    /// Merge threshold used when serving lookup tables.
    pub lut_threshold: f64,
    /// Seed for classifier training.
    pub seed: u64,
    pub forest: ForestConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5556,
            relearn_threshold: 20,
            relearn_mode: RelearnMode::Always,
            strict_commands: false,
            boundary_body: 0,
            lut_threshold: 0.5,
            seed: 0,
            forest: ForestConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load a config file, falling back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: SessionConfig = match path {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => {
                warn!("Configuration file not supplied, using flags only");
                SessionConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// `host:port` address of the session.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.relearn_threshold == 0 {
            return Err(ProofreadError::invalid_config(
                "relearn_threshold must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.lut_threshold) {
            return Err(ProofreadError::invalid_config(format!(
                "lut_threshold must lie in [0, 1], got {}",
                self.lut_threshold
            )));
        }
        if self.forest.n_trees == 0 {
            return Err(ProofreadError::invalid_config("forest needs at least one tree"));
        }
        if !(self.forest.feature_fraction > 0.0 && self.forest.feature_fraction <= 1.0) {
            return Err(ProofreadError::invalid_config(format!(
                "feature_fraction must lie in (0, 1], got {}",
                self.forest.feature_fraction
            )));
        }
        Ok(())
    }
}

/// Configuration of a simulated proofreader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Number of ground-truth segments to paint.
    pub num_operations: usize,
    /// Seed for the order in which segments are painted.
    pub seed: Option<u64>,
    /// Send `stop` after receiving the lookup table.
    pub stop_when_finished: bool,
    /// Label of the background pseudo-fragment.
    pub boundary_body: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            num_operations: 10,
            seed: None,
            stop_when_finished: false,
            boundary_body: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.port, 5556);
        assert_eq!(config.relearn_threshold, 20);
        assert_eq!(config.relearn_mode, RelearnMode::Always);
        assert!(!config.strict_commands);
        assert_eq!(config.address(), "127.0.0.1:5556");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(
            &path,
            r#"{"port": 6000, "relearn_mode": "threshold", "forest": {"n_trees": 5}}"#,
        )
        .unwrap();

        let config = SessionConfig::load(Some(&path)).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.relearn_mode, RelearnMode::Threshold);
        assert_eq!(config.forest.n_trees, 5);
        assert_eq!(config.forest.max_depth, 12);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let config = SessionConfig {
            seed: 42,
            strict_commands: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SessionConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = SessionConfig {
            relearn_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            lut_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.forest.feature_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_path_uses_defaults() {
        assert_eq!(SessionConfig::load(None).unwrap(), SessionConfig::default());
    }
}
