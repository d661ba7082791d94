//! Command line argument parsing for the proofreader CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::config::{RelearnMode, SessionConfig, SimulatorConfig};

/// Proofreader - interactive correction of image segmentations
#[derive(Parser, Debug, Clone)]
#[command(name = "proofreader")]
#[command(about = "Serve and simulate interactive segmentation proofreading")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct ProofreaderArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl ProofreaderArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }

    /// Log filter for the effective verbosity. Warnings show by default.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbosity() {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve a proofreading session over TCP until stopped
    Serve(ServeArgs),

    /// Proofread a running session from ground truth
    Simulate(SimulateArgs),
}

/// Arguments for serving a session
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Fragment label volume (JSON)
    #[arg(value_name = "LABELS")]
    pub labels: PathBuf,

    /// Image volume aligned with the labels (JSON)
    #[arg(short, long, value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    /// Session configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Corrections between retrains in threshold mode
    #[arg(long)]
    pub relearn_threshold: Option<usize>,

    /// When lookup table requests retrain the classifier
    #[arg(long)]
    pub relearn_mode: Option<RelearnModeArg>,

    /// Stop on unrecognized commands
    #[arg(long)]
    pub strict: bool,

    /// Classifier seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Correction log to resume from and save to on exit
    #[arg(long, value_name = "LOG_FILE")]
    pub corrections: Option<PathBuf>,
}

impl ServeArgs {
    /// Apply flags on top of a loaded configuration.
    pub fn apply(&self, config: &mut SessionConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(threshold) = self.relearn_threshold {
            config.relearn_threshold = threshold;
        }
        if let Some(mode) = self.relearn_mode {
            config.relearn_mode = mode.into();
        }
        if self.strict {
            config.strict_commands = true;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

/// Arguments for simulating a proofreader
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Fragment label volume the session serves (JSON)
    #[arg(value_name = "FRAGMENTS")]
    pub fragments: PathBuf,

    /// Ground-truth label volume (JSON)
    #[arg(value_name = "TRUTH")]
    pub truth: PathBuf,

    /// Session host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Session port
    #[arg(short, long, default_value = "5556")]
    pub port: u16,

    /// Number of ground-truth segments to paint
    #[arg(short = 'n', long, default_value = "10")]
    pub num_operations: usize,

    /// Seed for the painting order
    #[arg(long)]
    pub seed: Option<u64>,

    /// Label of the boundary body
    #[arg(long, default_value = "0")]
    pub boundary_body: u64,

    /// Send stop once the lookup table arrives
    #[arg(long)]
    pub stop: bool,
}

impl SimulateArgs {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            num_operations: self.num_operations,
            seed: self.seed,
            stop_when_finished: self.stop,
            boundary_body: self.boundary_body,
        }
    }
}

/// Relearn modes accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelearnModeArg {
    /// Retrain before every lookup table
    Always,
    /// Retrain after `--relearn-threshold` corrections
    Threshold,
}

impl From<RelearnModeArg> for RelearnMode {
    fn from(mode: RelearnModeArg) -> Self {
        match mode {
            RelearnModeArg::Always => RelearnMode::Always,
            RelearnModeArg::Threshold => RelearnMode::Threshold,
        }
    }
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
