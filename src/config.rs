//! Configuration parameters for the negotiation protocol.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings of the built-in routing oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Seed for the neighbourhood shuffling
    pub seed: u64,
    /// Maximum number of improvement passes after construction
    pub max_passes: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            seed: 42,
            max_passes: 50,
        }
    }
}

/// Where round snapshots are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub root: PathBuf,
    pub instance_name: String,
}

/// Configuration settings for a negotiation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Decimal places of the improvement percentage that must round to zero for convergence
    pub convergence_precision: u32,
    /// Cap on per-company negotiation rounds
    pub max_negotiation_rounds: u32,
    /// Run fleet-wide exchange rounds with cross-company actions
    pub cross_company_exchange: bool,
    /// Require every company's net cost delta per round to be non-positive
    pub individual_rationality: bool,
    /// Run the cross-company task reallocation loop
    pub reallocation: bool,
    /// Cap on reallocation rounds
    pub max_reallocation_rounds: u32,
    /// Multiplier applied to cost improvements before rounding to integer weights
    pub weight_scale: f64,
    pub oracle: OracleConfig,
    pub export: Option<ExportConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            convergence_precision: 1,
            max_negotiation_rounds: 50,
            cross_company_exchange: false,
            individual_rationality: true,
            reallocation: false,
            max_reallocation_rounds: 20,
            weight_scale: 1.0,
            oracle: OracleConfig::default(),
            export: None,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Config::default()
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Set the convergence precision (decimal places).
    pub fn with_convergence_precision(mut self, decimals: u32) -> Self {
        self.convergence_precision = decimals;
        self
    }

    /// Set the negotiation round cap.
    pub fn with_max_negotiation_rounds(mut self, rounds: u32) -> Self {
        self.max_negotiation_rounds = rounds;
        self
    }

    /// Enable or disable fleet-wide cross-company exchange.
    pub fn with_cross_company_exchange(mut self, enabled: bool) -> Self {
        self.cross_company_exchange = enabled;
        self
    }

    /// Enable or disable the individual rationality constraints.
    pub fn with_individual_rationality(mut self, enabled: bool) -> Self {
        self.individual_rationality = enabled;
        self
    }

    /// Enable or disable the reallocation loop.
    pub fn with_reallocation(mut self, enabled: bool) -> Self {
        self.reallocation = enabled;
        self
    }

    /// Set the reallocation round cap.
    pub fn with_max_reallocation_rounds(mut self, rounds: u32) -> Self {
        self.max_reallocation_rounds = rounds;
        self
    }

    /// Set the weight scale used by the selector.
    pub fn with_weight_scale(mut self, scale: f64) -> Self {
        self.weight_scale = scale;
        self
    }

    /// Set the routing oracle seed.
    pub fn with_oracle_seed(mut self, seed: u64) -> Self {
        self.oracle.seed = seed;
        self
    }

    /// Set the routing oracle improvement passes.
    pub fn with_oracle_passes(mut self, passes: usize) -> Self {
        self.oracle.max_passes = passes;
        self
    }

    /// Write round snapshots below `root/instance_name`.
    pub fn with_export<P: Into<PathBuf>>(mut self, root: P, instance_name: &str) -> Self {
        self.export = Some(ExportConfig {
            root: root.into(),
            instance_name: instance_name.to_string(),
        });
        self
    }
}
