//! Simulation configuration.
//!
//! Recognized options:
//!
//! | Key         | Meaning                          | Default           |
//! |-------------|----------------------------------|-------------------|
//! | `processes` | number of simulated ranks        | `1`               |
//! | `topology`  | interconnection shape            | `fully-connected` |
//!
//! ```
//! use psim::{SimConfig, TopologyKind};
//!
//! let config = SimConfig::from_toml_str("processes = 9\ntopology = \"torus-2d\"").unwrap();
//! assert_eq!(config.processes, 9);
//! assert_eq!(config.topology, TopologyKind::Torus2D);
//! ```

use serde::{Deserialize, Serialize};

use crate::topology::{Topology, TopologyKind};
use crate::{PsimError, Result};

/// Configuration for one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of simulated processes (ranks `0..processes`).
    pub processes: usize,

    /// Which ranks may talk to each other directly.
    pub topology: TopologyKind,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            processes: 1,
            topology: TopologyKind::FullyConnected,
        }
    }
}

impl SimConfig {
    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_topology(mut self, topology: TopologyKind) -> Self {
        self.topology = topology;
        self
    }

    /// Parses a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that cannot run.
    pub fn validate(&self) -> Result<()> {
        check_processes(self.processes)
    }

    /// Builds the configured topology for this process count.
    pub fn build_topology(&self) -> Topology {
        Topology::from_kind(self.topology, self.processes)
    }
}

/// A run needs at least one rank.
pub(crate) fn check_processes(processes: usize) -> Result<()> {
    if processes == 0 {
        return Err(PsimError::Config("process count must be >= 1".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_one_process_fully_connected() {
        let config = SimConfig::default();
        assert_eq!(config.processes, 1);
        assert_eq!(config.topology, TopologyKind::FullyConnected);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn bus_and_switch_parse_as_fully_connected() {
        for alias in ["bus", "switch", "fully-connected"] {
            let config = SimConfig::from_toml_str(&format!("topology = \"{alias}\"")).unwrap();
            assert_eq!(config.topology, TopologyKind::FullyConnected);
        }
    }

    #[test]
    fn zero_processes_rejected() {
        let err = SimConfig::from_toml_str("processes = 0").unwrap_err();
        assert!(matches!(err, PsimError::Config(_)));

        let err = SimConfig::default().with_processes(0).validate().unwrap_err();
        assert!(err.to_string().contains(">= 1"));
    }

    #[test]
    fn unknown_topology_is_a_toml_error() {
        let err = SimConfig::from_toml_str("topology = \"hypercube\"").unwrap_err();
        assert!(matches!(err, PsimError::Toml(_)));
    }

    #[test]
    fn build_topology_derives_grid_side() {
        let config = SimConfig::default()
            .with_processes(16)
            .with_topology(TopologyKind::Mesh2D);
        assert!(matches!(config.build_topology(), Topology::Mesh2D { side: 4 }));
    }
}
