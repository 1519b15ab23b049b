//! Node configuration
//!
//! Two sources:
//! - The neighbor config file: first line is the neighbor count N, followed by
//!   N lines of `<neighborId> <linkCost> <port>`. Operators edit it by hand and
//!   link-cost changes are written back to it.
//! - [`NodeSettings`]: timing and transport knobs, defaulting to the reference
//!   protocol constants.

use crate::topology::NodeId;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config file is empty")]
    Empty,
    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("Expected {expected} neighbor entries, found {found}")]
    CountMismatch { expected: usize, found: usize },
    #[error("Neighbor {0} is listed more than once")]
    DuplicateNeighbor(NodeId),
    #[error("Node {0} lists itself as a neighbor")]
    SelfNeighbor(NodeId),
    #[error("Unknown neighbor: {0}")]
    UnknownNeighbor(NodeId),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

/// One neighbor line of the config file
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborEntry {
    pub id: NodeId,
    pub link_cost: f64,
    pub port: u16,
}

/// Parsed neighbor config file, entries kept in file order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NeighborConfig {
    entries: Vec<NeighborEntry>,
}

impl NeighborConfig {
    pub fn new(entries: Vec<NeighborEntry>) -> Self {
        Self { entries }
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut lines = content.lines().enumerate();

        let (_, count_line) = lines.next().ok_or(ConfigError::Empty)?;
        let expected: usize = count_line.trim().parse().map_err(|_| ConfigError::Parse {
            line: 1,
            reason: format!("expected neighbor count, got {:?}", count_line.trim()),
        })?;

        let mut entries: Vec<NeighborEntry> = Vec::new();
        for (index, line) in lines {
            let line_no = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            if entries.len() == expected {
                return Err(ConfigError::CountMismatch {
                    expected,
                    found: entries.len() + 1,
                });
            }
            let entry = parse_entry(line, line_no)?;
            if entries.iter().any(|e| e.id == entry.id) {
                return Err(ConfigError::DuplicateNeighbor(entry.id));
            }
            entries.push(entry);
        }

        if entries.len() != expected {
            return Err(ConfigError::CountMismatch {
                expected,
                found: entries.len(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[NeighborEntry] {
        &self.entries
    }

    /// Reject a config that names the local node as its own neighbor
    pub fn validate_for(&self, local_id: &NodeId) -> Result<(), ConfigError> {
        match self.entries.iter().find(|e| &e.id == local_id) {
            Some(entry) => Err(ConfigError::SelfNeighbor(entry.id.clone())),
            None => Ok(()),
        }
    }

    pub fn set_link_cost(&mut self, neighbor: &NodeId, cost: f64) -> Result<(), ConfigError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| &e.id == neighbor)
            .ok_or_else(|| ConfigError::UnknownNeighbor(neighbor.clone()))?;
        entry.link_cost = cost;
        Ok(())
    }

    /// Render back into the on-disk format
    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.entries.len());
        for entry in &self.entries {
            out.push_str(&format!("{} {} {}\n", entry.id, entry.link_cost, entry.port));
        }
        out
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.render())?;
        Ok(())
    }
}

fn parse_entry(line: &str, line_no: usize) -> Result<NeighborEntry, ConfigError> {
    let parse_err = |reason: String| ConfigError::Parse {
        line: line_no,
        reason,
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    let [id, cost, port] = fields.as_slice() else {
        return Err(parse_err(format!(
            "expected `<id> <cost> <port>`, got {:?}",
            line.trim()
        )));
    };

    let id: NodeId = id.parse().map_err(|e| parse_err(format!("{}", e)))?;
    let link_cost: f64 = cost
        .parse()
        .map_err(|_| parse_err(format!("invalid link cost {:?}", cost)))?;
    if link_cost.is_nan() || link_cost < 0.0 {
        return Err(parse_err(format!("link cost must be non-negative, got {}", cost)));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| parse_err(format!("invalid port {:?}", port)))?;

    Ok(NeighborEntry {
        id,
        link_cost,
        port,
    })
}

/// Rewrite one neighbor's link cost in the config file at `path`
pub fn persist_link_cost(
    path: impl AsRef<Path>,
    neighbor: &NodeId,
    cost: f64,
) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let mut config = NeighborConfig::load(path)?;
    config.set_link_cost(neighbor, cost)?;
    config.save(path)
}

/// Timing and transport settings of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Period between two table floods to all neighbors
    pub dissemination_interval_ms: u64,
    /// Period between two liveness scans
    pub liveness_interval_ms: u64,
    /// Silence after which a neighbor is presumed down
    pub failure_threshold_ms: u64,
    /// Quiet period required before shortest paths are recomputed
    pub convergence_quiet_ms: u64,
    /// Upper bound on how long a burst of changes may defer recomputation
    pub convergence_max_wait_ms: u64,
    /// Inbound snapshots are discarded for this long after `enable`
    pub enable_grace_ms: u64,
    /// Connect timeout towards a neighbor
    pub connect_timeout_ms: u64,
    /// Read/write timeout for a single message
    pub io_timeout_ms: u64,
    /// Inbound payloads larger than this are dropped
    pub max_message_bytes: usize,
    /// Host on which every neighbor listens
    pub neighbor_host: IpAddr,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            dissemination_interval_ms: 10_000,
            liveness_interval_ms: 5_000,
            failure_threshold_ms: 15_000,
            convergence_quiet_ms: 20_000,
            convergence_max_wait_ms: 60_000,
            enable_grace_ms: 5_000,
            connect_timeout_ms: 2_000,
            io_timeout_ms: 2_000,
            max_message_bytes: 64 * 1024,
            neighbor_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl NodeSettings {
    /// Load settings overrides from a JSON file; missing keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let settings: NodeSettings = serde_json::from_str(&content)
            .map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("dissemination_interval_ms", self.dissemination_interval_ms),
            ("liveness_interval_ms", self.liveness_interval_ms),
            ("failure_threshold_ms", self.failure_threshold_ms),
            ("convergence_quiet_ms", self.convergence_quiet_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("io_timeout_ms", self.io_timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidSettings(format!("{} must be positive", name)));
        }
        if self.convergence_max_wait_ms < self.convergence_quiet_ms {
            return Err(ConfigError::InvalidSettings(
                "convergence_max_wait_ms must not be shorter than convergence_quiet_ms".to_string(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::InvalidSettings(
                "max_message_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dissemination_interval(&self) -> Duration {
        Duration::from_millis(self.dissemination_interval_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn failure_threshold(&self) -> Duration {
        Duration::from_millis(self.failure_threshold_ms)
    }

    pub fn convergence_quiet(&self) -> Duration {
        Duration::from_millis(self.convergence_quiet_ms)
    }

    pub fn convergence_max_wait(&self) -> Duration {
        Duration::from_millis(self.convergence_max_wait_ms)
    }

    pub fn enable_grace(&self) -> Duration {
        Duration::from_millis(self.enable_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}
