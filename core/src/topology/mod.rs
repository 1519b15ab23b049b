//! Topology: what this node knows about the network
//!
//! - Node identifiers with a total order for deterministic tie-breaks
//! - The static neighbor table (configured links and liveness state)
//! - The link-state store: cost matrix, per-origin freshness stamps, merge rule

pub mod neighbors;
pub mod node_id;
pub mod store;

pub use neighbors::{NeighborRecord, NeighborTable, Reception};
pub use node_id::{NodeId, NodeIdError};
pub use store::{current_timestamp, CostRow, LinkStateStore, LinkStateTable};
