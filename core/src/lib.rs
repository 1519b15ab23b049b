// Linkstate Core: Link-State Routing Node
//
// Every node floods its full view of the network to its neighbors, merges
// what it hears last-writer-wins per row, declares silent neighbors down, and
// recomputes shortest paths once the view has been quiet for long enough.

pub mod command;
pub mod config;
pub mod link;
pub mod liveness;
pub mod node;
pub mod routing;
pub mod topology;

pub use command::{Command, CommandError, CommandOutcome, CommandProcessor};
pub use config::{ConfigError, NeighborConfig, NeighborEntry, NodeSettings};
pub use link::{LinkSender, SendError, TcpLinkSender, WireError, WireMessage};
pub use liveness::LivenessMonitor;
pub use node::{NodeContext, NodeEvent, NodeHandle, RouterNode};
pub use routing::{ConvergenceMonitor, PathEngine, Route, ShortestPathResult};
pub use topology::{
    LinkStateStore, LinkStateTable, NeighborRecord, NeighborTable, NodeId, NodeIdError,
};
