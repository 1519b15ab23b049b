//! Routing: shortest paths and when to recompute them
//!
//! - Path engine: Dijkstra from the local node over the link-state table
//! - Convergence monitor: debounces bursts of table changes into one run

pub mod convergence;
pub mod path;

pub use convergence::ConvergenceMonitor;
pub use path::{PathEngine, Route, ShortestPathResult};
