//! Path engine: single-source shortest paths over the link-state table
//!
//! Classic O(n²) Dijkstra: the next node is the unvisited one with the lowest
//! distance, ties broken by [`NodeId`] order, so two nodes holding the same
//! table always produce the same predecessor tree.

use crate::topology::{LinkStateStore, LinkStateTable, NodeId};
use std::collections::{BTreeMap, BTreeSet};

/// Distances are rounded to this many decimal places
const PRECISION: f64 = 1_000.0;

/// Route to one destination, as displayed to the operator
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub destination: NodeId,
    /// `None` when the destination cannot be reached
    pub distance: Option<f64>,
    /// Source first, destination last; empty when unreachable
    pub path: Vec<NodeId>,
}

impl Route {
    pub fn is_reachable(&self) -> bool {
        self.distance.is_some()
    }
}

/// Output of one path-engine run
#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPathResult {
    pub source: NodeId,
    pub distances: BTreeMap<NodeId, f64>,
    pub predecessors: BTreeMap<NodeId, Option<NodeId>>,
}

impl ShortestPathResult {
    /// Distance to `destination`, `None` if unknown or unreachable
    pub fn distance(&self, destination: &NodeId) -> Option<f64> {
        self.distances
            .get(destination)
            .copied()
            .filter(|d| d.is_finite())
    }

    /// Walk predecessors back from `destination` and reverse
    pub fn path_to(&self, destination: &NodeId) -> Option<Vec<NodeId>> {
        self.distance(destination)?;

        let mut path = vec![destination.clone()];
        let mut current = destination;
        while let Some(Some(previous)) = self.predecessors.get(current) {
            // A predecessor tree from Dijkstra has no cycles; the bound only
            // guards against a hand-built result.
            if path.len() > self.predecessors.len() {
                return None;
            }
            path.push(previous.clone());
            current = previous;
        }
        path.reverse();
        Some(path)
    }

    /// One route per destination other than the source, in id order
    pub fn routes(&self) -> Vec<Route> {
        self.distances
            .keys()
            .filter(|destination| **destination != self.source)
            .map(|destination| Route {
                destination: destination.clone(),
                distance: self.distance(destination),
                path: self.path_to(destination).unwrap_or_default(),
            })
            .collect()
    }
}

/// Runs Dijkstra from the local node
#[derive(Debug, Clone)]
pub struct PathEngine {
    source: NodeId,
}

impl PathEngine {
    pub fn new(source: NodeId) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &NodeId {
        &self.source
    }

    /// Compute over a consistent snapshot of the store
    pub fn run(&self, store: &LinkStateStore) -> ShortestPathResult {
        self.compute(&store.snapshot())
    }

    pub fn compute(&self, table: &LinkStateTable) -> ShortestPathResult {
        let mut nodes = table.nodes();
        nodes.insert(self.source.clone());

        let mut distances: BTreeMap<NodeId, f64> =
            nodes.iter().map(|n| (n.clone(), f64::INFINITY)).collect();
        let mut predecessors: BTreeMap<NodeId, Option<NodeId>> =
            nodes.iter().map(|n| (n.clone(), None)).collect();
        distances.insert(self.source.clone(), 0.0);

        let mut unvisited: BTreeSet<NodeId> = nodes;
        while let Some(current) = closest(&unvisited, &distances) {
            unvisited.remove(&current);
            let base = distances[&current];
            if base.is_infinite() {
                break;
            }

            let Some(row) = table.row(&current) else {
                continue;
            };
            for (neighbor, cost) in row {
                if !unvisited.contains(neighbor) || !cost.is_finite() {
                    continue;
                }
                let candidate = round(base + cost);
                if candidate < distances[neighbor] {
                    distances.insert(neighbor.clone(), candidate);
                    predecessors.insert(neighbor.clone(), Some(current.clone()));
                }
            }
        }

        ShortestPathResult {
            source: self.source.clone(),
            distances,
            predecessors,
        }
    }
}

/// Unvisited node with the smallest distance; the first in id order wins ties
fn closest(unvisited: &BTreeSet<NodeId>, distances: &BTreeMap<NodeId, f64>) -> Option<NodeId> {
    let mut best: Option<(&NodeId, f64)> = None;
    for node in unvisited {
        let distance = distances[node];
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((node, distance)),
        }
    }
    best.map(|(node, _)| node.clone())
}

fn round(distance: f64) -> f64 {
    (distance * PRECISION).round() / PRECISION
}
