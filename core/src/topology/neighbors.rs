//! Neighbor table: static per-neighbor metadata and liveness state
//!
//! One record per neighbor listed in the node's config file. The set of
//! neighbors never changes at runtime; only the configured link cost, the
//! last-received clock and the active flag move.

use super::NodeId;
use crate::config::NeighborConfig;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::time::Instant;

/// Metadata for a directly connected neighbor
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborRecord {
    pub id: NodeId,
    /// Configured cost of our outgoing link to this neighbor
    pub link_cost: f64,
    /// Where the neighbor's listener accepts connections
    pub addr: SocketAddr,
    /// Last time a snapshot from this neighbor was accepted
    pub last_received: Option<Instant>,
    /// Cleared by the liveness monitor, set again when the neighbor speaks
    pub active: bool,
}

impl NeighborRecord {
    pub fn new(id: NodeId, link_cost: f64, addr: SocketAddr) -> Self {
        Self {
            id,
            link_cost,
            addr,
            last_received: None,
            active: true,
        }
    }
}

/// What recording a reception did to the neighbor's state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reception {
    /// Neighbor was already active, clock refreshed
    Refreshed,
    /// Neighbor was inactive and is active again; carries its configured cost
    Reactivated { link_cost: f64 },
}

/// Thread-safe table of all configured neighbors
#[derive(Debug, Default)]
pub struct NeighborTable {
    records: RwLock<BTreeMap<NodeId, NeighborRecord>>,
}

impl NeighborTable {
    pub fn new(records: impl IntoIterator<Item = NeighborRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }

    /// Build the table from a parsed config file, addressing every neighbor on `host`
    pub fn from_config(config: &NeighborConfig, host: IpAddr) -> Self {
        Self::new(config.entries().iter().map(|entry| {
            NeighborRecord::new(
                entry.id.clone(),
                entry.link_cost,
                SocketAddr::new(host, entry.port),
            )
        }))
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.records.read().contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<NeighborRecord> {
        self.records.read().get(id).cloned()
    }

    /// Copy of every record, ordered by id
    pub fn records(&self) -> Vec<NeighborRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Dissemination targets, active or not
    pub fn addresses(&self) -> Vec<(NodeId, SocketAddr)> {
        self.records
            .read()
            .values()
            .map(|r| (r.id.clone(), r.addr))
            .collect()
    }

    /// Configured link costs, used to seed the link-state table
    pub fn link_costs(&self) -> Vec<(NodeId, f64)> {
        self.records
            .read()
            .values()
            .map(|r| (r.id.clone(), r.link_cost))
            .collect()
    }

    /// Update the configured cost towards a neighbor. Returns false for unknown ids.
    pub fn set_link_cost(&self, id: &NodeId, cost: f64) -> bool {
        match self.records.write().get_mut(id) {
            Some(record) => {
                record.link_cost = cost;
                true
            }
            None => false,
        }
    }

    /// Note that a snapshot from `id` was accepted at `now`
    pub fn record_received(&self, id: &NodeId, now: Instant) -> Option<Reception> {
        let mut records = self.records.write();
        let record = records.get_mut(id)?;
        record.last_received = Some(now);
        if record.active {
            Some(Reception::Refreshed)
        } else {
            record.active = true;
            Some(Reception::Reactivated {
                link_cost: record.link_cost,
            })
        }
    }

    /// Deactivate every active neighbor that has been silent for longer than
    /// `threshold` (or never spoke). Returns the neighbors that just went down.
    pub fn expire(&self, now: Instant, threshold: Duration) -> Vec<NodeId> {
        let mut expired = Vec::new();
        for record in self.records.write().values_mut() {
            if !record.active {
                continue;
            }
            let silent = match record.last_received {
                Some(seen) => now.saturating_duration_since(seen) > threshold,
                None => true,
            };
            if silent {
                record.active = false;
                expired.push(record.id.clone());
            }
        }
        expired
    }

    /// Reset every neighbor's last-received clock to `now`
    pub fn touch_all(&self, now: Instant) {
        for record in self.records.write().values_mut() {
            record.last_received = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn id(s: &str) -> NodeId {
        s.parse().unwrap()
    }

    fn table() -> NeighborTable {
        let host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        NeighborTable::new(vec![
            NeighborRecord::new(id("B"), 1.0, SocketAddr::new(host, 6001)),
            NeighborRecord::new(id("C"), 5.0, SocketAddr::new(host, 6002)),
        ])
    }

    #[test]
    fn test_addresses_and_costs_are_ordered() {
        let table = table();
        let addrs = table.addresses();
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0].0, id("B"));
        assert_eq!(addrs[1].1.port(), 6002);
        assert_eq!(table.link_costs(), vec![(id("B"), 1.0), (id("C"), 5.0)]);
    }

    #[test]
    fn test_unset_clock_expires() {
        let table = table();
        let expired = table.expire(Instant::now(), Duration::from_secs(15));
        assert_eq!(expired, vec![id("B"), id("C")]);
        assert!(!table.get(&id("B")).unwrap().active);

        // Already inactive neighbors are not reported twice
        assert!(table.expire(Instant::now(), Duration::from_secs(15)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_only_silent_neighbors() {
        let table = table();
        let start = Instant::now();
        table.touch_all(start);

        tokio::time::advance(Duration::from_secs(10)).await;
        table.record_received(&id("B"), Instant::now());

        tokio::time::advance(Duration::from_secs(6)).await;
        let expired = table.expire(Instant::now(), Duration::from_secs(15));
        assert_eq!(expired, vec![id("C")]);
        assert!(table.get(&id("B")).unwrap().active);
    }

    #[test]
    fn test_record_received_reactivates() {
        let table = table();
        table.expire(Instant::now(), Duration::from_secs(15));

        let reception = table.record_received(&id("C"), Instant::now());
        assert_eq!(reception, Some(Reception::Reactivated { link_cost: 5.0 }));
        assert_eq!(
            table.record_received(&id("C"), Instant::now()),
            Some(Reception::Refreshed)
        );
        assert_eq!(table.record_received(&id("Z"), Instant::now()), None);
    }

    #[test]
    fn test_set_link_cost() {
        let table = table();
        assert!(table.set_link_cost(&id("B"), 2.5));
        assert_eq!(table.get(&id("B")).unwrap().link_cost, 2.5);
        assert!(!table.set_link_cost(&id("Q"), 1.0));
    }
}
