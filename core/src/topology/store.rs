//! Link-state store: the node's authoritative view of the network
//!
//! The table holds one cost row per origin node plus one freshness stamp per
//! row. Rows are only ever replaced whole: an incoming row wins when its stamp
//! is strictly newer than ours (last-writer-wins per origin, not per cell).
//!
//! Every mutation happens under a single write lock, and every mutation that
//! changed something bumps a `watch` counter so the convergence monitor can
//! debounce without polling.

use super::NodeId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::debug;

/// Smallest step a locally issued stamp advances past the previous one
const STAMP_STEP: f64 = 0.001;

/// One origin's row: destination → cost
pub type CostRow = BTreeMap<NodeId, f64>;

/// Cost matrix plus per-row freshness stamps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkStateTable {
    cost: BTreeMap<NodeId, CostRow>,
    time: BTreeMap<NodeId, Option<f64>>,
}

impl LinkStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cost of the directed link `from → to`; unknown entries are unreachable
    pub fn cost(&self, from: &NodeId, to: &NodeId) -> f64 {
        if from == to && self.cost.contains_key(from) {
            return 0.0;
        }
        self.cost
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(f64::INFINITY)
    }

    pub fn row(&self, origin: &NodeId) -> Option<&CostRow> {
        self.cost.get(origin)
    }

    /// Freshness stamp of a row, `None` when the row was never stamped
    pub fn stamp(&self, origin: &NodeId) -> Option<f64> {
        self.time.get(origin).copied().flatten()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&NodeId, &CostRow)> {
        self.cost.iter()
    }

    pub fn stamps(&self) -> impl Iterator<Item = (&NodeId, Option<f64>)> {
        self.time.iter().map(|(id, stamp)| (id, *stamp))
    }

    /// Every node mentioned as a row, a column or a stamp
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        let mut nodes: BTreeSet<NodeId> = self.cost.keys().cloned().collect();
        for row in self.cost.values() {
            nodes.extend(row.keys().cloned());
        }
        nodes.extend(self.time.keys().cloned());
        nodes
    }

    /// Replace a whole row and its stamp. The diagonal is forced to zero.
    pub fn set_row(&mut self, origin: NodeId, mut row: CostRow, stamp: Option<f64>) {
        row.insert(origin.clone(), 0.0);
        self.time.insert(origin.clone(), stamp);
        self.cost.insert(origin, row);
    }

    /// Make sure `origin` has a row (all unreachable except itself)
    fn ensure_row(&mut self, origin: &NodeId) -> &mut CostRow {
        self.time.entry(origin.clone()).or_insert(None);
        self.cost.entry(origin.clone()).or_insert_with(|| {
            let mut row = CostRow::new();
            row.insert(origin.clone(), 0.0);
            row
        })
    }

    fn set_cost(&mut self, from: &NodeId, to: &NodeId, cost: f64) {
        if from == to {
            return;
        }
        self.ensure_row(from).insert(to.clone(), cost);
    }

    fn set_stamp(&mut self, origin: &NodeId, stamp: f64) {
        self.ensure_row(origin);
        self.time.insert(origin.clone(), Some(stamp));
    }
}

/// Synchronized owner of the node's [`LinkStateTable`]
#[derive(Debug)]
pub struct LinkStateStore {
    local_id: NodeId,
    table: RwLock<LinkStateTable>,
    changes: watch::Sender<u64>,
}

impl LinkStateStore {
    /// Seed the table: our row holds the configured neighbor costs, stamped now.
    pub fn new(local_id: NodeId, link_costs: impl IntoIterator<Item = (NodeId, f64)>) -> Self {
        let mut table = LinkStateTable::new();
        let mut row = CostRow::new();
        for (neighbor, cost) in link_costs {
            table.ensure_row(&neighbor);
            row.insert(neighbor, cost);
        }
        table.set_row(local_id.clone(), row, Some(next_stamp(None)));

        let (changes, _) = watch::channel(0);
        Self {
            local_id,
            table: RwLock::new(table),
            changes,
        }
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// Subscribe to the change counter; it increments on every effective mutation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Bump the change counter without touching the table
    pub fn signal_change(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    /// Immutable copy of the full table
    pub fn snapshot(&self) -> LinkStateTable {
        self.table.read().clone()
    }

    /// Current cost of our own link to `neighbor`
    pub fn local_cost(&self, neighbor: &NodeId) -> f64 {
        self.table.read().cost(&self.local_id, neighbor)
    }

    /// Merge a neighbor's snapshot, adopting every row whose stamp is strictly
    /// newer than ours (or that we never stamped). Returns the number of rows
    /// that changed.
    ///
    /// Our own row is never adopted from a peer. If a peer holds a newer stamp
    /// for it (it declared us unreachable), we re-stamp our row past theirs so
    /// the true row wins on the next dissemination round.
    pub fn merge(&self, sender: &NodeId, remote: &LinkStateTable) -> usize {
        let mut changes = 0;
        {
            let mut table = self.table.write();
            for (origin, remote_stamp) in remote.stamps() {
                let Some(remote_stamp) = remote_stamp else {
                    continue;
                };
                let local_stamp = table.stamp(origin);

                if *origin == self.local_id {
                    if local_stamp.map_or(true, |local| remote_stamp > local) {
                        let reasserted = next_stamp(Some(remote_stamp.max(local_stamp.unwrap_or(0.0))));
                        table.set_stamp(origin, reasserted);
                        changes += 1;
                    }
                    continue;
                }

                let newer = match local_stamp {
                    Some(local) => remote_stamp > local,
                    None => true,
                };
                if newer {
                    let row = remote.row(origin).cloned().unwrap_or_default();
                    for destination in row.keys() {
                        table.ensure_row(destination);
                    }
                    table.set_row(origin.clone(), row, Some(remote_stamp));
                    changes += 1;
                }
            }
        }

        debug!("Merged snapshot from {}: {} row(s) changed", sender, changes);
        if changes > 0 {
            self.signal_change();
        }
        changes
    }

    /// Set our outgoing cost towards `neighbor` and re-stamp our row
    pub fn set_local_link_cost(&self, neighbor: &NodeId, cost: f64) {
        {
            let mut table = self.table.write();
            table.ensure_row(neighbor);
            table.set_cost(&self.local_id, neighbor, cost);
            let stamp = next_stamp(table.stamp(&self.local_id));
            table.set_stamp(&self.local_id, stamp);
        }
        self.signal_change();
    }

    /// Sever `neighbor`: our link to it and every link out of it become
    /// unreachable, and both rows are re-stamped so the outage propagates.
    pub fn mark_unreachable(&self, neighbor: &NodeId) {
        {
            let mut table = self.table.write();
            table.set_cost(&self.local_id, neighbor, f64::INFINITY);

            let row = table.ensure_row(neighbor);
            for (destination, cost) in row.iter_mut() {
                if destination != neighbor {
                    *cost = f64::INFINITY;
                }
            }

            let local_stamp = next_stamp(table.stamp(&self.local_id));
            table.set_stamp(&self.local_id, local_stamp);
            let neighbor_stamp = next_stamp(table.stamp(neighbor));
            table.set_stamp(neighbor, neighbor_stamp);
        }
        self.signal_change();
    }
}

/// Wall-clock UNIX time in (fractional) seconds
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// A stamp strictly newer than `previous`, tracking wall-clock time when it can
fn next_stamp(previous: Option<f64>) -> f64 {
    let now = current_timestamp();
    match previous {
        Some(previous) if now <= previous => previous + STAMP_STEP,
        _ => now,
    }
}
