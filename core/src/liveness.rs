//! Liveness monitor: declares silent neighbors down
//!
//! Every scan, an active neighbor whose last snapshot is older than the
//! failure threshold (or who never sent one) goes inactive and is severed in
//! the store. A disabled node refreshes every clock instead, so it does not
//! blame its neighbors for its own silence.

use crate::node::{shutdown_requested, NodeContext, NodeEvent};
use crate::topology::NodeId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

pub struct LivenessMonitor {
    ctx: Arc<NodeContext>,
}

impl LivenessMonitor {
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.ctx.settings().liveness_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan(Instant::now());
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }
        debug!("[{}] Liveness monitor stopped", self.ctx.id());
    }

    /// One pass over the neighbor table. Returns the neighbors that went down.
    pub fn scan(&self, now: Instant) -> Vec<NodeId> {
        if !self.ctx.is_enabled() {
            self.ctx.neighbors().touch_all(now);
            return Vec::new();
        }

        let expired = self
            .ctx
            .neighbors()
            .expire(now, self.ctx.settings().failure_threshold());
        for neighbor in &expired {
            info!("[{}] Neighbor {} timed out", self.ctx.id(), neighbor);
            self.ctx.store().mark_unreachable(neighbor);
            self.ctx.emit(NodeEvent::NeighborDown(neighbor.clone()));
        }
        expired
    }
}
