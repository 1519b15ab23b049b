//! Convergence monitor: debounced shortest-path recomputation
//!
//! Two states:
//! - **Idle**: waiting for the store's change counter to move.
//! - **Pending**: a change arrived; every further change restarts the quiet
//!   window. The path engine fires once the window elapses with no change, or
//!   once the maximum wait since the first change of the burst runs out.
//!
//! One run per burst, never one per update.

use super::path::{PathEngine, ShortestPathResult};
use crate::node::{shutdown_requested, NodeContext, NodeEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

pub struct ConvergenceMonitor {
    ctx: Arc<NodeContext>,
    engine: PathEngine,
    changes: watch::Receiver<u64>,
}

impl ConvergenceMonitor {
    /// Subscribes to the store immediately, so no change made after
    /// construction can be missed.
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        let changes = ctx.store().subscribe();
        let engine = PathEngine::new(ctx.id().clone());
        Self {
            ctx,
            engine,
            changes,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let quiet = self.ctx.settings().convergence_quiet();
        let max_wait = self.ctx.settings().convergence_max_wait();

        loop {
            // Idle
            tokio::select! {
                changed = self.changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = shutdown_requested(&mut shutdown) => return,
            }

            // Pending
            let first_change = Instant::now();
            let mut last_change = first_change;
            loop {
                let deadline = (last_change + quiet).min(first_change + max_wait);
                tokio::select! {
                    _ = sleep_until(deadline) => break,
                    changed = self.changes.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        last_change = Instant::now();
                        debug!("Change during quiet window, deferring recomputation");
                    }
                    _ = shutdown_requested(&mut shutdown) => return,
                }
            }

            self.changes.borrow_and_update();
            let result = self.fire();
            info!(
                "Routes recomputed after {:?}: {} destination(s) reachable",
                first_change.elapsed(),
                result.routes().iter().filter(|r| r.is_reachable()).count()
            );
            self.ctx.emit(NodeEvent::RoutesComputed(result));
        }
    }

    fn fire(&self) -> ShortestPathResult {
        self.engine.run(self.ctx.store())
    }
}
