//! Disseminator: periodic flood of the local table to every neighbor
//!
//! Inactive neighbors are included: the next round is the only retry, and a
//! snapshot reaching a neighbor that came back is how the link recovers.

use super::protocol::WireMessage;
use super::sender::LinkSender;
use crate::node::{shutdown_requested, NodeContext};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Result of one dissemination round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundReport {
    pub attempted: usize,
    pub delivered: usize,
}

pub struct Disseminator {
    ctx: Arc<NodeContext>,
    sender: Arc<dyn LinkSender>,
}

impl Disseminator {
    pub fn new(ctx: Arc<NodeContext>, sender: Arc<dyn LinkSender>) -> Self {
        Self { ctx, sender }
    }

    /// First round fires immediately, then once per dissemination interval
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.ctx.settings().dissemination_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.round().await;
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }
        debug!("[{}] Disseminator stopped", self.ctx.id());
    }

    /// Send one snapshot to every neighbor. `None` when the node is disabled.
    pub async fn round(&self) -> Option<RoundReport> {
        if !self.ctx.is_enabled() {
            debug!("[{}] Disabled, skipping dissemination", self.ctx.id());
            return None;
        }

        let message = WireMessage::TableSnapshot {
            sender: self.ctx.id().clone(),
            table: self.ctx.store().snapshot(),
        };
        let payload = match message.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("[{}] Failed to encode snapshot: {}", self.ctx.id(), e);
                return None;
            }
        };

        let targets = self.ctx.neighbors().addresses();
        let sends = targets.iter().map(|(neighbor, addr)| {
            let payload = &payload;
            async move {
                match self.sender.send(*addr, payload).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("Snapshot to {} not delivered: {}", neighbor, e);
                        false
                    }
                }
            }
        });
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();

        debug!(
            "[{}] Disseminated to {}/{} neighbor(s)",
            self.ctx.id(),
            delivered,
            targets.len()
        );
        Some(RoundReport {
            attempted: targets.len(),
            delivered,
        })
    }
}
