//! Listener: accepts neighbor connections and routes what they carry
//!
//! Each connection carries exactly one message. Snapshots are merged into the
//! store; link-cost directives update our link towards the sender. Anything
//! that fails to read or decode is dropped without touching the store.

use super::protocol::WireMessage;
use crate::node::{shutdown_requested, NodeContext, NodeEvent};
use crate::topology::{LinkStateTable, NodeId, Reception};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The node is disabled and ignores all traffic
    Ignored,
    /// Snapshot arrived inside the post-enable grace window
    Discarded,
    /// Snapshot merged; `changes` rows were replaced
    Merged { changes: usize, reactivated: bool },
    /// Directive applied to our link towards the sender
    LinkCostApplied,
    /// Directive from a node that is not our neighbor
    Rejected,
}

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Listener {
    ctx: Arc<NodeContext>,
    tcp: TcpListener,
}

impl Listener {
    pub fn new(ctx: Arc<NodeContext>, tcp: TcpListener) -> Self {
        Self { ctx, tcp }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Accept until shutdown. Dropping the socket on exit closes the port.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("[{}] Listening on {:?}", self.ctx.id(), self.tcp.local_addr().ok());
        loop {
            tokio::select! {
                accepted = self.tcp.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let ctx = self.ctx.clone();
                        tokio::spawn(async move {
                            handle_connection(ctx, stream, peer).await;
                        });
                    }
                    Err(e) => {
                        warn!("[{}] Accept failed: {}", self.ctx.id(), e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }
        info!("[{}] Stopped listening", self.ctx.id());
    }
}

async fn handle_connection(ctx: Arc<NodeContext>, mut stream: TcpStream, peer: SocketAddr) {
    let settings = ctx.settings();
    let payload = match read_payload(&mut stream, settings.max_message_bytes, settings.io_timeout()).await {
        Some(payload) => payload,
        None => {
            debug!("Dropped unreadable payload from {}", peer);
            return;
        }
    };

    match WireMessage::from_bytes(&payload) {
        Ok(message) => {
            let delivery = dispatch(&ctx, message, Instant::now());
            debug!("Message from {}: {:?}", peer, delivery);
        }
        Err(e) => debug!("Dropped malformed payload from {}: {}", peer, e),
    }
}

/// Read one whole message (until the sender closes). `None` on timeout, I/O
/// error or oversize payload.
async fn read_payload(stream: &mut TcpStream, max_bytes: usize, limit: Duration) -> Option<Vec<u8>> {
    let mut payload = Vec::new();
    let mut bounded = stream.take(max_bytes as u64 + 1);
    match timeout(limit, bounded.read_to_end(&mut payload)).await {
        Ok(Ok(_)) if payload.len() <= max_bytes => Some(payload),
        _ => None,
    }
}

/// Route a decoded message into the node's state
pub fn dispatch(ctx: &NodeContext, message: WireMessage, now: Instant) -> Delivery {
    if !ctx.is_enabled() {
        debug!("[{}] Disabled, ignoring {}", ctx.id(), message.message_type());
        return Delivery::Ignored;
    }

    match message {
        WireMessage::TableSnapshot { sender, table } => accept_snapshot(ctx, sender, &table, now),
        WireMessage::LinkChange { from, cost } => apply_directive(ctx, from, cost, now),
    }
}

fn accept_snapshot(ctx: &NodeContext, sender: NodeId, table: &LinkStateTable, now: Instant) -> Delivery {
    let reactivated = note_alive(ctx, &sender, now);

    if ctx.in_grace_window(now) {
        debug!("[{}] Discarding snapshot from {} inside grace window", ctx.id(), sender);
        ctx.emit(NodeEvent::SnapshotDiscarded { sender });
        return Delivery::Discarded;
    }

    let changes = ctx.store().merge(&sender, table);
    if changes > 0 {
        ctx.emit(NodeEvent::TableUpdated {
            sender: sender.clone(),
            changes,
        });
    }
    Delivery::Merged {
        changes,
        reactivated,
    }
}

/// Refresh the sender's clock. An inactive neighbor comes back with its
/// configured cost; returns whether that happened.
fn note_alive(ctx: &NodeContext, sender: &NodeId, now: Instant) -> bool {
    match ctx.neighbors().record_received(sender, now) {
        Some(Reception::Reactivated { link_cost }) => {
            info!("[{}] Neighbor {} is reachable again", ctx.id(), sender);
            ctx.store().set_local_link_cost(sender, link_cost);
            ctx.emit(NodeEvent::NeighborUp(sender.clone()));
            true
        }
        _ => false,
    }
}

fn apply_directive(ctx: &NodeContext, from: NodeId, cost: f64, now: Instant) -> Delivery {
    if !ctx.neighbors().contains(&from) {
        warn!("[{}] Ignoring link change from non-neighbor {}", ctx.id(), from);
        return Delivery::Rejected;
    }
    note_alive(ctx, &from, now);

    if let Err(e) = ctx.persist_link_cost(&from, cost) {
        warn!("[{}] Failed to persist link cost to {}: {}", ctx.id(), from, e);
    }
    ctx.apply_link_cost(&from, cost);
    info!("[{}] Link cost to {} changed to {} by neighbor", ctx.id(), from, cost);
    ctx.emit(NodeEvent::LinkCostChanged {
        neighbor: from,
        cost,
    });
    Delivery::LinkCostApplied
}
