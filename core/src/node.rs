//! Router node: shared context and task lifecycle
//!
//! [`NodeContext`] is the one object every loop shares: identity, settings,
//! the link-state store, the neighbor table, the administrative state and the
//! shutdown signal. [`RouterNode::start`] spawns the four long-running loops
//! against it and hands back a [`NodeHandle`].

use crate::command::CommandProcessor;
use crate::config::{persist_link_cost, ConfigError, NodeSettings};
use crate::link::{Disseminator, LinkSender, Listener};
use crate::liveness::LivenessMonitor;
use crate::routing::{ConvergenceMonitor, ShortestPathResult};
use crate::topology::{LinkStateStore, NeighborTable, NodeId};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Notifications from the engine to whoever embeds it
#[derive(Debug, Clone)]
pub enum NodeEvent {
    RoutesComputed(ShortestPathResult),
    TableUpdated { sender: NodeId, changes: usize },
    NeighborDown(NodeId),
    NeighborUp(NodeId),
    /// A neighbor changed the cost of its link to us
    LinkCostChanged { neighbor: NodeId, cost: f64 },
    /// Snapshot dropped inside the post-enable grace window
    SnapshotDiscarded { sender: NodeId },
}

#[derive(Debug)]
struct AdminState {
    enabled: bool,
    enabled_at: Option<Instant>,
}

pub struct NodeContext {
    id: NodeId,
    settings: NodeSettings,
    store: LinkStateStore,
    neighbors: NeighborTable,
    config_path: Option<PathBuf>,
    admin: Mutex<AdminState>,
    events: mpsc::Sender<NodeEvent>,
    shutdown: watch::Sender<bool>,
}

impl NodeContext {
    /// Seeds the store's own row from the neighbors' configured costs
    pub fn new(
        id: NodeId,
        neighbors: NeighborTable,
        settings: NodeSettings,
        events: mpsc::Sender<NodeEvent>,
    ) -> Self {
        let store = LinkStateStore::new(id.clone(), neighbors.link_costs());
        let (shutdown, _) = watch::channel(false);
        Self {
            id,
            settings,
            store,
            neighbors,
            config_path: None,
            admin: Mutex::new(AdminState {
                enabled: true,
                enabled_at: None,
            }),
            events,
            shutdown,
        }
    }

    /// Attach the config file that link-cost changes are written back to
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn store(&self) -> &LinkStateStore {
        &self.store
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.admin.lock().enabled
    }

    /// True while snapshots must still be discarded after the last `enable`
    pub fn in_grace_window(&self, now: Instant) -> bool {
        match self.admin.lock().enabled_at {
            Some(at) => now.saturating_duration_since(at) < self.settings.enable_grace(),
            None => false,
        }
    }

    /// Returns false if the node was already disabled
    pub fn disable(&self) -> bool {
        let mut admin = self.admin.lock();
        if !admin.enabled {
            return false;
        }
        admin.enabled = false;
        info!("[{}] Disabled", self.id);
        true
    }

    /// Returns false if the node was already enabled. Starts the grace window
    /// and resets every neighbor's liveness clock.
    pub fn enable(&self, now: Instant) -> bool {
        {
            let mut admin = self.admin.lock();
            if admin.enabled {
                return false;
            }
            admin.enabled = true;
            admin.enabled_at = Some(now);
        }
        self.neighbors.touch_all(now);
        info!("[{}] Enabled", self.id);
        true
    }

    pub fn emit(&self, event: NodeEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!("[{}] Dropped node event: {}", self.id, e);
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn trigger_shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!("[{}] Shutting down", self.id);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Write a neighbor's new cost to the attached config file, if any
    pub fn persist_link_cost(&self, neighbor: &NodeId, cost: f64) -> Result<(), ConfigError> {
        match &self.config_path {
            Some(path) => persist_link_cost(path, neighbor, cost),
            None => Ok(()),
        }
    }

    /// Update the neighbor record and our row in the store
    pub fn apply_link_cost(&self, neighbor: &NodeId, cost: f64) {
        if self.neighbors.set_link_cost(neighbor, cost) {
            self.store.set_local_link_cost(neighbor, cost);
        }
    }
}

/// Resolves once the shutdown flag is raised, or its sender is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub struct RouterNode {
    ctx: Arc<NodeContext>,
}

impl RouterNode {
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        Self { ctx }
    }

    /// Spawn the listener, disseminator, liveness and convergence loops.
    /// Must be called from within a tokio runtime.
    pub fn start(
        self,
        tcp: TcpListener,
        sender: Arc<dyn LinkSender>,
    ) -> std::io::Result<NodeHandle> {
        let ctx = self.ctx;
        let local_addr = tcp.local_addr()?;

        ctx.neighbors().touch_all(Instant::now());
        let convergence = ConvergenceMonitor::new(ctx.clone());
        // Startup counts as a change so the first routes are computed
        ctx.store().signal_change();

        let tasks = vec![
            tokio::spawn(Listener::new(ctx.clone(), tcp).run(ctx.shutdown_signal())),
            tokio::spawn(Disseminator::new(ctx.clone(), sender.clone()).run(ctx.shutdown_signal())),
            tokio::spawn(LivenessMonitor::new(ctx.clone()).run(ctx.shutdown_signal())),
            tokio::spawn(convergence.run(ctx.shutdown_signal())),
        ];

        info!(
            "[{}] Node started on {} with {} neighbor(s)",
            ctx.id(),
            local_addr,
            ctx.neighbors().len()
        );

        Ok(NodeHandle {
            commands: CommandProcessor::new(ctx.clone(), sender),
            ctx,
            local_addr,
            tasks,
        })
    }
}

/// Running node: its address, its command processor and its tasks
pub struct NodeHandle {
    ctx: Arc<NodeContext>,
    local_addr: SocketAddr,
    commands: CommandProcessor,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    pub fn commands(&self) -> CommandProcessor {
        self.commands.clone()
    }

    pub fn shutdown(&self) {
        self.ctx.trigger_shutdown();
    }

    /// Resolves once shutdown has been requested, by a command or otherwise
    pub async fn stopped(&self) {
        shutdown_requested(&mut self.ctx.shutdown_signal()).await;
    }

    /// Wait for every loop to exit
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("[{}] Node task failed: {}", self.ctx.id(), e);
            }
        }
        info!("[{}] Node stopped", self.ctx.id());
    }
}
