//! Operator commands
//!
//! One command per line, case-sensitive:
//! `config`, `routing table`, `table`, `change <A> <B> <cost>`, `disable`,
//! `enable`, `shutdown`, `shutdown -n <seconds>`.
//!
//! Parsing and execution are separate so the CLI can report usage errors
//! before anything touches the node.

use crate::config::ConfigError;
use crate::link::{LinkSender, WireMessage};
use crate::node::NodeContext;
use crate::routing::{PathEngine, ShortestPathResult};
use crate::topology::{LinkStateTable, NeighborRecord, NodeId};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

const CHANGE_USAGE: &str = "change <A> <B> <cost>";
const SHUTDOWN_USAGE: &str = "shutdown [-n <seconds>]";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unrecognized command: {0}")]
    Unrecognized(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid cost: {0}")]
    InvalidCost(String),
    #[error("Link {a}-{b} does not start or end at this node")]
    NotLocalEndpoint { a: NodeId, b: NodeId },
    #[error("{0} is not adjacent to this node")]
    NotAdjacent(NodeId),
    #[error("Node is disabled")]
    Disabled,
    #[error("Failed to persist link cost: {0}")]
    Persist(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Config,
    RoutingTable,
    LinkTable,
    Change { a: NodeId, b: NodeId, cost: f64 },
    Disable,
    Enable,
    Shutdown { delay: Option<Duration> },
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["config"] => Ok(Command::Config),
            ["routing", "table"] => Ok(Command::RoutingTable),
            ["table"] => Ok(Command::LinkTable),
            ["disable"] => Ok(Command::Disable),
            ["enable"] => Ok(Command::Enable),
            ["shutdown"] => Ok(Command::Shutdown { delay: None }),
            ["shutdown", "-n", seconds] => {
                let seconds: f64 = seconds
                    .parse()
                    .map_err(|_| CommandError::Usage(SHUTDOWN_USAGE))?;
                let delay = Duration::try_from_secs_f64(seconds)
                    .map_err(|_| CommandError::Usage(SHUTDOWN_USAGE))?;
                Ok(Command::Shutdown { delay: Some(delay) })
            }
            ["shutdown", ..] => Err(CommandError::Usage(SHUTDOWN_USAGE)),
            ["change", a, b, cost] => {
                let a = a.parse().map_err(|_| CommandError::Usage(CHANGE_USAGE))?;
                let b = b.parse().map_err(|_| CommandError::Usage(CHANGE_USAGE))?;
                let cost: f64 = cost
                    .parse()
                    .map_err(|_| CommandError::InvalidCost(cost.to_string()))?;
                if !cost.is_finite() || cost < 0.0 {
                    return Err(CommandError::InvalidCost(cost.to_string()));
                }
                Ok(Command::Change { a, b, cost })
            }
            ["change", ..] => Err(CommandError::Usage(CHANGE_USAGE)),
            _ => Err(CommandError::Unrecognized(line.trim().to_string())),
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What a successfully executed command produced
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Config(Vec<NeighborRecord>),
    RoutingTable(ShortestPathResult),
    LinkTable(LinkStateTable),
    LinkChanged {
        neighbor: NodeId,
        cost: f64,
        /// Whether the neighbor received the directive
        delivered: bool,
    },
    Disabled,
    Enabled,
    AlreadyDisabled,
    AlreadyEnabled,
    ShutdownScheduled { delay: Option<Duration> },
}

#[derive(Clone)]
pub struct CommandProcessor {
    ctx: Arc<NodeContext>,
    sender: Arc<dyn LinkSender>,
    engine: PathEngine,
}

impl CommandProcessor {
    pub fn new(ctx: Arc<NodeContext>, sender: Arc<dyn LinkSender>) -> Self {
        let engine = PathEngine::new(ctx.id().clone());
        Self {
            ctx,
            sender,
            engine,
        }
    }

    /// Parse and execute one line
    pub async fn execute_line(&self, line: &str) -> Result<CommandOutcome, CommandError> {
        let command = Command::parse(line)?;
        self.execute(command).await
    }

    pub async fn execute(&self, command: Command) -> Result<CommandOutcome, CommandError> {
        debug!("[{}] Executing {:?}", self.ctx.id(), command);
        match command {
            Command::Config => Ok(CommandOutcome::Config(self.ctx.neighbors().records())),
            Command::RoutingTable => Ok(CommandOutcome::RoutingTable(
                self.engine.run(self.ctx.store()),
            )),
            Command::LinkTable => Ok(CommandOutcome::LinkTable(self.ctx.store().snapshot())),
            Command::Change { a, b, cost } => self.change_link_cost(a, b, cost).await,
            Command::Disable => Ok(if self.ctx.disable() {
                CommandOutcome::Disabled
            } else {
                CommandOutcome::AlreadyDisabled
            }),
            Command::Enable => Ok(if self.ctx.enable(Instant::now()) {
                CommandOutcome::Enabled
            } else {
                CommandOutcome::AlreadyEnabled
            }),
            Command::Shutdown { delay } => {
                self.schedule_shutdown(delay);
                Ok(CommandOutcome::ShutdownScheduled { delay })
            }
        }
    }

    async fn change_link_cost(
        &self,
        a: NodeId,
        b: NodeId,
        cost: f64,
    ) -> Result<CommandOutcome, CommandError> {
        if !self.ctx.is_enabled() {
            return Err(CommandError::Disabled);
        }

        let local = self.ctx.id();
        let neighbor = match (&a == local, &b == local) {
            (true, false) => b,
            (false, true) => a,
            _ => return Err(CommandError::NotLocalEndpoint { a, b }),
        };

        let record = self
            .ctx
            .neighbors()
            .get(&neighbor)
            .ok_or_else(|| CommandError::NotAdjacent(neighbor.clone()))?;
        if !self.ctx.store().local_cost(&neighbor).is_finite() {
            return Err(CommandError::NotAdjacent(neighbor));
        }

        self.ctx.persist_link_cost(&neighbor, cost)?;
        self.ctx.apply_link_cost(&neighbor, cost);
        info!("[{}] Link cost to {} set to {}", local, neighbor, cost);

        let directive = WireMessage::LinkChange {
            from: local.clone(),
            cost,
        };
        let delivered = match directive.to_bytes() {
            Ok(payload) => match self.sender.send(record.addr, &payload).await {
                Ok(()) => true,
                Err(e) => {
                    debug!("Directive to {} not delivered: {}", neighbor, e);
                    false
                }
            },
            Err(e) => {
                debug!("Failed to encode directive: {}", e);
                false
            }
        };

        Ok(CommandOutcome::LinkChanged {
            neighbor,
            cost,
            delivered,
        })
    }

    fn schedule_shutdown(&self, delay: Option<Duration>) {
        match delay {
            None => self.ctx.trigger_shutdown(),
            Some(delay) => {
                info!("[{}] Shutdown in {:?}", self.ctx.id(), delay);
                let ctx = self.ctx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    ctx.trigger_shutdown();
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::sender::{MockLinkSender, SendError};
    use crate::link::{dispatch, Delivery};
    use crate::node::test_support::{context, context_with_config, id, remote_row};
    use std::net::SocketAddr;

    fn processor(ctx: Arc<NodeContext>, mock: MockLinkSender) -> CommandProcessor {
        CommandProcessor::new(ctx, Arc::new(mock))
    }

    fn silent_sender() -> MockLinkSender {
        let mut mock = MockLinkSender::new();
        mock.expect_send().never();
        mock
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("config").unwrap(), Command::Config);
        assert_eq!(Command::parse("  routing   table ").unwrap(), Command::RoutingTable);
        assert_eq!(Command::parse("table").unwrap(), Command::LinkTable);
        assert_eq!(Command::parse("disable").unwrap(), Command::Disable);
        assert_eq!(Command::parse("enable").unwrap(), Command::Enable);
        assert_eq!(
            Command::parse("shutdown").unwrap(),
            Command::Shutdown { delay: None }
        );
        assert_eq!(
            Command::parse("shutdown -n 3").unwrap(),
            Command::Shutdown {
                delay: Some(Duration::from_secs(3))
            }
        );
        assert_eq!(
            "change A B 2.5".parse::<Command>().unwrap(),
            Command::Change {
                a: id("A"),
                b: id("B"),
                cost: 2.5
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Command::parse("Config"), Err(CommandError::Unrecognized(_))));
        assert!(matches!(Command::parse("routing"), Err(CommandError::Unrecognized(_))));
        assert!(matches!(Command::parse("change A B"), Err(CommandError::Usage(_))));
        assert!(matches!(Command::parse("change A B x"), Err(CommandError::InvalidCost(_))));
        assert!(matches!(Command::parse("change A B -1"), Err(CommandError::InvalidCost(_))));
        assert!(matches!(Command::parse("change A B inf"), Err(CommandError::InvalidCost(_))));
        assert!(matches!(Command::parse("shutdown -n"), Err(CommandError::Usage(_))));
        assert!(matches!(Command::parse("shutdown -n soon"), Err(CommandError::Usage(_))));
        assert!(matches!(Command::parse("shutdown -n -2"), Err(CommandError::Usage(_))));
        assert!(matches!(Command::parse("shutdown -n 1e30"), Err(CommandError::Usage(_))));
        assert!(matches!(Command::parse("shutdown -n inf"), Err(CommandError::Usage(_))));
        assert!(matches!(Command::parse("shutdown -n NaN"), Err(CommandError::Usage(_))));
    }

    #[tokio::test]
    async fn test_change_applies_locally_and_sends_directive() {
        let (ctx, _events, dir) = context_with_config();
        let mut mock = MockLinkSender::new();
        mock.expect_send()
            .withf(|addr: &SocketAddr, payload: &[u8]| addr.port() == 6001 && payload == b"change A 3")
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = processor(ctx.clone(), mock)
            .execute_line("change B A 3")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CommandOutcome::LinkChanged {
                neighbor: id("B"),
                cost: 3.0,
                delivered: true
            }
        );
        assert_eq!(ctx.store().local_cost(&id("B")), 3.0);
        assert_eq!(ctx.neighbors().get(&id("B")).unwrap().link_cost, 3.0);
        let written = std::fs::read_to_string(dir.path().join("Aconfig.txt")).unwrap();
        assert_eq!(written, "2\nB 3 6001\nC 5 6002\n");
    }

    #[tokio::test]
    async fn test_change_keeps_local_update_when_send_fails() {
        let (ctx, _events) = context();
        let mut mock = MockLinkSender::new();
        mock.expect_send()
            .times(1)
            .returning(|addr, _| Err(SendError::ConnectTimeout(addr)));

        let outcome = processor(ctx.clone(), mock)
            .execute_line("change A C 2")
            .await
            .unwrap();

        assert!(matches!(outcome, CommandOutcome::LinkChanged { delivered: false, .. }));
        assert_eq!(ctx.store().local_cost(&id("C")), 2.0);
    }

    #[tokio::test]
    async fn test_change_rejections_leave_state_untouched() {
        let (ctx, _events) = context();
        let before = ctx.store().snapshot();
        let commands = processor(ctx.clone(), silent_sender());

        assert!(matches!(
            commands.execute_line("change B C 1").await,
            Err(CommandError::NotLocalEndpoint { .. })
        ));
        assert!(matches!(
            commands.execute_line("change A A 1").await,
            Err(CommandError::NotLocalEndpoint { .. })
        ));
        assert!(matches!(
            commands.execute_line("change A D 1").await,
            Err(CommandError::NotAdjacent(_))
        ));

        ctx.store().mark_unreachable(&id("C"));
        let severed = ctx.store().snapshot();
        assert!(matches!(
            commands.execute_line("change A C 1").await,
            Err(CommandError::NotAdjacent(_))
        ));
        assert_ne!(severed, before);
        assert_eq!(ctx.store().snapshot(), severed);
    }

    #[tokio::test]
    async fn test_change_rejected_while_disabled() {
        let (ctx, _events) = context();
        let commands = processor(ctx.clone(), silent_sender());

        assert_eq!(commands.execute_line("disable").await.unwrap(), CommandOutcome::Disabled);
        assert!(matches!(
            commands.execute_line("change A B 2").await,
            Err(CommandError::Disabled)
        ));
        assert_eq!(ctx.store().local_cost(&id("B")), 1.0);
    }

    #[tokio::test]
    async fn test_persist_failure_mutates_nothing() {
        let (ctx, _events, dir) = context_with_config();
        std::fs::remove_file(dir.path().join("Aconfig.txt")).unwrap();
        let before = ctx.store().snapshot();

        let result = processor(ctx.clone(), silent_sender())
            .execute_line("change A B 9")
            .await;

        assert!(matches!(result, Err(CommandError::Persist(_))));
        assert_eq!(ctx.store().snapshot(), before);
        assert_eq!(ctx.neighbors().get(&id("B")).unwrap().link_cost, 1.0);
    }

    #[tokio::test]
    async fn test_display_commands() {
        let (ctx, _events) = context();
        ctx.store()
            .merge(&id("B"), &remote_row("B", &[("A", 1.0), ("C", 2.0)], 10.0));
        let commands = processor(ctx.clone(), silent_sender());

        match commands.execute_line("routing table").await.unwrap() {
            CommandOutcome::RoutingTable(result) => {
                assert_eq!(result.distance(&id("C")), Some(3.0));
            }
            other => panic!("Unexpected outcome: {:?}", other),
        }
        match commands.execute_line("config").await.unwrap() {
            CommandOutcome::Config(records) => assert_eq!(records.len(), 2),
            other => panic!("Unexpected outcome: {:?}", other),
        }
        match commands.execute_line("table").await.unwrap() {
            CommandOutcome::LinkTable(table) => assert_eq!(table.cost(&id("B"), &id("C")), 2.0),
            other => panic!("Unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_opens_grace_window() {
        let (ctx, _events) = context();
        let commands = processor(ctx.clone(), silent_sender());

        assert_eq!(commands.execute_line("enable").await.unwrap(), CommandOutcome::AlreadyEnabled);
        commands.execute_line("disable").await.unwrap();
        assert_eq!(
            commands.execute_line("disable").await.unwrap(),
            CommandOutcome::AlreadyDisabled
        );
        assert_eq!(commands.execute_line("enable").await.unwrap(), CommandOutcome::Enabled);

        let before = ctx.store().snapshot();
        let message = WireMessage::TableSnapshot {
            sender: id("B"),
            table: remote_row("B", &[("C", 2.0)], 10.0),
        };
        assert_eq!(dispatch(&ctx, message, Instant::now()), Delivery::Discarded);
        assert_eq!(ctx.store().snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_shutdown() {
        let (ctx, _events) = context();
        let commands = processor(ctx.clone(), silent_sender());

        let outcome = commands.execute_line("shutdown -n 2").await.unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::ShutdownScheduled {
                delay: Some(Duration::from_secs(2))
            }
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!ctx.is_shutting_down());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ctx.is_shutting_down());
    }

    #[tokio::test]
    async fn test_immediate_shutdown() {
        let (ctx, _events) = context();
        processor(ctx.clone(), silent_sender())
            .execute_line("shutdown")
            .await
            .unwrap();
        assert!(ctx.is_shutting_down());
    }
}
