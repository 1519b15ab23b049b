// Console rendering for node state and events

use linkstate_core::topology::LinkStateTable;
use linkstate_core::{CommandOutcome, NeighborRecord, NodeEvent, NodeId, ShortestPathResult};
use std::fmt::Write;
use tokio::time::Instant;

pub fn format_cost(cost: f64) -> String {
    if cost.is_finite() {
        cost.to_string()
    } else {
        "∞".to_string()
    }
}

/// `Node X to node Y: Distance = d, Path = XZY`, one line per destination
pub fn render_routes(result: &ShortestPathResult) -> String {
    let mut out = String::new();
    for route in result.routes() {
        match route.distance {
            Some(distance) => {
                let path: String = route.path.iter().map(NodeId::as_str).collect();
                let _ = writeln!(
                    out,
                    "Node {} to node {}: Distance = {}, Path = {}",
                    result.source, route.destination, distance, path
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "Node {} to node {}: Unreachable",
                    result.source, route.destination
                );
            }
        }
    }
    if out.is_empty() {
        out.push_str("No known destinations\n");
    }
    out
}

pub fn render_config(local: &NodeId, records: &[NeighborRecord], now: Instant) -> String {
    let mut out = format!("Node {}: {} neighbor(s)\n", local, records.len());
    let _ = writeln!(
        out,
        "  {:<8} {:>8}  {:<21} {:<8} {}",
        "ID", "COST", "ADDRESS", "STATE", "LAST HEARD"
    );
    for record in records {
        let heard = match record.last_received {
            Some(at) => format!("{:.1}s ago", now.saturating_duration_since(at).as_secs_f64()),
            None => "never".to_string(),
        };
        let _ = writeln!(
            out,
            "  {:<8} {:>8}  {:<21} {:<8} {}",
            record.id.as_str(),
            format_cost(record.link_cost),
            record.addr.to_string(),
            if record.active { "active" } else { "down" },
            heard
        );
    }
    out
}

/// Cost matrix, one row per origin, plus each row's stamp
pub fn render_link_table(table: &LinkStateTable) -> String {
    let nodes: Vec<NodeId> = table.nodes().into_iter().collect();
    let mut out = format!("{:<8}", "");
    for node in &nodes {
        let _ = write!(out, "{:>8}", node.as_str());
    }
    let _ = writeln!(out, "  {}", "STAMP");

    for (origin, _) in table.rows() {
        let _ = write!(out, "{:<8}", origin.as_str());
        for node in &nodes {
            let _ = write!(out, "{:>8}", format_cost(table.cost(origin, node)));
        }
        let stamp = match table.stamp(origin) {
            Some(stamp) => format!("{:.3}", stamp),
            None => "-".to_string(),
        };
        let _ = writeln!(out, "  {}", stamp);
    }
    out
}

pub fn render_outcome(local: &NodeId, outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Config(records) => render_config(local, records, Instant::now()),
        CommandOutcome::RoutingTable(result) => render_routes(result),
        CommandOutcome::LinkTable(table) => render_link_table(table),
        CommandOutcome::LinkChanged {
            neighbor,
            cost,
            delivered,
        } => {
            let mut line = format!("Link {}-{} set to {}", local, neighbor, format_cost(*cost));
            if !delivered {
                line.push_str(&format!(" ({} not reachable, it will not see the change)", neighbor));
            }
            line.push('\n');
            line
        }
        CommandOutcome::Disabled => "Node disabled\n".to_string(),
        CommandOutcome::Enabled => "Node enabled\n".to_string(),
        CommandOutcome::AlreadyDisabled => "Node is already disabled\n".to_string(),
        CommandOutcome::AlreadyEnabled => "Node is already enabled\n".to_string(),
        CommandOutcome::ShutdownScheduled { delay: None } => "Shutting down...\n".to_string(),
        CommandOutcome::ShutdownScheduled { delay: Some(delay) } => {
            format!("Shutting down in {}s\n", delay.as_secs_f64())
        }
    }
}

/// Printable line for an engine event; `None` for chatter the console skips
pub fn render_event(event: &NodeEvent) -> Option<String> {
    match event {
        NodeEvent::RoutesComputed(result) => Some(format!("Routing table updated:\n{}", render_routes(result))),
        NodeEvent::NeighborDown(neighbor) => Some(format!("Neighbor {} is down\n", neighbor)),
        NodeEvent::NeighborUp(neighbor) => Some(format!("Neighbor {} is back\n", neighbor)),
        NodeEvent::LinkCostChanged { neighbor, cost } => Some(format!(
            "Neighbor {} changed our link cost to {}\n",
            neighbor,
            format_cost(*cost)
        )),
        NodeEvent::TableUpdated { .. } | NodeEvent::SnapshotDiscarded { .. } => None,
    }
}
