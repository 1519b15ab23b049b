//! Link-state wire protocol: messages and serialization
//!
//! Two message kinds travel between neighbors, one per connection:
//! - Table snapshot: JSON `{"sender": .., "table": {"cost": {..}, "time": {..}}}`
//! - Link-cost-change directive: plain text `change <fromId> <newCost>`
//!
//! The kind is decided once, here, from the first token of the payload.

use crate::topology::{CostRow, LinkStateTable, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Leading token of a link-cost-change directive
pub const CHANGE_TOKEN: &str = "change";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("Empty payload")]
    Empty,
    #[error("Unknown message kind")]
    UnknownKind,
    #[error("Malformed directive: {0}")]
    MalformedDirective(String),
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// A message exchanged between neighbors
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Full copy of the sender's link-state table
    TableSnapshot { sender: NodeId, table: LinkStateTable },
    /// The sender changed the cost of its link to us
    LinkChange { from: NodeId, cost: f64 },
}

impl WireMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            WireMessage::TableSnapshot { .. } => "TableSnapshot",
            WireMessage::LinkChange { .. } => "LinkChange",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        match self {
            WireMessage::TableSnapshot { sender, table } => {
                let wire = WireSnapshot {
                    sender: sender.clone(),
                    table: WireTable::from(table),
                };
                serde_json::to_vec(&wire).map_err(|e| WireError::SerializationError(e.to_string()))
            }
            WireMessage::LinkChange { from, cost } => {
                Ok(format!("{} {} {}", CHANGE_TOKEN, from, cost).into_bytes())
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let text = std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(WireError::Empty);
        }

        if text.split_whitespace().next() == Some(CHANGE_TOKEN) {
            parse_directive(text)
        } else if text.starts_with('{') {
            let wire: WireSnapshot = serde_json::from_str(text)
                .map_err(|e| WireError::MalformedSnapshot(e.to_string()))?;
            Ok(WireMessage::TableSnapshot {
                sender: wire.sender,
                table: wire.table.into_table()?,
            })
        } else {
            Err(WireError::UnknownKind)
        }
    }
}

fn parse_directive(text: &str) -> Result<WireMessage, WireError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let [_, from, cost] = fields.as_slice() else {
        return Err(WireError::MalformedDirective(format!(
            "expected `{} <fromId> <newCost>`",
            CHANGE_TOKEN
        )));
    };
    let from: NodeId = from
        .parse()
        .map_err(|e| WireError::MalformedDirective(format!("{}", e)))?;
    let cost: f64 = cost
        .parse()
        .map_err(|_| WireError::MalformedDirective(format!("invalid cost {:?}", cost)))?;
    if cost.is_nan() || cost < 0.0 {
        return Err(WireError::MalformedDirective(format!(
            "cost must be non-negative, got {}",
            cost
        )));
    }
    Ok(WireMessage::LinkChange { from, cost })
}

#[derive(Debug, Serialize, Deserialize)]
struct WireSnapshot {
    sender: NodeId,
    table: WireTable,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTable {
    cost: BTreeMap<NodeId, BTreeMap<NodeId, WireCost>>,
    time: BTreeMap<NodeId, Option<f64>>,
}

/// JSON has no infinity; unreachable costs travel as a string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireCost {
    Finite(f64),
    Named(String),
}

impl From<f64> for WireCost {
    fn from(cost: f64) -> Self {
        if cost.is_finite() {
            WireCost::Finite(cost)
        } else {
            WireCost::Named("inf".to_string())
        }
    }
}

impl WireCost {
    fn to_cost(&self) -> Result<f64, WireError> {
        let cost = match self {
            WireCost::Finite(cost) => *cost,
            WireCost::Named(name) => match name.as_str() {
                "inf" | "Infinity" | "∞" => f64::INFINITY,
                other => {
                    return Err(WireError::MalformedSnapshot(format!(
                        "invalid cost {:?}",
                        other
                    )))
                }
            },
        };
        if cost.is_nan() || cost < 0.0 {
            return Err(WireError::MalformedSnapshot(format!(
                "cost must be non-negative, got {}",
                cost
            )));
        }
        Ok(cost)
    }
}

impl From<&LinkStateTable> for WireTable {
    fn from(table: &LinkStateTable) -> Self {
        let cost = table
            .rows()
            .map(|(origin, row)| {
                let row = row
                    .iter()
                    .map(|(destination, cost)| (destination.clone(), WireCost::from(*cost)))
                    .collect();
                (origin.clone(), row)
            })
            .collect();
        let time = table
            .stamps()
            .map(|(origin, stamp)| (origin.clone(), stamp))
            .collect();
        WireTable { cost, time }
    }
}

impl WireTable {
    fn into_table(self) -> Result<LinkStateTable, WireError> {
        let mut table = LinkStateTable::new();
        let mut time = self.time;
        for (origin, wire_row) in self.cost {
            let row = wire_row
                .iter()
                .map(|(destination, cost)| cost.to_cost().map(|c| (destination.clone(), c)))
                .collect::<Result<CostRow, WireError>>()?;
            let stamp = time.remove(&origin).flatten();
            table.set_row(origin, row, stamp);
        }
        // Stamped rows with no cost entry are all-unreachable rows
        for (origin, stamp) in time {
            table.set_row(origin, CostRow::new(), stamp);
        }
        Ok(table)
    }
}
