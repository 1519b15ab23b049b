//! Node identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque identifier of a router in the network (a single letter in practice).
///
/// Ordering is lexicographic and is what every deterministic tie-break in the
/// crate relies on, from table iteration to Dijkstra's node selection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeIdError {
    #[error("Node id must not be empty")]
    Empty,
    #[error("Node id must not contain whitespace: {0:?}")]
    Whitespace(String),
}

impl NodeId {
    pub fn new(id: impl Into<String>) -> Result<Self, NodeIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(NodeIdError::Empty);
        }
        if id.chars().any(char::is_whitespace) {
            return Err(NodeIdError::Whitespace(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_id() {
        let id: NodeId = "A".parse().unwrap();
        assert_eq!(id.as_str(), "A");
        assert_eq!(id.to_string(), "A");
    }

    #[test]
    fn test_reject_empty_and_whitespace() {
        assert_eq!(NodeId::new(""), Err(NodeIdError::Empty));
        assert!(matches!(NodeId::new("A B"), Err(NodeIdError::Whitespace(_))));
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut ids: Vec<NodeId> = ["C", "A", "B"].iter().map(|s| s.parse().unwrap()).collect();
        ids.sort();
        let names: Vec<&str> = ids.iter().map(NodeId::as_str).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_serde_as_plain_string() {
        let id: NodeId = "J".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"J\"");
        let back: NodeId = serde_json::from_str("\"J\"").unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<NodeId>("\"\"").is_err());
    }
}
