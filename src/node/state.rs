//! Node lifecycle
//!
//! ```text
//! Unregistered ──set_id──▶ Registered ──serve / set_next_peer──▶ Active
//!                               │                                  │
//!                               ├──────────── leave ───────────────┤──▶ Departed
//!                               └─────────── teardown ─────────────┴──▶ TornDown
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Unregistered,
    Registered,
    Active,
    Departed,
    TornDown,
}

impl NodeState {
    /// Departed and TornDown are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Departed | NodeState::TornDown)
    }

    /// Registered or Active: the node holds an id and may do work
    pub fn is_member(&self) -> bool {
        matches!(self, NodeState::Registered | NodeState::Active)
    }

    /// State after the node starts serving or learns a successor
    pub fn activate(self) -> Self {
        match self {
            NodeState::Registered => NodeState::Active,
            other => other,
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Unregistered => write!(f, "unregistered"),
            NodeState::Registered => write!(f, "registered"),
            NodeState::Active => write!(f, "active"),
            NodeState::Departed => write!(f, "departed"),
            NodeState::TornDown => write!(f, "torn down"),
        }
    }
}
