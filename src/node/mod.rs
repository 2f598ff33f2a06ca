//! Ring member
//!
//! Holds one partition of the dataset and a pointer to its ring successor:
//! - `store`: local key → payload partition
//! - `state`: Unregistered → Registered → Active → Departed / TornDown
//! - `server`: registration handshake, listener loop, lookup forwarding

pub mod server;
pub mod state;
pub mod store;

pub use server::{LookupAnswer, LookupOutcome, Node, NodeStatus};
pub use state::NodeState;
pub use store::Partition;
