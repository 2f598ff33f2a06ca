//! # ringdht
//!
//! A minimal distributed hash table over a single-direction ring:
//! - A coordinator assigns peer ids and derives ring order from them
//! - Items are placed with flat modulo hashing over the ring
//! - Nodes answer lookups locally or forward them to their successor
//! - Connectionless JSON datagrams, fire-and-forget
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────┐
//!                │       Coordinator        │
//!                │  registry (actor task)   │
//!                │  ring = sort(registry)   │
//!                └─────┬──────────┬─────────┘
//!       set_next_peer  │  store   │  teardown
//!          ┌───────────┼──────────┼───────────┐
//!          ▼           ▼          ▼           │
//!     ┌─────────┐  ┌─────────┐  ┌─────────┐   │
//!     │ Node 0  │─▶│ Node 1  │─▶│ Node 2  │───┘ find_event
//!     └─────────┘  └─────────┘  └─────────┘     (wraps to Node 0)
//! ```
//!
//! ## Usage
//!
//! ### Start the coordinator
//! ```bash
//! ringdht-coord serve --bind 127.0.0.1:5000 --dataset ./events.csv
//! # then at the prompt: setup | distribute | status | teardown
//! ```
//!
//! ### Start nodes
//! ```bash
//! ringdht-node serve --port 9000 --coordinator 127.0.0.1:5000
//! # then at the prompt: query <event_id> | status | leave | exit
//! ```

pub mod common;
pub mod coordinator;
pub mod node;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use node::Node;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
