//! Coordinator
//!
//! The coordinator is responsible for:
//! - Membership (identity assignment, voluntary departure)
//! - Ring derivation and successor broadcasts
//! - Key placement (flat `hash(key) % n` over the ring)
//! - Pushing dataset items to their owners

pub mod dataset;
pub mod placement;
pub mod registry;
pub mod ring;
pub mod server;

pub use dataset::{load_items, DatasetFormat, Item};
pub use registry::{PeerRecord, Registry, RegistryHandle};
pub use ring::Ring;
pub use server::{BroadcastReport, Coordinator, PlacementReport};
