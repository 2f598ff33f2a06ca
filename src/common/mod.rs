//! Common utilities and types shared across ringdht

pub mod config;
pub mod error;
pub mod hash;
pub mod memnet;
pub mod message;
pub mod transport;

pub use self::config::{Config, CoordinatorConfig, NodeConfig};
pub use self::error::{Error, Result};
pub use self::hash::{blake3_hash, key_hash, owner_index};
pub use self::memnet::{MemoryNetwork, MemoryTransport};
pub use self::message::{Message, Payload, PeerAddr, PeerId};
pub use self::transport::{Transport, UdpTransport};
