//! Membership registry
//!
//! The registry is owned by a single task. Callers talk to it through a
//! [`RegistryHandle`]; each request travels over an mpsc channel with a
//! oneshot reply, so "allocate an id and insert" and "remove and derive
//! the new ring" each happen in one indivisible actor turn.

use crate::common::{Error, PeerAddr, PeerId, Result};
use crate::coordinator::ring::Ring;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::{mpsc, oneshot};

/// Request buffer for the registry task
const REGISTRY_BUFFER: usize = 256;

/// A registered peer. Immutable for the lifetime of its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    pub address: IpAddr,
    pub port: u16,
}

impl PeerRecord {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn peer_addr(&self) -> PeerAddr {
        PeerAddr::from(self.socket_addr())
    }
}

/// Peer id → record. Holds no order; see [`Ring`].
#[derive(Debug, Default)]
pub struct Registry {
    peers: HashMap<PeerId, PeerRecord>,
    next_id: PeerId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and record the peer. Ids are never reused.
    pub fn register(&mut self, address: IpAddr, port: u16) -> PeerRecord {
        let record = PeerRecord {
            id: self.next_id,
            address,
            port,
        };
        self.next_id += 1;
        self.peers.insert(record.id, record.clone());
        record
    }

    /// Remove a peer; `false` if it wasn't registered
    pub fn remove(&mut self, id: PeerId) -> bool {
        self.peers.remove(&id).is_some()
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerRecord> {
        self.peers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Derive the ring from the current membership
    pub fn ring(&self) -> Ring {
        Ring::from_peers(self.peers.values().cloned())
    }

    /// Drop every record, returning the ring they formed
    pub fn clear(&mut self) -> Ring {
        Ring::from_peers(self.peers.drain().map(|(_, record)| record))
    }
}

enum RegistryCommand {
    Register {
        address: IpAddr,
        port: u16,
        reply: oneshot::Sender<PeerRecord>,
    },
    Remove {
        id: PeerId,
        reply: oneshot::Sender<Option<Ring>>,
    },
    Snapshot {
        reply: oneshot::Sender<Ring>,
    },
    Clear {
        reply: oneshot::Sender<Ring>,
    },
}

/// Cheap, cloneable access to the registry task
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl std::fmt::Debug for RegistryCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryCommand::Register { address, port, .. } => {
                write!(f, "Register({}:{})", address, port)
            }
            RegistryCommand::Remove { id, .. } => write!(f, "Remove({})", id),
            RegistryCommand::Snapshot { .. } => write!(f, "Snapshot"),
            RegistryCommand::Clear { .. } => write!(f, "Clear"),
        }
    }
}

impl RegistryHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::Unavailable)?;
        reply_rx.await.map_err(|_| Error::Unavailable)
    }

    /// Register a peer and return its record (with the freshly assigned id)
    pub async fn register(&self, address: IpAddr, port: u16) -> Result<PeerRecord> {
        self.request(|reply| RegistryCommand::Register {
            address,
            port,
            reply,
        })
        .await
    }

    /// Remove a peer. Returns the ring derived right after the removal, or
    /// `None` if the id was unknown (a no-op).
    pub async fn remove(&self, id: PeerId) -> Result<Option<Ring>> {
        self.request(|reply| RegistryCommand::Remove { id, reply })
            .await
    }

    /// Current ring
    pub async fn snapshot(&self) -> Result<Ring> {
        self.request(|reply| RegistryCommand::Snapshot { reply })
            .await
    }

    /// Empty the registry, returning the ring that was live
    pub async fn clear(&self) -> Result<Ring> {
        self.request(|reply| RegistryCommand::Clear { reply }).await
    }
}

/// Spawn the registry task
pub fn spawn_registry() -> RegistryHandle {
    let (tx, mut rx) = mpsc::channel(REGISTRY_BUFFER);

    tokio::spawn(async move {
        let mut registry = Registry::new();
        while let Some(command) = rx.recv().await {
            match command {
                RegistryCommand::Register {
                    address,
                    port,
                    reply,
                } => {
                    let record = registry.register(address, port);
                    tracing::info!(
                        "Registered peer {} at {}:{}",
                        record.id,
                        record.address,
                        record.port
                    );
                    let _ = reply.send(record);
                }
                RegistryCommand::Remove { id, reply } => {
                    let ring = if registry.remove(id) {
                        tracing::info!("Peer {} removed ({} remaining)", id, registry.len());
                        Some(registry.ring())
                    } else {
                        tracing::warn!("Attempt to remove unknown peer {}", id);
                        None
                    };
                    let _ = reply.send(ring);
                }
                RegistryCommand::Snapshot { reply } => {
                    let _ = reply.send(registry.ring());
                }
                RegistryCommand::Clear { reply } => {
                    let _ = reply.send(registry.clear());
                }
            }
        }
        tracing::debug!("Registry task stopped");
    });

    RegistryHandle { tx }
}
