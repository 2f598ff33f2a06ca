//! Coordinator server
//!
//! One listener task handles datagrams in arrival order; operator actions
//! (`rebuild_and_broadcast`, `distribute`, `teardown`) run concurrently
//! from another task. Both reach membership state only through the
//! registry handle.

use crate::common::{
    CoordinatorConfig, Error, Message, PeerId, Result, Transport, UdpTransport,
};
use crate::coordinator::dataset::Item;
use crate::coordinator::placement::assign;
use crate::coordinator::registry::{spawn_registry, RegistryHandle};
use crate::coordinator::ring::Ring;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// Outcome of a per-peer broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Outcome of pushing items to their owners
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementReport {
    pub placed: usize,
    pub failed: usize,
}

pub struct Coordinator<T: Transport> {
    transport: Arc<T>,
    registry: RegistryHandle,
    shutdown: watch::Sender<bool>,
}

impl Coordinator<UdpTransport> {
    /// Bind the coordinator's UDP socket
    pub async fn bind(config: &CoordinatorConfig) -> Result<Self> {
        let transport = UdpTransport::bind(config.bind_addr, config.max_datagram_size).await?;
        Ok(Self::new(transport))
    }
}

impl<T: Transport> Coordinator<T> {
    /// Must be called from within a tokio runtime (spawns the registry task)
    pub fn new(transport: T) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            transport: Arc::new(transport),
            registry: spawn_registry(),
            shutdown,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Listener loop. Returns after `teardown`.
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        tracing::info!("Coordinator listening on {}", self.local_addr()?);
        let mut shutdown = self.shutdown.subscribe();

        while !*shutdown.borrow() {
            tokio::select! {
                received = self.transport.recv_from() => {
                    match received {
                        Ok((bytes, src)) => self.handle_datagram(&bytes, src).await,
                        Err(e) => tracing::error!("Receive error: {}", e),
                    }
                }
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!("Coordinator stopped");
        Ok(())
    }

    /// Decode and dispatch one datagram. Bad input is logged and dropped.
    pub async fn handle_datagram(&self, bytes: &[u8], src: SocketAddr) {
        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) if e.is_discardable() => {
                tracing::warn!("Discarding datagram from {}: {}", src, e);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to decode datagram from {}: {}", src, e);
                return;
            }
        };

        if let Err(e) = self.dispatch(message, src).await {
            tracing::error!("Error handling datagram from {}: {}", src, e);
        }
    }

    async fn dispatch(&self, message: Message, src: SocketAddr) -> Result<()> {
        match message {
            Message::Register { peer_port } => self.handle_register(src, peer_port).await,
            Message::StoreAck { peer_id, event_id } => {
                tracing::info!("Peer {} stored event {}", peer_id, event_id);
                Ok(())
            }
            Message::Leave { peer_id } => self.handle_leave(peer_id).await.map(|_| ()),
            other => {
                tracing::warn!(
                    "Unexpected command {} from {}, ignoring",
                    other.command(),
                    src
                );
                Ok(())
            }
        }
    }

    async fn handle_register(&self, src: SocketAddr, peer_port: u16) -> Result<()> {
        let record = self.registry.register(src.ip(), peer_port).await?;
        // Reply to the datagram source, which is where the node is waiting.
        self.transport
            .send_message(&Message::SetId { peer_id: record.id }, src)
            .await
    }

    /// Remove a departing peer and reshape the ring. Unknown ids are a no-op.
    pub async fn handle_leave(&self, peer_id: PeerId) -> Result<BroadcastReport> {
        match self.registry.remove(peer_id).await? {
            Some(ring) => {
                tracing::info!("Peer {} left, updating ring", peer_id);
                Ok(self.broadcast_ring(&ring).await)
            }
            None => Ok(BroadcastReport::default()),
        }
    }

    /// Recompute the ring and send every member its successor
    pub async fn rebuild_and_broadcast(&self) -> Result<BroadcastReport> {
        let ring = self.registry.snapshot().await?;
        Ok(self.broadcast_ring(&ring).await)
    }

    async fn broadcast_ring(&self, ring: &Ring) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        if ring.is_empty() {
            tracing::info!("No peers to update in ring");
            return report;
        }

        for (peer, successor) in ring.successors() {
            let message = Message::SetNextPeer {
                next_peer: successor.peer_addr(),
            };
            match self.transport.send_message(&message, peer.socket_addr()).await {
                Ok(()) => {
                    tracing::info!("Peer {} -> next peer {}", peer.id, successor.peer_addr());
                    report.sent += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to send set_next_peer to peer {}: {}", peer.id, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Assign items over the current ring and push each to its owner
    pub async fn distribute(&self, items: &[Item]) -> Result<PlacementReport> {
        let ring = self.registry.snapshot().await?;
        let plan = match assign(items, &ring) {
            Ok(plan) => plan,
            Err(Error::EmptyRegistry) => {
                tracing::warn!("No peers registered, cannot distribute items");
                return Err(Error::EmptyRegistry);
            }
            Err(e) => return Err(e),
        };

        tracing::info!("Distributing {} items to {} peers", items.len(), ring.len());
        let mut report = PlacementReport::default();
        for peer in ring.members() {
            let Some(owned) = plan.get(&peer.id) else {
                continue;
            };
            for item in owned {
                let message = Message::Store {
                    event_id: item.key.clone(),
                    event_data: item.payload.clone(),
                };
                match self.transport.send_message(&message, peer.socket_addr()).await {
                    Ok(()) => report.placed += 1,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to send item {} to peer {}: {}",
                            item.key,
                            peer.id,
                            e
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Distribution complete: {} placed, {} failed",
            report.placed,
            report.failed
        );
        Ok(report)
    }

    /// Tell every peer to shut down, forget them, and stop the listener
    pub async fn teardown(&self) -> Result<BroadcastReport> {
        let ring = self.registry.clear().await?;
        let mut report = BroadcastReport::default();

        for peer in ring.members() {
            match self
                .transport
                .send_message(&Message::Teardown, peer.socket_addr())
                .await
            {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    tracing::warn!("Failed to send teardown to peer {}: {}", peer.id, e);
                    report.failed += 1;
                }
            }
        }

        self.shutdown.send_replace(true);
        tracing::info!("Coordinator shutting down");
        Ok(report)
    }
}
