//! Node server
//!
//! A node registers with the coordinator, then serves datagrams from a
//! single listener task while the operator task issues `query` and
//! `leave`. Lookups for keys not held locally are forwarded verbatim to
//! the successor; the `origin` carried in the request lets the owner answer
//! the requester directly.
//!
//! There is no hop limit: a lookup for a key stored nowhere circulates
//! around the ring until a node leaves or the processes exit.

use crate::common::{
    Error, Message, NodeConfig, Payload, PeerAddr, PeerId, Result, Transport, UdpTransport,
};
use crate::node::state::NodeState;
use crate::node::store::Partition;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Buffered answers per subscriber before the slowest one starts lagging
const ANSWER_BUFFER: usize = 64;

/// A lookup result delivered to this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupAnswer {
    pub event_id: String,
    pub event_data: Payload,
    /// Node that answered (our own address for local hits)
    pub from: SocketAddr,
}

/// What a node did with one lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Key held locally; answer sent (or published, for our own query)
    Answered,
    /// Key absent; request passed to the successor
    Forwarded(PeerAddr),
    /// Key absent and no successor known; request dropped
    Dropped,
}

/// Point-in-time view for operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub peer_id: Option<PeerId>,
    pub state: NodeState,
    pub successor: Option<PeerAddr>,
    pub items: usize,
}

struct Membership {
    state: NodeState,
    peer_id: Option<PeerId>,
    successor: Option<PeerAddr>,
}

pub struct Node<T: Transport> {
    transport: T,
    coordinator: SocketAddr,
    register_timeout: Duration,
    membership: Mutex<Membership>,
    partition: Partition,
    answers: broadcast::Sender<LookupAnswer>,
    shutdown: watch::Sender<bool>,
}

impl Node<UdpTransport> {
    /// Bind the node's UDP socket
    pub async fn bind(config: &NodeConfig) -> Result<Self> {
        let transport = UdpTransport::bind(config.bind_addr, config.max_datagram_size).await?;
        if config.bind_addr.ip().is_unspecified() {
            tracing::warn!(
                "Bound to wildcard {}; lookups will name loopback as their origin, \
                 so answers only reach this node from peers on the same host",
                config.bind_addr
            );
        }
        Ok(Self::new(
            transport,
            config.coordinator_addr,
            config.register_timeout(),
        ))
    }
}

impl<T: Transport> Node<T> {
    pub fn new(transport: T, coordinator: SocketAddr, register_timeout: Duration) -> Self {
        let (answers, _) = broadcast::channel(ANSWER_BUFFER);
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            coordinator,
            register_timeout,
            membership: Mutex::new(Membership {
                state: NodeState::Unregistered,
                peer_id: None,
                successor: None,
            }),
            partition: Partition::new(),
            answers,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Address other nodes should reply to. A wildcard bind is advertised
    /// as loopback, since the wildcard itself is not routable. That only
    /// works when every node runs on one host: across hosts, bind a
    /// concrete interface address or answers to `query` never arrive.
    pub fn advertised_addr(&self) -> Result<SocketAddr> {
        let mut addr = self.local_addr()?;
        if addr.ip().is_unspecified() {
            let loopback = match addr.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            addr.set_ip(loopback);
        }
        Ok(addr)
    }

    pub fn state(&self) -> NodeState {
        self.membership.lock().unwrap().state
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.membership.lock().unwrap().peer_id
    }

    pub fn successor(&self) -> Option<PeerAddr> {
        self.membership.lock().unwrap().successor.clone()
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn status(&self) -> NodeStatus {
        let membership = self.membership.lock().unwrap();
        NodeStatus {
            peer_id: membership.peer_id,
            state: membership.state,
            successor: membership.successor.clone(),
            items: self.partition.len(),
        }
    }

    /// Stream of lookup answers arriving at this node
    pub fn subscribe(&self) -> broadcast::Receiver<LookupAnswer> {
        self.answers.subscribe()
    }

    /// Register with the coordinator and wait (bounded) for an id
    pub async fn register(&self) -> Result<PeerId> {
        let state = self.state();
        if state != NodeState::Unregistered {
            return Err(Error::InvalidState(format!("cannot register while {}", state)));
        }

        let peer_port = self.local_addr()?.port();
        self.transport
            .send_message(&Message::Register { peer_port }, self.coordinator)
            .await?;

        let (peer_id, successor) = tokio::time::timeout(self.register_timeout, self.await_id())
            .await
            .map_err(|_| Error::RegistrationTimeout(self.register_timeout))??;

        {
            let mut membership = self.membership.lock().unwrap();
            membership.peer_id = Some(peer_id);
            membership.state = NodeState::Registered;
        }
        tracing::info!("Registered with coordinator, assigned id {}", peer_id);
        if let Some(next_peer) = successor {
            self.handle_successor_update(next_peer);
        }
        Ok(peer_id)
    }

    /// Wait for `set_id`. A `set_next_peer` that overtakes it (a ring setup
    /// racing this registration) is held and returned alongside the id.
    async fn await_id(&self) -> Result<(PeerId, Option<PeerAddr>)> {
        let mut successor = None;
        loop {
            let (bytes, src) = self.transport.recv_from().await?;
            match Message::decode(&bytes) {
                Ok(Message::SetId { peer_id }) => return Ok((peer_id, successor)),
                Ok(Message::SetNextPeer { next_peer }) => {
                    tracing::debug!(
                        "Holding next peer {} until registration completes",
                        next_peer
                    );
                    successor = Some(next_peer);
                }
                Ok(other) => tracing::warn!(
                    "Unexpected {} from {} while registering, discarding",
                    other.command(),
                    src
                ),
                Err(e) => tracing::warn!("Discarding datagram from {}: {}", src, e),
            }
        }
    }

    /// Listener loop. Returns after teardown or departure, including one
    /// that happened before the loop first ran.
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        {
            let mut membership = self.membership.lock().unwrap();
            let state = membership.state;
            match state {
                NodeState::Unregistered => {
                    return Err(Error::InvalidState(
                        "cannot serve while unregistered".into(),
                    ));
                }
                _ if state.is_terminal() => {
                    tracing::info!(
                        "Node {:?} already {}, not serving",
                        membership.peer_id,
                        state
                    );
                    return Ok(());
                }
                _ => membership.state = state.activate(),
            }
        }

        let mut shutdown = self.shutdown.subscribe();
        tracing::info!("Node {:?} serving on {}", self.peer_id(), self.local_addr()?);

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

        tracing::info!("Node {:?} stopped ({})", self.peer_id(), self.state());
        Ok(())
    }

    /// Decode and dispatch one datagram. Bad input is logged and dropped.
    pub async fn handle_datagram(&self, bytes: &[u8], src: SocketAddr) {
        if self.state().is_terminal() {
            tracing::debug!("Node is {}, dropping datagram from {}", self.state(), src);
            return;
        }

        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Discarding datagram from {}: {}", src, e);
                return;
            }
        };

        let result = match message {
            Message::Store {
                event_id,
                event_data,
            } => self.handle_store(&event_id, event_data).await,
            Message::FindEvent { event_id, origin } => self
                .lookup(&event_id, origin.as_ref(), src, bytes)
                .await
                .map(|_| ()),
            Message::FoundEvent {
                event_id,
                event_data,
            } => {
                self.handle_found(event_id, event_data, src);
                Ok(())
            }
            Message::SetNextPeer { next_peer } => {
                self.handle_successor_update(next_peer);
                Ok(())
            }
            Message::Teardown => {
                self.handle_teardown();
                Ok(())
            }
            Message::SetId { peer_id } => {
                tracing::debug!("Ignoring duplicate set_id {} from {}", peer_id, src);
                Ok(())
            }
            other => {
                tracing::warn!("Unexpected command {} from {}, ignoring", other.command(), src);
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::error!("Error handling datagram from {}: {}", src, e);
        }
    }

    /// Store an item and acknowledge it to the coordinator
    pub async fn handle_store(&self, event_id: &str, event_data: Payload) -> Result<()> {
        self.partition.insert(event_id, event_data);
        tracing::info!("Node {:?} stored event {}", self.peer_id(), event_id);

        let peer_id = self
            .peer_id()
            .ok_or_else(|| Error::InvalidState("store before registration".into()))?;
        let ack = Message::StoreAck {
            peer_id,
            event_id: event_id.to_string(),
        };
        self.transport.send_message(&ack, self.coordinator).await
    }

    /// Answer a lookup from the local partition, or pass it on unchanged.
    ///
    /// The reply goes to `origin` when the request carries one, else to the
    /// datagram source.
    pub async fn handle_lookup(
        &self,
        event_id: &str,
        origin: Option<PeerAddr>,
        src: SocketAddr,
    ) -> Result<LookupOutcome> {
        let request = Message::FindEvent {
            event_id: event_id.to_string(),
            origin: origin.clone(),
        }
        .encode()?;
        self.lookup(event_id, origin.as_ref(), src, &request).await
    }

    /// `request` is the datagram as received. A miss forwards those bytes
    /// as-is, so fields this node does not know about survive the hop.
    async fn lookup(
        &self,
        event_id: &str,
        origin: Option<&PeerAddr>,
        src: SocketAddr,
        request: &[u8],
    ) -> Result<LookupOutcome> {
        if let Some(event_data) = self.partition.get(event_id) {
            let target = match origin {
                Some(origin) => origin.to_socket_addr()?,
                None => src,
            };
            let reply = Message::FoundEvent {
                event_id: event_id.to_string(),
                event_data,
            };
            self.transport.send_message(&reply, target).await?;
            tracing::info!("Answered lookup for {} to {}", event_id, target);
            return Ok(LookupOutcome::Answered);
        }

        let Some(successor) = self.successor() else {
            tracing::info!("Event {} not found and no next peer set", event_id);
            return Ok(LookupOutcome::Dropped);
        };

        tracing::debug!("Forwarding lookup for {} to {}", event_id, successor);
        self.transport
            .send_to(request, successor.to_socket_addr()?)
            .await?;
        Ok(LookupOutcome::Forwarded(successor))
    }

    fn handle_found(&self, event_id: String, event_data: Payload, from: SocketAddr) {
        tracing::info!("Found event {} at {}: {:?}", event_id, from, event_data);
        // No subscribers is fine; the log line is the answer then.
        let _ = self.answers.send(LookupAnswer {
            event_id,
            event_data,
            from,
        });
    }

    /// Replace the successor pointer. Last writer wins.
    pub fn handle_successor_update(&self, next_peer: PeerAddr) {
        let mut membership = self.membership.lock().unwrap();
        tracing::info!("Node {:?} next peer set to {}", membership.peer_id, next_peer);
        membership.successor = Some(next_peer);
        membership.state = membership.state.activate();
    }

    fn handle_teardown(&self) {
        self.membership.lock().unwrap().state = NodeState::TornDown;
        self.shutdown.send_replace(true);
        tracing::info!("Received teardown, shutting down");
    }

    /// Operator lookup: answer locally if possible, else start the request
    /// around the ring with ourselves as origin.
    pub async fn query(&self, event_id: &str) -> Result<LookupOutcome> {
        let state = self.state();
        if !state.is_member() {
            return Err(Error::InvalidState(format!("cannot query while {}", state)));
        }

        let here = self.advertised_addr()?;
        if let Some(event_data) = self.partition.get(event_id) {
            self.handle_found(event_id.to_string(), event_data, here);
            return Ok(LookupOutcome::Answered);
        }

        let Some(successor) = self.successor() else {
            tracing::info!("Event {} not held locally and no next peer set", event_id);
            return Ok(LookupOutcome::Dropped);
        };

        let request = Message::FindEvent {
            event_id: event_id.to_string(),
            origin: Some(PeerAddr::from(here)),
        };
        tracing::info!("Sending query for {} to next peer {}", event_id, successor);
        self.transport
            .send_message(&request, successor.to_socket_addr()?)
            .await?;
        Ok(LookupOutcome::Forwarded(successor))
    }

    /// Voluntarily leave: tell the coordinator, then stop serving.
    /// Ring neighbours learn about it from the coordinator only.
    pub async fn leave(&self) -> Result<()> {
        let (state, peer_id) = {
            let membership = self.membership.lock().unwrap();
            (membership.state, membership.peer_id)
        };
        let peer_id = match (state.is_member(), peer_id) {
            (true, Some(peer_id)) => peer_id,
            _ => return Err(Error::InvalidState(format!("cannot leave while {}", state))),
        };

        let sent = self
            .transport
            .send_message(&Message::Leave { peer_id }, self.coordinator)
            .await;

        self.membership.lock().unwrap().state = NodeState::Departed;
        self.shutdown.send_replace(true);
        tracing::info!("Node {} left the ring", peer_id);
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{MemoryNetwork, MemoryTransport};

    const COORD: u16 = 5000;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn payload(state: &str) -> Payload {
        let mut p = Payload::new();
        p.insert("STATE".into(), state.into());
        p
    }

    async fn next_message(endpoint: &MemoryTransport) -> (Message, SocketAddr) {
        let (bytes, src) = tokio::time::timeout(Duration::from_secs(1), endpoint.recv_from())
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        (Message::decode(&bytes).unwrap(), src)
    }

    /// A node already registered as `peer_id`, plus the coordinator endpoint
    async fn registered_node(
        net: &MemoryNetwork,
        port: u16,
        peer_id: PeerId,
    ) -> (Node<MemoryTransport>, MemoryTransport) {
        let coord = net.bind(addr(COORD));
        let node = Node::new(net.bind(addr(port)), addr(COORD), Duration::from_secs(1));

        let (registered, _) = tokio::join!(node.register(), async {
            let (msg, src) = next_message(&coord).await;
            assert_eq!(msg, Message::Register { peer_port: port });
            coord
                .send_message(&Message::SetId { peer_id }, src)
                .await
                .unwrap();
        });
        assert_eq!(registered.unwrap(), peer_id);
        (node, coord)
    }

    #[tokio::test]
    async fn test_register_assigns_id() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 7).await;
        assert_eq!(node.peer_id(), Some(7));
        assert_eq!(node.state(), NodeState::Registered);
        assert!(matches!(node.register().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_successor_before_id_is_kept() {
        let net = MemoryNetwork::new();
        let coord = net.bind(addr(COORD));
        let node = Node::new(net.bind(addr(9000)), addr(COORD), Duration::from_secs(1));

        let (registered, _) = tokio::join!(node.register(), async {
            let (_, src) = next_message(&coord).await;
            coord
                .send_message(
                    &Message::SetNextPeer {
                        next_peer: PeerAddr::from(addr(9001)),
                    },
                    src,
                )
                .await
                .unwrap();
            coord
                .send_message(&Message::SetId { peer_id: 1 }, src)
                .await
                .unwrap();
        });
        assert_eq!(registered.unwrap(), 1);
        assert_eq!(node.successor(), Some(PeerAddr::from(addr(9001))));
        assert_eq!(node.state(), NodeState::Active);
    }

    #[tokio::test]
    async fn test_register_times_out() {
        let net = MemoryNetwork::new();
        let _coord = net.bind(addr(COORD));
        let node = Node::new(net.bind(addr(9000)), addr(COORD), Duration::from_millis(50));
        assert!(matches!(
            node.register().await,
            Err(Error::RegistrationTimeout(_))
        ));
        assert_eq!(node.state(), NodeState::Unregistered);
    }

    #[tokio::test]
    async fn test_register_lost_reply_times_out() {
        let net = MemoryNetwork::new();
        let coord = net.bind(addr(COORD));
        let node = Node::new(net.bind(addr(9000)), addr(COORD), Duration::from_millis(100));
        net.drop_to(addr(9000));

        let (registered, _) = tokio::join!(node.register(), async {
            let (_, src) = next_message(&coord).await;
            coord
                .send_message(&Message::SetId { peer_id: 0 }, src)
                .await
                .unwrap();
        });
        assert!(matches!(registered, Err(Error::RegistrationTimeout(_))));
    }

    #[tokio::test]
    async fn test_store_inserts_and_acks() {
        let net = MemoryNetwork::new();
        let (node, coord) = registered_node(&net, 9000, 3).await;

        let bytes = Message::Store {
            event_id: "EVT1".into(),
            event_data: payload("OHIO"),
        }
        .encode()
        .unwrap();
        node.handle_datagram(&bytes, addr(COORD)).await;

        assert_eq!(node.partition().get("EVT1"), Some(payload("OHIO")));
        assert_eq!(
            next_message(&coord).await.0,
            Message::StoreAck {
                peer_id: 3,
                event_id: "EVT1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_lookup_hit_replies_to_origin() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;
        let origin = net.bind(addr(9100));
        let previous_hop = net.bind(addr(9200));
        node.partition().insert("EVT1", payload("OHIO"));

        let outcome = node
            .handle_lookup("EVT1", Some(PeerAddr::from(addr(9100))), addr(9200))
            .await
            .unwrap();
        assert_eq!(outcome, LookupOutcome::Answered);
        assert_eq!(
            next_message(&origin).await.0,
            Message::FoundEvent {
                event_id: "EVT1".into(),
                event_data: payload("OHIO")
            }
        );
        assert_eq!(net.delivered(addr(9200)), 0);
        drop(previous_hop);
    }

    #[tokio::test]
    async fn test_lookup_hit_without_origin_replies_to_source() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;
        let src = net.bind(addr(9200));
        node.partition().insert("EVT1", payload("OHIO"));

        node.handle_lookup("EVT1", None, addr(9200)).await.unwrap();
        assert!(matches!(
            next_message(&src).await.0,
            Message::FoundEvent { .. }
        ));
    }

    #[tokio::test]
    async fn test_lookup_miss_forwards_verbatim() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;
        let successor = net.bind(addr(9001));
        node.handle_successor_update(PeerAddr::from(addr(9001)));

        let request = Message::FindEvent {
            event_id: "EVT9".into(),
            origin: Some(PeerAddr::from(addr(9100))),
        };
        node.handle_datagram(&request.encode().unwrap(), addr(9100))
            .await;

        let (forwarded, src) = next_message(&successor).await;
        assert_eq!(forwarded, request);
        assert_eq!(src, addr(9000));
    }

    #[tokio::test]
    async fn test_lookup_miss_keeps_unknown_fields() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;
        let successor = net.bind(addr(9001));
        node.handle_successor_update(PeerAddr::from(addr(9001)));

        let request =
            br#"{"command":"find_event","event_id":"EVT9","origin":["127.0.0.1",9100],"hops":3}"#;
        node.handle_datagram(request, addr(9100)).await;

        let (bytes, _) = tokio::time::timeout(Duration::from_secs(1), successor.recv_from())
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        assert_eq!(bytes, request.to_vec());
    }

    #[tokio::test]
    async fn test_lookup_miss_without_successor_dropped() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;
        let outcome = node
            .handle_lookup("EVT9", Some(PeerAddr::from(addr(9100))), addr(9100))
            .await
            .unwrap();
        assert_eq!(outcome, LookupOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_successor_update_last_writer_wins() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;

        node.handle_successor_update(PeerAddr::from(addr(9001)));
        assert_eq!(node.state(), NodeState::Active);
        node.handle_successor_update(PeerAddr::from(addr(9002)));
        node.handle_successor_update(PeerAddr::from(addr(9001)));
        assert_eq!(node.successor(), Some(PeerAddr::from(addr(9001))));
    }

    #[tokio::test]
    async fn test_query_local_hit_publishes_answer() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;
        let mut answers = node.subscribe();
        node.partition().insert("EVT1", payload("OHIO"));

        assert_eq!(node.query("EVT1").await.unwrap(), LookupOutcome::Answered);
        let answer = answers.recv().await.unwrap();
        assert_eq!(answer.event_id, "EVT1");
        assert_eq!(answer.event_data, payload("OHIO"));
        assert_eq!(answer.from, addr(9000));
    }

    #[tokio::test]
    async fn test_query_forwards_with_origin() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;
        let successor = net.bind(addr(9001));
        node.handle_successor_update(PeerAddr::from(addr(9001)));

        let outcome = node.query("EVT1").await.unwrap();
        assert_eq!(outcome, LookupOutcome::Forwarded(PeerAddr::from(addr(9001))));
        assert_eq!(
            next_message(&successor).await.0,
            Message::FindEvent {
                event_id: "EVT1".into(),
                origin: Some(PeerAddr::from(addr(9000)))
            }
        );
    }

    #[tokio::test]
    async fn test_query_requires_membership() {
        let net = MemoryNetwork::new();
        let node = Node::new(net.bind(addr(9000)), addr(COORD), Duration::from_secs(1));
        assert!(matches!(node.query("EVT1").await, Err(Error::InvalidState(_))));
        assert!(matches!(node.leave().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_leave_notifies_coordinator_and_stops() {
        let net = MemoryNetwork::new();
        let (node, coord) = registered_node(&net, 9000, 4).await;
        let node = Arc::new(node);
        let server = tokio::spawn(node.clone().serve());

        node.leave().await.unwrap();
        assert_eq!(next_message(&coord).await.0, Message::Leave { peer_id: 4 });
        assert_eq!(node.state(), NodeState::Departed);
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("serve did not stop")
            .unwrap()
            .unwrap();

        assert!(matches!(node.query("EVT1").await, Err(Error::InvalidState(_))));
        assert!(matches!(node.leave().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_leave_before_serve_runs_stops_cleanly() {
        let net = MemoryNetwork::new();
        let (node, coord) = registered_node(&net, 9000, 2).await;
        let node = Arc::new(node);

        node.leave().await.unwrap();
        assert_eq!(next_message(&coord).await.0, Message::Leave { peer_id: 2 });
        node.clone().serve().await.unwrap();
        assert_eq!(node.state(), NodeState::Departed);
    }

    #[tokio::test]
    async fn test_teardown_before_serve_runs_stops_cleanly() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;
        let node = Arc::new(node);

        node.handle_datagram(&Message::Teardown.encode().unwrap(), addr(COORD))
            .await;
        tokio::time::timeout(Duration::from_secs(1), node.clone().serve())
            .await
            .expect("serve did not return")
            .unwrap();
        assert_eq!(node.state(), NodeState::TornDown);
    }

    #[tokio::test]
    async fn test_teardown_stops_serving() {
        let net = MemoryNetwork::new();
        let (node, coord) = registered_node(&net, 9000, 0).await;
        let node = Arc::new(node);
        let server = tokio::spawn(node.clone().serve());

        coord
            .send_message(&Message::Teardown, addr(9000))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("serve did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(node.state(), NodeState::TornDown);

        // Terminal nodes ignore further work.
        let bytes = Message::Store {
            event_id: "EVT1".into(),
            event_data: payload("OHIO"),
        }
        .encode()
        .unwrap();
        node.handle_datagram(&bytes, addr(COORD)).await;
        assert!(node.partition().is_empty());
    }

    #[tokio::test]
    async fn test_serve_requires_registration() {
        let net = MemoryNetwork::new();
        let node = Arc::new(Node::new(
            net.bind(addr(9000)),
            addr(COORD),
            Duration::from_secs(1),
        ));
        assert!(matches!(node.serve().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_bad_datagrams_ignored() {
        let net = MemoryNetwork::new();
        let (node, _coord) = registered_node(&net, 9000, 0).await;
        node.handle_datagram(b"\xff\xfe", addr(1)).await;
        node.handle_datagram(br#"{"command":"gossip"}"#, addr(1))
            .await;
        node.handle_datagram(&Message::Leave { peer_id: 0 }.encode().unwrap(), addr(1))
            .await;
        assert_eq!(node.state(), NodeState::Registered);
        assert!(node.partition().is_empty());
    }

    #[test]
    fn test_advertised_addr_replaces_wildcard() {
        let net = MemoryNetwork::new();
        let node = Node::new(
            net.bind("0.0.0.0:9000".parse().unwrap()),
            addr(COORD),
            Duration::from_secs(1),
        );
        assert_eq!(node.advertised_addr().unwrap(), addr(9000));
    }

    #[tokio::test]
    async fn test_wildcard_udp_bind_advertises_loopback() {
        let config = NodeConfig {
            bind_addr: "0.0.0.0:0".parse().unwrap(),
            ..Default::default()
        };
        let node = Node::bind(&config).await.unwrap();
        let local = node.local_addr().unwrap();
        let advertised = node.advertised_addr().unwrap();
        assert!(local.ip().is_unspecified());
        assert_eq!(advertised.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(advertised.port(), local.port());
    }
}
