//! In-process datagram network for tests
//!
//! Endpoints attach to a shared [`MemoryNetwork`] under a synthetic
//! `SocketAddr`. Faults are injected per destination: datagrams to an
//! address can be dropped or duplicated, which lets tests exercise
//! message loss without timing games.

use crate::common::transport::Transport;
use crate::common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Default)]
struct Faults {
    drop_to: HashSet<SocketAddr>,
    duplicate_to: HashSet<SocketAddr>,
}

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    delivered: HashMap<SocketAddr, usize>,
    faults: Faults,
}

/// Shared in-memory network
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint at `addr`, replacing any previous one there
    pub fn bind(&self, addr: SocketAddr) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().endpoints.insert(addr, tx);
        MemoryTransport {
            addr,
            network: self.clone(),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Detach `addr`; later sends to it fail with `Error::Unreachable`
    pub fn unbind(&self, addr: SocketAddr) {
        self.state.lock().unwrap().endpoints.remove(&addr);
    }

    /// Silently drop every datagram sent to `addr`
    pub fn drop_to(&self, addr: SocketAddr) {
        self.state.lock().unwrap().faults.drop_to.insert(addr);
    }

    /// Deliver every datagram sent to `addr` twice
    pub fn duplicate_to(&self, addr: SocketAddr) {
        self.state.lock().unwrap().faults.duplicate_to.insert(addr);
    }

    /// Clear all faults for `addr`
    pub fn heal(&self, addr: SocketAddr) {
        let mut state = self.state.lock().unwrap();
        state.faults.drop_to.remove(&addr);
        state.faults.duplicate_to.remove(&addr);
    }

    /// Number of datagrams delivered to `addr` so far
    pub fn delivered(&self, addr: SocketAddr) -> usize {
        self.state
            .lock()
            .unwrap()
            .delivered
            .get(&addr)
            .copied()
            .unwrap_or(0)
    }

    fn deliver(&self, payload: &[u8], from: SocketAddr, to: SocketAddr) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let sender = state
            .endpoints
            .get(&to)
            .cloned()
            .ok_or(Error::Unreachable(to))?;

        if state.faults.drop_to.contains(&to) {
            return Ok(());
        }
        let copies = if state.faults.duplicate_to.contains(&to) {
            2
        } else {
            1
        };

        for _ in 0..copies {
            // A closed receiver behaves like a socket nobody reads anymore.
            if sender.send((payload.to_vec(), from)).is_ok() {
                *state.delivered.entry(to).or_insert(0) += 1;
            }
        }
        Ok(())
    }
}

/// One endpoint on a [`MemoryNetwork`]
pub struct MemoryTransport {
    addr: SocketAddr,
    network: MemoryNetwork,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.addr)
    }

    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> Result<()> {
        self.network.deliver(payload, self.addr, target)
    }

    /// Once the endpoint is unbound or replaced, this waits forever, like a
    /// socket nobody sends to; callers stop it through their own shutdown.
    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(datagram) => Ok(datagram),
            None => std::future::pending().await,
        }
    }
}
