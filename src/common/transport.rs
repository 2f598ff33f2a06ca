//! Datagram transport
//!
//! All protocol traffic is fire-and-forget: `send_to` returns once the
//! datagram is handed off, never after delivery. `UdpTransport` is the
//! production implementation; [`crate::common::memnet`] provides an
//! in-process network for tests.

use crate::common::{Error, Message, Result};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

pub trait Transport: Send + Sync + 'static {
    /// Address peers should send to
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Hand one datagram off for delivery
    fn send_to(&self, payload: &[u8], target: SocketAddr)
        -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next datagram
    fn recv_from(&self) -> impl Future<Output = Result<(Vec<u8>, SocketAddr)>> + Send;

    /// Encode and send one message
    fn send_message(
        &self,
        message: &Message,
        target: SocketAddr,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let bytes = message.encode()?;
            self.send_to(&bytes, target).await
        }
    }
}

/// UDP socket transport
pub struct UdpTransport {
    socket: UdpSocket,
    max_datagram_size: usize,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr, max_datagram_size: usize) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            max_datagram_size,
        })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> Result<()> {
        if payload.len() > self.max_datagram_size {
            return Err(Error::DatagramTooLarge {
                size: payload.len(),
                max: self.max_datagram_size,
            });
        }
        self.socket.send_to(payload, target).await?;
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; self.max_datagram_size];
        let (len, src) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, src))
    }
}
