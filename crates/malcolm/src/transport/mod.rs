// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer-addressed message transport.
//!
//! A server endpoint yields [`TransportEvent`]s tagged with a [`PeerId`]
//! and can send opaque payloads back to any connected peer. A client
//! endpoint exchanges payloads with exactly one server. Payloads are
//! delivered whole and in order per peer.
//!
//! Two bindings are provided: [`tcp`] (length-prefixed frames) and
//! [`memory`] (an explicitly constructed in-process hub).

pub mod memory;
pub mod tcp;

use crate::error::{Error, Result};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub use memory::MemoryHub;

/// Opaque identity of one client connection.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Arc<[u8]>);

impl PeerId {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }

    pub(crate) fn from_counter(n: u64) -> Self {
        Self::from_bytes(&n.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

/// Server-side transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(PeerId),
    Message(PeerId, Vec<u8>),
    Disconnected(PeerId),
}

/// Outbound queues of connected peers, drained by one writer per peer.
pub(crate) type PeerTable = Arc<DashMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>>;

/// Server side of a transport binding.
pub struct ServerEndpoint {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    peers: PeerTable,
    shutdown: watch::Sender<bool>,
    local_addr: Option<SocketAddr>,
}

impl ServerEndpoint {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<TransportEvent>,
        peers: PeerTable,
        shutdown: watch::Sender<bool>,
        local_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            events,
            peers,
            shutdown,
            local_addr,
        }
    }

    /// Next event, or `None` once the binding has stopped.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn sender(&self) -> PeerSender {
        PeerSender {
            peers: self.peers.clone(),
        }
    }

    /// Bound socket address (TCP only).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Stop accepting peers and close every connection.
    ///
    /// Frames already queued to a peer are still written.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
        self.peers.clear();
    }
}

impl Drop for ServerEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEndpoint")
            .field("local_addr", &self.local_addr)
            .field("peers", &self.peers.len())
            .finish()
    }
}

/// Cloneable handle for sending to peers of a [`ServerEndpoint`].
#[derive(Clone)]
pub struct PeerSender {
    peers: PeerTable,
}

impl PeerSender {
    /// Queue `payload` for `peer`. Fails with `TransportDead` once the peer is gone.
    pub fn send(&self, peer: &PeerId, payload: Vec<u8>) -> Result<()> {
        let queue = self
            .peers
            .get(peer)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::TransportDead(format!("peer {} disconnected", peer)))?;
        queue
            .send(payload)
            .map_err(|_| Error::TransportDead(format!("peer {} disconnected", peer)))
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }
}

/// Client side of a transport binding.
///
/// Dropping the endpoint, or calling [`close`](Self::close), tears the
/// connection down and the server observes a disconnect.
pub struct ClientEndpoint {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    closer: EndpointCloser,
}

impl ClientEndpoint {
    pub(crate) fn new(
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        inbound: mpsc::UnboundedReceiver<Vec<u8>>,
        closed: watch::Sender<bool>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            closer: EndpointCloser(closed),
        }
    }

    pub fn send(&self, payload: Vec<u8>) -> Result<()> {
        self.outbound
            .send(payload)
            .map_err(|_| Error::TransportDead("connection closed".into()))
    }

    /// Next payload from the server, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    pub fn close(&self) {
        self.closer.close();
    }

    /// Split into a cloneable sending half, the receiving half and the closer.
    pub fn split(
        self,
    ) -> (
        mpsc::UnboundedSender<Vec<u8>>,
        mpsc::UnboundedReceiver<Vec<u8>>,
        EndpointCloser,
    ) {
        (self.outbound, self.inbound, self.closer)
    }
}

impl std::fmt::Debug for ClientEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEndpoint")
            .field("closed", &self.closer.is_closed())
            .finish()
    }
}

/// Closes a client connection when told to or when dropped.
#[derive(Debug)]
pub struct EndpointCloser(watch::Sender<bool>);

impl EndpointCloser {
    pub fn close(&self) {
        let _ = self.0.send(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.0.borrow()
    }
}

impl Drop for EndpointCloser {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parsed endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `tcp://host:port`
    Tcp(String),
}

impl Endpoint {
    pub fn parse(endpoint: &str) -> Result<Self> {
        let (scheme, address) = endpoint.split_once("://").ok_or_else(|| {
            Error::Config(format!("Endpoint {} has no scheme, expected tcp://host:port", endpoint))
        })?;
        match scheme {
            "tcp" if !address.is_empty() => Ok(Endpoint::Tcp(address.to_string())),
            "tcp" => Err(Error::Config(format!("Endpoint {} has no address", endpoint))),
            other => Err(Error::Config(format!(
                "Unsupported endpoint scheme {} in {}",
                other, endpoint
            ))),
        }
    }

    pub async fn listen(&self, max_message_size: usize) -> Result<ServerEndpoint> {
        match self {
            Endpoint::Tcp(address) => tcp::listen(address, max_message_size).await,
        }
    }

    pub async fn connect(&self, max_message_size: usize) -> Result<ClientEndpoint> {
        match self {
            Endpoint::Tcp(address) => tcp::connect(address, max_message_size).await,
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(address) => write!(f, "tcp://{}", address),
        }
    }
}
