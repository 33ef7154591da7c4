// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process binding.
//!
//! A [`MemoryHub`] is created together with its [`ServerEndpoint`] and
//! hands out connected [`ClientEndpoint`]s. There is no global registry:
//! clients can only reach a hub they hold.

use super::{ClientEndpoint, PeerId, PeerTable, ServerEndpoint, TransportEvent};
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Connector for an in-process server endpoint.
#[derive(Clone)]
pub struct MemoryHub {
    events: mpsc::UnboundedSender<TransportEvent>,
    peers: PeerTable,
    shutdown: watch::Receiver<bool>,
    next_peer: Arc<AtomicU64>,
}

impl MemoryHub {
    /// Create a hub and the server endpoint it connects to.
    pub fn new() -> (Self, ServerEndpoint) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let peers: PeerTable = Arc::new(DashMap::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let hub = Self {
            events: events_tx,
            peers: peers.clone(),
            shutdown: shutdown_rx,
            next_peer: Arc::new(AtomicU64::new(0)),
        };
        (hub, ServerEndpoint::new(events_rx, peers, shutdown_tx, None))
    }

    /// Open a new connection to the server endpoint.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> Result<ClientEndpoint> {
        if *self.shutdown.borrow() || self.events.is_closed() {
            return Err(Error::TransportDead("memory endpoint closed".into()));
        }

        let peer = PeerId::from_counter(self.next_peer.fetch_add(1, Ordering::Relaxed));
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, mut from_client_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (closed_tx, mut closed_rx) = watch::channel(false);

        self.peers.insert(peer.clone(), to_client_tx);
        if self
            .events
            .send(TransportEvent::Connected(peer.clone()))
            .is_err()
        {
            self.peers.remove(&peer);
            return Err(Error::TransportDead("memory endpoint closed".into()));
        }
        debug!("[{}] Memory peer connected", peer);

        let events = self.events.clone();
        let peers = self.peers.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    payload = from_client_rx.recv() => {
                        let Some(payload) = payload else { break };
                        if events.send(TransportEvent::Message(peer.clone(), payload)).is_err() {
                            break;
                        }
                    }
                    _ = closed_rx.changed() => break,
                    _ = shutdown.changed() => break,
                }
            }
            peers.remove(&peer);
            let _ = events.send(TransportEvent::Disconnected(peer.clone()));
            debug!("[{}] Memory peer disconnected", peer);
        });

        Ok(ClientEndpoint::new(from_client_tx, to_client_rx, closed_tx))
    }
}

impl std::fmt::Debug for MemoryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHub")
            .field("peers", &self.peers.len())
            .finish()
    }
}
