// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Live subscriptions of the server, keyed by peer and request id.

use crate::error::{Error, Result};
use crate::model::WatchHandle;
use crate::transport::PeerId;
use std::collections::HashMap;
use std::time::Instant;

/// A registered subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    /// Path as sent by the subscriber
    pub path: String,

    /// Listener installed on the device
    pub handle: WatchHandle,

    /// Registration timestamp
    pub created_at: Instant,
}

/// Registry of all subscriptions of all peers.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<(PeerId, u64), SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, peer: &PeerId, id: u64) -> bool {
        self.entries.contains_key(&(peer.clone(), id))
    }

    /// Register a subscription. Ids must be unique per peer.
    pub fn insert(&mut self, peer: &PeerId, id: u64, path: &str, handle: WatchHandle) -> Result<()> {
        let key = (peer.clone(), id);
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateSubscription(id));
        }
        self.entries.insert(
            key,
            SubscriptionEntry {
                path: path.to_string(),
                handle,
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, peer: &PeerId, id: u64) -> Option<SubscriptionEntry> {
        self.entries.remove(&(peer.clone(), id))
    }

    /// Remove every subscription of `peer`.
    pub fn remove_peer(&mut self, peer: &PeerId) -> Vec<(u64, SubscriptionEntry)> {
        let ids: Vec<u64> = self
            .entries
            .keys()
            .filter(|(p, _)| p == peer)
            .map(|(_, id)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.remove(peer, id).map(|entry| (id, entry)))
            .collect()
    }

    /// Remove everything.
    pub fn drain(&mut self) -> Vec<SubscriptionEntry> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
