// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Change listeners for attributes, status and devices.
//!
//! Listeners run synchronously in the updating task, after every field of
//! the update has been written. They must not block and must not update
//! the entity they listen to. A listener that returns an error or panics
//! is logged and skipped; the remaining listeners still run.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Payload delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Path of the changed entity relative to the listener's owner.
    pub path: String,
    /// Serialized entity after the update.
    pub value: Value,
}

impl Change {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Listener callback.
pub type ListenerFn = Arc<dyn Fn(&Change) -> Result<()> + Send + Sync>;

/// Handle returned by registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered list of listener callbacks.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, ListenerFn)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`. Registering the same `Arc` twice is an error.
    pub fn add(&self, callback: ListenerFn) -> Result<ListenerId> {
        let mut entries = self.entries.write();
        let ptr = Arc::as_ptr(&callback) as *const ();
        if entries
            .iter()
            .any(|(_, existing)| std::ptr::eq(Arc::as_ptr(existing) as *const (), ptr))
        {
            return Err(Error::Listener(
                "Callback function already in callback list".into(),
            ));
        }
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.push((id, callback));
        Ok(id)
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every listener with `change`. Returns the number that failed.
    pub fn notify(&self, owner: &str, change: &Change) -> usize {
        // Snapshot so a callback may remove itself without deadlocking.
        let callbacks: Vec<(ListenerId, ListenerFn)> = self.entries.read().clone();
        let mut failures = 0;

        for (id, callback) in callbacks {
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(change)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(
                        "[{}] Listener {:?} failed on {:?}: {}",
                        owner,
                        id,
                        change.path,
                        e
                    );
                }
                Err(_) => {
                    failures += 1;
                    tracing::error!(
                        "[{}] Listener {:?} panicked on {:?}",
                        owner,
                        id,
                        change.path
                    );
                }
            }
        }

        failures
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}
