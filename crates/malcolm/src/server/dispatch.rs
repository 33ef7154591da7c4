// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-frame request handling.

use super::registry::SubscriptionRegistry;
use crate::codec::{self, serialize_error, Envelope};
use crate::error::{Error, Result};
use crate::model::{Args, Change, Device, ListenerFn, Method, Target};
use crate::transport::{PeerId, PeerSender};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Name of the built-in method that stops the server.
pub const STOP_METHOD: &str = "stop";

/// Dispatch state owned by the server loop.
pub(crate) struct Dispatcher {
    device: Arc<Device>,
    sender: PeerSender,
    registry: SubscriptionRegistry,
    pub(crate) handlers: JoinSet<()>,
    expired: mpsc::UnboundedSender<(PeerId, u64)>,
    stop: Arc<watch::Sender<bool>>,
}

impl Dispatcher {
    pub(crate) fn new(
        device: Arc<Device>,
        sender: PeerSender,
        expired: mpsc::UnboundedSender<(PeerId, u64)>,
        stop: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            device,
            sender,
            registry: SubscriptionRegistry::new(),
            handlers: JoinSet::new(),
            expired,
            stop,
        }
    }

    pub(crate) fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn peer_connected(&mut self, peer: &PeerId) {
        info!("[{}] Peer {} connected", self.device.name(), peer);
        let ready = Envelope::Ready {
            device: self.device.name().to_string(),
        };
        if let Err(e) = send_envelope(&self.sender, peer, &ready) {
            warn!("[{}] Failed to greet peer {}: {}", self.device.name(), peer, e);
        }
    }

    pub(crate) fn peer_disconnected(&mut self, peer: &PeerId) {
        let removed = self.registry.remove_peer(peer);
        for (_, entry) in &removed {
            self.device.unwatch(&entry.handle);
        }
        info!(
            "[{}] Peer {} disconnected, dropped {} subscriptions",
            self.device.name(),
            peer,
            removed.len()
        );
    }

    /// Drop a subscription whose peer could not be reached.
    pub(crate) fn expire(&mut self, peer: &PeerId, id: u64) {
        if let Some(entry) = self.registry.remove(peer, id) {
            self.device.unwatch(&entry.handle);
            debug!(
                "[{}] Subscription {} of peer {} on {} expired after {:?}",
                self.device.name(),
                id,
                peer,
                entry.path,
                entry.created_at.elapsed()
            );
        }
    }

    /// Decode and answer one inbound frame.
    pub(crate) fn handle_frame(&mut self, peer: &PeerId, payload: &[u8]) {
        let envelope = match codec::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("[{}] Malformed frame from {}: {}", self.device.name(), peer, e);
                let id = e.id.unwrap_or(0);
                self.reply(peer, serialize_error(id, &Error::from(e)));
                return;
            }
        };

        debug!("[{}] {} from {}", self.device.name(), envelope.kind(), peer);
        let id = envelope.id().unwrap_or(0);
        let result = match envelope {
            Envelope::Call { id, method, args } => self.call(peer, id, &method, args),
            Envelope::Get { id, param } => self.get(peer, id, &param),
            Envelope::Subscribe { id, param } => self.subscribe(peer, id, &param),
            Envelope::Unsubscribe { id } => self.unsubscribe(peer, id),
            other => Err(Error::Protocol(format!("Unexpected {} message", other.kind()))),
        };

        if let Err(e) = result {
            debug!("[{}] Request {} from {} failed: {}", self.device.name(), id, peer, e);
            let reply = match e {
                Error::Protocol(message) => serialize_error(id, &message),
                other => serialize_error(id, &other),
            };
            self.reply(peer, reply);
        }
    }

    fn reply(&self, peer: &PeerId, envelope: Envelope) {
        if let Err(e) = send_envelope(&self.sender, peer, &envelope) {
            debug!("[{}] Reply to {} dropped: {}", self.device.name(), peer, e);
        }
    }

    fn call(
        &mut self,
        peer: &PeerId,
        id: u64,
        method: &str,
        args: Option<Map<String, Value>>,
    ) -> Result<()> {
        let fname = match method.split_once('.') {
            Some((device, fname)) => {
                if device != self.device.name() {
                    return Err(Error::WrongDevice(device.to_string()));
                }
                fname
            }
            None => method,
        };

        let Some(method) = self.device.method(fname).cloned() else {
            if fname == STOP_METHOD {
                info!("[{}] Stop requested by {}", self.device.name(), peer);
                self.reply(peer, Envelope::ret(id, None));
                self.stop.send_replace(true);
                return Ok(());
            }
            return Err(Error::UnknownMethod(fname.to_string()));
        };

        let device = self.device.clone();
        let sender = self.sender.clone();
        let handlers = &mut self.handlers;
        let status = device.status();
        // The body is built inside the task: it may update the status before
        // its first await, and the sequencer is held until the spawn returns.
        status.admit(|state| -> Result<()> {
            if !method.allows(state) {
                return Err(Error::StateForbidden {
                    method: method.name().to_string(),
                    state: status.states().name(state).unwrap_or_default().to_string(),
                });
            }
            let args = method.check_args(args)?;
            handlers.spawn(run_handler(
                method.clone(),
                device.clone(),
                args,
                peer.clone(),
                id,
                sender,
            ));
            Ok(())
        })
    }

    fn get(&mut self, peer: &PeerId, id: u64, param: &str) -> Result<()> {
        let target = self.device.resolve(param)?;
        let value = self.device.snapshot(&target)?;
        self.reply(peer, Envelope::ret(id, Some(value)));
        Ok(())
    }

    fn subscribe(&mut self, peer: &PeerId, id: u64, param: &str) -> Result<()> {
        if self.registry.contains(peer, id) {
            return Err(Error::DuplicateSubscription(id));
        }
        let target = self.device.resolve(param)?;
        if !target.is_watchable() {
            return Err(Error::UnknownPath(param.to_string()));
        }

        let listener = change_listener(
            Arc::downgrade(&self.device),
            target.clone(),
            peer.clone(),
            id,
            self.sender.clone(),
            self.expired.clone(),
        );
        let sender = &self.sender;
        let handle = self.device.watch(&target, listener, |snapshot| {
            send_envelope(sender, peer, &Envelope::Value { id, val: snapshot })
        })?;

        if let Err(e) = self.registry.insert(peer, id, param, handle.clone()) {
            self.device.unwatch(&handle);
            return Err(e);
        }
        debug!("[{}] Peer {} subscribed {} to {}", self.device.name(), peer, id, param);
        Ok(())
    }

    fn unsubscribe(&mut self, peer: &PeerId, id: u64) -> Result<()> {
        let entry = self
            .registry
            .remove(peer, id)
            .ok_or(Error::UnknownSubscription(id))?;
        self.device.unwatch(&entry.handle);
        debug!(
            "[{}] Peer {} unsubscribed {} from {} after {:?}",
            self.device.name(),
            peer,
            id,
            entry.path,
            entry.created_at.elapsed()
        );
        self.reply(peer, Envelope::ret(id, None));
        Ok(())
    }

    /// Close every subscription and wait for running calls.
    ///
    /// Calls still running after `grace` are aborted.
    pub(crate) async fn shutdown(&mut self, grace: Duration) {
        for entry in self.registry.drain() {
            self.device.unwatch(&entry.handle);
        }

        let handlers = &mut self.handlers;
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = handlers.join_next().await {
                log_join(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "[{}] Aborting {} calls still running after {:?}",
                self.device.name(),
                self.handlers.len(),
                grace
            );
            self.handlers.abort_all();
            while self.handlers.join_next().await.is_some() {}
        }
    }
}

pub(crate) fn log_join(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Call handler task panicked: {}", e);
        }
    }
}

fn send_envelope(sender: &PeerSender, peer: &PeerId, envelope: &Envelope) -> Result<()> {
    match codec::encode(envelope) {
        Ok(payload) => sender.send(peer, payload),
        Err(e) => {
            warn!("[{}] Dropping {} frame: {}", peer, envelope.kind(), e);
            Ok(())
        }
    }
}

async fn run_handler(
    method: Arc<Method>,
    device: Arc<Device>,
    args: Args,
    peer: PeerId,
    id: u64,
    sender: PeerSender,
) {
    let name = method.name();
    let invoked = std::panic::catch_unwind(AssertUnwindSafe(|| method.invoke(device, args)));
    let outcome = match invoked {
        Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
        Err(payload) => Err(payload),
    };
    let reply = match outcome {
        Ok(Ok(value)) => Envelope::ret(id, value),
        Ok(Err(e)) => {
            warn!("[{}] Call {} failed: {}", peer, name, e);
            serialize_error(id, &e)
        }
        Err(payload) => {
            let message = panic_message(name, &*payload);
            error!("[{}] Call {} panicked: {}", peer, name, message);
            serialize_error(id, &Error::HandlerFailure(message))
        }
    };
    if let Err(e) = send_envelope(&sender, &peer, &reply) {
        debug!("[{}] Result of {} dropped: {}", peer, name, e);
    }
}

fn panic_message(method: &str, payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("Method {} panicked", method)
    }
}

/// Listener pushing a Value frame for subscription `id` on each change.
fn change_listener(
    device: Weak<Device>,
    target: Target,
    peer: PeerId,
    id: u64,
    sender: PeerSender,
    expired: mpsc::UnboundedSender<(PeerId, u64)>,
) -> ListenerFn {
    Arc::new(move |change: &Change| -> Result<()> {
        let val = match &target {
            Target::Attribute(_) | Target::Status => change.value.clone(),
            Target::Attributes => {
                if !change.path.starts_with("attributes.") {
                    return Ok(());
                }
                match device.upgrade() {
                    Some(device) => serde_json::to_value(device.attributes())?,
                    None => return Ok(()),
                }
            }
            Target::Device => match device.upgrade() {
                Some(device) => device.to_value()?,
                None => return Ok(()),
            },
            Target::Methods | Target::Method(_) => return Ok(()),
        };

        send_envelope(&sender, &peer, &Envelope::Value { id, val }).map_err(|e| {
            let _ = expired.send((peer.clone(), id));
            e
        })
    })
}
