// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client runtime.
//!
//! Each request gets the next id and a private mailbox in the pending
//! table. One reader task routes inbound frames to mailboxes by id and
//! removes the entry when the terminal Return or Error arrives.
//!
//! # Example
//!
//! ```no_run
//! use malcolm::client::{Client, ClientConfig};
//! use serde_json::{json, Map};
//!
//! # async fn demo() -> malcolm::Result<()> {
//! let client = Client::connect("tcp://127.0.0.1:5600", "det", ClientConfig::default()).await?;
//! let status = client.get("status").await?;
//! println!("{}", status["state"]["index"]);
//!
//! let mut args = Map::new();
//! args.insert("nframes".into(), json!(5));
//! args.insert("exposure".into(), json!(0.1));
//! client.call("configure", args).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod stream;

pub use config::ClientConfig;
pub use stream::{RequestStream, Subscription};

use crate::codec::{self, Envelope};
use crate::error::{Error, Result};
use crate::transport::{ClientEndpoint, Endpoint, EndpointCloser};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use stream::Reply;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// State shared by the client, its reader task and its subscriptions.
pub(crate) struct ClientInner {
    pub(crate) device: String,
    pub(crate) config: ClientConfig,
    next_id: AtomicU64,
    pending: DashMap<u64, mpsc::UnboundedSender<Reply>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
    closer: EndpointCloser,
}

impl ClientInner {
    pub(crate) fn send(&self, envelope: &Envelope) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::TransportDead("client closed".into()));
        }
        let payload = codec::encode(envelope)?;
        self.outbound
            .send(payload)
            .map_err(|_| Error::TransportDead("connection closed".into()))
    }

    /// Allocate an id, install its mailbox and send the request.
    fn start(&self, request: impl FnOnce(u64) -> Envelope) -> Result<RequestStream> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::TransportDead("client closed".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.insert(id, tx);

        // A teardown racing with the insert has already drained the table.
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(Error::TransportDead("client closed".into()));
        }

        if let Err(e) = self.send(&request(id)) {
            self.pending.remove(&id);
            return Err(e);
        }
        Ok(RequestStream::new(id, rx, self.config.request_timeout()))
    }

    /// Deliver a frame to its mailbox. Unknown ids are a protocol error.
    fn route(&self, id: u64, envelope: Envelope) -> Result<()> {
        let kind = envelope.kind();
        let mailbox = if envelope.is_terminal() {
            self.pending.remove(&id).map(|(_, tx)| tx)
        } else {
            self.pending.get(&id).map(|entry| entry.value().clone())
        };
        match mailbox {
            Some(tx) => {
                if tx.send(Reply::Frame(envelope)).is_err() {
                    debug!("[{}] Discarding {} for abandoned request {}", self.device, kind, id);
                }
                Ok(())
            }
            None => Err(Error::Protocol(format!("{} for unknown request {}", kind, id))),
        }
    }

    /// Fail every pending request and close the connection.
    fn teardown(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Reply::Closed(reason.to_string()));
            }
        }
        self.closer.close();
    }

    fn qualify(&self, path: &str) -> String {
        if path == self.device || path.starts_with(&format!("{}.", self.device)) {
            path.to_string()
        } else {
            format!("{}.{}", self.device, path)
        }
    }
}

/// Connection to one device on a Malcolm server.
///
/// Dropping the client closes the connection.
pub struct Client {
    inner: Arc<ClientInner>,
    reader: JoinHandle<()>,
}

impl Client {
    /// Connect to `endpoint` and wait for `device` to announce itself.
    pub async fn connect(endpoint: &str, device: &str, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = Endpoint::parse(endpoint)?
            .connect(config.max_message_size)
            .await?;
        Self::with_transport(transport, device, config).await
    }

    /// Wait for the Ready greeting on an already open connection.
    pub async fn with_transport(
        transport: ClientEndpoint,
        device: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        let (outbound, mut inbound, closer) = transport.split();

        let greeting = tokio::time::timeout(config.ready_timeout(), inbound.recv())
            .await
            .map_err(|_| Error::Timeout(format!("Ready from {}", device)))?
            .ok_or_else(|| Error::TransportDead("connection closed before Ready".into()))?;
        match codec::decode(&greeting)? {
            Envelope::Ready { device: name } if name == device => {}
            Envelope::Ready { device: name } => return Err(Error::WrongDevice(name)),
            other => {
                return Err(Error::Protocol(format!(
                    "Expected Ready, got {}",
                    other.kind()
                )))
            }
        }
        info!("[{}] Connected", device);

        let inner = Arc::new(ClientInner {
            device: device.to_string(),
            config,
            next_id: AtomicU64::new(0),
            pending: DashMap::new(),
            outbound,
            closed: AtomicBool::new(false),
            closer,
        });
        let reader = tokio::spawn(read_loop(inner.clone(), inbound));
        Ok(Self { inner, reader })
    }

    pub fn device(&self) -> &str {
        &self.inner.device
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of requests still waiting for their terminal frame.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Issue a Get for `param` as given.
    pub fn request_get(&self, param: &str) -> Result<RequestStream> {
        self.inner.start(|id| Envelope::Get {
            id,
            param: param.to_string(),
        })
    }

    /// Issue a Call. `method` without a `device.` prefix gets this client's device.
    pub fn request_call(&self, method: &str, args: Map<String, Value>) -> Result<RequestStream> {
        let method = if method.contains('.') {
            method.to_string()
        } else {
            format!("{}.{}", self.inner.device, method)
        };
        self.inner.start(|id| Envelope::call(id, method, args))
    }

    /// Issue a Subscribe for `param` as given.
    pub fn request_subscribe(&self, param: &str) -> Result<RequestStream> {
        self.inner.start(|id| Envelope::Subscribe {
            id,
            param: param.to_string(),
        })
    }

    /// Read one entity. `param` is relative to the device unless it
    /// already names it.
    pub async fn get(&self, param: &str) -> Result<Value> {
        let param = self.inner.qualify(param);
        let mut values = self.request_get(&param)?.collect().await?;
        match values.len() {
            1 => Ok(values.remove(0)),
            n => Err(Error::Protocol(format!(
                "Expected exactly one value for {}, got {}",
                param, n
            ))),
        }
    }

    /// Call a method and return its last value, if any.
    pub async fn call(&self, method: &str, args: Map<String, Value>) -> Result<Option<Value>> {
        let values = self.request_call(method, args)?.collect().await?;
        Ok(values.into_iter().last())
    }

    /// Subscribe to `path` and feed every value, starting with the current
    /// one, to `callback` on a dedicated task.
    pub async fn subscribe<F>(&self, path: &str, mut callback: F) -> Result<Subscription>
    where
        F: FnMut(Value) + Send + 'static,
    {
        let path = self.inner.qualify(path);
        let mut stream = self.request_subscribe(&path)?;
        let id = stream.id();
        let first = match stream.next().await {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                // A timed-out request is still live on the server.
                if !stream.is_done() {
                    debug!("[{}] Cancelling subscription {}: {}", self.inner.device, id, e);
                    let _ = self.inner.send(&Envelope::Unsubscribe { id });
                }
                return Err(e);
            }
            None => {
                return Err(Error::Protocol(format!(
                    "Subscription to {} ended before its first value",
                    path
                )))
            }
        };
        stream.timeout = None;

        let task = tokio::spawn(async move {
            callback(first);
            while let Some(item) = stream.next().await {
                callback(item?);
            }
            Ok::<(), Error>(())
        });
        Ok(Subscription::new(id, self.inner.clone(), task))
    }

    /// Close the connection. Pending requests fail with `TransportDead`.
    pub fn close(&self) {
        self.inner.teardown("client closed");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.inner.teardown("client dropped");
        self.reader.abort();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("device", &self.inner.device)
            .field("pending", &self.inner.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn read_loop(inner: Arc<ClientInner>, mut inbound: mpsc::UnboundedReceiver<Vec<u8>>) {
    let reason = loop {
        let Some(payload) = inbound.recv().await else {
            break "connection closed".to_string();
        };
        let envelope = match codec::decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("[{}] Closing connection: {}", inner.device, e);
                break e.to_string();
            }
        };
        let Some(id) = envelope.id() else {
            debug!("[{}] Ignoring repeated {}", inner.device, envelope.kind());
            continue;
        };
        if let Err(e) = inner.route(id, envelope) {
            error!("[{}] Closing connection: {}", inner.device, e);
            break e.to_string();
        }
    };
    inner.teardown(&reason);
    debug!("[{}] Reader stopped: {}", inner.device, reason);
}
