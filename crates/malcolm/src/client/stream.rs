// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-request result streams and subscription handles.

use super::ClientInner;
use crate::codec::Envelope;
use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// What the reader task hands to a request's mailbox.
#[derive(Debug)]
pub(crate) enum Reply {
    Frame(Envelope),
    /// Connection torn down; carries the reason.
    Closed(String),
}

/// Frames of one request, pulled until the terminal frame.
///
/// Dropping the stream early is fine: the request stays registered until
/// the server's terminal frame arrives and late frames are discarded.
#[derive(Debug)]
pub struct RequestStream {
    id: u64,
    rx: mpsc::UnboundedReceiver<Reply>,
    done: bool,
    pub(crate) timeout: Option<Duration>,
}

impl RequestStream {
    pub(crate) fn new(id: u64, rx: mpsc::UnboundedReceiver<Reply>, timeout: Option<Duration>) -> Self {
        Self {
            id,
            rx,
            done: false,
            timeout,
        }
    }

    /// Correlation id of the request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the terminal frame has been consumed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Next value of the request.
    ///
    /// Yields each streamed Value, then the Return's value if it has one,
    /// then `None`. An Error frame yields [`Error::Remote`] and ends the
    /// stream. A timeout yields [`Error::Timeout`] but leaves the stream
    /// usable.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        if self.done {
            return None;
        }

        let reply = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.rx.recv()).await {
                Ok(reply) => reply,
                Err(_) => {
                    return Some(Err(Error::Timeout(format!("reply to request {}", self.id))));
                }
            },
            None => self.rx.recv().await,
        };

        match reply {
            Some(Reply::Frame(Envelope::Value { val, .. })) => Some(Ok(val)),
            Some(Reply::Frame(Envelope::Return { val, .. })) => {
                self.done = true;
                val.map(Ok)
            }
            Some(Reply::Frame(Envelope::Error { message, .. })) => {
                self.done = true;
                Some(Err(Error::Remote(message)))
            }
            Some(Reply::Frame(other)) => {
                self.done = true;
                Some(Err(Error::Protocol(format!(
                    "Unexpected {} reply to request {}",
                    other.kind(),
                    self.id
                ))))
            }
            Some(Reply::Closed(reason)) => {
                self.done = true;
                Some(Err(Error::TransportDead(reason)))
            }
            None => {
                self.done = true;
                Some(Err(Error::TransportDead("connection closed".into())))
            }
        }
    }

    /// Drain the stream, returning every value.
    pub async fn collect(mut self) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        while let Some(item) = self.next().await {
            values.push(item?);
        }
        Ok(values)
    }
}

/// Live subscription created by [`Client::subscribe`](super::Client::subscribe).
///
/// Dropping the handle without [`unsubscribe`](Self::unsubscribe) still
/// asks the server to stop, but does not wait for it.
pub struct Subscription {
    id: u64,
    inner: Arc<ClientInner>,
    task: Option<JoinHandle<Result<()>>>,
}

impl Subscription {
    pub(crate) fn new(id: u64, inner: Arc<ClientInner>, task: JoinHandle<Result<()>>) -> Self {
        Self {
            id,
            inner,
            task: Some(task),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the consumer task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Send Unsubscribe and wait for the server's Return.
    ///
    /// Fails with the error that ended the subscription, if any.
    pub async fn unsubscribe(mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        if !task.is_finished() {
            self.inner.send(&Envelope::Unsubscribe { id: self.id })?;
        }

        let joined = match self.inner.config.request_timeout() {
            Some(limit) => {
                let abort = task.abort_handle();
                match tokio::time::timeout(limit, task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        abort.abort();
                        return Err(Error::Timeout(format!("unsubscribe of {}", self.id)));
                    }
                }
            }
            None => task.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) => Err(Error::HandlerFailure(format!(
                "Subscription {} callback failed: {}",
                self.id, e
            ))),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!("[{}] Dropping subscription {}", self.inner.device, self.id);
                let _ = self.inner.send(&Envelope::Unsubscribe { id: self.id });
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("device", &self.inner.device)
            .field("finished", &self.is_finished())
            .finish()
    }
}
