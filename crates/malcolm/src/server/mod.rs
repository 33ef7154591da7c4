// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server runtime hosting one device.
//!
//! A single loop owns the device's subscription registry and processes
//! transport events in arrival order. Method bodies run as separate tasks,
//! so a slow call never holds up Gets, Subscribes or other calls.

pub mod config;
mod dispatch;
mod registry;

pub use config::ServerConfig;
pub use dispatch::STOP_METHOD;
pub use registry::{SubscriptionEntry, SubscriptionRegistry};

use crate::error::Result;
use crate::model::Device;
use crate::transport::{ServerEndpoint, TransportEvent};
use dispatch::{log_join, Dispatcher};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Malcolm server for one device.
pub struct Server {
    device: Arc<Device>,
    endpoint: ServerEndpoint,
    config: ServerConfig,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Server {
    /// Bind `config.endpoint` and prepare to serve `device`.
    pub async fn bind(device: Arc<Device>, config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config
            .parsed_endpoint()?
            .listen(config.max_message_size)
            .await?;
        Ok(Self::with_transport(device, endpoint, config))
    }

    /// Serve `device` on an already bound endpoint.
    pub fn with_transport(device: Arc<Device>, endpoint: ServerEndpoint, config: ServerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            device,
            endpoint,
            config,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Handle that stops [`serve`](Self::serve) from another task.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Run until stopped by [`ServerHandle::stop`], a remote `stop` call or
    /// the transport closing.
    pub async fn serve(self) -> Result<()> {
        let Server {
            device,
            mut endpoint,
            config,
            shutdown,
        } = self;

        let mut stop = shutdown.subscribe();
        let (expired_tx, mut expired_rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher::new(device.clone(), endpoint.sender(), expired_tx, shutdown);

        info!("[{}] Serving device", device.name());

        while !*stop.borrow() {
            tokio::select! {
                event = endpoint.recv() => {
                    match event {
                        Some(TransportEvent::Connected(peer)) => dispatcher.peer_connected(&peer),
                        Some(TransportEvent::Message(peer, payload)) => {
                            dispatcher.handle_frame(&peer, &payload)
                        }
                        Some(TransportEvent::Disconnected(peer)) => dispatcher.peer_disconnected(&peer),
                        None => {
                            warn!("[{}] Transport closed", device.name());
                            break;
                        }
                    }
                }
                Some((peer, id)) = expired_rx.recv() => dispatcher.expire(&peer, id),
                Some(result) = dispatcher.handlers.join_next(), if !dispatcher.handlers.is_empty() => {
                    log_join(result);
                }
                _ = stop.changed() => {
                    debug!("[{}] Shutdown signal received", device.name());
                }
            }
        }

        info!(
            "[{}] Stopping: {} peers, {} subscriptions, {} calls in flight",
            device.name(),
            endpoint.peer_count(),
            dispatcher.subscription_count(),
            dispatcher.handlers.len()
        );
        dispatcher.shutdown(config.shutdown_grace()).await;
        endpoint.close();
        info!("[{}] Server stopped", device.name());
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("device", &self.device.name())
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish()
    }
}

/// Stops a running [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}
