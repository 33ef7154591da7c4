// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures: a zebra position-capture device served over the
//! in-process transport.

#![allow(dead_code)]

use malcolm::model::{Attribute, DState, Device, DeviceBuilder, Method, VType};
use malcolm::server::{Server, ServerConfig, ServerHandle};
use malcolm::transport::{ClientEndpoint, MemoryHub};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

/// Zebra device in Idle, without extra methods.
pub fn zebra_builder() -> DeviceBuilder {
    Device::builder("zebra1", DState::states())
        .initial_state(&DState::Idle)
        .attribute(
            "PC_BIT_CAP",
            Attribute::new(VType::Int, "Which encoders to capture"),
        )
        .attribute(
            "PC_TSPRE",
            Attribute::new(VType::Str, "What time units for capture"),
        )
        .attribute("CONNECTED", Attribute::new(VType::Int, "Is zebra connected"))
        .method(
            Method::builder("configure", |device, args| async move {
                if let Some(attr) = device.attribute("PC_BIT_CAP") {
                    attr.set(args.i64("PC_BIT_CAP")?)?;
                }
                if let Some(attr) = device.attribute("PC_TSPRE") {
                    attr.set(args.str("PC_TSPRE")?)?;
                }
                device
                    .status()
                    .transition(&DState::Configuring, "Configuring started")?;
                Ok::<_, malcolm::Error>(None)
            })
            .descriptor("Configure the device")
            .valid_states(DState::configurable())
            .arg("PC_BIT_CAP")
            .arg_default("PC_TSPRE", "ms"),
        )
        .method(
            Method::builder("run", |device, _args| async move {
                device.status().transition(&DState::Running, "Running")?;
                Ok::<_, malcolm::Error>(None)
            })
            .descriptor("Start a scan running")
            .valid_states(DState::runnable()),
        )
}

pub fn zebra() -> Arc<Device> {
    zebra_builder().build().unwrap()
}

/// A device served over a fresh memory hub.
pub struct Served {
    pub device: Arc<Device>,
    pub hub: MemoryHub,
    pub handle: ServerHandle,
    pub task: JoinHandle<malcolm::Result<()>>,
}

pub fn serve(device: Arc<Device>) -> Served {
    serve_with(device, ServerConfig::default())
}

pub fn serve_with(device: Arc<Device>, config: ServerConfig) -> Served {
    let (hub, endpoint) = MemoryHub::new();
    let server = Server::with_transport(device.clone(), endpoint, config);
    let handle = server.handle();
    let task = tokio::spawn(server.serve());
    Served {
        device,
        hub,
        handle,
        task,
    }
}

/// Peer speaking raw JSON frames.
pub struct RawPeer {
    endpoint: ClientEndpoint,
}

impl RawPeer {
    pub fn connect(hub: &MemoryHub) -> Self {
        Self {
            endpoint: hub.connect().unwrap(),
        }
    }

    pub fn send(&self, frame: &str) {
        self.endpoint.send(frame.as_bytes().to_vec()).unwrap();
    }

    pub async fn recv_raw(&mut self) -> String {
        let bytes = tokio::time::timeout(WAIT, self.endpoint.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed");
        String::from_utf8(bytes).unwrap()
    }

    pub async fn recv(&mut self) -> Value {
        serde_json::from_str(&self.recv_raw().await).unwrap()
    }

    /// Consume the Ready greeting.
    pub async fn ready(mut self) -> Self {
        let ready = self.recv().await;
        assert_eq!(ready["type"], "Ready");
        self
    }

    /// Nothing arrives within `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(frame) = tokio::time::timeout(window, self.endpoint.recv()).await {
            panic!("Unexpected frame: {:?}", frame.map(String::from_utf8));
        }
    }
}
