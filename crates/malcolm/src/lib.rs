// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Malcolm remote device control
//!
//! Hosts a named device (typed attributes, state-gated methods and live
//! status) behind a multiplexed request/response/stream protocol, and
//! provides the matching client.
//!
//! # Features
//!
//! - **Device model**: attributes, status and methods with change listeners
//! - **Server runtime**: state-gated calls run concurrently, subscriptions fan out changes
//! - **Client runtime**: correlated requests, streamed results, subscriptions
//! - **Transports**: length-prefixed TCP and an in-process hub
//!
//! # Quick Start
//!
//! ```no_run
//! use malcolm::model::{Attribute, DState, Device, Method, VType};
//! use malcolm::server::{Server, ServerConfig};
//!
//! # async fn demo() -> malcolm::Result<()> {
//! let device = Device::builder("det", DState::states())
//!     .initial_state(&DState::Idle)
//!     .attribute("exposure", Attribute::new(VType::Float, "Exposure time"))
//!     .method(
//!         Method::builder("configure", |device, args| async move {
//!             if let Some(exposure) = device.attribute("exposure") {
//!                 exposure.set(args.f64("exposure")?)?;
//!             }
//!             device.status().transition(&DState::Ready, "Configured")?;
//!             Ok::<_, malcolm::Error>(None)
//!         })
//!         .valid_states(DState::configurable())
//!         .arg("exposure"),
//!     )
//!     .build()?;
//!
//! let server = Server::bind(device, ServerConfig::default()).await?;
//! server.serve().await
//! # }
//! ```
//!
//! # Wire Format
//!
//! ```text
//! -> {"type":"Call","id":0,"method":"det.configure","args":{"exposure":0.1}}
//! <- {"type":"Return","id":0}
//! -> {"type":"Subscribe","id":1,"param":"det.status"}
//! <- {"type":"Value","id":1,"val":{"message":"Configured","state":{...},"timeStamp":{...}}}
//! ```

pub mod client;
pub mod codec;
pub mod error;
pub mod model;
pub mod server;
pub mod transport;

pub use client::{Client, ClientConfig, RequestStream, Subscription};
pub use codec::{serialize_error, Envelope};
pub use error::{Error, Result};
pub use model::{
    Alarm, Attribute, DState, Device, DeviceBuilder, Method, MethodBuilder, States, Status,
    TimeStamp, VType,
};
pub use server::{Server, ServerConfig, ServerHandle};
pub use transport::{Endpoint, MemoryHub};
