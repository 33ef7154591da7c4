// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device model: typed attributes, state-gated methods and status.
//!
//! Everything a server hosts is built from these pieces. Attributes and
//! status notify their listeners after every write; the device forwards
//! those notifications so a single listener can observe the whole device.

mod alarm;
mod attribute;
mod attributes;
mod device;
mod listener;
mod method;
mod state;
mod status;
mod timestamp;
mod vtype;

pub use alarm::{Alarm, AlarmSeverity, AlarmStatus};
pub use attribute::Attribute;
pub use attributes::Attributes;
pub use device::{Device, DeviceBuilder, Target, WatchHandle};
pub use listener::{Change, ListenerFn, ListenerId, Listeners};
pub use method::{
    ArgDescriptor, Args, Method, MethodBuilder, MethodFuture, MethodResult, REQUIRED_TAG,
};
pub use state::{DState, StateName, States};
pub use status::Status;
pub use timestamp::TimeStamp;
pub use vtype::VType;
