// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The hosted device: attributes, methods and status under one name.

use super::listener::{Change, ListenerFn, ListenerId, Listeners};
use super::method::ArgDescriptor;
use super::{Attribute, Attributes, Method, MethodBuilder, StateName, States, Status};
use crate::codec::wire::DeviceWire;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// What a Get/Subscribe path refers to.
#[derive(Debug, Clone)]
pub enum Target {
    Device,
    Status,
    Attributes,
    Attribute(Arc<Attribute>),
    Methods,
    Method(Arc<Method>),
}

impl Target {
    /// Whether changes to this target can be watched.
    pub fn is_watchable(&self) -> bool {
        !matches!(self, Target::Methods | Target::Method(_))
    }
}

#[derive(Debug, Clone)]
enum WatchPoint {
    Device,
    Status,
    Attribute(Arc<Attribute>),
}

/// Registration made by [`Device::watch`].
#[derive(Debug, Clone)]
pub struct WatchHandle {
    point: WatchPoint,
    id: ListenerId,
}

/// A named bundle of attributes, methods and status.
///
/// Attribute and status changes are forwarded to device-level listeners
/// with paths `attributes.<name>` and `status`.
pub struct Device {
    name: String,
    attributes: Attributes,
    methods: Vec<Arc<Method>>,
    method_index: HashMap<String, usize>,
    status: Status,
    sequencer: Mutex<()>,
    listeners: Listeners,
}

impl Device {
    /// Start declaring a device with the given state set.
    pub fn builder(name: impl Into<String>, states: States) -> DeviceBuilder {
        DeviceBuilder {
            name: name.into(),
            states,
            initial: None,
            attributes: Attributes::new(),
            methods: Vec::new(),
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Arc<Attribute>> {
        self.attributes.get(name)
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&Arc<Method>> {
        self.method_index.get(name).map(|&i| &self.methods[i])
    }

    /// Listen to every attribute and status change on the device.
    pub fn add_listener(&self, callback: ListenerFn) -> Result<ListenerId> {
        let _sequence = self.sequencer.lock();
        self.listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let _sequence = self.sequencer.lock();
        self.listeners.remove(id)
    }

    fn forward(&self, change: Change) {
        let _sequence = self.sequencer.lock();
        self.listeners.notify(&self.name, &change);
    }

    /// Resolve a Get/Subscribe path.
    ///
    /// Accepts `<device>`, and with or without the `<device>.` prefix:
    /// `status`, `attributes`, `attributes.<attr>`, `methods`,
    /// `methods.<method>` and the bare `<attr>` shorthand. `status` wins
    /// over an attribute of the same name.
    pub fn resolve(&self, path: &str) -> Result<Target> {
        if path == self.name {
            return Ok(Target::Device);
        }
        let rest = path
            .strip_prefix(self.name.as_str())
            .and_then(|r| r.strip_prefix('.'))
            .unwrap_or(path);

        let target = match rest {
            "status" => Some(Target::Status),
            "attributes" => Some(Target::Attributes),
            "methods" => Some(Target::Methods),
            _ => {
                if let Some(attr) = rest.strip_prefix("attributes.") {
                    self.attribute(attr).cloned().map(Target::Attribute)
                } else if let Some(method) = rest.strip_prefix("methods.") {
                    self.method(method).cloned().map(Target::Method)
                } else {
                    self.attribute(rest).cloned().map(Target::Attribute)
                }
            }
        };
        target.ok_or_else(|| Error::UnknownPath(path.to_string()))
    }

    /// Serialized value of `target`.
    pub fn snapshot(&self, target: &Target) -> Result<Value> {
        let value = match target {
            Target::Device => serde_json::to_value(self)?,
            Target::Status => serde_json::to_value(&self.status)?,
            Target::Attributes => serde_json::to_value(&self.attributes)?,
            Target::Attribute(attr) => serde_json::to_value(attr.as_ref())?,
            Target::Methods => serde_json::to_value(MethodsMap(&self.methods))?,
            Target::Method(method) => serde_json::to_value(method.as_ref())?,
        };
        Ok(value)
    }

    /// Install `callback` on `target` and pass the current value to
    /// `snapshot` while updates to the target are held off.
    ///
    /// `Device` and `Attributes` targets listen at device level and see
    /// every forwarded change.
    pub fn watch<F>(&self, target: &Target, callback: ListenerFn, snapshot: F) -> Result<WatchHandle>
    where
        F: FnOnce(Value) -> Result<()>,
    {
        match target {
            Target::Attribute(attr) => {
                let id = attr.watch(callback, snapshot)?;
                Ok(WatchHandle {
                    point: WatchPoint::Attribute(attr.clone()),
                    id,
                })
            }
            Target::Status => {
                let id = self.status.watch(callback, snapshot)?;
                Ok(WatchHandle {
                    point: WatchPoint::Status,
                    id,
                })
            }
            Target::Device | Target::Attributes => {
                let _sequence = self.sequencer.lock();
                let current = self.snapshot(target)?;
                let id = self.listeners.add(callback)?;
                if let Err(e) = snapshot(current) {
                    self.listeners.remove(id);
                    return Err(e);
                }
                Ok(WatchHandle {
                    point: WatchPoint::Device,
                    id,
                })
            }
            Target::Methods | Target::Method(_) => Err(Error::UnknownPath(format!(
                "{}.methods is not subscribable",
                self.name
            ))),
        }
    }

    /// Remove a watch. Once this returns, the callback will not run again.
    pub fn unwatch(&self, handle: &WatchHandle) -> bool {
        match &handle.point {
            WatchPoint::Attribute(attr) => attr.remove_listener(handle.id),
            WatchPoint::Status => self.status.remove_listener(handle.id),
            WatchPoint::Device => self.remove_listener(handle.id),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

struct MethodsMap<'a>(&'a [Arc<Method>]);

impl Serialize for MethodsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for method in self.0 {
            map.serialize_entry(method.name(), method.as_ref())?;
        }
        map.end()
    }
}

impl Serialize for Device {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        DeviceWire {
            methods: MethodsMap(&self.methods),
            status: &self.status,
            attributes: &self.attributes,
        }
        .serialize(serializer)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("attributes", &self.attributes.names().collect::<Vec<_>>())
            .field(
                "methods",
                &self.methods.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("status", &self.status)
            .finish()
    }
}

/// Declares a [`Device`].
///
/// Errors from individual declarations are reported by [`build`](Self::build).
pub struct DeviceBuilder {
    name: String,
    states: States,
    initial: Option<String>,
    attributes: Attributes,
    methods: Vec<MethodBuilder>,
    error: Option<Error>,
}

impl DeviceBuilder {
    pub fn attribute(mut self, name: &str, attribute: Attribute) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.attributes.add(name, attribute) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Initial state; defaults to the first declared state.
    pub fn initial_state<S: StateName + ?Sized>(mut self, state: &S) -> Self {
        self.initial = Some(state.state_name().to_string());
        self
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Result<Arc<Device>> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.name.is_empty() || self.name.contains('.') {
            return Err(Error::Config(format!(
                "Invalid device name {:?}",
                self.name
            )));
        }

        let status = match &self.initial {
            Some(initial) => Status::new(self.states.clone(), initial.as_str())?,
            None => {
                let first = self.states.name(0).unwrap_or_default().to_string();
                Status::new(self.states.clone(), first.as_str())?
            }
        };

        let mut own_args: HashMap<String, Vec<ArgDescriptor>> = HashMap::new();
        for builder in &self.methods {
            if own_args.contains_key(builder.name()) {
                return Err(Error::Config(format!("Duplicate method {}", builder.name())));
            }
            own_args.insert(builder.name().to_string(), builder.own_args(&self.attributes)?);
        }

        let mut methods = Vec::with_capacity(self.methods.len());
        let mut method_index = HashMap::new();
        for builder in self.methods {
            let method = builder.finish(&self.states, &own_args)?;
            method_index.insert(method.name().to_string(), methods.len());
            methods.push(Arc::new(method));
        }

        let device = Arc::new(Device {
            name: self.name,
            attributes: self.attributes,
            methods,
            method_index,
            status,
            sequencer: Mutex::new(()),
            listeners: Listeners::new(),
        });

        for attribute in device.attributes.iter() {
            attribute.add_listener(forwarder(
                Arc::downgrade(&device),
                format!("attributes.{}", attribute.name()),
            ))?;
        }
        device
            .status
            .add_listener(forwarder(Arc::downgrade(&device), "status".to_string()))?;

        Ok(device)
    }
}

fn forwarder(device: Weak<Device>, path: String) -> ListenerFn {
    Arc::new(move |change: &Change| -> Result<()> {
        if let Some(device) = device.upgrade() {
            device.forward(Change::new(path.clone(), change.value.clone()));
        }
        Ok(())
    })
}
