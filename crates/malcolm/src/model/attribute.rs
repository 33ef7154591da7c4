// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed, timestamped device attributes.

use super::listener::{Change, ListenerFn, ListenerId, Listeners};
use super::{Alarm, TimeStamp, VType};
use crate::codec::wire::AttributeWire;
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Current reading of an attribute.
#[derive(Debug, Clone)]
struct Reading {
    value: Value,
    alarm: Alarm,
    time_stamp: TimeStamp,
}

/// A typed value with alarm and timestamp metadata.
///
/// Writes go through [`Attribute::update`], which holds the attribute's
/// sequencing lock across the field write and the listener notification.
/// Two updates therefore notify in the order their writes happened.
pub struct Attribute {
    name: String,
    typ: VType,
    descriptor: String,
    tags: RwLock<Vec<String>>,
    reading: RwLock<Reading>,
    sequencer: Mutex<()>,
    listeners: Listeners,
}

impl Attribute {
    /// Create an unnamed attribute with no value.
    pub fn new(typ: VType, descriptor: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            typ,
            descriptor: descriptor.into(),
            tags: RwLock::new(Vec::new()),
            reading: RwLock::new(Reading {
                value: Value::Null,
                alarm: Alarm::default(),
                time_stamp: TimeStamp::now(),
            }),
            sequencer: Mutex::new(()),
            listeners: Listeners::new(),
        }
    }

    /// Set the initial value, checked against the type.
    pub fn with_value(self, value: impl Into<Value>) -> Result<Self> {
        let value = self.typ.validate(&value.into())?;
        self.reading.write().value = value;
        Ok(self)
    }

    /// Add free-form tags.
    pub fn with_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.write().extend(tags.into_iter().map(Into::into));
        self
    }

    /// Name assigned by the owning container; empty until added.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn assign_name(&mut self, name: &str) -> Result<()> {
        if !self.name.is_empty() {
            return Err(Error::Config(format!(
                "Attribute {} is already named, cannot rename to {}",
                self.name, name
            )));
        }
        self.name = name.to_string();
        Ok(())
    }

    pub fn typ(&self) -> &VType {
        &self.typ
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.read().clone()
    }

    pub(crate) fn add_tag(&self, tag: &str) {
        let mut tags = self.tags.write();
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    pub fn value(&self) -> Value {
        self.reading.read().value.clone()
    }

    pub fn alarm(&self) -> Alarm {
        self.reading.read().alarm.clone()
    }

    pub fn time_stamp(&self) -> TimeStamp {
        self.reading.read().time_stamp
    }

    /// Update value, alarm and timestamp, then notify listeners once.
    ///
    /// A missing alarm resets to the default alarm; a missing timestamp
    /// uses the current time.
    pub fn update(
        &self,
        value: impl Into<Value>,
        alarm: Option<Alarm>,
        time_stamp: Option<TimeStamp>,
    ) -> Result<()> {
        let value = self
            .typ
            .validate(&value.into())
            .map_err(|e| Error::TypeMismatch(format!("{}: {}", self.name, e)))?;

        let _sequence = self.sequencer.lock();
        {
            let mut reading = self.reading.write();
            reading.value = value;
            reading.alarm = alarm.unwrap_or_default();
            reading.time_stamp = time_stamp.unwrap_or_else(TimeStamp::now);
        }
        let change = Change::new(self.name.clone(), serde_json::to_value(self)?);
        self.listeners.notify(&self.name, &change);
        Ok(())
    }

    /// Shorthand for an update with default alarm and the current time.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.update(value, None, None)
    }

    pub fn add_listener(&self, callback: ListenerFn) -> Result<ListenerId> {
        let _sequence = self.sequencer.lock();
        self.listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let _sequence = self.sequencer.lock();
        self.listeners.remove(id)
    }

    /// Register `callback` and hand the current serialized value to
    /// `snapshot` before any update can notify it.
    pub(crate) fn watch<F>(&self, callback: ListenerFn, snapshot: F) -> Result<ListenerId>
    where
        F: FnOnce(Value) -> Result<()>,
    {
        let _sequence = self.sequencer.lock();
        let current = serde_json::to_value(self)?;
        let id = self.listeners.add(callback)?;
        if let Err(e) = snapshot(current) {
            self.listeners.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let tags = self.tags.read();
        let reading = self.reading.read();
        AttributeWire {
            value: &reading.value,
            typ: &self.typ,
            tags: &tags,
            descriptor: &self.descriptor,
            alarm: Some(&reading.alarm),
            time_stamp: Some(&reading.time_stamp),
        }
        .serialize(serializer)
    }
}

impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("typ", &self.typ)
            .field("value", &self.reading.read().value)
            .finish()
    }
}
