// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device status: current state, message, progress and timestamp.

use super::listener::{Change, ListenerFn, ListenerId, Listeners};
use super::state::{StateName, States};
use super::TimeStamp;
use crate::codec::wire::{StateWire, StatusWire};
use crate::error::Result;
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone)]
struct StatusFields {
    state: usize,
    message: String,
    percent: Option<f64>,
    time_stamp: TimeStamp,
}

/// Live status of a device.
///
/// Shares the single-writer discipline of attributes: the sequencing lock
/// is held from the field write through listener notification. The server
/// also takes it while admitting a call, so no state change can land
/// between the admission check and the spawn of the handler.
pub struct Status {
    states: States,
    fields: RwLock<StatusFields>,
    sequencer: Mutex<()>,
    listeners: Listeners,
}

impl Status {
    pub fn new<S: StateName + ?Sized>(states: States, initial: &S) -> Result<Self> {
        let state = states.index_of(initial)?;
        Ok(Self {
            states,
            fields: RwLock::new(StatusFields {
                state,
                message: String::new(),
                percent: None,
                time_stamp: TimeStamp::now(),
            }),
            sequencer: Mutex::new(()),
            listeners: Listeners::new(),
        })
    }

    pub fn states(&self) -> &States {
        &self.states
    }

    /// Index of the current state.
    pub fn state_index(&self) -> usize {
        self.fields.read().state
    }

    /// Name of the current state.
    pub fn state(&self) -> String {
        let index = self.state_index();
        self.states.name(index).unwrap_or_default().to_string()
    }

    pub fn message(&self) -> String {
        self.fields.read().message.clone()
    }

    pub fn percent(&self) -> Option<f64> {
        self.fields.read().percent
    }

    pub fn time_stamp(&self) -> TimeStamp {
        self.fields.read().time_stamp
    }

    /// Update the status and notify listeners.
    ///
    /// `state`, when given, must be one of the declared states. The state is
    /// left unchanged when `None`.
    pub fn update(
        &self,
        message: impl Into<String>,
        percent: Option<f64>,
        state: Option<&str>,
        time_stamp: Option<TimeStamp>,
    ) -> Result<()> {
        let state = state.map(|s| self.states.index_of(s)).transpose()?;

        let _sequence = self.sequencer.lock();
        {
            let mut fields = self.fields.write();
            if let Some(state) = state {
                fields.state = state;
            }
            fields.message = message.into();
            fields.percent = percent;
            fields.time_stamp = time_stamp.unwrap_or_else(TimeStamp::now);
        }
        let change = Change::new("status", serde_json::to_value(self)?);
        self.listeners.notify("status", &change);
        Ok(())
    }

    /// Move to `state` with `message`, clearing progress.
    pub fn transition<S: StateName + ?Sized>(
        &self,
        state: &S,
        message: impl Into<String>,
    ) -> Result<()> {
        self.update(message, None, Some(state.state_name()), None)
    }

    /// Report progress without changing state.
    pub fn progress(&self, message: impl Into<String>, percent: f64) -> Result<()> {
        self.update(message, Some(percent), None, None)
    }

    pub fn add_listener(&self, callback: ListenerFn) -> Result<ListenerId> {
        let _sequence = self.sequencer.lock();
        self.listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let _sequence = self.sequencer.lock();
        self.listeners.remove(id)
    }

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

    /// Run `f` with the current state index while no update can proceed.
    pub(crate) fn admit<R>(&self, f: impl FnOnce(usize) -> R) -> R {
        let _sequence = self.sequencer.lock();
        let state = self.fields.read().state;
        f(state)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = self.fields.read();
        StatusWire {
            message: &fields.message,
            state: StateWire {
                index: fields.state,
                choices: self.states.choices(),
            },
            percent: fields.percent,
            time_stamp: &fields.time_stamp,
        }
        .serialize(serializer)
    }
}

impl std::fmt::Debug for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields = self.fields.read();
        f.debug_struct("Status")
            .field("state", &self.states.name(fields.state))
            .field("message", &fields.message)
            .field("percent", &fields.percent)
            .finish()
    }
}
