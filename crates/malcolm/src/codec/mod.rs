// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Malcolm wire protocol.
//!
//! Every frame is one JSON object tagged by `type`. All requests carry an
//! `id` chosen by the requester, and every reply echoes it.
//!
//! ```text
//! {"type":"Call","id":0,"method":"zebra1.configure","args":{...}}
//! {"type":"Value","id":7,"val":{...}}
//! {"type":"Return","id":0}
//! {"type":"Error","id":0,"message":"Invalid function foo"}
//! {"type":"Ready","device":"zebra1"}
//! ```

pub(crate) mod wire;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Malcolm protocol envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Invoke `method` (`device.fname` or bare `fname`).
    Call {
        id: u64,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Map<String, Value>>,
    },

    /// Read the entity at `param`.
    Get { id: u64, param: String },

    /// Stream the entity at `param` until unsubscribed.
    Subscribe { id: u64, param: String },

    /// Cancel the subscription opened with the same id.
    Unsubscribe { id: u64 },

    /// Streamed value for a pending request.
    Value { id: u64, val: Value },

    /// Terminal success. `val` is absent when the request produced nothing.
    Return {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        val: Option<Value>,
    },

    /// Terminal failure.
    Error { id: u64, message: String },

    /// Server greeting sent once per connection.
    Ready { device: String },
}

impl Envelope {
    /// Build a Call, dropping an empty argument map.
    pub fn call(id: u64, method: impl Into<String>, args: Map<String, Value>) -> Self {
        Envelope::Call {
            id,
            method: method.into(),
            args: if args.is_empty() { None } else { Some(args) },
        }
    }

    /// Build a Return, treating `null` as no value.
    pub fn ret(id: u64, val: Option<Value>) -> Self {
        Envelope::Return {
            id,
            val: val.filter(|v| !v.is_null()),
        }
    }

    /// Correlation id, `None` for Ready.
    pub fn id(&self) -> Option<u64> {
        match self {
            Envelope::Call { id, .. }
            | Envelope::Get { id, .. }
            | Envelope::Subscribe { id, .. }
            | Envelope::Unsubscribe { id }
            | Envelope::Value { id, .. }
            | Envelope::Return { id, .. }
            | Envelope::Error { id, .. } => Some(*id),
            Envelope::Ready { .. } => None,
        }
    }

    /// Wire name of the envelope type.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Call { .. } => "Call",
            Envelope::Get { .. } => "Get",
            Envelope::Subscribe { .. } => "Subscribe",
            Envelope::Unsubscribe { .. } => "Unsubscribe",
            Envelope::Value { .. } => "Value",
            Envelope::Return { .. } => "Return",
            Envelope::Error { .. } => "Error",
            Envelope::Ready { .. } => "Ready",
        }
    }

    /// Whether this frame ends its request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Envelope::Return { .. } | Envelope::Error { .. })
    }
}

/// Frame that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Id recovered from the raw object, if any.
    pub id: Option<u64>,
    pub reason: String,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Malformed message: {}", self.reason)
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::MalformedEnvelope(e.reason)
    }
}

pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(envelope)?)
}

pub fn decode(bytes: &[u8]) -> std::result::Result<Envelope, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| DecodeError {
        id: recover_id(bytes),
        reason: e.to_string(),
    })
}

fn recover_id(bytes: &[u8]) -> Option<u64> {
    let raw: Value = serde_json::from_slice(bytes).ok()?;
    raw.get("id")?.as_u64()
}

/// Error reply carrying the display text of `err`.
pub fn serialize_error(id: u64, err: &impl std::fmt::Display) -> Envelope {
    Envelope::Error {
        id,
        message: err.to_string(),
    }
}
