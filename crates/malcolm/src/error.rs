// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy shared by the server and client runtimes.
//!
//! Every kind the server can report travels to the client as an `Error`
//! frame whose `message` is the `Display` text of the variant. On the
//! client side those frames come back as [`Error::Remote`] with the
//! message preserved verbatim.

use thiserror::Error;

/// Malcolm errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Undecodable frame.
    #[error("Malformed message: {0}")]
    MalformedEnvelope(String),

    /// Call or Ready addressed to another device.
    #[error("Wrong device name {0}")]
    WrongDevice(String),

    /// Call of a method the device does not declare.
    #[error("Invalid function {0}")]
    UnknownMethod(String),

    /// Call refused by state gating.
    #[error("Cannot call {method} from state {state}")]
    StateForbidden { method: String, state: String },

    /// Missing, unknown or mistyped call arguments.
    #[error("{0}")]
    InvalidArgs(String),

    /// Method body returned an error or panicked.
    #[error("{0}")]
    HandlerFailure(String),

    /// Get/Subscribe path that does not resolve on the device.
    #[error("No such path {0}")]
    UnknownPath(String),

    /// Unsubscribe of an id with no live subscription.
    #[error("Unknown subscription {0}")]
    UnknownSubscription(u64),

    /// Subscribe reusing an id that is still live for the same peer.
    #[error("Subscription {0} already exists")]
    DuplicateSubscription(u64),

    /// Frame the receiving side cannot accept at this point.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Client-side deadline expired.
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Socket closed or peer gone.
    #[error("Transport closed: {0}")]
    TransportDead(String),

    /// Error frame received from the server.
    #[error("{0}")]
    Remote(String),

    /// Value does not fit the attribute or argument type.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// State name outside the declared state set.
    #[error("State {state} should be one of {choices:?}")]
    InvalidState { state: String, choices: Vec<String> },

    /// Listener registration misuse or listener failure.
    #[error("Listener error: {0}")]
    Listener(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Malcolm operations.
pub type Result<T> = std::result::Result<T, Error>;
