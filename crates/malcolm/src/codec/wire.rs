// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire views of the device model.
//!
//! Field order in these structs is the serialization contract that
//! existing web and desktop clients depend on.

use crate::model::{Alarm, TimeStamp, VType};
use serde::Serialize;
use serde_json::Value;

/// Attribute value or method argument descriptor.
///
/// `alarm` and `timeStamp` are absent for argument descriptors.
#[derive(Debug, Serialize)]
pub(crate) struct AttributeWire<'a> {
    pub value: &'a Value,
    #[serde(rename = "type")]
    pub typ: &'a VType,
    #[serde(skip_serializing_if = "no_tags")]
    pub tags: &'a [String],
    pub descriptor: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm: Option<&'a Alarm>,
    #[serde(rename = "timeStamp", skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<&'a TimeStamp>,
}

fn no_tags(tags: &&[String]) -> bool {
    tags.is_empty()
}

#[derive(Debug, Serialize)]
pub(crate) struct StateWire<'a> {
    pub index: usize,
    pub choices: &'a [String],
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusWire<'a> {
    pub message: &'a str,
    pub state: StateWire<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(rename = "timeStamp")]
    pub time_stamp: &'a TimeStamp,
}

#[derive(Serialize)]
pub(crate) struct MethodWire<'a, A: Serialize> {
    pub descriptor: &'a str,
    pub args: A,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_states: Option<&'a [String]>,
}

#[derive(Serialize)]
pub(crate) struct DeviceWire<'a, M: Serialize, S: Serialize, A: Serialize> {
    pub methods: M,
    pub status: &'a S,
    pub attributes: &'a A,
}
