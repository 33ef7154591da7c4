// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Alarm metadata attached to attribute values.
//!
//! Severity and status travel as their ordinal on the wire.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Alarm severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AlarmSeverity {
    #[default]
    NoAlarm = 0,
    MinorAlarm = 1,
    MajorAlarm = 2,
    InvalidAlarm = 3,
    UndefinedAlarm = 4,
}

impl AlarmSeverity {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::NoAlarm),
            1 => Some(Self::MinorAlarm),
            2 => Some(Self::MajorAlarm),
            3 => Some(Self::InvalidAlarm),
            4 => Some(Self::UndefinedAlarm),
            _ => None,
        }
    }
}

/// Origin of the alarm condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AlarmStatus {
    #[default]
    NoStatus = 0,
    DeviceStatus = 1,
    DriverStatus = 2,
    RecordStatus = 3,
    DbStatus = 4,
    ConfStatus = 5,
    UndefinedStatus = 6,
    ClientStatus = 7,
}

impl AlarmStatus {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::NoStatus),
            1 => Some(Self::DeviceStatus),
            2 => Some(Self::DriverStatus),
            3 => Some(Self::RecordStatus),
            4 => Some(Self::DbStatus),
            5 => Some(Self::ConfStatus),
            6 => Some(Self::UndefinedStatus),
            7 => Some(Self::ClientStatus),
            _ => None,
        }
    }
}

macro_rules! ordinal_serde {
    ($ty:ident, $what:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u8(*self as u8)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let index = u8::deserialize(deserializer)?;
                $ty::from_index(index)
                    .ok_or_else(|| D::Error::custom(format!("invalid {} {}", $what, index)))
            }
        }
    };
}

ordinal_serde!(AlarmSeverity, "alarm severity");
ordinal_serde!(AlarmStatus, "alarm status");

/// Alarm state of a value: `{severity, status, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub severity: AlarmSeverity,
    pub status: AlarmStatus,
    pub message: String,
}

impl Alarm {
    pub fn new(severity: AlarmSeverity, status: AlarmStatus, message: impl Into<String>) -> Self {
        Self {
            severity,
            status,
            message: message.into(),
        }
    }

    /// True when severity is `NoAlarm`.
    pub fn is_ok(&self) -> bool {
        self.severity == AlarmSeverity::NoAlarm
    }
}

impl Default for Alarm {
    fn default() -> Self {
        Self::new(AlarmSeverity::NoAlarm, AlarmStatus::NoStatus, "No alarm")
    }
}
