// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Value types for attributes and method arguments.

use crate::error::{Error, Result};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Type of an attribute or method argument.
///
/// Enum values are stored as the index into `labels`; validation accepts
/// either the index or the label text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VType {
    Int,
    Float,
    Str,
    Bool,
    Enum(Vec<String>),
}

impl VType {
    /// Build an enum type from its labels.
    pub fn enumeration<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(labels.into_iter().map(Into::into).collect())
    }

    /// Wire name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bool => "bool",
            Self::Enum(_) => "enum",
        }
    }

    /// Check `value` and return it in canonical form.
    ///
    /// `null` is accepted for every type and means "no value".
    pub fn validate(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Self::Int => {
                if value.is_i64() || value.is_u64() {
                    return Ok(value.clone());
                }
                match value.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Value::from(f as i64)),
                    Some(f) => Err(self.mismatch_msg(format!("Lost information converting {}", f))),
                    None => Err(self.mismatch(value)),
                }
            }
            Self::Float => value
                .as_f64()
                .map(Value::from)
                .ok_or_else(|| self.mismatch(value)),
            Self::Str => {
                if value.is_string() {
                    Ok(value.clone())
                } else {
                    Err(self.mismatch(value))
                }
            }
            Self::Bool => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::Number(n) if n.as_u64() == Some(0) => Ok(Value::Bool(false)),
                Value::Number(n) if n.as_u64() == Some(1) => Ok(Value::Bool(true)),
                _ => Err(self.mismatch(value)),
            },
            Self::Enum(labels) => {
                if let Some(index) = value.as_u64() {
                    if (index as usize) < labels.len() {
                        return Ok(Value::from(index));
                    }
                    return Err(self.mismatch_msg(format!(
                        "Index {} out of range for {} labels",
                        index,
                        labels.len()
                    )));
                }
                if let Some(label) = value.as_str() {
                    return labels
                        .iter()
                        .position(|l| l == label)
                        .map(Value::from)
                        .ok_or_else(|| {
                            self.mismatch_msg(format!("{:?} is not one of {:?}", label, labels))
                        });
                }
                Err(self.mismatch(value))
            }
        }
    }

    fn mismatch(&self, value: &Value) -> Error {
        Error::TypeMismatch(format!("expected {}, got {}", self.name(), value))
    }

    fn mismatch_msg(&self, detail: String) -> Error {
        Error::TypeMismatch(format!("expected {}: {}", self.name(), detail))
    }
}

impl Serialize for VType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Enum(labels) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("name", self.name())?;
                map.serialize_entry("labels", labels)?;
                map.end()
            }
            _ => serializer.serialize_str(self.name()),
        }
    }
}
