// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered attribute container.

use super::Attribute;
use crate::error::{Error, Result};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Attributes keyed by name, serialized in insertion order.
#[derive(Debug, Default)]
pub struct Attributes {
    entries: Vec<Arc<Attribute>>,
    index: HashMap<String, usize>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name `attribute` and append it. Names must be unique.
    pub fn add(&mut self, name: &str, mut attribute: Attribute) -> Result<Arc<Attribute>> {
        if self.index.contains_key(name) {
            return Err(Error::Config(format!("Duplicate attribute {}", name)));
        }
        attribute.assign_name(name)?;
        let attribute = Arc::new(attribute);
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(attribute.clone());
        Ok(attribute)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Attribute>> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Attribute>> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|a| a.name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for attribute in &self.entries {
            map.serialize_entry(attribute.name(), attribute.as_ref())?;
        }
        map.end()
    }
}
