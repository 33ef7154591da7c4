// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device state enumerations.
//!
//! States are device policy: a device declares an ordered list of state
//! names and its methods name the subset they may run from. [`DState`] is
//! the canonical set used by scan-style devices.

use crate::error::{Error, Result};
use std::sync::Arc;

/// Anything that names a state.
pub trait StateName {
    fn state_name(&self) -> &str;
}

impl StateName for str {
    fn state_name(&self) -> &str {
        self
    }
}

impl StateName for &str {
    fn state_name(&self) -> &str {
        self
    }
}

impl StateName for String {
    fn state_name(&self) -> &str {
        self
    }
}

/// Ordered set of state names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct States {
    choices: Arc<[String]>,
}

impl States {
    pub fn new<I, S>(choices: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
        if choices.is_empty() {
            return Err(Error::Config("State set cannot be empty".into()));
        }
        for (i, name) in choices.iter().enumerate() {
            if choices[..i].contains(name) {
                return Err(Error::Config(format!("Duplicate state {}", name)));
            }
        }
        Ok(Self {
            choices: choices.into(),
        })
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Index of `state`, or `InvalidState` if it is not declared.
    pub fn index_of<S: StateName + ?Sized>(&self, state: &S) -> Result<usize> {
        let name = state.state_name();
        self.choices
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::InvalidState {
                state: name.to_string(),
                choices: self.choices.to_vec(),
            })
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.choices.get(index).map(String::as_str)
    }
}

/// Canonical device states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DState {
    Fault,
    Idle,
    Configuring,
    Ready,
    Running,
    Pausing,
    Paused,
    Aborting,
    Aborted,
    Resetting,
}

impl DState {
    pub const ALL: [DState; 10] = [
        DState::Fault,
        DState::Idle,
        DState::Configuring,
        DState::Ready,
        DState::Running,
        DState::Pausing,
        DState::Paused,
        DState::Aborting,
        DState::Aborted,
        DState::Resetting,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DState::Fault => "Fault",
            DState::Idle => "Idle",
            DState::Configuring => "Configuring",
            DState::Ready => "Ready",
            DState::Running => "Running",
            DState::Pausing => "Pausing",
            DState::Paused => "Paused",
            DState::Aborting => "Aborting",
            DState::Aborted => "Aborted",
            DState::Resetting => "Resetting",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// The full ordered state set.
    pub fn states() -> States {
        States {
            choices: Self::ALL.iter().map(|s| s.name().to_string()).collect(),
        }
    }

    pub fn rest() -> Vec<DState> {
        vec![DState::Fault, DState::Idle, DState::Ready, DState::Paused]
    }

    pub fn abortable() -> Vec<DState> {
        vec![
            DState::Configuring,
            DState::Ready,
            DState::Running,
            DState::Pausing,
            DState::Paused,
        ]
    }

    pub fn configurable() -> Vec<DState> {
        vec![DState::Idle, DState::Ready]
    }

    pub fn runnable() -> Vec<DState> {
        vec![DState::Ready, DState::Paused]
    }
}

impl StateName for DState {
    fn state_name(&self) -> &str {
        self.name()
    }
}

impl std::fmt::Display for DState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
