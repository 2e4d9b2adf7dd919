//! Name-based lookup of registered overrides.

use std::collections::HashMap;

use crate::controller::ControlHandle;
use crate::error::{OverrideError, Result};

/// Maps override names to their control handles.
///
/// The host owns one registry and hands it to
/// [`OverrideController::register`](crate::OverrideController::register);
/// command layers look controllers up here by name.
#[derive(Default)]
pub struct OverrideRegistry {
    overrides: HashMap<String, ControlHandle>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, handle: ControlHandle) -> Result<()> {
        let name = handle.name().to_string();
        if self.overrides.contains_key(&name) {
            return Err(OverrideError::AlreadyRegistered(name));
        }
        self.overrides.insert(name, handle);
        Ok(())
    }

    /// Removes `handle`'s entry. An entry under the same name that belongs to
    /// another override is left alone.
    pub(crate) fn remove(&mut self, handle: &ControlHandle) -> Option<ControlHandle> {
        match self.overrides.get(handle.name()) {
            Some(entry) if entry.is_same(handle) => self.overrides.remove(handle.name()),
            _ => None,
        }
    }

    /// Finds the override registered under `name`.
    pub fn find(&self, name: &str) -> Result<ControlHandle> {
        self.overrides
            .get(name)
            .cloned()
            .ok_or_else(|| OverrideError::NotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.overrides.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.overrides.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}
