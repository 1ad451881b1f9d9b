//! In-memory backend
//!
//! Holds a scripted list of endpoints and defaults. Tests plug and unplug
//! devices, make the next set-default call fail, and inspect the calls made.

use color_eyre::eyre::{self, Result};
use std::sync::{Mutex, PoisonError};

use super::{AudioBackend, Role};
use crate::device::{Direction, EnumeratorKind, RawEndpoint};

#[derive(Debug, Default)]
struct MemoryState {
    endpoints: Vec<RawEndpoint>,
    defaults: [Option<String>; 2],
    fail_next_set: Option<String>,
    calls: Vec<(String, Direction, Role)>,
}

/// Scripted [`AudioBackend`]
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an endpoint (replaces any endpoint with the same id and direction)
    pub fn plug(&self, raw_name: &str, id: &str, direction: Direction, enumerator: EnumeratorKind) {
        let mut state = self.state();
        state
            .endpoints
            .retain(|e| !(e.id == id && e.direction == direction));
        state.endpoints.push(RawEndpoint {
            raw_name: raw_name.to_string(),
            id: id.to_string(),
            direction,
            enumerator,
        });
    }

    /// Remove an endpoint; clears the default if it pointed at it
    pub fn unplug(&self, id: &str, direction: Direction) {
        let mut state = self.state();
        state
            .endpoints
            .retain(|e| !(e.id == id && e.direction == direction));
        let slot = &mut state.defaults[direction.index()];
        if slot.as_deref() == Some(id) {
            *slot = None;
        }
    }

    /// Set the default as if something outside the core changed it
    pub fn set_default(&self, direction: Direction, id: Option<&str>) {
        self.state().defaults[direction.index()] = id.map(String::from);
    }

    /// Make the next set-default call fail with `message`
    pub fn fail_next_set(&self, message: &str) {
        self.state().fail_next_set = Some(message.to_string());
    }

    /// Set-default calls made so far, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Direction, Role)> {
        self.state().calls.clone()
    }
}

impl AudioBackend for MemoryBackend {
    fn endpoints(&self, direction: Direction) -> Result<Vec<RawEndpoint>> {
        Ok(self
            .state()
            .endpoints
            .iter()
            .filter(|e| e.direction == direction)
            .cloned()
            .collect())
    }

    fn default_endpoint(&self, direction: Direction) -> Result<Option<String>> {
        Ok(self.state().defaults[direction.index()].clone())
    }

    fn set_default_endpoint(&self, id: &str, direction: Direction, role: Role) -> Result<()> {
        let mut state = self.state();
        state.calls.push((id.to_string(), direction, role));

        if let Some(message) = state.fail_next_set.take() {
            eyre::bail!("{message}");
        }
        if !state
            .endpoints
            .iter()
            .any(|e| e.id == id && e.direction == direction)
        {
            eyre::bail!("Endpoint '{id}' is not present");
        }
        if role == Role::Default {
            state.defaults[direction.index()] = Some(id.to_string());
        }
        Ok(())
    }
}
