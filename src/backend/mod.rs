//! Platform audio backends
//!
//! The switching core never talks to the OS directly. It goes through
//! [`AudioBackend`], which lists endpoints, reads the current default and
//! sets a new one:
//! - [`PipeWireBackend`]: `pw-dump` / `pw-metadata` on Linux desktops
//! - [`MemoryBackend`]: scripted endpoints for tests and dry runs
//!
//! Calls are synchronous and may block briefly (process spawn); async callers
//! wrap them in `spawn_blocking`.

pub mod memory;
pub mod pipewire;

pub use memory::MemoryBackend;
pub use pipewire::PipeWireBackend;

use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::device::{DeviceIdentity, Direction, RawEndpoint};

/// Which default slot a set-default call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Console/multimedia default
    Default,
    /// Default for voice chat applications
    Communications,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Communications => f.write_str("communications"),
        }
    }
}

/// OS capability the switching core depends on
pub trait AudioBackend: Send + Sync {
    /// Endpoints currently present for `direction`
    ///
    /// # Errors
    /// Returns an error if the OS cannot be queried.
    fn endpoints(&self, direction: Direction) -> Result<Vec<RawEndpoint>>;

    /// Id of the current default endpoint for `direction`, if any
    ///
    /// # Errors
    /// Returns an error if the OS cannot be queried.
    fn default_endpoint(&self, direction: Direction) -> Result<Option<String>>;

    /// Make endpoint `id` the default for `direction` in `role`
    ///
    /// # Errors
    /// Returns an error if the OS refuses or the endpoint is gone.
    fn set_default_endpoint(&self, id: &str, direction: Direction, role: Role) -> Result<()>;

    /// Present endpoints as identities, in display order
    ///
    /// # Errors
    /// Returns an error if the OS cannot be queried.
    fn identities(&self, direction: Direction) -> Result<Vec<DeviceIdentity>> {
        let mut devices: Vec<DeviceIdentity> = self
            .endpoints(direction)?
            .into_iter()
            .map(DeviceIdentity::from)
            .collect();
        devices.sort_by(DeviceIdentity::display_cmp);
        Ok(devices)
    }
}
