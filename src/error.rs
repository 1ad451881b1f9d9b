//! Switching errors
//!
//! Every failure a cycle or activation can hit is returned as a value. None of
//! these are retried here; the caller decides whether to tell the user.

use crate::device::Direction;

/// Failure of a cycle, activation, or persisted-record load
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwitchError {
    /// Nothing selected, or nothing selected is currently present
    #[error("No {direction} devices to select. Select at least one connected device.")]
    NoDevices { direction: Direction },

    /// A requested target is gone by the time it is activated
    #[error("{direction} device '{name}' is not connected")]
    DeviceNotFound { direction: Direction, name: String },

    /// The OS refused or failed the set-default call
    #[error("Failed to set '{name}' as default {direction} device: {message}")]
    PlatformCall {
        direction: Direction,
        name: String,
        message: String,
    },

    /// Listing endpoints or reading the default failed
    #[error("Failed to query {direction} devices: {message}")]
    Query { direction: Direction, message: String },

    /// A stored device record could not be turned into an identity
    #[error("Skipping malformed device record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

impl SwitchError {
    /// Configuration problems need the user; everything else is situational
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::NoDevices { .. })
    }
}
