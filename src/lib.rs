//! `SNDSW` - Sound Switcher
//!
//! Cycles the default audio device among a user-selected set of endpoints.
//! Uses `PipeWire` native tools (`pw-dump`, `pw-metadata`) for audio control.
//!
//! # Features
//! - Next/previous cycling per direction, skipping unselected and absent devices
//! - Device identity that survives USB/Bluetooth re-plugs with a new id
//! - Optional switch to a selected device as soon as it is plugged in
//! - Profiles that switch playback and recording together, triggered by
//!   hotkey, window title, process or Steam
//! - Daemon with Unix socket IPC, and a CLI that also works without it
//!
//! The core ([`context::AppContext`]) is independent of `PipeWire`: it talks
//! to the OS through [`backend::AudioBackend`], and [`backend::MemoryBackend`]
//! stands in for it in tests.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod cycler;
pub mod daemon;
pub mod debounce;
pub mod device;
pub mod error;
pub mod events;
pub mod ipc;
pub mod logging;
pub mod notification;
pub mod profile;
pub mod selection;
pub mod style;
pub mod watcher;

// Re-export commonly used types for convenience
pub use cli::Args;
pub use config::Config;
pub use context::AppContext;
pub use device::{DeviceIdentity, Direction};
pub use error::SwitchError;
