//! `PipeWire` backend
//!
//! Endpoint discovery and default switching via `PipeWire` native tools:
//! - `pw-dump`: JSON snapshot of nodes and the `default` metadata object
//! - `pw-metadata`: setting `default.audio.sink` / `default.audio.source`
//!
//! Node names (`alsa_output.usb-...analog-stereo`) serve as endpoint ids;
//! they are stable across reboots but change when a USB or Bluetooth device
//! is replugged into another port, which is what name fallback covers.

use color_eyre::eyre::{self, Context, Result};
use serde::Deserialize;
use std::process::Command;
use tracing::{debug, trace};

use super::{AudioBackend, Role};
use crate::device::{Direction, EnumeratorKind, RawEndpoint};

// ============================================================================
// PipeWire JSON Structures (from pw-dump)
// ============================================================================

/// Top-level `PipeWire` object from `pw-dump` output
#[derive(Debug, Deserialize)]
pub struct PwObject {
    pub id: u32,
    #[serde(rename = "type")]
    pub obj_type: String,
    #[serde(default)]
    pub info: Option<PwInfo>,
    #[serde(default)]
    pub props: Option<PwProps>,
    #[serde(default)]
    pub metadata: Option<Vec<PwMetadataEntry>>,
}

impl PwObject {
    /// Get props from either info.props or top-level props (metadata objects use top-level)
    #[must_use]
    pub fn get_props(&self) -> Option<&PwProps> {
        self.info
            .as_ref()
            .and_then(|i| i.props.as_ref())
            .or(self.props.as_ref())
    }
}

#[derive(Debug, Deserialize)]
pub struct PwInfo {
    #[serde(default)]
    pub props: Option<PwProps>,
}

/// `PipeWire` object properties - uses permissive deserialization
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PwProps {
    #[serde(rename = "node.name")]
    pub node_name: Option<String>,
    #[serde(rename = "node.description")]
    pub node_description: Option<String>,
    #[serde(rename = "node.nick")]
    pub node_nick: Option<String>,
    #[serde(rename = "media.class")]
    pub media_class: Option<String>,
    #[serde(rename = "metadata.name")]
    pub metadata_name: Option<String>,
    #[serde(rename = "device.bus")]
    pub device_bus: Option<String>,
    #[serde(rename = "device.api")]
    pub device_api: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PwMetadataEntry {
    pub key: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl PwMetadataEntry {
    /// Extract node name from metadata value (handles multiple formats)
    pub fn get_name(&self) -> Option<String> {
        let value = self.value.as_ref()?;
        // Try object with "name" field first
        if let Some(obj) = value.as_object()
            && let Some(name_val) = obj.get("name")
        {
            return name_val.as_str().map(String::from);
        }
        // Fall back to plain string
        value.as_str().map(String::from)
    }
}

// ============================================================================
// Direction Mapping
// ============================================================================

fn media_class(direction: Direction) -> &'static str {
    match direction {
        Direction::Playback => "Audio/Sink",
        Direction::Capture => "Audio/Source",
    }
}

fn default_metadata_key(direction: Direction) -> &'static str {
    match direction {
        Direction::Playback => "default.audio.sink",
        Direction::Capture => "default.audio.source",
    }
}

/// Work out the bus of a node from its props, falling back to its name
fn enumerator_of(props: &PwProps, node_name: &str) -> EnumeratorKind {
    if let Some(bus) = &props.device_bus {
        return EnumeratorKind::from_bus_name(bus);
    }
    if props.device_api.as_deref() == Some("bluez5") || node_name.starts_with("bluez_") {
        return EnumeratorKind::Bluetooth;
    }
    if node_name.contains(".usb-") {
        return EnumeratorKind::Usb;
    }
    if node_name.contains(".pci-") {
        return EnumeratorKind::Pci;
    }
    EnumeratorKind::Other(String::new())
}

// ============================================================================
// PipeWire Interface
// ============================================================================

/// [`AudioBackend`] backed by `pw-dump` and `pw-metadata`
#[derive(Debug, Default, Clone, Copy)]
pub struct PipeWireBackend;

impl PipeWireBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate that all required `PipeWire` tools are available in `PATH`
    ///
    /// # Errors
    /// Returns an error with installation instructions if any tools are missing.
    pub fn validate_tools() -> Result<()> {
        let missing: Vec<&str> = ["pw-dump", "pw-metadata"]
            .into_iter()
            .filter(|tool| {
                !Command::new(tool)
                    .arg("--version")
                    .output()
                    .is_ok_and(|o| o.status.success())
            })
            .collect();

        if !missing.is_empty() {
            eyre::bail!(
                "Missing required PipeWire tools: {}\n\
                 \n\
                 Please install the PipeWire utilities package for your distribution:\n\
                 - Arch/Manjaro: pacman -S pipewire-tools\n\
                 - Fedora: dnf install pipewire-utils\n\
                 - Debian/Ubuntu: apt install pipewire-bin\n\
                 - openSUSE: zypper install pipewire-tools",
                missing.join(", ")
            );
        }

        Ok(())
    }

    /// Get all `PipeWire` objects via `pw-dump`
    ///
    /// # Errors
    /// Returns an error if `pw-dump` fails to execute or returns invalid JSON.
    pub fn dump() -> Result<Vec<PwObject>> {
        let output = Command::new("pw-dump")
            .output()
            .context("PipeWire tool 'pw-dump' not found or failed. Is PipeWire installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            eyre::bail!("pw-dump failed: {}", stderr.trim());
        }

        let objects: Vec<PwObject> =
            serde_json::from_slice(&output.stdout).context("Failed to parse pw-dump JSON")?;

        trace!("pw-dump returned {} objects", objects.len());
        Ok(objects)
    }

    /// Extract the audio endpoints for `direction` from `PipeWire` objects
    #[must_use]
    pub fn endpoints_from_objects(objects: &[PwObject], direction: Direction) -> Vec<RawEndpoint> {
        let class = media_class(direction);

        objects
            .iter()
            .filter(|obj| obj.obj_type == "PipeWire:Interface:Node")
            .filter_map(|obj| {
                let props = obj.get_props()?;
                if props.media_class.as_deref() != Some(class) {
                    return None;
                }

                let id = props.node_name.clone()?;
                let raw_name = props
                    .node_description
                    .clone()
                    .or_else(|| props.node_nick.clone())
                    .unwrap_or_else(|| id.clone());

                Some(RawEndpoint {
                    raw_name,
                    enumerator: enumerator_of(props, &id),
                    id,
                    direction,
                })
            })
            .collect()
    }

    /// Extract the default node name for `direction` from metadata objects
    #[must_use]
    pub fn default_from_objects(objects: &[PwObject], direction: Direction) -> Option<String> {
        let key = default_metadata_key(direction);

        objects
            .iter()
            .filter(|obj| obj.obj_type == "PipeWire:Interface:Metadata")
            .filter(|obj| {
                obj.get_props()
                    .is_some_and(|p| p.metadata_name.as_deref() == Some("default"))
            })
            .filter_map(|obj| obj.metadata.as_ref())
            .flatten()
            .find(|entry| entry.key == key)
            .and_then(PwMetadataEntry::get_name)
    }
}

impl AudioBackend for PipeWireBackend {
    fn endpoints(&self, direction: Direction) -> Result<Vec<RawEndpoint>> {
        Ok(Self::endpoints_from_objects(&Self::dump()?, direction))
    }

    fn default_endpoint(&self, direction: Direction) -> Result<Option<String>> {
        Ok(Self::default_from_objects(&Self::dump()?, direction))
    }

    fn set_default_endpoint(&self, id: &str, direction: Direction, role: Role) -> Result<()> {
        if role == Role::Communications {
            // PipeWire routes voice apps through the same default node
            debug!("No separate communications default in PipeWire, skipping for '{}'", id);
            return Ok(());
        }

        // Use proper JSON serialization to avoid injection risks
        let value = serde_json::to_string(&serde_json::json!({ "name": id }))
            .context("Failed to serialize node name to JSON")?;

        let output = Command::new("pw-metadata")
            .args(["0", default_metadata_key(direction), &value, "Spa:String:JSON"])
            .output()
            .with_context(|| {
                format!(
                    "PipeWire tool 'pw-metadata' not found or failed. Attempted to set default {direction} to '{id}'"
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            eyre::bail!(
                "Failed to set default {} to '{}': {}",
                direction,
                id,
                stderr.trim()
            );
        }

        debug!("Set default {}: {}", direction, id);
        Ok(())
    }
}
