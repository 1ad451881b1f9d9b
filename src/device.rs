//! Audio endpoint identity
//!
//! Turns raw OS-reported endpoint data into a [`DeviceIdentity`] that stays
//! recognizable across re-enumeration: the name is canonicalized once, the OS
//! id is authoritative when it matches, and removable-bus devices (USB,
//! Bluetooth) fall back to name matching because their id changes on replug.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::{LazyLock, OnceLock};

// ============================================================================
// Name Canonicalization
// ============================================================================

/// Splits `"<friendly> (<ordinal/separators><controller>)"`
static NAME_SPLITTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<friendly>[\w\s_./\\-]+)\s\([\d\s|-]*(?P<controller>.+)\)")
        .expect("name splitter pattern is valid")
});

/// Leading ordinal added by the OS to tell identical devices apart (`"2 - "`)
static ORDINAL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s?-\s?").expect("ordinal prefix pattern is valid"));

/// Derive the canonical name of a raw endpoint name
///
/// `"2 - Speakers (Realtek Audio)"` becomes `"Speakers (Realtek Audio)"`.
/// Names that don't have the `"<friendly> (<controller>)"` shape are returned
/// unchanged. Runs once per raw input; applying it to its own output is not
/// guaranteed to be stable.
#[must_use]
pub fn canonicalize(raw_name: &str) -> String {
    let Some(caps) = NAME_SPLITTER.captures(raw_name) else {
        return raw_name.to_string();
    };

    let friendly = ORDINAL_PREFIX.replace(&caps["friendly"], "");
    format!("{friendly} ({})", &caps["controller"])
}

// ============================================================================
// Direction / Enumerator
// ============================================================================

/// Data flow of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Playback,
    Capture,
}

impl Direction {
    pub const ALL: [Self; 2] = [Self::Playback, Self::Capture];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Playback => "playback",
            Self::Capture => "capture",
        }
    }

    /// Index for per-direction tables
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Playback => 0,
            Self::Capture => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "playback" | "output" | "sink" => Ok(Self::Playback),
            "capture" | "recording" | "input" | "source" => Ok(Self::Capture),
            other => Err(format!(
                "Unknown direction '{other}'. Use: playback or capture"
            )),
        }
    }
}

/// Bus the OS enumerated an endpoint behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumeratorKind {
    Usb,
    Bluetooth,
    Pci,
    Other(String),
}

impl EnumeratorKind {
    /// Hot-pluggable buses hand out a fresh id when the device comes back
    #[must_use]
    pub fn is_removable_bus(&self) -> bool {
        matches!(self, Self::Usb | Self::Bluetooth)
    }

    /// Parse an enumerator/bus name as reported by the OS (`"USB"`, `"usb"`, `"bluetooth"`, ...)
    #[must_use]
    pub fn from_bus_name(bus: &str) -> Self {
        match bus.to_ascii_lowercase().as_str() {
            "usb" => Self::Usb,
            "bluetooth" | "bt" | "bthenum" => Self::Bluetooth,
            "pci" | "hdaudio" => Self::Pci,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Endpoint exactly as the backend listed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEndpoint {
    pub raw_name: String,
    pub id: String,
    pub direction: Direction,
    pub enumerator: EnumeratorKind,
}

// ============================================================================
// DeviceIdentity
// ============================================================================

/// Canonical, comparable identity of one audio endpoint
///
/// Immutable after construction. The canonical name is derived lazily from
/// `raw_name` and memoized for the lifetime of the value.
///
/// # Equality
///
/// Two identities are equal when their directions match and either
/// - their ids are equal and non-empty, or
/// - at least one of them sits on a removable bus (or neither has an id) and
///   their canonical names are equal.
///
/// The relation is reflexive and symmetric but NOT transitive when removable
/// and built-in devices share a canonical name, which is why the type
/// implements neither `Eq` nor `Hash`. Use [`DeviceIdentity::display_cmp`]
/// for sorting; it is unrelated to equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "PersistedDevice", into = "PersistedDevice")]
pub struct DeviceIdentity {
    raw_name: String,
    id: String,
    direction: Direction,
    is_removable_bus: bool,
    canonical_name: OnceLock<String>,
}

impl DeviceIdentity {
    #[must_use]
    pub fn new(
        raw_name: impl Into<String>,
        id: impl Into<String>,
        direction: Direction,
        is_removable_bus: bool,
    ) -> Self {
        Self {
            raw_name: raw_name.into(),
            id: id.into(),
            direction,
            is_removable_bus,
            canonical_name: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn is_removable_bus(&self) -> bool {
        self.is_removable_bus
    }

    /// Canonical name, computed on first access
    #[must_use]
    pub fn canonical_name(&self) -> &str {
        self.canonical_name.get_or_init(|| canonicalize(&self.raw_name))
    }

    /// Display ordering: canonical name (byte-wise), then id, then direction
    #[must_use]
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.canonical_name()
            .cmp(other.canonical_name())
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.direction.cmp(&other.direction))
    }

    /// Minimal fields needed to rebuild this identity later
    #[must_use]
    pub fn to_persisted(&self) -> PersistedDevice {
        PersistedDevice {
            raw_name: self.raw_name.clone(),
            id: self.id.clone(),
            direction: self.direction,
            is_removable_bus: self.is_removable_bus,
        }
    }
}

impl PartialEq for DeviceIdentity {
    fn eq(&self, other: &Self) -> bool {
        if self.direction != other.direction {
            return false;
        }
        if !self.id.is_empty() && self.id == other.id {
            return true;
        }
        // Without any id to go on, the name is all that identifies a device
        let ids_missing = self.id.is_empty() && other.id.is_empty();
        (self.is_removable_bus || other.is_removable_bus || ids_missing)
            && self.canonical_name() == other.canonical_name()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl From<RawEndpoint> for DeviceIdentity {
    fn from(endpoint: RawEndpoint) -> Self {
        let removable = endpoint.enumerator.is_removable_bus();
        Self::new(endpoint.raw_name, endpoint.id, endpoint.direction, removable)
    }
}

impl From<&RawEndpoint> for DeviceIdentity {
    fn from(endpoint: &RawEndpoint) -> Self {
        Self::new(
            endpoint.raw_name.clone(),
            endpoint.id.clone(),
            endpoint.direction,
            endpoint.enumerator.is_removable_bus(),
        )
    }
}

// ============================================================================
// Persisted Form
// ============================================================================

/// Stored form of a [`DeviceIdentity`] (`[[devices]]` and profile targets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDevice {
    pub raw_name: String,
    #[serde(default)]
    pub id: String,
    pub direction: Direction,
    #[serde(default)]
    pub is_removable_bus: bool,
}

impl PersistedDevice {
    /// A record with neither a name nor an id can never match anything
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !(self.raw_name.trim().is_empty() && self.id.trim().is_empty())
    }
}

impl From<PersistedDevice> for DeviceIdentity {
    fn from(p: PersistedDevice) -> Self {
        Self::new(p.raw_name, p.id, p.direction, p.is_removable_bus)
    }
}

impl From<DeviceIdentity> for PersistedDevice {
    fn from(d: DeviceIdentity) -> Self {
        Self {
            raw_name: d.raw_name,
            id: d.id,
            direction: d.direction,
            is_removable_bus: d.is_removable_bus,
        }
    }
}

// ============================================================================
// User References
// ============================================================================

/// Resolve a user-supplied device reference against a listing
///
/// Tries, in order: 1-based position in `devices`, exact id, canonical name,
/// raw name (names compared case-insensitively).
#[must_use]
pub fn resolve_ref<'a>(
    devices: &'a [DeviceIdentity],
    reference: &str,
) -> Option<&'a DeviceIdentity> {
    if let Ok(pos) = reference.parse::<usize>() {
        return pos.checked_sub(1).and_then(|i| devices.get(i));
    }

    devices
        .iter()
        .find(|d| d.id() == reference)
        .or_else(|| {
            devices
                .iter()
                .find(|d| d.canonical_name().eq_ignore_ascii_case(reference))
        })
        .or_else(|| {
            devices
                .iter()
                .find(|d| d.raw_name().eq_ignore_ascii_case(reference))
        })
}
