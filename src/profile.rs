//! Profiles and trigger matching
//!
//! A profile pairs a list of triggers with an optional playback and an
//! optional recording target. Whatever detects that a trigger is satisfied
//! (hotkey listener, window tracker, process monitor) reports a
//! [`Condition`]; [`ProfileTriggerMatcher`] picks the profile and makes its
//! targets default through the cycler's direct activation.
//!
//! Trigger counts per kind are limited (one hotkey per profile, for example).
//! The limit is checked when a profile is edited or loaded, never when a
//! profile is activated.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cycler::DeviceCycler;
use crate::device::{DeviceIdentity, Direction};
use crate::error::SwitchError;
use crate::events::{Event, EventBus};

// ============================================================================
// Triggers
// ============================================================================

/// Trigger type, used for per-profile occurrence limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    HotKey,
    Window,
    Process,
    Steam,
}

impl TriggerKind {
    /// How many triggers of this kind one profile may have (`None` = unlimited)
    #[must_use]
    pub const fn max_occurrence(self) -> Option<usize> {
        match self {
            Self::HotKey | Self::Steam => Some(1),
            Self::Window | Self::Process => None,
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HotKey => "hotkey",
            Self::Window => "window",
            Self::Process => "process",
            Self::Steam => "steam",
        })
    }
}

/// Condition that activates a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trigger {
    /// Key combination such as `"ctrl+alt+F9"`
    #[serde(rename = "hotkey")]
    HotKey { keys: String },
    /// Regex matched against the focused window title
    Window {
        #[serde(with = "serde_regex")]
        pattern: Regex,
    },
    /// Process name, compared case-insensitively
    Process { name: String },
    /// Steam Big Picture is running
    Steam,
}

impl Trigger {
    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::HotKey { .. } => TriggerKind::HotKey,
            Self::Window { .. } => TriggerKind::Window,
            Self::Process { .. } => TriggerKind::Process,
            Self::Steam => TriggerKind::Steam,
        }
    }

    #[must_use]
    pub fn matches(&self, condition: &Condition) -> bool {
        match (self, condition) {
            (Self::HotKey { keys }, Condition::HotKey { keys: pressed }) => {
                normalize_hotkey(keys) == normalize_hotkey(pressed)
            }
            (Self::Window { pattern }, Condition::Window { title }) => pattern.is_match(title),
            (Self::Process { name }, Condition::Process { name: running }) => {
                name.eq_ignore_ascii_case(running)
            }
            (Self::Steam, Condition::Steam) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HotKey { keys } => write!(f, "hotkey {keys}"),
            Self::Window { pattern } => write!(f, "window /{}/", pattern.as_str()),
            Self::Process { name } => write!(f, "process {name}"),
            Self::Steam => f.write_str("steam"),
        }
    }
}

/// Condition reported by a trigger detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    #[serde(rename = "hotkey")]
    HotKey { keys: String },
    Window { title: String },
    Process { name: String },
    Steam,
}

/// Canonical spelling of a key combination
///
/// Case, spaces and modifier order don't matter; common aliases are folded
/// (`control` -> `ctrl`, `meta`/`win`/`logo` -> `super`).
#[must_use]
pub fn normalize_hotkey(keys: &str) -> String {
    const MODIFIER_ORDER: [&str; 4] = ["ctrl", "alt", "shift", "super"];

    let mut parts: Vec<String> = keys
        .split('+')
        .map(|part| part.trim().to_ascii_lowercase())
        .filter(|part| !part.is_empty())
        .map(|part| match part.as_str() {
            "control" => "ctrl".to_string(),
            "meta" | "win" | "logo" | "mod4" => "super".to_string(),
            _ => part,
        })
        .collect();

    let key = parts.pop().unwrap_or_default();
    parts.sort_by_key(|m| {
        MODIFIER_ORDER
            .iter()
            .position(|o| o == m)
            .unwrap_or(MODIFIER_ORDER.len())
    });
    parts.dedup();
    parts.push(key);
    parts.join("+")
}

// ============================================================================
// Profiles
// ============================================================================

/// Device a profile switches to; its direction comes from the slot it sits in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileTarget {
    pub raw_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub is_removable_bus: bool,
}

impl ProfileTarget {
    #[must_use]
    pub fn identity(&self, direction: Direction) -> DeviceIdentity {
        DeviceIdentity::new(
            self.raw_name.clone(),
            self.id.clone(),
            direction,
            self.is_removable_bus,
        )
    }
}

impl From<&DeviceIdentity> for ProfileTarget {
    fn from(device: &DeviceIdentity) -> Self {
        Self {
            raw_name: device.raw_name().to_string(),
            id: device.id().to_string(),
            is_removable_bus: device.is_removable_bus(),
        }
    }
}

/// Rejected profile edit or invalid profile list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile '{profile}' already has {max} {kind} trigger(s)")]
    TooManyTriggers {
        profile: String,
        kind: TriggerKind,
        max: usize,
    },

    #[error("Duplicate profile name: '{0}'")]
    DuplicateName(String),

    #[error("Profile '{0}' has neither a playback nor a recording device")]
    NoTargets(String),

    #[error("Hotkey '{keys}' is bound by both {first} and {second}")]
    HotkeyConflict {
        keys: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback: Option<ProfileTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<ProfileTarget>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

impl Profile {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            playback: None,
            recording: None,
        }
    }

    /// Number of triggers of `kind`
    #[must_use]
    pub fn trigger_count(&self, kind: TriggerKind) -> usize {
        self.triggers.iter().filter(|t| t.kind() == kind).count()
    }

    /// Append a trigger, enforcing the per-kind limit
    ///
    /// # Errors
    /// Returns [`ProfileError::TooManyTriggers`] when the kind is at its limit.
    pub fn add_trigger(&mut self, trigger: Trigger) -> Result<(), ProfileError> {
        let kind = trigger.kind();
        if let Some(max) = kind.max_occurrence()
            && self.trigger_count(kind) >= max
        {
            return Err(ProfileError::TooManyTriggers {
                profile: self.name.clone(),
                kind,
                max,
            });
        }
        self.triggers.push(trigger);
        Ok(())
    }

    /// Target for one direction, as an identity
    #[must_use]
    pub fn target(&self, direction: Direction) -> Option<DeviceIdentity> {
        let slot = match direction {
            Direction::Playback => self.playback.as_ref(),
            Direction::Capture => self.recording.as_ref(),
        };
        slot.map(|t| t.identity(direction))
    }

    /// Structural checks for a profile that bypassed [`Profile::add_trigger`]
    ///
    /// # Errors
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.playback.is_none() && self.recording.is_none() {
            return Err(ProfileError::NoTargets(self.name.clone()));
        }

        let mut counts: HashMap<TriggerKind, usize> = HashMap::new();
        for trigger in &self.triggers {
            let kind = trigger.kind();
            let count = counts.entry(kind).or_default();
            *count += 1;
            if let Some(max) = kind.max_occurrence()
                && *count > max
            {
                return Err(ProfileError::TooManyTriggers {
                    profile: self.name.clone(),
                    kind,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Hotkey of this profile, if it has one
    #[must_use]
    pub fn hotkey(&self) -> Option<&str> {
        self.triggers.iter().find_map(|t| match t {
            Trigger::HotKey { keys } => Some(keys.as_str()),
            _ => None,
        })
    }
}

/// Validate a whole profile list
///
/// `reserved` holds hotkeys bound elsewhere as `(owner, keys)` pairs, e.g.
/// the cycle hotkeys; profile hotkeys must not collide with them or with
/// each other.
///
/// # Errors
/// Returns the first violated rule.
pub fn validate_profiles(
    profiles: &[Profile],
    reserved: &[(&str, &str)],
) -> Result<(), ProfileError> {
    let mut names = HashSet::with_capacity(profiles.len());
    for profile in profiles {
        if !names.insert(profile.name.as_str()) {
            return Err(ProfileError::DuplicateName(profile.name.clone()));
        }
        profile.validate()?;
    }

    let mut bound: HashMap<String, String> = HashMap::new();
    let profile_keys = profiles
        .iter()
        .filter_map(|p| Some((format!("profile '{}'", p.name), p.hotkey()?)));
    let reserved_keys = reserved.iter().map(|(owner, keys)| ((*owner).to_string(), *keys));

    for (owner, keys) in reserved_keys.chain(profile_keys) {
        let normalized = normalize_hotkey(keys);
        if let Some(first) = bound.get(&normalized) {
            return Err(ProfileError::HotkeyConflict {
                keys: keys.to_string(),
                first: first.clone(),
                second: owner,
            });
        }
        bound.insert(normalized, owner);
    }

    Ok(())
}

// ============================================================================
// Activation
// ============================================================================

/// Outcome of activating one profile, per direction
///
/// `None` means the profile has no target for that direction.
#[derive(Debug, Clone)]
pub struct ActivationReport {
    pub profile: String,
    pub playback: Option<Result<DeviceIdentity, SwitchError>>,
    pub recording: Option<Result<DeviceIdentity, SwitchError>>,
}

impl ActivationReport {
    /// Every configured target was activated
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &SwitchError> {
        [&self.playback, &self.recording]
            .into_iter()
            .filter_map(|r| r.as_ref()?.as_ref().err())
    }

    pub fn activated(&self) -> impl Iterator<Item = &DeviceIdentity> {
        [&self.playback, &self.recording]
            .into_iter()
            .filter_map(|r| r.as_ref()?.as_ref().ok())
    }
}

/// Maps conditions to profiles and activates them
pub struct ProfileTriggerMatcher {
    profiles: Vec<Profile>,
    cycler: Arc<DeviceCycler>,
    events: EventBus,
}

impl ProfileTriggerMatcher {
    #[must_use]
    pub fn new(profiles: Vec<Profile>, cycler: Arc<DeviceCycler>, events: EventBus) -> Self {
        Self {
            profiles,
            cycler,
            events,
        }
    }

    #[must_use]
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// First profile (in configuration order) with a trigger matching `condition`
    #[must_use]
    pub fn find(&self, condition: &Condition) -> Option<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.triggers.iter().any(|t| t.matches(condition)))
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Make the profile's targets default
    ///
    /// Both directions are attempted independently; a failure on one does not
    /// stop the other. The report is returned and published.
    pub fn activate(&self, profile: &Profile) -> ActivationReport {
        let attempt = |direction| {
            profile.target(direction).map(|target| {
                let result = self.cycler.set_as_default(&target);
                if let Err(ref e) = result {
                    warn!("Profile '{}': {}", profile.name, e);
                }
                result
            })
        };

        let report = ActivationReport {
            profile: profile.name.clone(),
            playback: attempt(Direction::Playback),
            recording: attempt(Direction::Capture),
        };

        if report.is_complete() {
            info!("Activated profile '{}'", profile.name);
        }
        self.events
            .publish(Event::ProfileActivated(report.clone()));
        report
    }

    /// Activate a profile by name; `None` if no such profile exists
    pub fn activate_by_name(&self, name: &str) -> Option<ActivationReport> {
        let profile = self.find_by_name(name)?;
        Some(self.activate(profile))
    }

    /// Activate the profile matching `condition`, if any
    pub fn on_condition(&self, condition: &Condition) -> Option<ActivationReport> {
        let Some(profile) = self.find(condition) else {
            debug!("No profile for {:?}", condition);
            return None;
        };
        Some(self.activate(profile))
    }
}
