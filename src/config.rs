//! Configuration management
//!
//! Handles loading, parsing, validating and saving the TOML configuration
//! file: settings, cycle hotkeys, the selected device set and profiles.

use color_eyre::eyre::{self, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::device::{DeviceIdentity, Direction, PersistedDevice};
use crate::error::SwitchError;
use crate::profile::{self, Profile};

// ============================================================================
// Public Configuration Types
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    pub settings: Settings,
    pub hotkeys: Hotkeys,
    pub devices: Vec<PersistedDevice>,
    pub profiles: Vec<Profile>,
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Also move the communications default when switching
    pub change_communications: bool,
    /// Make a selected device default as soon as it is plugged in
    pub switch_on_plug: bool,
    /// Notifications for daemon start/stop
    pub notify_daemon: bool,
    /// Notifications for switches (cycle, profile, plug)
    pub notify_switch: bool,
    pub log_level: String,
    /// Quiet period before a burst of device changes is acted on
    pub debounce_ms: u64,
    /// How often the device watcher polls the backend
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            change_communications: false,
            switch_on_plug: false,
            notify_daemon: true,
            notify_switch: true,
            log_level: "info".to_string(),
            debounce_ms: 200,
            poll_interval_ms: 1000,
        }
    }
}

/// Key combinations that cycle each direction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hotkeys {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<String>,
}

impl Hotkeys {
    /// Cycle hotkey for `direction`
    #[must_use]
    pub fn for_direction(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Playback => self.playback.as_deref(),
            Direction::Capture => self.recording.as_deref(),
        }
    }
}

// ============================================================================
// Config File Deserialization (TOML)
// ============================================================================

/// On-disk shape; device records stay raw so one bad entry can be skipped
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    hotkeys: Hotkeys,
    #[serde(default)]
    devices: Vec<toml::Value>,
    #[serde(default)]
    profiles: Vec<Profile>,
}

/// Parse persisted device records, skipping the ones that can't be used
fn parse_devices(records: Vec<toml::Value>) -> Vec<PersistedDevice> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| {
            let reason = match record.try_into::<PersistedDevice>() {
                Ok(device) if device.is_usable() => return Some(device),
                Ok(_) => "neither raw_name nor id is set".to_string(),
                Err(e) => e.message().trim().to_string(),
            };
            warn!(
                "{}",
                SwitchError::MalformedRecord {
                    index: i + 1,
                    reason,
                }
            );
            None
        })
        .collect()
}

// ============================================================================
// Config Implementation
// ============================================================================

impl Config {
    /// Load configuration from the default XDG config path
    ///
    /// Creates a commented default config on first run.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or fails validation.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            info!("Creating default config at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {path:?}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config: {path:?}"))
    }

    /// Parse and validate configuration text
    ///
    /// # Errors
    /// Returns an error on TOML syntax errors or failed validation.
    pub fn parse(contents: &str) -> Result<Self> {
        let config_file: ConfigFile =
            toml::from_str(contents).context("Failed to parse config TOML")?;

        let config = Self {
            settings: config_file.settings,
            hotkeys: config_file.hotkeys,
            devices: parse_devices(config_file.devices),
            profiles: config_file.profiles,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check settings, profiles and hotkey bindings
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        match self.settings.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => eyre::bail!(
                "Invalid log_level '{level}'. Must be: error, warn, info, debug, or trace"
            ),
        }

        if self.settings.poll_interval_ms == 0 {
            eyre::bail!("poll_interval_ms must be greater than 0");
        }

        if let (Some(playback), Some(recording)) = (&self.hotkeys.playback, &self.hotkeys.recording)
            && profile::normalize_hotkey(playback) == profile::normalize_hotkey(recording)
        {
            eyre::bail!("Hotkey '{playback}' is bound to both playback and recording cycling");
        }

        let reserved: Vec<(&str, &str)> = Direction::ALL
            .iter()
            .filter_map(|&d| {
                let owner = match d {
                    Direction::Playback => "the playback cycle",
                    Direction::Capture => "the recording cycle",
                };
                Some((owner, self.hotkeys.for_direction(d)?))
            })
            .collect();
        profile::validate_profiles(&self.profiles, &reserved)?;

        Ok(())
    }

    /// Selected devices as identities
    #[must_use]
    pub fn selected_devices(&self) -> Vec<DeviceIdentity> {
        self.devices.iter().cloned().map(DeviceIdentity::from).collect()
    }

    /// Write the configuration atomically with owner-only permissions
    ///
    /// Writes to a temporary file in the same directory and renames it over
    /// `path`, so readers never see a half-written file.
    ///
    /// # Errors
    /// Returns an error if serialization or any filesystem step fails.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("Failed to create config dir: {dir:?}"))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {dir:?}"))?;
        tmp.write_all(contents.as_bytes())
            .context("Failed to write config")?;
        tmp.as_file().sync_all().context("Failed to sync config")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))
                .context("Failed to set config permissions")?;
        }

        tmp.persist(path)
            .with_context(|| format!("Failed to replace config: {path:?}"))?;
        Ok(())
    }

    /// Get the XDG config path for sndsw
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined or created.
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre::eyre!("Could not determine config directory"))?
            .join("sndsw");
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config dir: {config_dir:?}"))?;
        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<()> {
        let default_config = r#"# sndsw (Sound Switcher) Configuration
#
# Cycles the default audio device among the devices you selected,
# by hotkey, when a device is plugged in, or per-application profile.

[settings]
change_communications = false  # Also switch the communications (voice chat) default
switch_on_plug = false         # Make a selected device default when it is plugged in
notify_daemon = true           # Notifications for daemon start/stop
notify_switch = true           # Notifications for device switches
log_level = "info"             # error, warn, info, debug, trace
debounce_ms = 200              # Quiet period before reacting to device changes
poll_interval_ms = 1000        # How often to check for device changes

# Cycle hotkeys, reported by your hotkey daemon via:
#   sndsw trigger hotkey "ctrl+alt+F11"
[hotkeys]
# playback = "ctrl+alt+F11"
# recording = "ctrl+alt+F7"

# Selected devices (cycling candidates)
# Manage with 'sndsw select <device>' and 'sndsw unselect <device>';
# list devices with 'sndsw list-devices'.
#
# [[devices]]
# raw_name = "Built-in Audio Analog Stereo"
# id = "alsa_output.pci-0000_00_1f.3.analog-stereo"
# direction = "playback"
# is_removable_bus = false

# Profiles
# Trigger types: hotkey (max 1), window (regex on title), process, steam (max 1)
#
# [[profiles]]
# name = "Gaming"
#
# [profiles.playback]
# raw_name = "Headset (USB Audio)"
# is_removable_bus = true
#
# [[profiles.triggers]]
# type = "process"
# name = "steam"
#
# [[profiles.triggers]]
# type = "window"
# pattern = "(?i)big picture"
"#;
        fs::write(path, default_config)
            .with_context(|| format!("Failed to write config: {path:?}"))?;

        // Inform user that we created the config
        eprintln!("Created default config at: {path:?}");
        eprintln!();
        eprintln!("Next steps:");
        eprintln!("  1. Run 'sndsw list-devices' to see available audio devices");
        eprintln!("  2. Run 'sndsw select <device>' for each device to cycle through");
        eprintln!("  3. Run 'sndsw validate' to check your config");
        eprintln!("  4. Run 'sndsw daemon' to start");
        eprintln!();

        Ok(())
    }

    /// Print a human-readable summary of the configuration
    pub fn print_summary(&self) {
        println!("✓ Configuration valid\n");

        println!("Settings:");
        println!("  change_communications: {}", self.settings.change_communications);
        println!("  switch_on_plug: {}", self.settings.switch_on_plug);
        println!("  notify_daemon: {}", self.settings.notify_daemon);
        println!("  notify_switch: {}", self.settings.notify_switch);
        println!("  log_level: {}", self.settings.log_level);
        println!("  debounce_ms: {}", self.settings.debounce_ms);
        println!("  poll_interval_ms: {}", self.settings.poll_interval_ms);

        println!("\nHotkeys:");
        for direction in Direction::ALL {
            println!(
                "  {}: {}",
                direction,
                self.hotkeys.for_direction(direction).unwrap_or("(none)")
            );
        }

        for direction in Direction::ALL {
            let mut selected: Vec<DeviceIdentity> = self
                .selected_devices()
                .into_iter()
                .filter(|d| d.direction() == direction)
                .collect();
            selected.sort_by(DeviceIdentity::display_cmp);

            println!("\nSelected {} devices ({}):", direction, selected.len());
            for (i, device) in selected.iter().enumerate() {
                let usb = if device.is_removable_bus() { " [removable]" } else { "" };
                println!("  {}. {}{}", i + 1, device, usb);
                if !device.id().is_empty() {
                    println!("     id: {}", device.id());
                }
            }
        }

        if self.profiles.is_empty() {
            println!("\nNo profiles configured.");
        } else {
            println!("\nProfiles ({}):", self.profiles.len());
            for (i, profile) in self.profiles.iter().enumerate() {
                println!("  {}. {}", i + 1, profile.name);
                for direction in Direction::ALL {
                    if let Some(target) = profile.target(direction) {
                        println!("     {direction}: {target}");
                    }
                }
                for trigger in &profile.triggers {
                    println!("     trigger: {trigger}");
                }
            }
        }

        if let Ok(path) = Self::get_config_path() {
            println!("\nConfig: {path:?}");
        }
    }

    /// Find a profile by name
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}
