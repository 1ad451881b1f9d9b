//! Integration tests for config loading, validation, and persistence
//!
//! These tests verify the full lifecycle of config operations through TOML
//! serialization/deserialization, rather than constructing Config structs directly.

use pretty_assertions::assert_eq;
use sndsw::config::Config;
use sndsw::device::Direction;
use sndsw::profile::Condition;
use std::fs;
use tempfile::TempDir;

/// Helper to create a temporary config directory
fn setup_temp_config() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_dir = temp_dir.path().join("sndsw");
    fs::create_dir_all(&config_dir).expect("Failed to create config dir");
    let config_path = config_dir.join("config.toml");
    (temp_dir, config_path)
}

const FULL_CONFIG: &str = r#"
[settings]
change_communications = true
switch_on_plug = true
notify_daemon = false
notify_switch = true
log_level = "debug"
debounce_ms = 150

[hotkeys]
playback = "ctrl+alt+F11"
recording = "ctrl+alt+F7"

[[devices]]
raw_name = "Speakers (Realtek(R) Audio)"
id = "alsa_output.pci-0000_00_1f.3.analog-stereo"
direction = "playback"

[[devices]]
raw_name = "2- Headset (USB Audio)"
id = "alsa_output.usb-Generic_Headset-00.analog-stereo"
direction = "playback"
is_removable_bus = true

[[devices]]
raw_name = "Headset Mic (USB Audio)"
id = "alsa_input.usb-Generic_Headset-00.mono-fallback"
direction = "capture"
is_removable_bus = true

[[profiles]]
name = "Gaming"

[profiles.playback]
raw_name = "Headset (USB Audio)"
is_removable_bus = true

[profiles.recording]
raw_name = "Headset Mic (USB Audio)"
is_removable_bus = true

[[profiles.triggers]]
type = "hotkey"
keys = "ctrl+shift+G"

[[profiles.triggers]]
type = "window"
pattern = "(?i)big picture"

[[profiles.triggers]]
type = "steam"
"#;

#[test]
fn test_config_save_and_load_toml() {
    let (_temp, config_path) = setup_temp_config();
    fs::write(&config_path, FULL_CONFIG).expect("Failed to write TOML");

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");

    // Settings, with omitted keys falling back to defaults
    assert!(loaded.settings.change_communications);
    assert!(loaded.settings.switch_on_plug);
    assert!(!loaded.settings.notify_daemon);
    assert_eq!(loaded.settings.log_level, "debug");
    assert_eq!(loaded.settings.debounce_ms, 150);
    assert_eq!(loaded.settings.poll_interval_ms, 1000);

    assert_eq!(loaded.hotkeys.for_direction(Direction::Capture), Some("ctrl+alt+F7"));

    assert_eq!(loaded.devices.len(), 3);
    let selected = loaded.selected_devices();
    assert_eq!(selected[1].canonical_name(), "Headset (USB Audio)");
    assert!(selected[1].is_removable_bus());
    assert_eq!(selected[2].direction(), Direction::Capture);

    let gaming = loaded.profile("Gaming").expect("profile should load");
    assert_eq!(gaming.triggers.len(), 3);
    assert_eq!(gaming.hotkey(), Some("ctrl+shift+G"));
    assert!(gaming.triggers.iter().any(|t| t.matches(&Condition::Window {
        title: "Steam Big Picture Mode".to_string()
    })));

    // Save and reload: nothing is lost
    loaded.save_to(&config_path).expect("Failed to save");
    let reloaded = Config::load_from_path(&config_path).expect("Failed to reload");

    assert_eq!(reloaded.devices, loaded.devices);
    assert_eq!(reloaded.hotkeys, loaded.hotkeys);
    assert_eq!(reloaded.settings.debounce_ms, 150);
    let gaming = reloaded.profile("Gaming").expect("profile should survive save");
    assert_eq!(gaming.playback, loaded.profiles[0].playback);
    assert_eq!(gaming.triggers.len(), 3);
}

#[test]
fn test_config_file_permissions() {
    let (_temp, config_path) = setup_temp_config();

    let toml_content = r#"
[[devices]]
raw_name = "Speakers"
id = "spk"
direction = "playback"
"#;
    fs::write(&config_path, toml_content).expect("Failed to write TOML");

    // Load and save to trigger atomic write with proper permissions
    let config = Config::load_from_path(&config_path).expect("Failed to load");
    config.save_to(&config_path).expect("Failed to save");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(&config_path).expect("Failed to read metadata");
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "Config file should have 0o600 permissions after save");
    }

    let loaded = Config::load_from_path(&config_path).expect("Failed to load after save");
    assert_eq!(loaded.devices.len(), 1);
    assert_eq!(loaded.devices[0].raw_name, "Speakers");
}

#[test]
fn test_save_leaves_no_temp_files_behind() {
    let (temp, config_path) = setup_temp_config();

    Config::default().save_to(&config_path).expect("Failed to save");
    Config::default().save_to(&config_path).expect("Failed to save again");

    let entries: Vec<_> = fs::read_dir(temp.path().join("sndsw"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("config.toml")]);
}

#[test]
fn test_bad_device_record_does_not_block_the_rest() {
    let (_temp, config_path) = setup_temp_config();

    let toml_content = r#"
[[devices]]
raw_name = "Speakers"
direction = "playback"

[[devices]]
raw_name = "Broken"
direction = "sideways"

[[devices]]
direction = "capture"
"#;
    fs::write(&config_path, toml_content).expect("Failed to write TOML");

    let loaded = Config::load_from_path(&config_path).expect("bad records are skipped, not fatal");
    assert_eq!(loaded.devices.len(), 1);
    assert_eq!(loaded.devices[0].raw_name, "Speakers");
}

#[test]
fn test_duplicate_profile_names_rejected() {
    let (_temp, config_path) = setup_temp_config();

    let toml_content = r#"
[[profiles]]
name = "Music"
[profiles.playback]
raw_name = "Speakers"

[[profiles]]
name = "Music"
[profiles.playback]
raw_name = "Headphones"
"#;
    fs::write(&config_path, toml_content).expect("Failed to write TOML");

    let err = Config::load_from_path(&config_path).unwrap_err();
    let err_msg = format!("{err:?}");
    assert!(err_msg.contains("Music"), "Error should name the profile: {err_msg}");
}

#[test]
fn test_too_many_hotkey_triggers_rejected() {
    let (_temp, config_path) = setup_temp_config();

    let toml_content = r#"
[[profiles]]
name = "Movie"
[profiles.playback]
raw_name = "HDMI"

[[profiles.triggers]]
type = "hotkey"
keys = "ctrl+F1"

[[profiles.triggers]]
type = "hotkey"
keys = "ctrl+F2"
"#;
    fs::write(&config_path, toml_content).expect("Failed to write TOML");

    let err = Config::load_from_path(&config_path).unwrap_err();
    let err_msg = format!("{err:?}");
    assert!(err_msg.contains("hotkey"), "Error should name the trigger kind: {err_msg}");
}
