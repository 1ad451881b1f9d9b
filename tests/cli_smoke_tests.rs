//! CLI smoke tests - verify basic command-line interface functionality
//!
//! These tests run the actual compiled binary to ensure:
//! - Help and version flags work
//! - Commands parse correctly
//! - Error messages are helpful

use std::process::Command;
use tempfile::TempDir;

/// Helper to get the path to the compiled sndsw binary
fn sndsw_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sndsw"))
}

#[test]
fn cli_help_works() {
    let output = sndsw_bin()
        .arg("--help")
        .output()
        .expect("Failed to run sndsw --help");

    assert!(output.status.success(), "sndsw --help should exit successfully");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Help should show usage");
    assert!(stdout.contains("daemon"), "Help should list daemon command");
    assert!(stdout.contains("status"), "Help should list status command");
    assert!(stdout.contains("list-devices"), "Help should list list-devices command");
    assert!(stdout.contains("trigger"), "Help should list trigger command");
    assert!(!stdout.contains("--detached"), "Internal flag should stay hidden");
}

#[test]
fn cli_version_works() {
    let output = sndsw_bin()
        .arg("--version")
        .output()
        .expect("Failed to run sndsw --version");

    assert!(output.status.success(), "sndsw --version should exit successfully");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sndsw"), "Version should mention sndsw");
    assert!(
        stdout.split_whitespace().count() >= 2,
        "Version should show name and version number"
    );
}

#[test]
fn cli_validate_creates_default_config_without_daemon() {
    let home = TempDir::new().expect("Failed to create temp dir");

    let output = sndsw_bin()
        .arg("validate")
        .env("XDG_CONFIG_HOME", home.path())
        .output()
        .expect("Failed to run sndsw validate");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "validate should succeed on the default config");
    assert!(stdout.contains("Configuration valid"), "got: {stdout}");
    assert!(home.path().join("sndsw").join("config.toml").exists());
}

#[test]
fn cli_validate_reports_bad_config() {
    let home = TempDir::new().expect("Failed to create temp dir");
    let dir = home.path().join("sndsw");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "[settings]\nlog_level = \"loud\"\n").unwrap();

    let output = sndsw_bin()
        .arg("validate")
        .env("XDG_CONFIG_HOME", home.path())
        .output()
        .expect("Failed to run sndsw validate");

    assert!(!output.status.success(), "invalid config should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("log_level"), "error should name the setting: {stderr}");
}

#[test]
fn cli_invalid_command_shows_error() {
    let output = sndsw_bin()
        .arg("nonexistent-command")
        .output()
        .expect("Failed to run sndsw with invalid command");

    assert!(!output.status.success(), "Invalid command should fail with non-zero exit");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unrecognized")
            || stderr.contains("unexpected")
            || stderr.contains("error"),
        "Should show error for invalid command"
    );
}

#[test]
fn cli_invalid_direction_is_rejected() {
    let output = sndsw_bin()
        .args(["next", "--direction", "sideways"])
        .output()
        .expect("Failed to run sndsw next");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sideways"), "got: {stderr}");
}
