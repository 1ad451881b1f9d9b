//! CLI commands
//!
//! `list-devices` and `validate` are local. Everything that changes a
//! default or the selection goes to the daemon when one is running, and
//! otherwise runs against a core built on the spot (selection changes are
//! then saved to the config file directly).

use color_eyre::eyre::{self, Result};
use crossterm::style::Stylize;
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::backend::{AudioBackend, PipeWireBackend};
use crate::config::Config;
use crate::context::AppContext;
use crate::cycler::Step;
use crate::daemon;
use crate::device::{DeviceIdentity, Direction};
use crate::ipc::{self, DeviceInfo, ProfileOutcome, Request, Response};
use crate::notification::{device_icon, send_notification};
use crate::profile::Condition;
use crate::style::SndswStyle;

// ============================================================================
// Dispatch
// ============================================================================

/// Send `request` to the daemon, or carry it out locally when none is running
async fn dispatch(config: Config, request: Request) -> Result<Response> {
    if ipc::is_daemon_running().await {
        debug!("Sending {:?} to daemon", request);
        return ipc::send_request(request).await;
    }

    debug!("No daemon running, handling {:?} locally", request);
    PipeWireBackend::validate_tools()?;

    let notify_switch = config.settings.notify_switch;
    let persists = matches!(request, Request::Select { .. } | Request::Unselect { .. });
    let ctx = AppContext::new(config, Arc::new(PipeWireBackend::new()), Handle::current());

    let (ctx, response) = tokio::task::spawn_blocking(move || {
        let response = daemon::execute(&ctx, request, 0);
        (ctx, response)
    })
    .await?;

    if persists && matches!(response, Response::Ok { .. }) {
        let path = Config::get_config_path()?;
        ctx.persist(&path)?;
    }
    ctx.shutdown();

    if notify_switch {
        notify_response(&response);
    }
    Ok(response)
}

/// Notification for a switch made without the daemon
fn notify_response(response: &Response) {
    let (summary, body, icon) = match response {
        Response::Switched { device } => {
            let identity = identity_of(device);
            (
                format!("Default {} device", device.direction),
                device.name.clone(),
                device_icon(&identity),
            )
        }
        Response::Profile(outcome) => {
            let mut lines: Vec<String> = outcome.activated.iter().map(|d| d.name.clone()).collect();
            lines.extend(outcome.errors.iter().cloned());
            let icon = if outcome.errors.is_empty() {
                outcome
                    .activated
                    .first()
                    .map_or("audio-card", |d| device_icon(&identity_of(d)))
            } else {
                "dialog-warning"
            };
            (format!("Profile: {}", outcome.profile), lines.join("\n"), icon)
        }
        _ => return,
    };

    if let Err(e) = send_notification(&summary, &body, Some(icon)) {
        warn!("Notification failed: {:#}", e);
    }
}

fn identity_of(device: &DeviceInfo) -> DeviceIdentity {
    DeviceIdentity::new(
        device.name.clone(),
        device.id.clone(),
        device.direction,
        device.removable,
    )
}

/// Print the outcome of a switching request
fn report(response: Response) -> Result<()> {
    match response {
        Response::Switched { device } => {
            println!(
                "{} {}",
                "Switched to:".success(),
                device.name.as_str().bold()
            );
            println!("    {}", device.id.as_str().secondary());
            Ok(())
        }
        Response::Profile(outcome) => print_profile_outcome(&outcome),
        Response::Ok { message } => {
            println!("{}", message.success());
            Ok(())
        }
        Response::Error { message } => eyre::bail!("{message}"),
        Response::Status { .. } => eyre::bail!("Unexpected response from daemon"),
    }
}

fn print_profile_outcome(outcome: &ProfileOutcome) -> Result<()> {
    println!("{} {}", "Profile:".header(), outcome.profile.as_str().bold());
    for device in &outcome.activated {
        println!(
            "  {} {}: {}",
            "✓".success(),
            device.direction.as_str().secondary(),
            device.name
        );
    }
    for error in &outcome.errors {
        println!("  {} {}", "✗".error(), error.as_str().error());
    }

    if outcome.activated.is_empty() && !outcome.errors.is_empty() {
        eyre::bail!("Profile '{}' could not be activated", outcome.profile);
    }
    Ok(())
}

// ============================================================================
// Local Commands (no daemon needed)
// ============================================================================

#[derive(Serialize)]
struct DeviceListEntry {
    index: usize,
    #[serde(flatten)]
    device: DeviceInfo,
    raw_name: String,
    is_default: bool,
    selected: bool,
}

/// List connected devices per direction, numbered as `select`/`set` expect
///
/// # Errors
/// Returns an error if `PipeWire` cannot be queried or JSON serialization fails.
pub fn list_devices(
    config: &Config,
    direction: Option<Direction>,
    json_output: bool,
) -> Result<()> {
    PipeWireBackend::validate_tools()?;
    let backend = PipeWireBackend::new();
    let selected = config.selected_devices();

    let directions: Vec<Direction> = direction.map_or_else(|| Direction::ALL.to_vec(), |d| vec![d]);

    let mut entries = Vec::new();
    for direction in directions.iter().copied() {
        let default_id = backend.default_endpoint(direction)?;
        for (i, device) in backend.identities(direction)?.into_iter().enumerate() {
            entries.push(DeviceListEntry {
                index: i + 1,
                device: DeviceInfo::from(&device),
                raw_name: device.raw_name().to_string(),
                is_default: default_id.as_deref() == Some(device.id()),
                selected: selected.iter().any(|s| *s == device),
            });
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (n, direction) in directions.iter().enumerate() {
        if n > 0 {
            println!();
        }
        let header = format!("{} DEVICES:", direction.as_str().to_uppercase());
        println!("{}", header.as_str().header());
        println!("{}", "-".repeat(header.len()));

        let mut any = false;
        for entry in entries.iter().filter(|e| e.device.direction == *direction) {
            any = true;
            let marker = if entry.is_default { "*" } else { " " };
            let selected_tag = if entry.selected {
                format!(" [{}]", "selected".success())
            } else {
                String::new()
            };
            let removable = if entry.device.removable {
                format!(" {}", "(removable)".secondary())
            } else {
                String::new()
            };
            println!(
                "{} {}. {}{}{}",
                marker,
                entry.index.to_string().secondary(),
                entry.device.name.as_str().bold(),
                selected_tag,
                removable
            );
            println!("     {}", entry.device.id.as_str().technical());
        }
        if !any {
            println!("  {}", "(none)".secondary());
        }
    }
    println!("\n  {} = current default", "*".secondary());

    if let Ok(path) = Config::get_config_path() {
        println!("\n{} {}", "Config:".secondary(), path.display());
    }
    Ok(())
}

// ============================================================================
// Switching Commands (daemon if running, local otherwise)
// ============================================================================

/// Switch to the next or previous selected device
///
/// # Errors
/// Returns an error if nothing can be selected or the switch fails.
pub async fn cycle(config: Config, direction: Direction, step: Step) -> Result<()> {
    report(dispatch(config, Request::Cycle { direction, step }).await?)
}

/// Make a specific device default
///
/// # Errors
/// Returns an error if the reference matches no connected device or the switch fails.
pub async fn set_device(config: Config, direction: Direction, device: &str) -> Result<()> {
    report(
        dispatch(
            config,
            Request::SetDevice {
                direction,
                device: device.to_string(),
            },
        )
        .await?,
    )
}

/// Add a connected device to the selection
///
/// # Errors
/// Returns an error if the reference matches no connected device or the config can't be saved.
pub async fn select(config: Config, direction: Direction, device: &str) -> Result<()> {
    report(
        dispatch(
            config,
            Request::Select {
                direction,
                device: device.to_string(),
            },
        )
        .await?,
    )
}

/// Remove a device from the selection
///
/// # Errors
/// Returns an error if the reference matches no selected device or the config can't be saved.
pub async fn unselect(config: Config, direction: Direction, device: &str) -> Result<()> {
    report(
        dispatch(
            config,
            Request::Unselect {
                direction,
                device: device.to_string(),
            },
        )
        .await?,
    )
}

/// Activate a profile by name
///
/// # Errors
/// Returns an error if the profile doesn't exist or none of its devices could be activated.
pub async fn profile(config: Config, name: &str) -> Result<()> {
    report(
        dispatch(
            config,
            Request::ActivateProfile {
                name: name.to_string(),
            },
        )
        .await?,
    )
}

/// Report a trigger condition
///
/// # Errors
/// Returns an error if the bound action fails.
pub async fn trigger(config: Config, condition: Condition) -> Result<()> {
    report(dispatch(config, Request::Trigger { condition }).await?)
}

/// Format uptime in human-readable form
fn format_uptime(secs: u64) -> String {
    const SECS_PER_MINUTE: u64 = 60;
    const SECS_PER_HOUR: u64 = 3600;

    if secs < SECS_PER_MINUTE {
        return format!("{secs}s");
    }
    if secs < SECS_PER_HOUR {
        return format!("{mins}m", mins = secs / SECS_PER_MINUTE);
    }
    let hours = secs / SECS_PER_HOUR;
    let mins = (secs % SECS_PER_HOUR) / SECS_PER_MINUTE;
    if mins > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{hours}h")
    }
}

/// Show current defaults, the selection and daemon status
///
/// Works with or without a daemon; without one, defaults come straight
/// from `PipeWire` and the selection from the config file.
///
/// # Errors
/// Returns an error if `PipeWire` cannot be queried or JSON serialization fails.
pub async fn status(config: Config, json_output: bool) -> Result<()> {
    let daemon_running = ipc::is_daemon_running().await;
    let response = dispatch(config, Request::Status).await?;

    let (version, uptime_secs, defaults, selected) = match response {
        Response::Status {
            version,
            uptime_secs,
            defaults,
            selected,
        } => (version, uptime_secs, defaults, selected),
        other => return report(other),
    };

    if json_output {
        let daemon_json = if daemon_running {
            serde_json::json!({
                "running": true,
                "version": version,
                "uptime_secs": uptime_secs,
                "uptime_human": format_uptime(uptime_secs),
            })
        } else {
            serde_json::json!({ "running": false })
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "defaults": defaults,
                "selected": selected,
                "daemon": daemon_json,
            }))?
        );
        return Ok(());
    }

    println!("{}", "Default Devices".header());
    println!("{}", "-".repeat(15));
    for direction in Direction::ALL {
        let label = format!("{direction}:");
        match defaults.iter().find(|d| d.direction == direction) {
            Some(device) => println!(
                "{:<10} {}",
                label.as_str().secondary(),
                device.name.as_str().bold()
            ),
            None => println!("{:<10} {}", label.as_str().secondary(), "(none)".secondary()),
        }
    }

    for direction in Direction::ALL {
        let in_direction: Vec<&DeviceInfo> =
            selected.iter().filter(|d| d.direction == direction).collect();
        let header = format!("Selected {direction} ({})", in_direction.len());
        println!("\n{}", header.as_str().header());
        println!("{}", "-".repeat(header.len()));
        if in_direction.is_empty() {
            println!(
                "  {} {}",
                "(none) add with:".secondary(),
                format!("sndsw select <device> -d {direction}").technical()
            );
        }
        for (i, device) in in_direction.iter().enumerate() {
            let is_default = defaults.iter().any(|d| d.direction == direction && d.id == device.id);
            let marker = if is_default { "*" } else { " " };
            println!(
                "{} {}. {}",
                marker,
                (i + 1).to_string().secondary(),
                device.name
            );
        }
    }

    println!("\n{}", "Daemon".header());
    println!("{}", "-".repeat(6));
    if daemon_running {
        println!(
            "{} {}",
            "Status:".secondary(),
            format!("Running (uptime: {})", format_uptime(uptime_secs)).success()
        );
        println!("{} {}", "Version:".secondary(), version);
    } else {
        println!("{} {}", "Status:".secondary(), "Not running".error());
        println!("  Start with: {}", "sndsw daemon".technical());
    }

    Ok(())
}

// ============================================================================
// Daemon-only Commands
// ============================================================================

/// Gracefully shutdown the daemon
///
/// # Errors
/// Returns an error if no daemon is running or IPC communication fails.
pub async fn shutdown() -> Result<()> {
    if !ipc::is_daemon_running().await {
        eyre::bail!("Daemon is not running");
    }

    match ipc::send_request(Request::Shutdown).await? {
        Response::Ok { message } => {
            println!("{}", message.success());
            Ok(())
        }
        Response::Error { message } => eyre::bail!("Error: {message}"),
        _ => eyre::bail!("Unexpected response from daemon"),
    }
}

/// Start the daemon in the background
///
/// Re-executes this binary as `daemon --detached` with stdio detached,
/// then waits briefly for its socket to answer.
///
/// # Errors
/// Returns an error if a daemon is already running or the child can't be spawned.
pub async fn spawn_background_daemon() -> Result<()> {
    use std::process::{Command, Stdio};

    if ipc::is_daemon_running().await {
        eyre::bail!("Daemon is already running");
    }

    let exe = std::env::current_exe()?;
    let child = Command::new(exe)
        .args(["daemon", "--detached"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    for _ in 0..20 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if ipc::is_daemon_running().await {
            println!(
                "{} (pid {})",
                "Daemon started".success(),
                child.id().to_string().technical()
            );
            return Ok(());
        }
    }

    eyre::bail!("Daemon did not come up. Run 'sndsw daemon --foreground' to see why")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0 => "0s")]
    #[test_case(59 => "59s")]
    #[test_case(60 => "1m")]
    #[test_case(3600 => "1h")]
    #[test_case(3660 => "1h 1m")]
    fn test_format_uptime(secs: u64) -> String {
        format_uptime(secs)
    }

    #[test]
    fn test_report_error_becomes_err() {
        let err = report(Response::Error {
            message: "No playback devices to select.".to_string(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("No playback devices"));
    }

    #[test]
    fn test_profile_with_only_errors_fails() {
        let outcome = ProfileOutcome {
            profile: "Gaming".to_string(),
            activated: Vec::new(),
            errors: vec!["capture device 'Headset' is not connected".to_string()],
        };
        assert!(print_profile_outcome(&outcome).is_err());

        let partial = ProfileOutcome {
            activated: vec![DeviceInfo {
                direction: Direction::Playback,
                name: "Speakers".to_string(),
                id: "spk".to_string(),
                removable: false,
            }],
            ..outcome
        };
        assert!(print_profile_outcome(&partial).is_ok());
    }
}
