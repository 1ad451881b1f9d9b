//! Desktop notifications
//!
//! Sends notifications via notify-rust, with icons picked from `FreeDesktop`
//! standard names by device kind.

use color_eyre::eyre::{Context, Result};
use notify_rust::Notification;

use crate::device::{DeviceIdentity, Direction};
use crate::events::Event;
use crate::profile::ActivationReport;

/// Send a desktop notification
///
/// # Errors
/// Returns an error if the notification cannot be sent (e.g., no notification daemon running).
pub fn send_notification(summary: &str, body: &str, icon: Option<&str>) -> Result<()> {
    let icon = icon.unwrap_or("audio-card");

    Notification::new()
        .summary(summary)
        .body(body)
        .appname("sndsw")
        .icon(icon)
        .timeout(3000)
        .show()
        .context("Failed to show notification")?;

    Ok(())
}

/// `FreeDesktop` icon name for a device, guessed from its name and direction
#[must_use]
pub fn device_icon(device: &DeviceIdentity) -> &'static str {
    let name = device.canonical_name().to_lowercase();
    let id = device.id().to_lowercase();

    if device.direction() == Direction::Capture {
        return if name.contains("headset") || id.starts_with("bluez") {
            "audio-headset"
        } else {
            "audio-input-microphone"
        };
    }

    if name.contains("hdmi")
        || name.contains("displayport")
        || name.contains("tv")
        || id.contains("hdmi")
    {
        "video-display"
    } else if name.contains("headphone")
        || name.contains("headset")
        || name.contains("bluetooth")
        || id.starts_with("bluez")
    {
        "audio-headphones"
    } else {
        // Default for speakers, optical, digital, etc.
        "audio-speakers"
    }
}

/// Summary, body and icon for an event worth a notification
///
/// Selection changes are bookkeeping and produce nothing.
#[must_use]
pub fn describe_event(event: &Event) -> Option<(String, String, &'static str)> {
    match event {
        Event::DefaultChanged {
            direction,
            device: Some(device),
        } => Some((
            format!("Default {direction} device"),
            device.to_string(),
            device_icon(device),
        )),
        Event::NoDevices { direction } => Some((
            format!("No {direction} devices"),
            format!("None of the selected {direction} devices is connected"),
            "dialog-warning",
        )),
        Event::ProfileActivated(report) => Some(describe_report(report)),
        Event::DefaultChanged { device: None, .. } | Event::SelectionChanged { .. } => None,
    }
}

fn describe_report(report: &ActivationReport) -> (String, String, &'static str) {
    let mut lines: Vec<String> = report.activated().map(ToString::to_string).collect();
    lines.extend(report.errors().map(ToString::to_string));

    let icon = if report.is_complete() {
        report.activated().next().map_or("audio-card", device_icon)
    } else {
        "dialog-warning"
    };
    (format!("Profile: {}", report.profile), lines.join("\n"), icon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwitchError;
    use test_case::test_case;

    #[test_case("HDMI Output (HDA NVidia)", "alsa_output.pci.hdmi-stereo", Direction::Playback => "video-display" ; "hdmi")]
    #[test_case("Headphones (USB Audio)", "alsa_output.usb", Direction::Playback => "audio-headphones" ; "headphones")]
    #[test_case("WH-1000XM4", "bluez_output.AA_BB.1", Direction::Playback => "audio-headphones" ; "bluetooth by id")]
    #[test_case("Speakers (Realtek)", "alsa_output.pci.analog", Direction::Playback => "audio-speakers" ; "speakers")]
    #[test_case("Headset Mic (USB)", "alsa_input.usb", Direction::Capture => "audio-headset" ; "headset mic")]
    #[test_case("Line In (Realtek)", "alsa_input.pci", Direction::Capture => "audio-input-microphone" ; "generic input")]
    fn test_device_icon(name: &str, id: &str, direction: Direction) -> &'static str {
        device_icon(&DeviceIdentity::new(name, id, direction, false))
    }

    #[test]
    fn test_selection_changes_are_silent() {
        let event = Event::SelectionChanged {
            direction: Direction::Playback,
            devices: Vec::new(),
        };
        assert!(describe_event(&event).is_none());
    }

    #[test]
    fn test_partial_profile_uses_warning_icon() {
        let report = ActivationReport {
            profile: "Gaming".to_string(),
            playback: Some(Ok(DeviceIdentity::new(
                "Speakers (Realtek)",
                "spk",
                Direction::Playback,
                false,
            ))),
            recording: Some(Err(SwitchError::DeviceNotFound {
                direction: Direction::Capture,
                name: "Headset Mic (USB)".to_string(),
            })),
        };

        let (summary, body, icon) = describe_event(&Event::ProfileActivated(report)).unwrap();
        assert_eq!(summary, "Profile: Gaming");
        assert!(body.contains("Speakers (Realtek)"));
        assert!(body.contains("not connected"));
        assert_eq!(icon, "dialog-warning");
    }
}
