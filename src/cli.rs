//! Command-line interface definitions
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Parser, Subcommand};

use crate::device::Direction;
use crate::profile::Condition;

/// SNDSW - Sound Switcher
///
/// Cycle the default audio device among the devices you selected.
#[derive(Parser)]
#[command(name = "sndsw")]
#[command(version)]
#[command(about = "Sound Switcher - Cycle the default audio device among selected devices")]
#[command(after_help = "\
BEHAVIOR:
  - Only devices you select take part in cycling; unselected devices are skipped
  - Cycling wraps around and skips selected devices that are not connected
  - A USB/Bluetooth device that comes back with a new id is still recognized by name
  - Profiles switch playback and recording together, by hotkey, window, process or Steam
  - With switch_on_plug, a selected device becomes default as soon as it is plugged in

DAEMON MANAGEMENT:
  sndsw daemon               Run the daemon in background (detached)
  sndsw daemon --foreground  Run in foreground with logs to stderr
  sndsw status               Show defaults, selection and daemon status (or just: sndsw)
  sndsw shutdown             Gracefully stop the daemon

DEVICE COMMANDS:
  sndsw list-devices         List connected devices (numbered per direction)
  sndsw select 2             Add device #2 to the cycle
  sndsw unselect 'USB Audio' Remove a device from the cycle
  sndsw next / sndsw prev    Cycle the default (use -d capture for recording)
  sndsw set 'Speakers'       Make a device default right away

PROFILES AND HOTKEYS:
  sndsw profile Gaming             Activate a profile by name
  sndsw trigger hotkey ctrl+F11    Report a hotkey press from your hotkey daemon
  sndsw trigger window 'Title'     Report the focused window title

  Commands go through the daemon when it is running, otherwise they run
  directly against PipeWire and edit the config file.

IPC SOCKET:
  $XDG_RUNTIME_DIR/sndsw.sock (or /tmp/sndsw.sock)

PIPEWIRE INTEGRATION:
  Uses pw-dump for JSON queries and pw-metadata for setting defaults.
  Device references are a list position, a node name, or a device name.")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the daemon (watches devices, answers hotkeys and profile triggers)
    Daemon {
        /// Run in foreground with logs to stderr
        #[arg(short, long)]
        foreground: bool,

        /// Already detached from the terminal (set when the daemon re-spawns itself)
        #[arg(long, hide = true)]
        detached: bool,
    },

    /// Show current defaults, selected devices and daemon status
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Gracefully shutdown the daemon
    Shutdown,

    /// List connected audio devices
    ListDevices {
        /// Only list one direction (playback or capture)
        #[arg(short, long)]
        direction: Option<Direction>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Switch to the next selected device
    Next {
        #[arg(short, long, default_value = "playback")]
        direction: Direction,
    },

    /// Switch to the previous selected device
    Prev {
        #[arg(short, long, default_value = "playback")]
        direction: Direction,
    },

    /// Make a device default (position, node name or device name)
    Set {
        device: String,

        #[arg(short, long, default_value = "playback")]
        direction: Direction,
    },

    /// Add a connected device to the cycle
    Select {
        /// Position in 'list-devices', node name or device name
        device: String,

        #[arg(short, long, default_value = "playback")]
        direction: Direction,
    },

    /// Remove a device from the cycle
    Unselect {
        /// Position in the selected list ('status'), node name or device name
        device: String,

        #[arg(short, long, default_value = "playback")]
        direction: Direction,
    },

    /// Activate a profile by name
    Profile { name: String },

    /// Report a trigger condition (for hotkey daemons and window watchers)
    Trigger {
        #[command(subcommand)]
        condition: TriggerCommand,
    },

    /// Validate config file (local, no daemon needed)
    Validate,
}

/// Conditions that can be reported with `sndsw trigger`
#[derive(Subcommand)]
pub enum TriggerCommand {
    /// A key combination was pressed (e.g. "ctrl+alt+F11")
    Hotkey { keys: String },
    /// A window with this title gained focus
    Window { title: String },
    /// A process started
    Process { name: String },
    /// Steam Big Picture started
    Steam,
}

impl From<TriggerCommand> for Condition {
    fn from(command: TriggerCommand) -> Self {
        match command {
            TriggerCommand::Hotkey { keys } => Self::HotKey { keys },
            TriggerCommand::Window { title } => Self::Window { title },
            TriggerCommand::Process { name } => Self::Process { name },
            TriggerCommand::Steam => Self::Steam,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_direction_flag_accepts_aliases() {
        let args = Args::try_parse_from(["sndsw", "next", "-d", "recording"]).unwrap();
        match args.command {
            Some(Command::Next { direction }) => assert_eq!(direction, Direction::Capture),
            _ => panic!("expected next"),
        }
    }

    #[test]
    fn test_trigger_subcommand_builds_condition() {
        let args = Args::try_parse_from(["sndsw", "trigger", "hotkey", "ctrl+F11"]).unwrap();
        match args.command {
            Some(Command::Trigger { condition }) => assert_eq!(
                Condition::from(condition),
                Condition::HotKey {
                    keys: "ctrl+F11".to_string()
                }
            ),
            _ => panic!("expected trigger"),
        }
    }
}
