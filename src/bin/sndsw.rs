//! SNDSW binary entry point
//!
//! Dispatches to daemon mode or subcommands based on CLI arguments.

use clap::Parser;
use color_eyre::eyre::Result;
use sndsw::cli::{Args, Command};
use sndsw::cycler::Step;
use sndsw::{commands, config::Config, daemon, logging};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        // No subcommand - show status
        None => {
            logging::init_cli();
            commands::status(Config::load()?, false).await
        }

        // Daemon mode handles its own logging (file vs stderr)
        Some(Command::Daemon {
            foreground,
            detached,
        }) => {
            let config = Config::load()?;
            if foreground || detached {
                daemon::run(config, foreground).await
            } else {
                logging::init_cli();
                commands::spawn_background_daemon().await
            }
        }

        Some(Command::Status { json }) => {
            logging::init_cli();
            commands::status(Config::load()?, json).await
        }

        Some(Command::Shutdown) => {
            logging::init_cli();
            commands::shutdown().await
        }

        // Local commands (no daemon needed)
        Some(Command::ListDevices { direction, json }) => {
            logging::init_cli();
            commands::list_devices(&Config::load()?, direction, json)
        }

        Some(Command::Validate) => {
            logging::init_cli();
            Config::load()?.print_summary();
            Ok(())
        }

        // Hybrid commands (daemon if running, local otherwise)
        Some(Command::Next { direction }) => {
            logging::init_cli();
            commands::cycle(Config::load()?, direction, Step::Next).await
        }

        Some(Command::Prev { direction }) => {
            logging::init_cli();
            commands::cycle(Config::load()?, direction, Step::Prev).await
        }

        Some(Command::Set { device, direction }) => {
            logging::init_cli();
            commands::set_device(Config::load()?, direction, &device).await
        }

        Some(Command::Select { device, direction }) => {
            logging::init_cli();
            commands::select(Config::load()?, direction, &device).await
        }

        Some(Command::Unselect { device, direction }) => {
            logging::init_cli();
            commands::unselect(Config::load()?, direction, &device).await
        }

        Some(Command::Profile { name }) => {
            logging::init_cli();
            commands::profile(Config::load()?, &name).await
        }

        Some(Command::Trigger { condition }) => {
            logging::init_cli();
            commands::trigger(Config::load()?, condition.into()).await
        }
    }
}
