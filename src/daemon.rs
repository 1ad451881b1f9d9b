//! Daemon mode
//!
//! Runs the main event loop: device changes from the watcher, IPC requests
//! from the CLI (and hotkey daemons via `sndsw trigger`), and shutdown
//! signals. A subscriber task turns core events into notifications and
//! persists selection changes.

use color_eyre::eyre::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::signal;
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::backend::{AudioBackend, PipeWireBackend};
use crate::config::Config;
use crate::context::{AppContext, ConditionOutcome};
use crate::device::{self, DeviceIdentity, Direction};
use crate::events::Event;
use crate::ipc::{self, DeviceInfo, IpcServer, ProfileOutcome, Request, Response};
use crate::logging;
use crate::notification::{describe_event, send_notification};
use crate::watcher;

/// Run the daemon against `PipeWire`
///
/// # Errors
/// Returns an error if logging, the backend tools, or the IPC socket can't be set up.
pub async fn run(config: Config, foreground: bool) -> Result<()> {
    // Keep the guard alive for the whole run so buffered log lines are flushed
    let _log_guard = logging::init_daemon(&config.settings.log_level, foreground)?;

    info!("Starting sndsw daemon v{}", env!("CARGO_PKG_VERSION"));
    PipeWireBackend::validate_tools()?;

    let config_path = Config::get_config_path()?;
    run_with_backend(config, Arc::new(PipeWireBackend::new()), config_path).await
}

/// Run the event loop with any backend until shutdown
///
/// # Errors
/// Returns an error if the IPC socket cannot be bound.
pub async fn run_with_backend(
    config: Config,
    backend: Arc<dyn AudioBackend>,
    config_path: PathBuf,
) -> Result<()> {
    let start_time = Instant::now();
    let settings = config.settings.clone();
    info!(
        "Loaded {} selected devices, {} profiles",
        config.devices.len(),
        config.profiles.len()
    );

    let ctx = Arc::new(AppContext::new(config, Arc::clone(&backend), Handle::current()));

    let ipc_server = IpcServer::bind().await?;
    info!("IPC server listening on {:?}", ipc_server.socket_path());

    let (mut changes, watcher) =
        watcher::spawn_watcher(backend, Duration::from_millis(settings.poll_interval_ms));

    let subscriber = tokio::spawn(handle_events(
        ctx.events().subscribe(),
        Arc::clone(&ctx),
        config_path,
        settings.notify_switch,
    ));

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let mut sigterm =
        unix_signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    if settings.notify_daemon {
        notify_blocking("sndsw started", "Audio device switcher running", None);
    }

    info!("Watching audio devices...");

    loop {
        tokio::select! {
            change = changes.recv() => {
                match change {
                    Some(change) => ctx.on_device_change(change),
                    None => {
                        error!("Device watcher stopped (change channel closed)");
                        break;
                    }
                }
            }

            Some(mut stream) = ipc_server.accept() => {
                let ctx = Arc::clone(&ctx);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        handle_ipc_request(&mut stream, ctx, start_time, shutdown_tx).await
                    {
                        error!("IPC request handling error: {:#}", e);
                    }
                });
            }

            _ = shutdown_rx.recv() => {
                info!("Shutdown requested via IPC");
                break;
            }

            _ = signal::ctrl_c() => {
                info!("Shutting down (interrupt)");
                break;
            }

            _ = sigterm.recv() => {
                info!("Shutting down (SIGTERM)");
                break;
            }
        }
    }

    ctx.shutdown();
    // Joining waits for at most one poll of the backend
    if let Err(e) = tokio::task::spawn_blocking(move || watcher.stop()).await {
        warn!("Device watcher did not stop cleanly: {}", e);
    }
    subscriber.abort();

    if settings.notify_daemon {
        notify_blocking("sndsw stopped", "Audio device switcher stopped", None);
    }
    info!("Daemon stopped");
    Ok(())
}

fn notify_blocking(summary: &str, body: &str, icon: Option<&str>) {
    if let Err(e) = send_notification(summary, body, icon) {
        warn!("Could not send notification: {:#}", e);
    }
}

/// Persist selection changes and show notifications for core events
async fn handle_events(
    mut rx: broadcast::Receiver<Event>,
    ctx: Arc<AppContext>,
    config_path: PathBuf,
    notify_switch: bool,
) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Event subscriber lagged, {} events missed", missed);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let Event::SelectionChanged { direction, .. } = &event {
            debug!("{} selection changed, saving config", direction);
            let ctx = Arc::clone(&ctx);
            let path = config_path.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(e) = ctx.persist(&path) {
                    error!("Failed to save selection: {:#}", e);
                }
            });
        }

        if notify_switch && let Some((summary, body, icon)) = describe_event(&event) {
            tokio::task::spawn_blocking(move || notify_blocking(&summary, &body, Some(icon)));
        }
    }
}

/// Handle a single IPC request from a client
async fn handle_ipc_request(
    stream: &mut tokio::net::UnixStream,
    ctx: Arc<AppContext>,
    start_time: Instant,
    shutdown_tx: mpsc::Sender<()>,
) -> Result<()> {
    let request = ipc::read_request(stream).await?;
    debug!("IPC request: {:?}", request);

    if let Request::Shutdown = request {
        ipc::write_response(
            stream,
            &Response::Ok {
                message: "Daemon shutting down...".to_string(),
            },
        )
        .await?;
        // Buffer of one: a second shutdown while the first is pending is moot
        let _ = shutdown_tx.try_send(());
        return Ok(());
    }

    let uptime_secs = start_time.elapsed().as_secs();
    let response = tokio::task::spawn_blocking(move || execute(&ctx, request, uptime_secs))
        .await
        .context("IPC request handler panicked")?;

    ipc::write_response(stream, &response).await
}

/// Carry out a request against the core
///
/// Blocking. Used by the daemon for IPC requests and by the CLI when no
/// daemon is running. `Shutdown` only makes sense inside the daemon loop
/// and is answered with an error here.
pub fn execute(ctx: &AppContext, request: Request, uptime_secs: u64) -> Response {
    match request {
        Request::Status => status(ctx, uptime_secs),

        Request::Cycle { direction, step } => match ctx.cycle(direction, step) {
            Ok(device) => Response::Switched {
                device: DeviceInfo::from(&device),
            },
            Err(e) => error_response(e),
        },

        Request::SetDevice { direction, device } => {
            let present = match ctx.cycler().present(direction) {
                Ok(present) => present,
                Err(e) => return error_response(e),
            };
            let Some(target) = device::resolve_ref(&present, &device) else {
                return not_found(direction, &device);
            };
            match ctx.cycler().set_as_default(target) {
                Ok(device) => Response::Switched {
                    device: DeviceInfo::from(&device),
                },
                Err(e) => error_response(e),
            }
        }

        Request::Select { direction, device } => {
            let present = match ctx.cycler().present(direction) {
                Ok(present) => present,
                Err(e) => return error_response(e),
            };
            let Some(target) = device::resolve_ref(&present, &device) else {
                return not_found(direction, &device);
            };
            let message = if ctx.select_device(target.clone()) {
                format!("Selected {direction} device: {target}")
            } else {
                format!("Already selected: {target}")
            };
            Response::Ok { message }
        }

        Request::Unselect { direction, device } => {
            // Positions refer to the selected list, so absent devices can be dropped too
            let selected = ctx.selection().sorted(direction);
            let Some(target) = device::resolve_ref(&selected, &device) else {
                return not_found(direction, &device);
            };
            ctx.unselect_device(target);
            Response::Ok {
                message: format!("Unselected {direction} device: {target}"),
            }
        }

        Request::ActivateProfile { name } => match ctx.activate_profile(&name) {
            Some(report) => Response::Profile(ProfileOutcome::from(&report)),
            None => Response::Error {
                message: format!("Unknown profile '{name}'"),
            },
        },

        Request::Trigger { condition } => match ctx.handle_condition(&condition) {
            ConditionOutcome::Cycled { result, .. } => match result {
                Ok(device) => Response::Switched {
                    device: DeviceInfo::from(&device),
                },
                Err(e) => error_response(e),
            },
            ConditionOutcome::Profile(report) => Response::Profile(ProfileOutcome::from(&report)),
            ConditionOutcome::Unmatched => Response::Ok {
                message: format!("Nothing is bound to {condition:?}"),
            },
        },

        Request::Shutdown => Response::Error {
            message: "Shutdown is only handled by a running daemon".to_string(),
        },
    }
}

fn status(ctx: &AppContext, uptime_secs: u64) -> Response {
    let mut defaults = Vec::new();
    for direction in Direction::ALL {
        match ctx.cycler().current_default(direction) {
            Ok(Some(device)) => defaults.push(DeviceInfo::from(&device)),
            Ok(None) => {}
            Err(e) => warn!("{}", e),
        }
    }

    let selected = Direction::ALL
        .into_iter()
        .flat_map(|direction| ctx.selection().sorted(direction))
        .map(|device: DeviceIdentity| DeviceInfo::from(&device))
        .collect();

    Response::Status {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs,
        defaults,
        selected,
    }
}

fn error_response(e: impl std::fmt::Display) -> Response {
    Response::Error {
        message: e.to_string(),
    }
}

fn not_found(direction: Direction, reference: &str) -> Response {
    Response::Error {
        message: format!(
            "No {direction} device matches '{reference}'. See 'sndsw list-devices --direction {direction}'"
        ),
    }
}
