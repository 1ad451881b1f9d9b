//! IPC infrastructure for daemon communication
//!
//! Unix socket IPC between CLI commands and the daemon, using length-prefixed
//! JSON messages for protocol framing.

use color_eyre::eyre::{self, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, warn};

use crate::cycler::Step;
use crate::device::{DeviceIdentity, Direction};
use crate::profile::{ActivationReport, Condition};

// ============================================================================
// Message Types
// ============================================================================

/// Requests sent from CLI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Query daemon status
    Status,
    /// Cycle the default device
    Cycle { direction: Direction, step: Step },
    /// Make a device default (position, id or name)
    SetDevice { direction: Direction, device: String },
    /// Add a present device to the selection
    Select { direction: Direction, device: String },
    /// Remove a device from the selection
    Unselect { direction: Direction, device: String },
    /// Activate a profile by name
    ActivateProfile { name: String },
    /// Report a trigger condition (hotkey press, focused window, ...)
    Trigger { condition: Condition },
    /// Gracefully shutdown the daemon
    Shutdown,
}

/// Responses sent from daemon to CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Status information
    Status {
        version: String,
        uptime_secs: u64,
        defaults: Vec<DeviceInfo>,
        selected: Vec<DeviceInfo>,
    },
    /// A device became default
    Switched { device: DeviceInfo },
    /// Outcome of a profile activation
    Profile(ProfileOutcome),
    /// Generic success response
    Ok { message: String },
    /// Error response
    Error { message: String },
}

/// Device as shown to users and status bars
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub direction: Direction,
    pub name: String,
    pub id: String,
    pub removable: bool,
}

impl From<&DeviceIdentity> for DeviceInfo {
    fn from(device: &DeviceIdentity) -> Self {
        Self {
            direction: device.direction(),
            name: device.canonical_name().to_string(),
            id: device.id().to_string(),
            removable: device.is_removable_bus(),
        }
    }
}

/// Serializable form of an [`ActivationReport`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOutcome {
    pub profile: String,
    pub activated: Vec<DeviceInfo>,
    pub errors: Vec<String>,
}

impl From<&ActivationReport> for ProfileOutcome {
    fn from(report: &ActivationReport) -> Self {
        Self {
            profile: report.profile.clone(),
            activated: report.activated().map(DeviceInfo::from).collect(),
            errors: report.errors().map(ToString::to_string).collect(),
        }
    }
}

// ============================================================================
// Socket Path Management
// ============================================================================

/// Get the IPC socket path
///
/// Prefers `$XDG_RUNTIME_DIR/sndsw.sock`, falls back to `/tmp/sndsw.sock`.
#[must_use]
pub fn get_socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(runtime_dir) => PathBuf::from(runtime_dir).join("sndsw.sock"),
        None => PathBuf::from("/tmp/sndsw.sock"),
    }
}

/// Whether a daemon answers on the socket
pub async fn is_daemon_running() -> bool {
    let socket_path = get_socket_path();
    if !socket_path.exists() {
        return false;
    }
    matches!(
        tokio::time::timeout(Duration::from_millis(100), UnixStream::connect(&socket_path)).await,
        Ok(Ok(_))
    )
}

/// Remove the socket file if no daemon is listening on it
///
/// # Errors
/// Returns an error if a stale socket exists but cannot be removed.
pub async fn cleanup_stale_socket() -> Result<()> {
    let socket_path = get_socket_path();

    if !socket_path.exists() || is_daemon_running().await {
        return Ok(());
    }

    debug!("Removing stale socket: {:?}", socket_path);
    std::fs::remove_file(&socket_path)
        .with_context(|| format!("Failed to remove stale socket: {socket_path:?}"))
}

// ============================================================================
// Protocol Helpers
// ============================================================================

const MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1MB max message size
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Read a length-prefixed JSON message from a stream
async fn read_message<T: for<'de> Deserialize<'de>>(stream: &mut UnixStream) -> Result<T> {
    // 4-byte big-endian length prefix
    let mut len_buf = [0u8; 4];
    tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut len_buf))
        .await
        .context("Timeout reading message length")?
        .context("Failed to read message length")?;

    let msg_len = u32::from_be_bytes(len_buf) as usize;

    if msg_len > MAX_MESSAGE_SIZE {
        eyre::bail!("Message too large: {} bytes (max: {})", msg_len, MAX_MESSAGE_SIZE);
    }

    let mut msg_buf = vec![0u8; msg_len];
    tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut msg_buf))
        .await
        .context("Timeout reading message payload")?
        .context("Failed to read message payload")?;

    serde_json::from_slice(&msg_buf).context("Failed to deserialize message")
}

/// Write a length-prefixed JSON message to a stream
async fn write_message<T: Serialize>(stream: &mut UnixStream, message: &T) -> Result<()> {
    let json = serde_json::to_vec(message).context("Failed to serialize message")?;

    if json.len() > MAX_MESSAGE_SIZE {
        eyre::bail!(
            "Message too large: {} bytes (max: {})",
            json.len(),
            MAX_MESSAGE_SIZE
        );
    }

    let len = u32::try_from(json.len())
        .context("Message length exceeds u32")?
        .to_be_bytes();
    stream
        .write_all(&len)
        .await
        .context("Failed to write message length")?;
    stream
        .write_all(&json)
        .await
        .context("Failed to write message payload")?;
    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}

// ============================================================================
// IPC Client (for CLI commands)
// ============================================================================

/// Send a request to the daemon and wait for response
///
/// # Errors
/// Returns an error if the daemon is unreachable or the exchange fails.
pub async fn send_request(request: Request) -> Result<Response> {
    let socket_path = get_socket_path();

    let mut stream = tokio::time::timeout(Duration::from_secs(5), UnixStream::connect(&socket_path))
        .await
        .context("Timeout connecting to daemon")?
        .with_context(|| {
            format!("Failed to connect to daemon. Is the daemon running?\nSocket: {socket_path:?}")
        })?;

    debug!("Connected to daemon at {:?}", socket_path);

    write_message(&mut stream, &request).await?;
    read_message(&mut stream).await
}

// ============================================================================
// IPC Server (for daemon)
// ============================================================================

/// Handle for the IPC server running in the daemon
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Create and bind a new IPC server on the default socket path
    ///
    /// # Errors
    /// Returns an error if another daemon is running or binding fails.
    pub async fn bind() -> Result<Self> {
        let socket_path = get_socket_path();

        if is_daemon_running().await {
            eyre::bail!("Another sndsw daemon is already running ({socket_path:?})");
        }
        cleanup_stale_socket().await?;

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind IPC socket: {socket_path:?}"))?;

        debug!("IPC server listening on {:?}", socket_path);

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept the next incoming connection
    ///
    /// Returns None if accept fails (non-fatal).
    pub async fn accept(&self) -> Option<UnixStream> {
        match self.listener.accept().await {
            Ok((stream, _addr)) => Some(stream),
            Err(e) => {
                error!("Failed to accept IPC connection: {}", e);
                None
            }
        }
    }

    #[must_use]
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            warn!("Failed to remove IPC socket on shutdown: {}", e);
        } else {
            debug!("Removed IPC socket: {:?}", self.socket_path);
        }
    }
}

/// Read a request from a client connection
///
/// # Errors
/// Returns an error on timeout or malformed framing.
pub async fn read_request(stream: &mut UnixStream) -> Result<Request> {
    read_message(stream).await
}

/// Write a response to a client connection
///
/// # Errors
/// Returns an error if the client went away.
pub async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<()> {
    write_message(stream, response).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_framing_over_socket_pair() {
        let (mut client, mut server) = UnixStream::pair().unwrap();

        write_message(
            &mut client,
            &Request::Trigger {
                condition: Condition::HotKey {
                    keys: "ctrl+F9".to_string(),
                },
            },
        )
        .await
        .unwrap();

        match read_request(&mut server).await.unwrap() {
            Request::Trigger {
                condition: Condition::HotKey { keys },
            } => assert_eq!(keys, "ctrl+F9"),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut client, mut server) = UnixStream::pair().unwrap();
        let len = u32::try_from(MAX_MESSAGE_SIZE + 1).unwrap().to_be_bytes();
        client.write_all(&len).await.unwrap();

        let err = read_request(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::to_value(Request::Cycle {
            direction: Direction::Capture,
            step: Step::Prev,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "Cycle", "direction": "capture", "step": "prev"})
        );
    }
}
