//! Device-change watcher
//!
//! `PipeWire` tools don't push change notifications, so a dedicated thread
//! polls the backend and diffs successive snapshots. Changes are sent to the
//! tokio side over an unbounded mpsc channel, like OS callbacks would be.
//!
//! The stream is deliberately raw: one replug can show up as several
//! changes, which the debouncer in the context collapses.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backend::AudioBackend;
use crate::device::Direction;

/// What happened to an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Added { id: String },
    Removed { id: String },
    /// The OS default moved (None when nothing is default anymore)
    DefaultChanged { id: Option<String> },
}

/// Raw device change for one direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChange {
    pub direction: Direction,
    pub kind: ChangeKind,
}

/// Endpoint ids and default per direction at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub endpoints: [Vec<String>; 2],
    pub defaults: [Option<String>; 2],
}

impl Snapshot {
    /// Query the backend for both directions
    ///
    /// # Errors
    /// Returns an error if the backend cannot be queried.
    pub fn capture(backend: &dyn AudioBackend) -> color_eyre::eyre::Result<Self> {
        let mut snapshot = Self::default();
        for direction in Direction::ALL {
            snapshot.endpoints[direction.index()] = backend
                .endpoints(direction)?
                .into_iter()
                .map(|e| e.id)
                .collect();
            snapshot.defaults[direction.index()] = backend.default_endpoint(direction)?;
        }
        Ok(snapshot)
    }
}

/// Changes that turn `old` into `new`
///
/// Per direction: removals first, then additions (both in listing order),
/// then the default change. Removal before addition lets a replugged device
/// with a fresh id read as "gone, then back".
#[must_use]
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Vec<DeviceChange> {
    let mut changes = Vec::new();

    for direction in Direction::ALL {
        let i = direction.index();
        let before: HashSet<&str> = old.endpoints[i].iter().map(String::as_str).collect();
        let after: HashSet<&str> = new.endpoints[i].iter().map(String::as_str).collect();

        for id in old.endpoints[i].iter().filter(|id| !after.contains(id.as_str())) {
            changes.push(DeviceChange {
                direction,
                kind: ChangeKind::Removed { id: id.clone() },
            });
        }
        for id in new.endpoints[i].iter().filter(|id| !before.contains(id.as_str())) {
            changes.push(DeviceChange {
                direction,
                kind: ChangeKind::Added { id: id.clone() },
            });
        }
        if old.defaults[i] != new.defaults[i] {
            changes.push(DeviceChange {
                direction,
                kind: ChangeKind::DefaultChanged {
                    id: new.defaults[i].clone(),
                },
            });
        }
    }

    changes
}

/// Stops the polling thread when stopped or dropped
#[derive(Debug)]
pub struct WatcherHandle {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Signal the thread and wait for it to exit (at most one poll)
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Disconnecting the channel wakes the thread immediately
        self.stop_tx.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!("Device watcher thread panicked");
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn a dedicated thread polling `backend` every `interval`
///
/// The initial state is taken as the baseline and produces no changes.
///
/// # Channel Behavior
///
/// The receiver yields `None` once the watcher stops. The thread also exits
/// on its own when the receiver is dropped. Backend errors are logged and the
/// poll is retried on the next tick.
pub fn spawn_watcher(
    backend: Arc<dyn AudioBackend>,
    interval: Duration,
) -> (mpsc::UnboundedReceiver<DeviceChange>, WatcherHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    let thread = std::thread::Builder::new()
        .name("sndsw-watcher".to_string())
        .spawn(move || run_poll_loop(backend.as_ref(), interval, &tx, &stop_rx));

    let thread = match thread {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Failed to spawn device watcher thread: {}", e);
            None
        }
    };

    (
        rx,
        WatcherHandle {
            stop_tx: Some(stop_tx),
            thread,
        },
    )
}

fn run_poll_loop(
    backend: &dyn AudioBackend,
    interval: Duration,
    tx: &mpsc::UnboundedSender<DeviceChange>,
    stop_rx: &std_mpsc::Receiver<()>,
) {
    let mut last = match Snapshot::capture(backend) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Initial device snapshot failed: {:#}", e);
            Snapshot::default()
        }
    };
    info!("Watching audio devices every {}ms", interval.as_millis());

    loop {
        match stop_rx.recv_timeout(interval) {
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let current = match Snapshot::capture(backend) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Device poll failed: {:#}", e);
                continue;
            }
        };

        for change in diff_snapshots(&last, &current) {
            debug!("Device change: {:?}", change);
            if tx.send(change).is_err() {
                debug!("Device change receiver dropped, stopping watcher");
                return;
            }
        }
        last = current;
    }

    debug!("Device watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::device::EnumeratorKind;
    use pretty_assertions::assert_eq;

    fn snapshot(playback: &[&str], default: Option<&str>) -> Snapshot {
        Snapshot {
            endpoints: [
                playback.iter().map(ToString::to_string).collect(),
                Vec::new(),
            ],
            defaults: [default.map(String::from), None],
        }
    }

    fn change(kind: ChangeKind) -> DeviceChange {
        DeviceChange {
            direction: Direction::Playback,
            kind,
        }
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        let s = snapshot(&["a", "b"], Some("a"));
        assert!(diff_snapshots(&s, &s).is_empty());
    }

    #[test]
    fn test_replug_reads_as_removed_then_added() {
        let old = snapshot(&["spk", "usb-old"], Some("usb-old"));
        let new = snapshot(&["spk", "usb-new"], Some("spk"));

        assert_eq!(
            diff_snapshots(&old, &new),
            vec![
                change(ChangeKind::Removed {
                    id: "usb-old".to_string()
                }),
                change(ChangeKind::Added {
                    id: "usb-new".to_string()
                }),
                change(ChangeKind::DefaultChanged {
                    id: Some("spk".to_string())
                }),
            ]
        );
    }

    #[test]
    fn test_default_cleared() {
        let old = snapshot(&["a"], Some("a"));
        let new = snapshot(&["a"], None);
        assert_eq!(
            diff_snapshots(&old, &new),
            vec![change(ChangeKind::DefaultChanged { id: None })]
        );
    }

    #[test]
    fn test_directions_are_diffed_independently() {
        let old = Snapshot::default();
        let mut new = Snapshot::default();
        new.endpoints[Direction::Capture.index()] = vec!["mic".to_string()];

        let changes = diff_snapshots(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].direction, Direction::Capture);
    }

    #[tokio::test]
    async fn test_watcher_reports_plug() {
        let backend = Arc::new(MemoryBackend::new());
        backend.plug("Speakers (Realtek)", "spk", Direction::Playback, EnumeratorKind::Pci);

        let (mut rx, handle) = spawn_watcher(backend.clone(), Duration::from_millis(20));
        // Let the baseline snapshot happen first
        tokio::time::sleep(Duration::from_millis(60)).await;
        backend.plug("Headset (USB Audio)", "usb-1", Direction::Playback, EnumeratorKind::Usb);

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            received,
            change(ChangeKind::Added {
                id: "usb-1".to_string()
            })
        );

        handle.stop();
        assert!(rx.recv().await.is_none());
    }
}
