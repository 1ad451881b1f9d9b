//! Default-device cycling
//!
//! [`DeviceCycler`] moves the OS default through the selected devices that
//! are currently present, and activates a single device directly for
//! profiles and manual `set`.
//!
//! The OS default is ground truth and is re-read on every cycle. A cycle
//! (read default, pick next, set default) holds the lock for its direction,
//! so two racing cycles for one direction advance twice instead of both
//! landing on the same device.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::backend::{AudioBackend, Role};
use crate::device::{DeviceIdentity, Direction};
use crate::error::SwitchError;
use crate::events::{Event, EventBus};
use crate::selection::SelectionStore;

/// Cycling direction through the candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Next,
    Prev,
}

/// Index to activate given the current position in a list of `len` entries
///
/// `len` must be non-zero. A default that is not in the list counts as sitting
/// just before the first entry for `Next` and just after the last for `Prev`.
fn step_index(current: Option<usize>, len: usize, step: Step) -> usize {
    match (step, current) {
        (Step::Next, Some(i)) => (i + 1) % len,
        (Step::Next, None) => 0,
        (Step::Prev, Some(i)) => (i + len - 1) % len,
        (Step::Prev, None) => len - 1,
    }
}

pub struct DeviceCycler {
    backend: Arc<dyn AudioBackend>,
    selection: Arc<SelectionStore>,
    events: EventBus,
    change_communications: bool,
    locks: [Mutex<()>; 2],
}

impl DeviceCycler {
    #[must_use]
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        selection: Arc<SelectionStore>,
        events: EventBus,
        change_communications: bool,
    ) -> Self {
        Self {
            backend,
            selection,
            events,
            change_communications,
            locks: [Mutex::new(()), Mutex::new(())],
        }
    }

    fn lock(&self, direction: Direction) -> MutexGuard<'_, ()> {
        self.locks[direction.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn query_error(direction: Direction, e: &color_eyre::eyre::Report) -> SwitchError {
        SwitchError::Query {
            direction,
            message: format!("{e:#}"),
        }
    }

    /// Present endpoints for `direction`, in display order
    ///
    /// # Errors
    /// Returns [`SwitchError::Query`] if the backend cannot list endpoints.
    pub fn present(&self, direction: Direction) -> Result<Vec<DeviceIdentity>, SwitchError> {
        self.backend
            .identities(direction)
            .map_err(|e| Self::query_error(direction, &e))
    }

    /// Selected devices that are present right now, in display order
    ///
    /// Entries are the live identities, so a removable device that came back
    /// with a new id is activated by that new id.
    ///
    /// # Errors
    /// Returns [`SwitchError::Query`] if the backend cannot list endpoints.
    pub fn candidates(&self, direction: Direction) -> Result<Vec<DeviceIdentity>, SwitchError> {
        Ok(self
            .present(direction)?
            .into_iter()
            .filter(|device| self.selection.contains(device))
            .collect())
    }

    /// The OS default for `direction` as an identity, if it is a present endpoint
    ///
    /// # Errors
    /// Returns [`SwitchError::Query`] if the backend cannot be queried.
    pub fn current_default(
        &self,
        direction: Direction,
    ) -> Result<Option<DeviceIdentity>, SwitchError> {
        let Some(id) = self
            .backend
            .default_endpoint(direction)
            .map_err(|e| Self::query_error(direction, &e))?
        else {
            return Ok(None);
        };

        let device = self.present(direction)?.into_iter().find(|d| d.id() == id);
        if device.is_none() {
            debug!("Default {} '{}' is not a listed endpoint", direction, id);
        }
        Ok(device)
    }

    /// Activate the next selected, present device
    ///
    /// # Errors
    /// See [`DeviceCycler::cycle`].
    pub fn cycle_next(&self, direction: Direction) -> Result<DeviceIdentity, SwitchError> {
        self.cycle(direction, Step::Next)
    }

    /// Move the default one step through the candidates, wrapping around
    ///
    /// With a single candidate the cycle lands on it again.
    ///
    /// # Errors
    /// - [`SwitchError::NoDevices`] if no selected device is present
    ///   (also published as [`Event::NoDevices`])
    /// - [`SwitchError::Query`] / [`SwitchError::PlatformCall`] on backend failure
    pub fn cycle(&self, direction: Direction, step: Step) -> Result<DeviceIdentity, SwitchError> {
        let _guard = self.lock(direction);

        let current = self
            .backend
            .default_endpoint(direction)
            .map_err(|e| Self::query_error(direction, &e))?;
        let present = self.present(direction)?;
        let candidates: Vec<&DeviceIdentity> = present
            .iter()
            .filter(|device| self.selection.contains(device))
            .collect();

        if candidates.is_empty() {
            warn!("No selected {} devices are connected", direction);
            self.events.publish(Event::NoDevices { direction });
            return Err(SwitchError::NoDevices { direction });
        }

        // Same-named removable devices are all equal to each other, so locate
        // the default by its id first and fall back to identity equality
        let position = current.as_deref().and_then(|id| {
            candidates
                .iter()
                .position(|d| !id.is_empty() && d.id() == id)
                .or_else(|| {
                    let live = present.iter().find(|d| d.id() == id)?;
                    candidates.iter().position(|d| *d == live)
                })
        });

        let next = candidates[step_index(position, candidates.len(), step)];
        debug!(
            "Cycling {} {:?}: {:?} -> {} ({} candidates)",
            direction,
            step,
            position,
            next,
            candidates.len()
        );

        self.activate(next)?;
        Ok(next.clone())
    }

    /// Make `device` the default without cycling
    ///
    /// `device` may be a stored record; it is resolved against the present
    /// endpoints first and the live identity is activated and returned.
    ///
    /// # Errors
    /// - [`SwitchError::DeviceNotFound`] if no present endpoint matches
    /// - [`SwitchError::Query`] / [`SwitchError::PlatformCall`] on backend failure
    pub fn set_as_default(&self, device: &DeviceIdentity) -> Result<DeviceIdentity, SwitchError> {
        let direction = device.direction();
        let _guard = self.lock(direction);

        // Prefer an exact id hit over a name-based match
        let present = self.present(direction)?;
        let live = present
            .iter()
            .find(|d| !device.id().is_empty() && d.id() == device.id())
            .or_else(|| present.iter().find(|d| *d == device))
            .cloned()
            .ok_or_else(|| SwitchError::DeviceNotFound {
                direction,
                name: device.canonical_name().to_string(),
            })?;

        self.activate(&live)?;
        Ok(live)
    }

    /// Issue the set-default call(s); callers hold the direction lock
    fn activate(&self, device: &DeviceIdentity) -> Result<(), SwitchError> {
        let direction = device.direction();

        self.backend
            .set_default_endpoint(device.id(), direction, Role::Default)
            .map_err(|e| SwitchError::PlatformCall {
                direction,
                name: device.canonical_name().to_string(),
                message: format!("{e:#}"),
            })?;

        if self.change_communications
            && let Err(e) =
                self.backend
                    .set_default_endpoint(device.id(), direction, Role::Communications)
        {
            // The main default already moved; report and carry on
            warn!(
                "Failed to set communications {} device to {}: {:#}",
                direction, device, e
            );
        }

        info!("Switched {} to: {}", direction, device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::device::EnumeratorKind;
    use crate::selection::DeviceSet;
    use test_case::test_case;

    #[test_case(Some(1), 3, Step::Next => 2 ; "middle to next")]
    #[test_case(Some(2), 3, Step::Next => 0 ; "last wraps to first")]
    #[test_case(None, 3, Step::Next => 0 ; "unknown starts at first")]
    #[test_case(Some(0), 1, Step::Next => 0 ; "single entry cycles to itself")]
    #[test_case(Some(0), 3, Step::Prev => 2 ; "first wraps to last")]
    #[test_case(None, 3, Step::Prev => 2 ; "unknown prev starts at last")]
    fn test_step_index(current: Option<usize>, len: usize, step: Step) -> usize {
        step_index(current, len, step)
    }

    fn setup(selected: &[(&str, &str)]) -> (Arc<MemoryBackend>, DeviceCycler, EventBus) {
        let backend = Arc::new(MemoryBackend::new());
        let events = EventBus::new();
        let set: DeviceSet = selected
            .iter()
            .map(|(name, id)| DeviceIdentity::new(*name, *id, Direction::Playback, false))
            .collect();
        let selection = Arc::new(SelectionStore::new(set, events.clone()));
        let cycler = DeviceCycler::new(backend.clone(), selection, events.clone(), false);
        (backend, cycler, events)
    }

    fn plug_abc(backend: &MemoryBackend) {
        for (name, id) in [("A (X)", "a"), ("B (X)", "b"), ("C (X)", "c")] {
            backend.plug(name, id, Direction::Playback, EnumeratorKind::Pci);
        }
    }

    #[test]
    fn test_cycle_next_advances_and_wraps() {
        let (backend, cycler, _events) = setup(&[("A (X)", "a"), ("B (X)", "b"), ("C (X)", "c")]);
        plug_abc(&backend);

        backend.set_default(Direction::Playback, Some("b"));
        assert_eq!(cycler.cycle_next(Direction::Playback).unwrap().id(), "c");
        assert_eq!(cycler.cycle_next(Direction::Playback).unwrap().id(), "a");
        assert_eq!(
            backend.default_endpoint(Direction::Playback).unwrap().as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_cycle_from_unselected_default_starts_at_first() {
        let (backend, cycler, _events) = setup(&[("A (X)", "a"), ("B (X)", "b"), ("C (X)", "c")]);
        plug_abc(&backend);
        backend.plug("Other (X)", "other", Direction::Playback, EnumeratorKind::Pci);
        backend.set_default(Direction::Playback, Some("other"));

        assert_eq!(cycler.cycle_next(Direction::Playback).unwrap().id(), "a");
    }

    #[test]
    fn test_cycle_prev() {
        let (backend, cycler, _events) = setup(&[("A (X)", "a"), ("B (X)", "b"), ("C (X)", "c")]);
        plug_abc(&backend);
        backend.set_default(Direction::Playback, Some("a"));

        assert_eq!(
            cycler.cycle(Direction::Playback, Step::Prev).unwrap().id(),
            "c"
        );
    }

    #[test]
    fn test_absent_selected_devices_are_skipped() {
        let (backend, cycler, _events) = setup(&[("A (X)", "a"), ("B (X)", "b"), ("C (X)", "c")]);
        plug_abc(&backend);
        backend.unplug("b", Direction::Playback);
        backend.set_default(Direction::Playback, Some("a"));

        assert_eq!(cycler.cycle_next(Direction::Playback).unwrap().id(), "c");
    }

    #[tokio::test]
    async fn test_no_present_devices_is_an_error_and_an_event() {
        let (backend, cycler, events) = setup(&[("A (X)", "a")]);
        backend.plug("Other (X)", "other", Direction::Playback, EnumeratorKind::Pci);
        let mut rx = events.subscribe();

        let err = cycler.cycle_next(Direction::Playback).unwrap_err();
        assert_eq!(
            err,
            SwitchError::NoDevices {
                direction: Direction::Playback
            }
        );
        assert!(backend.calls().is_empty());
        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::NoDevices {
                direction: Direction::Playback
            }
        ));
    }

    #[test]
    fn test_platform_failure_is_surfaced_not_retried() {
        let (backend, cycler, _events) = setup(&[("A (X)", "a"), ("B (X)", "b")]);
        plug_abc(&backend);
        backend.set_default(Direction::Playback, Some("a"));
        backend.fail_next_set("device busy");

        let err = cycler.cycle_next(Direction::Playback).unwrap_err();
        assert!(matches!(
            err,
            SwitchError::PlatformCall { ref message, .. } if message.contains("device busy")
        ));
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(
            backend.default_endpoint(Direction::Playback).unwrap().as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_replugged_usb_device_activated_by_new_id() {
        let backend = Arc::new(MemoryBackend::new());
        let events = EventBus::new();
        let stored =
            DeviceIdentity::new("Headset (USB Audio)", "usb-old", Direction::Playback, true);
        let selection = Arc::new(SelectionStore::new(
            std::iter::once(stored.clone()).collect(),
            events.clone(),
        ));
        let cycler = DeviceCycler::new(backend.clone(), selection, events, false);

        backend.plug(
            "2 - Headset (USB Audio)",
            "usb-new",
            Direction::Playback,
            EnumeratorKind::Usb,
        );

        assert_eq!(cycler.cycle_next(Direction::Playback).unwrap().id(), "usb-new");
        assert_eq!(cycler.set_as_default(&stored).unwrap().id(), "usb-new");
        assert_eq!(backend.calls()[0].0, "usb-new");
    }

    #[test]
    fn test_identical_usb_devices_alternate() {
        let backend = Arc::new(MemoryBackend::new());
        let events = EventBus::new();
        let stored = DeviceIdentity::new("Headset (USB Audio)", "u1", Direction::Playback, true);
        let selection = Arc::new(SelectionStore::new(
            std::iter::once(stored).collect(),
            events.clone(),
        ));
        let cycler = DeviceCycler::new(backend.clone(), selection, events, false);

        // Two units of the same model: one stored record covers both
        backend.plug("Headset (USB Audio)", "u1", Direction::Playback, EnumeratorKind::Usb);
        backend.plug("Headset (USB Audio)", "u2", Direction::Playback, EnumeratorKind::Usb);
        backend.set_default(Direction::Playback, Some("u1"));

        let landed: Vec<String> = (0..4)
            .map(|_| cycler.cycle_next(Direction::Playback).unwrap().id().to_string())
            .collect();
        assert_eq!(landed, ["u2", "u1", "u2", "u1"]);
    }

    #[test]
    fn test_set_as_default_missing_device() {
        let (backend, cycler, _events) = setup(&[]);
        plug_abc(&backend);

        let gone = DeviceIdentity::new("Gone (X)", "gone", Direction::Playback, false);
        assert!(matches!(
            cycler.set_as_default(&gone),
            Err(SwitchError::DeviceNotFound { .. })
        ));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_communications_role_follows_when_enabled() {
        let backend = Arc::new(MemoryBackend::new());
        let events = EventBus::new();
        let selection = Arc::new(SelectionStore::new(DeviceSet::new(), events.clone()));
        let cycler = DeviceCycler::new(backend.clone(), selection, events, true);
        plug_abc(&backend);

        let b = DeviceIdentity::new("B (X)", "b", Direction::Playback, false);
        cycler.set_as_default(&b).unwrap();

        let roles: Vec<Role> = backend.calls().into_iter().map(|(_, _, role)| role).collect();
        assert_eq!(roles, [Role::Default, Role::Communications]);
    }

    #[test]
    fn test_current_default_resolves_identity() {
        let (backend, cycler, _events) = setup(&[]);
        plug_abc(&backend);
        assert!(cycler.current_default(Direction::Playback).unwrap().is_none());

        backend.set_default(Direction::Playback, Some("c"));
        let current = cycler.current_default(Direction::Playback).unwrap().unwrap();
        assert_eq!(current.canonical_name(), "C (X)");
    }

    #[test]
    fn test_concurrent_cycles_each_advance() {
        let (backend, cycler, _events) = setup(&[("A (X)", "a"), ("B (X)", "b"), ("C (X)", "c")]);
        plug_abc(&backend);
        backend.set_default(Direction::Playback, Some("a"));
        let cycler = Arc::new(cycler);

        let threads: Vec<_> = (0..2)
            .map(|_| {
                let cycler = Arc::clone(&cycler);
                std::thread::spawn(move || cycler.cycle_next(Direction::Playback).unwrap())
            })
            .collect();
        let mut landed: Vec<String> = threads
            .into_iter()
            .map(|t| t.join().unwrap().id().to_string())
            .collect();
        landed.sort();

        assert_eq!(landed, ["b", "c"]);
        assert_eq!(
            backend.default_endpoint(Direction::Playback).unwrap().as_deref(),
            Some("c")
        );
    }
}
