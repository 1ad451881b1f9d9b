//! Selected devices
//!
//! [`DeviceSet`] is the plain collection with identity-based membership.
//! [`SelectionStore`] wraps it for shared use: writers are exclusive, readers
//! get consistent snapshots, and every effective change is published.

use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::device::{DeviceIdentity, Direction};
use crate::events::{Event, EventBus};

// ============================================================================
// DeviceSet
// ============================================================================

/// Insertion-ordered set keyed by [`DeviceIdentity`] equality
///
/// Identity equality is not hashable, so membership is a linear scan. Sets
/// hold a handful of devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceSet {
    devices: Vec<DeviceIdentity>,
}

impl DeviceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, device: &DeviceIdentity) -> bool {
        self.devices.iter().any(|d| d == device)
    }

    /// Add a device; returns `false` if an equal device is already present
    pub fn add(&mut self, device: DeviceIdentity) -> bool {
        if self.contains(&device) {
            return false;
        }
        self.devices.push(device);
        true
    }

    /// Remove every entry equal to `device`; returns `false` if none matched
    ///
    /// A removable device can match both a stale id-based entry and a
    /// name-based one, so all of them go.
    pub fn remove(&mut self, device: &DeviceIdentity) -> bool {
        let before = self.devices.len();
        self.devices.retain(|d| d != device);
        self.devices.len() != before
    }

    /// All stored entries equal to `probe`
    pub fn find_all_equal_to<'a>(
        &'a self,
        probe: &'a DeviceIdentity,
    ) -> impl Iterator<Item = &'a DeviceIdentity> + 'a {
        self.devices.iter().filter(move |d| *d == probe)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceIdentity> {
        self.devices.iter()
    }

    /// Entries for one direction, in insertion order
    #[must_use]
    pub fn for_direction(&self, direction: Direction) -> Vec<DeviceIdentity> {
        self.devices
            .iter()
            .filter(|d| d.direction() == direction)
            .cloned()
            .collect()
    }

    /// Entries for one direction, in display order
    #[must_use]
    pub fn sorted(&self, direction: Direction) -> Vec<DeviceIdentity> {
        let mut devices = self.for_direction(direction);
        devices.sort_by(DeviceIdentity::display_cmp);
        devices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl FromIterator<DeviceIdentity> for DeviceSet {
    fn from_iter<I: IntoIterator<Item = DeviceIdentity>>(iter: I) -> Self {
        let mut set = Self::new();
        for device in iter {
            set.add(device);
        }
        set
    }
}

// ============================================================================
// SelectionStore
// ============================================================================

/// Thread-safe, observable selection shared by the daemon, cycler and CLI
#[derive(Debug)]
pub struct SelectionStore {
    set: RwLock<DeviceSet>,
    events: EventBus,
}

impl SelectionStore {
    #[must_use]
    pub fn new(initial: DeviceSet, events: EventBus) -> Self {
        Self {
            set: RwLock::new(initial),
            events,
        }
    }

    /// Select a device; publishes `SelectionChanged` when it was new
    pub fn select(&self, device: DeviceIdentity) -> bool {
        let direction = device.direction();
        let name = device.canonical_name().to_string();

        let snapshot = {
            let mut set = self.set.write().unwrap_or_else(PoisonError::into_inner);
            if !set.add(device) {
                debug!("Already selected: {}", name);
                return false;
            }
            set.sorted(direction)
        };

        debug!("Selected {} device: {}", direction, name);
        self.events.publish(Event::SelectionChanged {
            direction,
            devices: snapshot,
        });
        true
    }

    /// Unselect every entry equal to `device`; publishes when something was removed
    pub fn unselect(&self, device: &DeviceIdentity) -> bool {
        let direction = device.direction();

        let snapshot = {
            let mut set = self.set.write().unwrap_or_else(PoisonError::into_inner);
            if !set.remove(device) {
                return false;
            }
            set.sorted(direction)
        };

        debug!("Unselected {} device: {}", direction, device);
        self.events.publish(Event::SelectionChanged {
            direction,
            devices: snapshot,
        });
        true
    }

    #[must_use]
    pub fn contains(&self, device: &DeviceIdentity) -> bool {
        self.set
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(device)
    }

    /// Consistent copy of the whole set
    #[must_use]
    pub fn snapshot(&self) -> DeviceSet {
        self.set
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Display-ordered selection for one direction
    #[must_use]
    pub fn sorted(&self, direction: Direction) -> Vec<DeviceIdentity> {
        self.set
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sorted(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::sync::Arc;

    fn usb(name: &str, id: &str) -> DeviceIdentity {
        DeviceIdentity::new(name, id, Direction::Playback, true)
    }

    fn builtin(name: &str, id: &str) -> DeviceIdentity {
        DeviceIdentity::new(name, id, Direction::Playback, false)
    }

    // DeviceSet tests
    #[test]
    fn test_contains_with_equal_probe() {
        let mut set = DeviceSet::new();
        assert!(set.add(usb("Headset (USB Audio)", "old-id")));

        let replugged = usb("3 - Headset (USB Audio)", "new-id");
        assert!(set.contains(&replugged));
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut set = DeviceSet::new();
        assert!(set.add(builtin("Speakers (Realtek)", "id-1")));
        assert!(!set.add(builtin("Renamed (Realtek)", "id-1")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_lookalike_builtin_devices_stay_distinct() {
        let mut set = DeviceSet::new();
        assert!(set.add(builtin("Speakers (Realtek)", "id-1")));
        assert!(set.add(builtin("Speakers (Realtek)", "id-2")));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_takes_every_match() {
        // Built-in entry with the same name, plus a stale removable entry.
        // A probe that is removable matches both.
        let mut set = DeviceSet::new();
        set.add(builtin("Headset (USB Audio)", "stale"));
        set.add(builtin("Headset (USB Audio)", "other"));
        set.add(builtin("Speakers (Realtek)", "spk"));

        let probe = usb("Headset (USB Audio)", "fresh");
        assert_eq!(set.find_all_equal_to(&probe).count(), 2);
        assert!(set.remove(&probe));
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().id(), "spk");
    }

    #[fixture]
    fn headset_and_speakers() -> DeviceSet {
        [
            usb("Headset (USB Audio)", "usb-1"),
            builtin("Speakers (Realtek)", "spk"),
        ]
        .into_iter()
        .collect()
    }

    #[rstest]
    #[case::same_id(builtin("Anything", "spk"), true)]
    #[case::replugged_usb(usb("2 - Headset (USB Audio)", "usb-7"), true)]
    #[case::builtin_with_usb_name(builtin("Headset (USB Audio)", "pci-9"), true)]
    #[case::other_builtin(builtin("Speakers (Realtek)", "spk-2"), false)]
    #[case::other_direction(DeviceIdentity::new("Speakers (Realtek)", "spk", Direction::Capture, false), false)]
    fn test_membership(
        headset_and_speakers: DeviceSet,
        #[case] probe: DeviceIdentity,
        #[case] expected: bool,
    ) {
        assert_eq!(headset_and_speakers.contains(&probe), expected);
    }

    #[test]
    fn test_remove_from_empty_is_not_found() {
        let mut set = DeviceSet::new();
        assert!(!set.remove(&builtin("Speakers", "id")));
    }

    #[test]
    fn test_insertion_order_and_sorted_view() {
        let set: DeviceSet = [
            builtin("Zeta (X)", "1"),
            builtin("Alpha (X)", "2"),
            DeviceIdentity::new("Mic (X)", "3", Direction::Capture, false),
        ]
        .into_iter()
        .collect();

        let insertion: Vec<_> = set
            .for_direction(Direction::Playback)
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(insertion, ["1", "2"]);

        let sorted: Vec<_> = set
            .sorted(Direction::Playback)
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(sorted, ["2", "1"]);
        assert_eq!(set.sorted(Direction::Capture).len(), 1);
    }

    // SelectionStore tests
    #[tokio::test]
    async fn test_store_publishes_on_change_only() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let store = SelectionStore::new(DeviceSet::new(), bus);

        assert!(store.select(builtin("Speakers (Realtek)", "spk")));
        assert!(!store.select(builtin("Speakers (Realtek)", "spk")));
        assert!(!store.unselect(&builtin("Missing", "nope")));

        match rx.recv().await.unwrap() {
            Event::SelectionChanged { direction, devices } => {
                assert_eq!(direction, Direction::Playback);
                assert_eq!(devices.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());

        assert!(store.unselect(&builtin("Speakers (Realtek)", "spk")));
        match rx.recv().await.unwrap() {
            Event::SelectionChanged { devices, .. } => assert!(devices.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_store_concurrent_writers() {
        let store = Arc::new(SelectionStore::new(DeviceSet::new(), EventBus::new()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.select(builtin(&format!("Dev {i}"), &format!("id-{t}-{i}")));
                        // Same id from every thread: only one may win
                        store.select(builtin("Shared", "shared"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 8 * 25 + 1);
        assert!(store.contains(&builtin("Anything", "shared")));
    }
}
