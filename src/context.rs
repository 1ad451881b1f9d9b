//! Application context
//!
//! [`AppContext`] is built once at startup from the loaded [`Config`] and a
//! backend, and owns everything the switching core shares: event bus,
//! selection, cycler, profile matcher and the per-direction debouncers.
//! Components receive it (or the parts they need) explicitly.
//!
//! Methods that reach the backend block; async callers run them under
//! `spawn_blocking`.

use color_eyre::eyre::Result;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::backend::AudioBackend;
use crate::config::{Config, Hotkeys, Settings};
use crate::cycler::{DeviceCycler, Step};
use crate::debounce::ChangeDebouncer;
use crate::device::{DeviceIdentity, Direction};
use crate::error::SwitchError;
use crate::events::{Event, EventBus};
use crate::profile::{self, ActivationReport, Condition, ProfileTriggerMatcher};
use crate::selection::{DeviceSet, SelectionStore};
use crate::watcher::{ChangeKind, DeviceChange};

/// What a reported condition led to
#[derive(Debug, Clone)]
pub enum ConditionOutcome {
    /// A cycle hotkey was pressed
    Cycled {
        direction: Direction,
        result: Result<DeviceIdentity, SwitchError>,
    },
    /// A profile trigger matched
    Profile(ActivationReport),
    /// Nothing is bound to the condition
    Unmatched,
}

pub struct AppContext {
    settings: Settings,
    hotkeys: Hotkeys,
    config: Mutex<Config>,
    events: EventBus,
    selection: Arc<SelectionStore>,
    cycler: Arc<DeviceCycler>,
    matcher: ProfileTriggerMatcher,
    debouncers: [ChangeDebouncer<DeviceChange>; 2],
    runtime: Handle,
}

impl AppContext {
    /// Wire up the core from a validated config
    ///
    /// `runtime` runs debounce timers and the blocking work they trigger.
    #[must_use]
    pub fn new(config: Config, backend: Arc<dyn AudioBackend>, runtime: Handle) -> Self {
        let events = EventBus::new();
        let initial: DeviceSet = config.selected_devices().into_iter().collect();
        debug!("Loaded {} selected devices", initial.len());

        let selection = Arc::new(SelectionStore::new(initial, events.clone()));
        let cycler = Arc::new(DeviceCycler::new(
            backend,
            Arc::clone(&selection),
            events.clone(),
            config.settings.change_communications,
        ));
        let matcher = ProfileTriggerMatcher::new(
            config.profiles.clone(),
            Arc::clone(&cycler),
            events.clone(),
        );

        Self {
            settings: config.settings.clone(),
            hotkeys: config.hotkeys.clone(),
            config: Mutex::new(config),
            events,
            selection,
            cycler,
            matcher,
            debouncers: [
                ChangeDebouncer::new(runtime.clone()),
                ChangeDebouncer::new(runtime.clone()),
            ],
            runtime,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    #[must_use]
    pub fn cycler(&self) -> &DeviceCycler {
        &self.cycler
    }

    #[must_use]
    pub fn matcher(&self) -> &ProfileTriggerMatcher {
        &self.matcher
    }

    // ========================================================================
    // Device changes
    // ========================================================================

    /// React to a raw device change
    ///
    /// Changes are debounced per direction; once a direction goes quiet the
    /// default is re-read and published as [`Event::DefaultChanged`]. With
    /// `switch_on_plug`, a plugged-in selected device is made default right
    /// away.
    pub fn on_device_change(&self, change: DeviceChange) {
        let direction = change.direction;

        if self.settings.switch_on_plug
            && let ChangeKind::Added { id } = &change.kind
        {
            let cycler = Arc::clone(&self.cycler);
            let id = id.clone();
            self.runtime
                .spawn_blocking(move || switch_to_plugged(&cycler, direction, &id));
        }

        let cycler = Arc::clone(&self.cycler);
        let events = self.events.clone();
        let runtime = self.runtime.clone();
        self.debouncers[direction.index()].schedule(
            Duration::from_millis(self.settings.debounce_ms),
            change,
            move |settled| {
                debug!("Device changes settled, last: {:?}", settled);
                runtime.spawn_blocking(move || publish_default(&cycler, &events, direction));
            },
        );
    }

    // ========================================================================
    // Switching
    // ========================================================================

    /// Dispatch a condition reported by a trigger detector
    ///
    /// Cycle hotkeys take precedence over profile hotkeys (config validation
    /// keeps them from overlapping anyway).
    pub fn handle_condition(&self, condition: &Condition) -> ConditionOutcome {
        if let Condition::HotKey { keys } = condition {
            let pressed = profile::normalize_hotkey(keys);
            let bound = Direction::ALL.into_iter().find(|&d| {
                self.hotkeys
                    .for_direction(d)
                    .is_some_and(|k| profile::normalize_hotkey(k) == pressed)
            });
            if let Some(direction) = bound {
                return ConditionOutcome::Cycled {
                    direction,
                    result: self.cycler.cycle_next(direction),
                };
            }
        }

        match self.matcher.on_condition(condition) {
            Some(report) => ConditionOutcome::Profile(report),
            None => ConditionOutcome::Unmatched,
        }
    }

    /// Cycle the default for `direction`
    ///
    /// # Errors
    /// See [`DeviceCycler::cycle`].
    pub fn cycle(&self, direction: Direction, step: Step) -> Result<DeviceIdentity, SwitchError> {
        self.cycler.cycle(direction, step)
    }

    /// Activate a profile by name; `None` if there is no such profile
    pub fn activate_profile(&self, name: &str) -> Option<ActivationReport> {
        self.matcher.activate_by_name(name)
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn select_device(&self, device: DeviceIdentity) -> bool {
        self.selection.select(device)
    }

    pub fn unselect_device(&self, device: &DeviceIdentity) -> bool {
        self.selection.unselect(device)
    }

    /// Current selection in persisted form
    #[must_use]
    pub fn selected_config_devices(&self) -> Vec<crate::device::PersistedDevice> {
        self.selection
            .snapshot()
            .iter()
            .map(DeviceIdentity::to_persisted)
            .collect()
    }

    /// Write the current selection back into the config file at `path`
    ///
    /// # Errors
    /// Returns an error if the config cannot be saved.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        config.devices = self.selected_config_devices();
        config.save_to(path)?;
        debug!("Saved {} selected devices to {:?}", config.devices.len(), path);
        Ok(())
    }

    /// Cancel pending debounce timers (best effort)
    pub fn shutdown(&self) {
        for debouncer in &self.debouncers {
            debouncer.cancel();
        }
        info!("Switching core shut down");
    }
}

/// Re-read the default for `direction` and publish it
fn publish_default(cycler: &DeviceCycler, events: &EventBus, direction: Direction) {
    match cycler.current_default(direction) {
        Ok(device) => {
            if let Some(ref device) = device {
                info!("Default {} device: {}", direction, device);
            }
            events.publish(Event::DefaultChanged { direction, device });
        }
        Err(e) => warn!("{}", e),
    }
}

/// Make a freshly plugged endpoint default if it is selected
fn switch_to_plugged(cycler: &DeviceCycler, direction: Direction, id: &str) {
    let plugged = match cycler.candidates(direction) {
        Ok(candidates) => candidates.into_iter().find(|d| d.id() == id),
        Err(e) => {
            warn!("{}", e);
            return;
        }
    };

    let Some(device) = plugged else {
        debug!("Plugged {} endpoint '{}' is not selected", direction, id);
        return;
    };

    info!("Selected device plugged in: {}", device);
    if let Err(e) = cycler.set_as_default(&device) {
        warn!("{}", e);
    }
}
