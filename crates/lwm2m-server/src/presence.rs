//! Queue mode presence tracking.
//!
//! Clients that registered with the `Q` binding may sleep between
//! exchanges. The service keeps one awake/sleeping flag per registration
//! and tells [`PresenceListener`]s about every actual change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::clock::SharedClock;
use crate::config::PresenceConfig;
use crate::event::{EventBus, Lwm2mEvent};
use crate::registration::{Deregistered, Registered, Registration, RegistrationListener, Updated};

/// Called synchronously on presence changes, in the order listeners were
/// added.
pub trait PresenceListener: Send + Sync {
    fn on_awake(&self, registration: &Registration);

    fn on_sleeping(&self, registration: &Registration);
}

#[derive(Debug, Clone)]
struct PresenceState {
    registration: Registration,
    awake: bool,
    last_awake: DateTime<Utc>,
}

enum Change {
    Awake(Registration),
    Sleeping(Registration),
}

pub struct PresenceService {
    states: DashMap<String, PresenceState>,
    listeners: RwLock<Vec<Arc<dyn PresenceListener>>>,
    clock: SharedClock,
    config: PresenceConfig,
    events: Option<EventBus>,
}

impl PresenceService {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            states: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            clock,
            config: PresenceConfig::default(),
            events: None,
        }
    }

    pub fn with_config(mut self, config: PresenceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn add_listener(&self, listener: Arc<dyn PresenceListener>) {
        self.listeners.write().push(listener);
    }

    /// Mark a queue mode client awake, typically on any uplink message.
    /// Listeners are notified only if it was sleeping. Clients are tracked
    /// from their registration on, so an untracked one is ignored.
    pub fn set_awake(&self, registration: &Registration) {
        if !registration.uses_queue_mode() {
            return;
        }
        let now = self.clock.now();
        let woke = match self.states.get_mut(&registration.id) {
            Some(mut state) => {
                let woke = !state.awake;
                state.awake = true;
                state.last_awake = now;
                state.registration = registration.clone();
                woke
            }
            None => {
                debug!(
                    endpoint = %registration.endpoint,
                    registration = %registration.id,
                    "Ignoring presence of untracked client"
                );
                false
            }
        };
        if woke {
            self.notify(Change::Awake(registration.clone()));
        }
    }

    /// Mark a client sleeping. No-op if untracked or already sleeping.
    pub fn set_sleeping(&self, registration: &Registration) {
        let changed = match self.states.get_mut(&registration.id) {
            Some(mut state) if state.awake => {
                state.awake = false;
                Some(state.registration.clone())
            }
            _ => None,
        };
        if let Some(registration) = changed {
            self.notify(Change::Sleeping(registration));
        }
    }

    /// Whether a downlink request can be sent now.
    pub fn is_client_awake(&self, registration: &Registration) -> bool {
        if !registration.uses_queue_mode() {
            return true;
        }
        self.states
            .get(&registration.id)
            .map(|state| state.awake)
            .unwrap_or(false)
    }

    /// Put to sleep the clients whose awake window has elapsed at `now`.
    /// A zero awake time disables this.
    pub fn tick(&self, now: DateTime<Utc>) {
        if self.config.awake_time.is_zero() {
            return;
        }
        let Ok(window) = chrono::Duration::from_std(self.config.awake_time) else {
            return;
        };
        let mut sleeping = Vec::new();
        for mut state in self.states.iter_mut() {
            if state.awake && state.last_awake + window <= now {
                state.awake = false;
                sleeping.push(state.registration.clone());
            }
        }
        for registration in sleeping {
            self.notify(Change::Sleeping(registration));
        }
    }

    /// Forget a client without notifying.
    pub fn stop_tracking(&self, registration_id: &str) {
        self.states.remove(registration_id);
    }

    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }

    fn start_tracking(&self, registration: &Registration) {
        if !registration.uses_queue_mode() {
            return;
        }
        self.states.insert(
            registration.id.clone(),
            PresenceState {
                registration: registration.clone(),
                awake: true,
                last_awake: self.clock.now(),
            },
        );
    }

    /// Runs with no map entry borrowed.
    fn notify(&self, change: Change) {
        let listeners = self.listeners.read().clone();
        let timestamp = self.clock.now().timestamp();
        match change {
            Change::Awake(registration) => {
                debug!(endpoint = %registration.endpoint, "Client awake");
                for listener in &listeners {
                    listener.on_awake(&registration);
                }
                self.publish(Lwm2mEvent::Awake {
                    registration_id: registration.id,
                    endpoint: registration.endpoint,
                    timestamp,
                });
            }
            Change::Sleeping(registration) => {
                debug!(endpoint = %registration.endpoint, "Client sleeping");
                for listener in &listeners {
                    listener.on_sleeping(&registration);
                }
                self.publish(Lwm2mEvent::Sleeping {
                    registration_id: registration.id,
                    endpoint: registration.endpoint,
                    timestamp,
                });
            }
        }
    }

    fn publish(&self, event: Lwm2mEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

impl RegistrationListener for PresenceService {
    fn registered(&self, registered: &Registered) {
        if let Some(previous) = &registered.previous {
            self.stop_tracking(&previous.id);
        }
        self.start_tracking(&registered.registration);
    }

    /// An update is uplink traffic, so the client is awake again.
    fn updated(&self, updated: &Updated) {
        let registration = &updated.registration;
        if !registration.uses_queue_mode() {
            self.stop_tracking(&registration.id);
            return;
        }
        if self.states.contains_key(&registration.id) {
            self.set_awake(registration);
        } else {
            // switched to queue mode by this update
            self.start_tracking(registration);
        }
    }

    fn unregistered(&self, deregistered: &Deregistered) {
        self.stop_tracking(&deregistered.registration.id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::Identity;
    use crate::registration::BindingMode;

    fn registration(binding: BindingMode) -> Registration {
        Registration {
            id: "r1".to_string(),
            endpoint: "dev".to_string(),
            identity: Identity::unsecure(SocketAddr::from(([10, 0, 0, 1], 5683))),
            lifetime: 300,
            lwm2m_version: "1.1".to_string(),
            binding,
            sms_number: None,
            object_links: Vec::new(),
            root_path: "/".to_string(),
            supported_objects: BTreeMap::new(),
            additional_attributes: BTreeMap::new(),
            registration_date: DateTime::UNIX_EPOCH,
            last_update: DateTime::UNIX_EPOCH,
        }
    }

    #[derive(Default)]
    struct Counting {
        awake: AtomicUsize,
        sleeping: AtomicUsize,
    }

    impl PresenceListener for Counting {
        fn on_awake(&self, _: &Registration) {
            self.awake.fetch_add(1, Ordering::SeqCst);
        }

        fn on_sleeping(&self, _: &Registration) {
            self.sleeping.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_non_queue_mode_always_awake() {
        let service = PresenceService::new(Arc::new(ManualClock::at_epoch()));
        let registration = registration(BindingMode::U);
        service.set_sleeping(&registration);
        assert!(service.is_client_awake(&registration));
        assert_eq!(service.tracked_count(), 0);
    }

    #[test]
    fn test_sleeping_untracked_is_noop() {
        let service = PresenceService::new(Arc::new(ManualClock::at_epoch()));
        let counting = Arc::new(Counting::default());
        service.add_listener(counting.clone());

        let registration = registration(BindingMode::U | BindingMode::Q);
        service.set_sleeping(&registration);
        assert_eq!(counting.sleeping.load(Ordering::SeqCst), 0);
        assert!(!service.is_client_awake(&registration));
    }

    #[test]
    fn test_tick_puts_clients_to_sleep() {
        let clock = Arc::new(ManualClock::at_epoch());
        let service = PresenceService::new(clock.clone()).with_config(PresenceConfig {
            awake_time: Duration::from_secs(10),
        });
        let counting = Arc::new(Counting::default());
        service.add_listener(counting.clone());

        let registration = registration(BindingMode::U | BindingMode::Q);
        service.start_tracking(&registration);
        service.tick(DateTime::from_timestamp(9, 0).unwrap());
        assert!(service.is_client_awake(&registration));
        service.tick(DateTime::from_timestamp(10, 0).unwrap());
        assert!(!service.is_client_awake(&registration));
        service.tick(DateTime::from_timestamp(20, 0).unwrap());
        assert_eq!(counting.sleeping.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_awake_time_never_sleeps() {
        let service = PresenceService::new(Arc::new(ManualClock::at_epoch())).with_config(
            PresenceConfig {
                awake_time: Duration::ZERO,
            },
        );
        let registration = registration(BindingMode::Q);
        service.start_tracking(&registration);
        service.tick(DateTime::from_timestamp(100_000, 0).unwrap());
        assert!(service.is_client_awake(&registration));
    }
}
