//! Registration lifecycle: register, update, de-register, expire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lwm2m_core::attribute::find_root_path;
use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info};

use super::store::RegistrationStore;
use super::sweeper::ExpirationSweeper;
use super::{
    supported_objects, BindingMode, Deregistered, Registered, Registration, RegistrationListener,
    RegistrationRequest, RegistrationUpdate, Updated,
};
use crate::clock::SharedClock;
use crate::config::registration::{DEFAULT_LWM2M_VERSION, ID_LENGTH, MAX_LIFETIME_SECS};
use crate::config::RegistrationConfig;
use crate::error::RegistrationError;
use crate::event::{EventBus, Lwm2mEvent};
use crate::identity::Identity;
use crate::observation::Observation;

/// Owns the registration lifecycle.
///
/// Lookups only return registrations that are still alive according to
/// the clock, even before the sweeper removed them.
pub struct RegistrationManager {
    store: Arc<RegistrationStore>,
    clock: SharedClock,
    config: RegistrationConfig,
    listeners: RwLock<Vec<Arc<dyn RegistrationListener>>>,
    events: Option<EventBus>,
}

impl RegistrationManager {
    pub fn new(store: Arc<RegistrationStore>, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            config: RegistrationConfig::default(),
            listeners: RwLock::new(Vec::new()),
            events: None,
        }
    }

    pub fn with_config(mut self, config: RegistrationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<RegistrationStore> {
        &self.store
    }

    pub fn add_listener(&self, listener: Arc<dyn RegistrationListener>) {
        self.listeners.write().push(listener);
    }

    /// Handle a Register request. A live or stale registration of the same
    /// endpoint is replaced and its observations are dropped.
    pub fn register(&self, request: RegistrationRequest) -> Result<Registered, RegistrationError> {
        if request.endpoint.is_empty() {
            return Err(RegistrationError::InvalidRequest(
                "endpoint name is mandatory".to_string(),
            ));
        }
        check_lifetime(request.lifetime)?;

        let now = self.clock.now();
        let root_path = find_root_path(&request.object_links);
        let registration = Registration {
            id: generate_id(),
            endpoint: request.endpoint,
            identity: request.identity,
            lifetime: request
                .lifetime
                .unwrap_or(self.config.default_lifetime.as_secs()),
            lwm2m_version: request
                .lwm2m_version
                .unwrap_or_else(|| DEFAULT_LWM2M_VERSION.to_string()),
            binding: request.binding.unwrap_or(BindingMode::U),
            sms_number: request.sms_number,
            supported_objects: supported_objects(&request.object_links, &root_path),
            object_links: request.object_links,
            root_path,
            additional_attributes: request.additional_attributes,
            registration_date: now,
            last_update: now,
        };

        let (previous, previous_observations) =
            match self.store.add_registration(registration.clone()) {
                Some((previous, observations)) => (Some(previous), observations),
                None => (None, Vec::new()),
            };

        info!(
            endpoint = %registration.endpoint,
            registration = %registration.id,
            lifetime = registration.lifetime,
            binding = %registration.binding,
            replaced = previous.as_ref().map(|p| p.id.as_str()),
            "Client registered"
        );
        self.publish(Lwm2mEvent::Registered {
            registration_id: registration.id.clone(),
            endpoint: registration.endpoint.clone(),
            replaced: previous.as_ref().map(|p| p.id.clone()),
            timestamp: now.timestamp(),
        });

        let registered = Registered {
            registration,
            previous,
            previous_observations,
        };
        for listener in self.listeners() {
            listener.registered(&registered);
        }
        Ok(registered)
    }

    /// Handle an Update request. The lifetime restarts at the update.
    pub fn update(&self, update: RegistrationUpdate) -> Result<Updated, RegistrationError> {
        check_lifetime(update.lifetime)?;
        let now = self.clock.now();
        let (previous, registration) = self.store.update_registration(&update, now)?;

        debug!(
            endpoint = %registration.endpoint,
            registration = %registration.id,
            "Registration updated"
        );
        self.publish(Lwm2mEvent::Updated {
            registration_id: registration.id.clone(),
            endpoint: registration.endpoint.clone(),
            timestamp: now.timestamp(),
        });

        let updated = Updated {
            update,
            registration,
            previous,
        };
        for listener in self.listeners() {
            listener.updated(&updated);
        }
        Ok(updated)
    }

    /// Handle a De-register request.
    pub fn deregister(&self, registration_id: &str) -> Result<Deregistered, RegistrationError> {
        let (registration, observations) = self
            .store
            .remove_registration(registration_id)
            .ok_or_else(|| RegistrationError::NotFound(registration_id.to_string()))?;

        info!(
            endpoint = %registration.endpoint,
            registration = %registration.id,
            "Client deregistered"
        );
        Ok(self.removed(registration, observations, false))
    }

    /// Remove every registration expired at the current clock time.
    pub fn sweep_expired(&self) -> Vec<Deregistered> {
        let now = self.clock.now();
        let mut removed = Vec::new();
        for id in self.store.expired_ids(now) {
            let Some((registration, observations)) = self.store.remove_if_expired(&id, now) else {
                continue;
            };
            info!(
                endpoint = %registration.endpoint,
                registration = %registration.id,
                "Registration expired"
            );
            removed.push(self.removed(registration, observations, true));
        }
        removed
    }

    /// Run [`sweep_expired`](Self::sweep_expired) periodically. The task
    /// holds a weak reference and ends when the manager is dropped.
    pub fn start_expiration_sweeper(self: &Arc<Self>) -> ExpirationSweeper {
        self.start_expiration_sweeper_every(self.config.sweep_interval)
    }

    pub fn start_expiration_sweeper_every(self: &Arc<Self>, interval: Duration) -> ExpirationSweeper {
        ExpirationSweeper::spawn(Arc::downgrade(self), interval)
    }

    pub fn get_by_id(&self, registration_id: &str) -> Option<Registration> {
        self.alive(self.store.get(registration_id))
    }

    pub fn get_by_endpoint(&self, endpoint: &str) -> Option<Registration> {
        self.alive(self.store.get_by_endpoint(endpoint))
    }

    pub fn get_by_address(&self, address: SocketAddr) -> Option<Registration> {
        let now = self.clock.now();
        self.store
            .find_all(|r| r.identity.address() == address && r.is_alive_at(now))
            .into_iter()
            .next()
    }

    /// Registration authenticated with the same credential as `identity`.
    pub fn get_by_identity(&self, identity: &Identity) -> Option<Registration> {
        let now = self.clock.now();
        self.store
            .find_all(|r| r.identity.same_credential(identity) && r.is_alive_at(now))
            .into_iter()
            .next()
    }

    pub fn all_registrations(&self) -> Vec<Registration> {
        let now = self.clock.now();
        let mut all = self.store.find_all(|r| r.is_alive_at(now));
        all.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        all
    }

    fn alive(&self, registration: Option<Registration>) -> Option<Registration> {
        let now = self.clock.now();
        registration.filter(|r| r.is_alive_at(now))
    }

    fn removed(
        &self,
        registration: Registration,
        observations: Vec<Observation>,
        expired: bool,
    ) -> Deregistered {
        self.publish(Lwm2mEvent::Deregistered {
            registration_id: registration.id.clone(),
            endpoint: registration.endpoint.clone(),
            expired,
            timestamp: self.clock.now().timestamp(),
        });
        let deregistered = Deregistered {
            registration,
            observations,
            expired,
        };
        for listener in self.listeners() {
            listener.unregistered(&deregistered);
        }
        deregistered
    }

    fn listeners(&self) -> Vec<Arc<dyn RegistrationListener>> {
        self.listeners.read().clone()
    }

    fn publish(&self, event: Lwm2mEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

fn check_lifetime(lifetime: Option<u64>) -> Result<(), RegistrationError> {
    match lifetime {
        Some(0) => Err(RegistrationError::InvalidRequest(
            "lifetime must be positive".to_string(),
        )),
        Some(secs) if secs > MAX_LIFETIME_SECS => Err(RegistrationError::InvalidRequest(format!(
            "lifetime {} exceeds {} seconds",
            secs, MAX_LIFETIME_SECS
        ))),
        _ => Ok(()),
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::clock::ManualClock;
    use lwm2m_core::LwM2mPath;

    fn addr() -> SocketAddr {
        SocketAddr::from(([192, 168, 0, 7], 56830))
    }

    fn manager() -> (RegistrationManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let manager = RegistrationManager::new(Arc::new(RegistrationStore::new()), clock.clone());
        (manager, clock)
    }

    #[derive(Default)]
    struct Counting {
        registered: AtomicUsize,
        updated: AtomicUsize,
        unregistered: AtomicUsize,
    }

    impl RegistrationListener for Counting {
        fn registered(&self, _: &Registered) {
            self.registered.fetch_add(1, Ordering::SeqCst);
        }

        fn updated(&self, _: &Updated) {
            self.updated.fetch_add(1, Ordering::SeqCst);
        }

        fn unregistered(&self, _: &Deregistered) {
            self.unregistered.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_register_defaults() {
        let (manager, _) = manager();
        let registered = manager
            .register(RegistrationRequest::new("dev", Identity::unsecure(addr())))
            .unwrap();
        let registration = registered.registration;
        assert_eq!(registration.id.len(), ID_LENGTH);
        assert_eq!(registration.lifetime, 86400);
        assert_eq!(registration.lwm2m_version, "1.0");
        assert_eq!(registration.binding, BindingMode::U);
        assert_eq!(registration.root_path, "/");
    }

    #[test]
    fn test_register_rejects_bad_requests() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.register(RegistrationRequest::new("", Identity::unsecure(addr()))),
            Err(RegistrationError::InvalidRequest(_))
        ));
        assert!(matches!(
            manager.register(
                RegistrationRequest::new("dev", Identity::unsecure(addr())).with_lifetime(0)
            ),
            Err(RegistrationError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_reregister_drops_observations() {
        let (manager, _) = manager();
        let first = manager
            .register(RegistrationRequest::new("dev", Identity::unsecure(addr())))
            .unwrap();
        manager
            .store()
            .add_observation(Observation::single(
                first.registration.id.clone(),
                LwM2mPath::object(3),
                None,
            ))
            .unwrap();

        let second = manager
            .register(RegistrationRequest::new("dev", Identity::unsecure(addr())))
            .unwrap();
        assert_eq!(second.previous.unwrap().id, first.registration.id);
        assert_eq!(second.previous_observations.len(), 1);
        assert!(manager.get_by_id(&first.registration.id).is_none());
    }

    #[test]
    fn test_listeners_called() {
        let (manager, clock) = manager();
        let counting = Arc::new(Counting::default());
        manager.add_listener(counting.clone());

        let id = manager
            .register(
                RegistrationRequest::new("dev", Identity::unsecure(addr())).with_lifetime(10),
            )
            .unwrap()
            .registration
            .id;
        manager.update(RegistrationUpdate::new(id.clone())).unwrap();
        clock.advance_secs(11);
        let expired = manager.sweep_expired();

        assert_eq!(expired.len(), 1);
        assert!(expired[0].expired);
        assert_eq!(counting.registered.load(Ordering::SeqCst), 1);
        assert_eq!(counting.updated.load(Ordering::SeqCst), 1);
        assert_eq!(counting.unregistered.load(Ordering::SeqCst), 1);
        assert!(matches!(
            manager.deregister(&id),
            Err(RegistrationError::NotFound(_))
        ));
    }

    #[test]
    fn test_lookup_by_identity_and_address() {
        let (manager, _) = manager();
        manager
            .register(RegistrationRequest::new("dev", Identity::psk(addr(), "dev-psk")))
            .unwrap();

        let moved = Identity::psk(SocketAddr::from(([192, 168, 0, 8], 1)), "dev-psk");
        assert_eq!(manager.get_by_identity(&moved).unwrap().endpoint, "dev");
        assert_eq!(manager.get_by_address(addr()).unwrap().endpoint, "dev");
        assert!(manager.get_by_address(moved.address()).is_none());
    }
}
