//! Observation and Presence Tests
//!
//! - Cancelling by path removes every observation at or under the path
//! - Composite observations are removed as a whole
//! - Presence notifications fire only on actual changes
//! - The presence service follows the registration lifecycle

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lwm2m_core::{ContentFormat, LwM2mPath};
use lwm2m_server::config::PresenceConfig;
use lwm2m_server::prelude::*;
use lwm2m_server::ObservationError;
use parking_lot::Mutex;

fn addr() -> SocketAddr {
    SocketAddr::from(([198, 51, 100, 4], 5683))
}

fn registered_store(endpoint: &str, binding: BindingMode) -> (RegistrationManager, String) {
    let manager = RegistrationManager::new(
        Arc::new(RegistrationStore::new()),
        Arc::new(ManualClock::at_epoch()),
    );
    let id = manager
        .register(
            RegistrationRequest::new(endpoint, Identity::unsecure(addr())).with_binding(binding),
        )
        .unwrap()
        .registration
        .id;
    (manager, id)
}

// ============================================================================
// Observations
// ============================================================================

#[test]
fn test_cancel_by_path_prefix() {
    let (manager, id) = registered_store("dev", BindingMode::U);
    let registry = ObservationRegistry::new(manager.store().clone());

    for path in [
        LwM2mPath::resource(3, 0, 1),
        LwM2mPath::object_instance(3, 0),
        LwM2mPath::object_instance(4, 0),
        LwM2mPath::resource(3, 1, 1),
    ] {
        registry
            .add_observation(Observation::single(id.clone(), path, None))
            .unwrap();
    }

    let removed = registry.cancel_observations_by_path(&id, &LwM2mPath::object_instance(3, 0));
    let mut removed_paths: Vec<LwM2mPath> = removed.iter().map(|o| o.paths()[0]).collect();
    removed_paths.sort();
    assert_eq!(
        removed_paths,
        vec![LwM2mPath::object_instance(3, 0), LwM2mPath::resource(3, 0, 1)]
    );

    let left: Vec<LwM2mPath> = registry
        .get_observations(&id)
        .iter()
        .map(|o| o.paths()[0])
        .collect();
    assert_eq!(
        left,
        vec![LwM2mPath::object_instance(4, 0), LwM2mPath::resource(3, 1, 1)]
    );
}

#[test]
fn test_composite_cancelled_as_whole() {
    let (manager, id) = registered_store("dev", BindingMode::U);
    let registry = ObservationRegistry::new(manager.store().clone());

    let composite = Observation::composite(
        id.clone(),
        vec![
            LwM2mPath::resource(3, 0, 9),
            LwM2mPath::resource(4, 0, 2),
            LwM2mPath::resource(3, 0, 9),
        ],
        ContentFormat::SenmlJson,
        ContentFormat::SenmlCbor,
    );
    let composite_id = composite.id;
    registry.add_observation(composite).unwrap();

    let stored = registry.get_observation(&composite_id).unwrap();
    assert!(stored.is_composite());
    assert_eq!(stored.paths().len(), 3);

    let removed = registry.cancel_observations_by_path(&id, &LwM2mPath::object(4));
    assert_eq!(removed.len(), 1);
    assert!(registry.get_observation(&composite_id).is_none());
}

#[test]
fn test_cancel_by_id() {
    let (manager, id) = registered_store("dev", BindingMode::U);
    let registry = ObservationRegistry::new(manager.store().clone());

    let observation = Observation::single(id.clone(), LwM2mPath::resource(3, 0, 13), None)
        .with_context("app", "dashboard");
    let observation_id = observation.id;
    registry.add_observation(observation).unwrap();

    let cancelled = registry.cancel_observation(&observation_id).unwrap();
    assert_eq!(cancelled.context["app"], "dashboard");
    assert_eq!(
        registry.cancel_observation(&observation_id),
        Err(ObservationError::NotFound(observation_id))
    );
    assert!(registry.cancel_all(&id).is_empty());
}

// ============================================================================
// Presence
// ============================================================================

#[derive(Default)]
struct Recorder {
    changes: Mutex<Vec<String>>,
}

impl PresenceListener for Recorder {
    fn on_awake(&self, registration: &Registration) {
        self.changes.lock().push(format!("awake {}", registration.endpoint));
    }

    fn on_sleeping(&self, registration: &Registration) {
        self.changes.lock().push(format!("sleeping {}", registration.endpoint));
    }
}

/// Manager with a presence service following it, and a recorder on the
/// presence service.
fn tracked(
    clock: Arc<ManualClock>,
    config: PresenceConfig,
) -> (RegistrationManager, Arc<PresenceService>, Arc<Recorder>) {
    let manager = RegistrationManager::new(Arc::new(RegistrationStore::new()), clock.clone());
    let presence = Arc::new(PresenceService::new(clock).with_config(config));
    let recorder = Arc::new(Recorder::default());
    presence.add_listener(recorder.clone());
    manager.add_listener(presence.clone());
    (manager, presence, recorder)
}

fn register_queued(manager: &RegistrationManager) -> Registration {
    manager
        .register(
            RegistrationRequest::new("queued", Identity::unsecure(addr()))
                .with_binding(BindingMode::U | BindingMode::Q),
        )
        .unwrap()
        .registration
}

#[test]
fn test_presence_idempotent() {
    let (manager, presence, recorder) =
        tracked(Arc::new(ManualClock::at_epoch()), PresenceConfig::default());
    let registration = register_queued(&manager);

    presence.set_awake(&registration);
    presence.set_sleeping(&registration);
    presence.set_sleeping(&registration);
    presence.set_awake(&registration);
    presence.set_awake(&registration);

    assert_eq!(*recorder.changes.lock(), vec!["sleeping queued", "awake queued"]);
}

#[test]
fn test_update_wakes_sleeping_client() {
    let clock = Arc::new(ManualClock::at_epoch());
    let (manager, presence, recorder) = tracked(
        clock.clone(),
        PresenceConfig {
            awake_time: Duration::from_secs(10),
        },
    );
    let registration = register_queued(&manager);

    clock.advance_secs(11);
    presence.tick(clock.now());
    assert!(!presence.is_client_awake(&registration));

    manager
        .update(RegistrationUpdate::new(registration.id.clone()))
        .unwrap();
    assert!(presence.is_client_awake(&registration));

    // The awake window restarts at the update
    clock.advance_secs(9);
    presence.tick(clock.now());
    assert!(presence.is_client_awake(&registration));

    manager
        .update(RegistrationUpdate::new(registration.id.clone()))
        .unwrap();
    assert_eq!(*recorder.changes.lock(), vec!["sleeping queued", "awake queued"]);
}

#[test]
fn test_stale_registration_not_tracked() {
    let (manager, presence, recorder) =
        tracked(Arc::new(ManualClock::at_epoch()), PresenceConfig::default());
    let registration = register_queued(&manager);
    manager.deregister(&registration.id).unwrap();

    presence.set_awake(&registration);
    assert_eq!(presence.tracked_count(), 0);
    assert!(!presence.is_client_awake(&registration));
    assert!(recorder.changes.lock().is_empty());
}

#[test]
fn test_presence_follows_registrations() {
    let clock = Arc::new(ManualClock::at_epoch());
    let manager = RegistrationManager::new(Arc::new(RegistrationStore::new()), clock.clone());
    let presence = Arc::new(PresenceService::new(clock));
    let recorder = Arc::new(Recorder::default());
    presence.add_listener(recorder.clone());
    manager.add_listener(presence.clone());

    let registration = manager
        .register(
            RegistrationRequest::new("queued", Identity::unsecure(addr()))
                .with_binding(BindingMode::U | BindingMode::Q),
        )
        .unwrap()
        .registration;
    assert!(presence.is_client_awake(&registration));

    presence.set_sleeping(&registration);
    assert!(!presence.is_client_awake(&registration));

    // Re-registration starts awake again, without a notification
    let registration = manager
        .register(
            RegistrationRequest::new("queued", Identity::unsecure(addr()))
                .with_binding(BindingMode::U | BindingMode::Q),
        )
        .unwrap()
        .registration;
    assert!(presence.is_client_awake(&registration));
    assert_eq!(presence.tracked_count(), 1);

    manager.deregister(&registration.id).unwrap();
    assert_eq!(presence.tracked_count(), 0);
    assert_eq!(*recorder.changes.lock(), vec!["sleeping queued"]);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_presence_and_observation_events() {
    let bus = EventBus::new();
    let mut presence_events = bus.filter().presence_events();
    let mut observation_events = bus.filter().observation_events();

    let manager = RegistrationManager::new(
        Arc::new(RegistrationStore::new()),
        Arc::new(ManualClock::at_epoch()),
    );
    let presence = Arc::new(
        PresenceService::new(Arc::new(ManualClock::at_epoch())).with_event_bus(bus.clone()),
    );
    manager.add_listener(presence.clone());
    let registration = register_queued(&manager);
    let id = registration.id.clone();
    let registry = ObservationRegistry::new(manager.store().clone()).with_event_bus(bus.clone());

    presence.set_sleeping(&registration);
    presence.set_awake(&registration);

    let token = ObservationId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]);
    let observation = Observation::single(id.clone(), LwM2mPath::resource(3, 0, 13), None)
        .with_id(token)
        .with_protocol_data("coap-token", token.to_string());
    registry.add_observation(observation).unwrap();
    assert_eq!(
        registry.get_observation(&token).unwrap().protocol_data["coap-token"],
        "0102030405060708"
    );
    registry.cancel_all(&id);

    let (sleeping, _) = presence_events.recv().await.unwrap();
    assert_eq!(sleeping.type_name(), "Sleeping");
    let (awake, _) = presence_events.recv().await.unwrap();
    assert_eq!(awake.type_name(), "Awake");

    let (added, _) = observation_events.recv().await.unwrap();
    assert_eq!(
        added,
        Lwm2mEvent::ObservationAdded {
            observation_id: "0102030405060708".to_string(),
            registration_id: id.clone(),
            timestamp: added.timestamp(),
        }
    );
    let (cancelled, _) = observation_events.recv().await.unwrap();
    assert_eq!(cancelled.type_name(), "ObservationCancelled");
}
