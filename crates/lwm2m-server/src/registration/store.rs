//! In-memory registration and observation store.
//!
//! Registrations are indexed by id and by endpoint. Observations are
//! indexed by id and by owning registration. When both locks are needed
//! the registration lock is always taken first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{Registration, RegistrationUpdate};
use crate::error::{ObservationError, RegistrationError};
use crate::observation::{Observation, ObservationId};

#[derive(Default)]
struct Registrations {
    by_id: HashMap<String, Registration>,
    /// Endpoint name to registration id
    by_endpoint: HashMap<String, String>,
}

#[derive(Default)]
struct Observations {
    by_id: HashMap<ObservationId, Observation>,
    by_registration: HashMap<String, Vec<ObservationId>>,
}

impl Observations {
    fn insert(&mut self, observation: Observation) {
        self.by_registration
            .entry(observation.registration_id.clone())
            .or_default()
            .push(observation.id);
        self.by_id.insert(observation.id, observation);
    }

    fn remove(&mut self, id: &ObservationId) -> Option<Observation> {
        let observation = self.by_id.remove(id)?;
        if let Some(ids) = self.by_registration.get_mut(&observation.registration_id) {
            ids.retain(|other| other != id);
            if ids.is_empty() {
                self.by_registration.remove(&observation.registration_id);
            }
        }
        Some(observation)
    }

    /// Remove the observations of `registration_id` matching `predicate`,
    /// in insertion order.
    fn remove_where<F>(&mut self, registration_id: &str, predicate: F) -> Vec<Observation>
    where
        F: Fn(&Observation) -> bool,
    {
        let ids: Vec<ObservationId> = self
            .by_registration
            .get(registration_id)
            .map(|ids| {
                ids.iter()
                    .filter(|id| self.by_id.get(id).is_some_and(&predicate))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }
}

/// Registrations plus the observations that belong to them.
#[derive(Default)]
pub struct RegistrationStore {
    registrations: RwLock<Registrations>,
    observations: RwLock<Observations>,
}

impl RegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a registration. A registration of the same endpoint is
    /// replaced; it is returned together with its observations.
    pub fn add_registration(
        &self,
        registration: Registration,
    ) -> Option<(Registration, Vec<Observation>)> {
        let mut regs = self.registrations.write();
        let previous_id = regs
            .by_endpoint
            .insert(registration.endpoint.clone(), registration.id.clone());
        let previous = previous_id
            .filter(|id| *id != registration.id)
            .and_then(|id| regs.by_id.remove(&id));
        regs.by_id.insert(registration.id.clone(), registration);

        let previous = previous?;
        let observations = self
            .observations
            .write()
            .remove_where(&previous.id, |_| true);
        Some((previous, observations))
    }

    /// Apply `update` at `now`. Returns the previous and the updated
    /// registration.
    pub fn update_registration(
        &self,
        update: &RegistrationUpdate,
        now: DateTime<Utc>,
    ) -> Result<(Registration, Registration), RegistrationError> {
        let mut regs = self.registrations.write();
        let current = regs
            .by_id
            .get_mut(&update.registration_id)
            .ok_or_else(|| RegistrationError::NotFound(update.registration_id.clone()))?;
        let updated = update.apply(current, now);
        let previous = std::mem::replace(current, updated.clone());
        Ok((previous, updated))
    }

    /// Remove a registration and its observations.
    pub fn remove_registration(&self, id: &str) -> Option<(Registration, Vec<Observation>)> {
        let mut regs = self.registrations.write();
        let registration = regs.by_id.remove(id)?;
        if regs.by_endpoint.get(&registration.endpoint).map(String::as_str) == Some(id) {
            regs.by_endpoint.remove(&registration.endpoint);
        }
        let observations = self.observations.write().remove_where(id, |_| true);
        Some((registration, observations))
    }

    /// Remove a registration only if it is still expired at `now`. An
    /// update racing with the sweeper wins.
    pub fn remove_if_expired(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Option<(Registration, Vec<Observation>)> {
        {
            let regs = self.registrations.read();
            let registration = regs.by_id.get(id)?;
            if registration.is_alive_at(now) {
                return None;
            }
        }
        let mut regs = self.registrations.write();
        if regs.by_id.get(id)?.is_alive_at(now) {
            return None;
        }
        let registration = regs.by_id.remove(id)?;
        if regs.by_endpoint.get(&registration.endpoint).map(String::as_str) == Some(id) {
            regs.by_endpoint.remove(&registration.endpoint);
        }
        let observations = self.observations.write().remove_where(id, |_| true);
        Some((registration, observations))
    }

    /// Ids of the registrations expired at `now`.
    pub fn expired_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        self.registrations
            .read()
            .by_id
            .values()
            .filter(|registration| !registration.is_alive_at(now))
            .map(|registration| registration.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Registration> {
        self.registrations.read().by_id.get(id).cloned()
    }

    pub fn get_by_endpoint(&self, endpoint: &str) -> Option<Registration> {
        let regs = self.registrations.read();
        regs.by_endpoint
            .get(endpoint)
            .and_then(|id| regs.by_id.get(id))
            .cloned()
    }

    pub fn find_all<F>(&self, predicate: F) -> Vec<Registration>
    where
        F: Fn(&Registration) -> bool,
    {
        self.registrations
            .read()
            .by_id
            .values()
            .filter(|registration| predicate(registration))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert an observation. The registration read lock is held so the
    /// registration cannot disappear meanwhile. Observations of the same
    /// registration with the same target are replaced and returned.
    pub fn add_observation(
        &self,
        observation: Observation,
    ) -> Result<Vec<Observation>, ObservationError> {
        let regs = self.registrations.read();
        if !regs.by_id.contains_key(&observation.registration_id) {
            return Err(ObservationError::UnknownRegistration(
                observation.registration_id,
            ));
        }
        let mut observations = self.observations.write();
        let replaced = observations.remove_where(&observation.registration_id, |other| {
            other.has_same_target(&observation)
        });
        observations.insert(observation);
        Ok(replaced)
    }

    pub fn remove_observation(&self, id: &ObservationId) -> Option<Observation> {
        self.observations.write().remove(id)
    }

    pub fn remove_observations_where<F>(
        &self,
        registration_id: &str,
        predicate: F,
    ) -> Vec<Observation>
    where
        F: Fn(&Observation) -> bool,
    {
        self.observations
            .write()
            .remove_where(registration_id, predicate)
    }

    pub fn get_observation(&self, id: &ObservationId) -> Option<Observation> {
        self.observations.read().by_id.get(id).cloned()
    }

    /// Observations of a registration, in insertion order.
    pub fn observations_of(&self, registration_id: &str) -> Vec<Observation> {
        let observations = self.observations.read();
        observations
            .by_registration
            .get(registration_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| observations.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::SocketAddr;

    use lwm2m_core::LwM2mPath;

    use super::*;
    use crate::identity::Identity;
    use crate::registration::BindingMode;

    fn registration(id: &str, endpoint: &str) -> Registration {
        Registration {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
            identity: Identity::unsecure(SocketAddr::from(([10, 0, 0, 1], 5683))),
            lifetime: 100,
            lwm2m_version: "1.1".to_string(),
            binding: BindingMode::U,
            sms_number: None,
            object_links: Vec::new(),
            root_path: "/".to_string(),
            supported_objects: BTreeMap::new(),
            additional_attributes: BTreeMap::new(),
            registration_date: DateTime::UNIX_EPOCH,
            last_update: DateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_replace_same_endpoint() {
        let store = RegistrationStore::new();
        assert!(store.add_registration(registration("r1", "dev")).is_none());
        store
            .add_observation(Observation::single("r1", LwM2mPath::object(3), None))
            .unwrap();

        let (previous, observations) = store.add_registration(registration("r2", "dev")).unwrap();
        assert_eq!(previous.id, "r1");
        assert_eq!(observations.len(), 1);
        assert_eq!(store.get_by_endpoint("dev").unwrap().id, "r2");
        assert!(store.get("r1").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_observation_needs_registration() {
        let store = RegistrationStore::new();
        let result = store.add_observation(Observation::single("nope", LwM2mPath::object(3), None));
        assert_eq!(
            result,
            Err(ObservationError::UnknownRegistration("nope".to_string()))
        );
    }

    #[test]
    fn test_same_target_replaced() {
        let store = RegistrationStore::new();
        store.add_registration(registration("r1", "dev"));
        let first = Observation::single("r1", LwM2mPath::resource(3, 0, 9), None);
        let first_id = first.id;
        store.add_observation(first).unwrap();

        let replaced = store
            .add_observation(Observation::single("r1", LwM2mPath::resource(3, 0, 9), None))
            .unwrap();
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].id, first_id);
        assert_eq!(store.observations_of("r1").len(), 1);
    }

    #[test]
    fn test_remove_if_expired_rechecks() {
        let store = RegistrationStore::new();
        store.add_registration(registration("r1", "dev"));
        let at = |secs| DateTime::from_timestamp(secs, 0).unwrap();

        assert_eq!(store.expired_ids(at(101)), vec!["r1".to_string()]);
        store
            .update_registration(&RegistrationUpdate::new("r1"), at(101))
            .unwrap();
        assert!(store.remove_if_expired("r1", at(101)).is_none());
        assert!(store.remove_if_expired("r1", at(202)).is_some());
        assert!(store.is_empty());
        assert!(store.get_by_endpoint("dev").is_none());
    }
}
