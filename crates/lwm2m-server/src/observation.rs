//! Observation bookkeeping.
//!
//! The registry correlates observe requests with their registration so
//! that notifications can be matched and so that removing a registration
//! releases its observations. Observations are stored next to the
//! registrations in [`RegistrationStore`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use lwm2m_core::{ContentFormat, LwM2mPath};
use rand::RngCore;
use tracing::debug;

use crate::config::observation::TOKEN_LENGTH;
use crate::error::ObservationError;
use crate::event::{EventBus, Lwm2mEvent};
use crate::registration::RegistrationStore;

/// Opaque observation token, displayed as hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationId([u8; TOKEN_LENGTH]);

impl ObservationId {
    pub fn random() -> Self {
        let mut bytes = [0u8; TOKEN_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; TOKEN_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ObservationId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; TOKEN_LENGTH];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// What an observation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationTarget {
    Single {
        path: LwM2mPath,
        content_format: Option<ContentFormat>,
    },
    /// Ordered paths; duplicates are kept as requested
    Composite {
        paths: Vec<LwM2mPath>,
        request_format: ContentFormat,
        response_format: ContentFormat,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub id: ObservationId,
    pub registration_id: String,
    pub target: ObservationTarget,
    /// Application metadata
    pub context: BTreeMap<String, String>,
    /// Transport metadata, such as the peer address the token belongs to
    pub protocol_data: BTreeMap<String, String>,
}

impl Observation {
    pub fn single(
        registration_id: impl Into<String>,
        path: LwM2mPath,
        content_format: Option<ContentFormat>,
    ) -> Self {
        Self::new(
            registration_id,
            ObservationTarget::Single {
                path,
                content_format,
            },
        )
    }

    pub fn composite(
        registration_id: impl Into<String>,
        paths: Vec<LwM2mPath>,
        request_format: ContentFormat,
        response_format: ContentFormat,
    ) -> Self {
        Self::new(
            registration_id,
            ObservationTarget::Composite {
                paths,
                request_format,
                response_format,
            },
        )
    }

    fn new(registration_id: impl Into<String>, target: ObservationTarget) -> Self {
        Self {
            id: ObservationId::random(),
            registration_id: registration_id.into(),
            target,
            context: BTreeMap::new(),
            protocol_data: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: ObservationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_protocol_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.protocol_data.insert(key.into(), value.into());
        self
    }

    pub fn paths(&self) -> &[LwM2mPath] {
        match &self.target {
            ObservationTarget::Single { path, .. } => std::slice::from_ref(path),
            ObservationTarget::Composite { paths, .. } => paths,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.target, ObservationTarget::Composite { .. })
    }

    /// Same kind of observation over the same path list.
    pub fn has_same_target(&self, other: &Observation) -> bool {
        self.is_composite() == other.is_composite() && self.paths() == other.paths()
    }

    /// Whether a cancellation of `prefix` covers this observation. A
    /// composite observation is covered as soon as one of its paths is.
    pub fn is_under(&self, prefix: &LwM2mPath) -> bool {
        self.paths().iter().any(|path| path.starts_with(prefix))
    }
}

/// Add, look up and cancel observations.
pub struct ObservationRegistry {
    store: Arc<RegistrationStore>,
    events: Option<EventBus>,
}

impl ObservationRegistry {
    pub fn new(store: Arc<RegistrationStore>) -> Self {
        Self {
            store,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Add an observation. Observations of the same registration with the
    /// same target are replaced and returned.
    pub fn add_observation(
        &self,
        observation: Observation,
    ) -> Result<Vec<Observation>, ObservationError> {
        let id = observation.id;
        let registration_id = observation.registration_id.clone();
        let replaced = self.store.add_observation(observation)?;

        debug!(
            observation = %id,
            registration = %registration_id,
            replaced = replaced.len(),
            "Observation added"
        );
        for old in &replaced {
            self.publish_cancelled(old);
        }
        if let Some(events) = &self.events {
            events.publish(Lwm2mEvent::ObservationAdded {
                observation_id: id.to_string(),
                registration_id,
                timestamp: chrono::Utc::now().timestamp(),
            });
        }
        Ok(replaced)
    }

    pub fn get_observation(&self, id: &ObservationId) -> Option<Observation> {
        self.store.get_observation(id)
    }

    pub fn get_observations(&self, registration_id: &str) -> Vec<Observation> {
        self.store.observations_of(registration_id)
    }

    pub fn cancel_observation(&self, id: &ObservationId) -> Result<Observation, ObservationError> {
        let removed = self
            .store
            .remove_observation(id)
            .ok_or(ObservationError::NotFound(*id))?;
        debug!(observation = %id, "Observation cancelled");
        self.publish_cancelled(&removed);
        Ok(removed)
    }

    /// Cancel every observation of `registration_id` whose target is
    /// `path` or lies under it.
    pub fn cancel_observations_by_path(
        &self,
        registration_id: &str,
        path: &LwM2mPath,
    ) -> Vec<Observation> {
        let removed = self
            .store
            .remove_observations_where(registration_id, |o| o.is_under(path));
        for observation in &removed {
            self.publish_cancelled(observation);
        }
        removed
    }

    pub fn cancel_all(&self, registration_id: &str) -> Vec<Observation> {
        let removed = self.store.remove_observations_where(registration_id, |_| true);
        for observation in &removed {
            self.publish_cancelled(observation);
        }
        removed
    }

    fn publish_cancelled(&self, observation: &Observation) {
        if let Some(events) = &self.events {
            events.publish(Lwm2mEvent::ObservationCancelled {
                observation_id: observation.id.to_string(),
                registration_id: observation.registration_id.clone(),
                timestamp: chrono::Utc::now().timestamp(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_hex_round_trip() {
        let id = ObservationId::from_bytes([0xDE, 0xAD, 0xBE, 0xEF, 0, 1, 2, 3]);
        assert_eq!(id.to_string(), "deadbeef00010203");
        assert_eq!("deadbeef00010203".parse::<ObservationId>().unwrap(), id);
        assert!("dead".parse::<ObservationId>().is_err());
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(ObservationId::random(), ObservationId::random());
    }

    #[test]
    fn test_composite_under_prefix() {
        let observation = Observation::composite(
            "reg",
            vec![LwM2mPath::resource(3, 0, 1), LwM2mPath::resource(4, 0, 2)],
            ContentFormat::SenmlJson,
            ContentFormat::SenmlJson,
        );
        assert!(observation.is_under(&LwM2mPath::object(4)));
        assert!(!observation.is_under(&LwM2mPath::object(5)));
    }

    #[test]
    fn test_same_target() {
        let path = LwM2mPath::resource(3, 0, 1);
        let single = Observation::single("reg", path, None);
        let again = Observation::single("reg", path, Some(ContentFormat::Tlv));
        let composite = Observation::composite(
            "reg",
            vec![path],
            ContentFormat::SenmlJson,
            ContentFormat::SenmlJson,
        );
        assert!(single.has_same_target(&again));
        assert!(!single.has_same_target(&composite));
    }
}
