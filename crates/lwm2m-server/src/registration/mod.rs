//! Client registrations and their lifecycle.
//!
//! A [`Registration`] is created by a Register request, refreshed by
//! Updates and removed by a De-register request or by expiration. The
//! [`RegistrationManager`] owns the lifecycle and notifies
//! [`RegistrationListener`]s after every change.

mod manager;
mod store;
mod sweeper;

pub use manager::RegistrationManager;
pub use store::RegistrationStore;
pub use sweeper::ExpirationSweeper;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use chrono::{DateTime, Duration, Utc};
use lwm2m_core::attribute::{find_root_path, resolve_path};
use lwm2m_core::Link;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::registration::DEFAULT_OBJECT_VERSION;
use crate::identity::Identity;
use crate::observation::Observation;

bitflags! {
    /// Transport bindings a client supports.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BindingMode: u8 {
        /// UDP
        const U = 0b0001;
        /// TCP
        const T = 0b0010;
        /// SMS
        const S = 0b0100;
        /// Queue mode
        const Q = 0b1000;
    }
}

impl BindingMode {
    pub fn uses_queue_mode(&self) -> bool {
        self.contains(BindingMode::Q)
    }
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, letter) in [
            (BindingMode::U, 'U'),
            (BindingMode::T, 'T'),
            (BindingMode::S, 'S'),
            (BindingMode::Q, 'Q'),
        ] {
            if self.contains(flag) {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

impl FromStr for BindingMode {
    type Err = String;

    /// Parse a binding string such as `UQ`. Letters may come in any order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut binding = BindingMode::empty();
        for letter in s.chars() {
            let flag = match letter {
                'U' => BindingMode::U,
                'T' => BindingMode::T,
                'S' => BindingMode::S,
                'Q' => BindingMode::Q,
                other => return Err(format!("unknown binding '{}' in '{}'", other, s)),
            };
            if binding.contains(flag) {
                return Err(format!("binding '{}' repeated in '{}'", letter, s));
            }
            binding |= flag;
        }
        Ok(binding)
    }
}

impl Serialize for BindingMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BindingMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A registered client.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub id: String,
    pub endpoint: String,
    pub identity: Identity,
    /// Seconds
    pub lifetime: u64,
    pub lwm2m_version: String,
    pub binding: BindingMode,
    pub sms_number: Option<String>,
    pub object_links: Vec<Link>,
    /// Alternate root path, `/` by default
    pub root_path: String,
    /// Object id to object version, derived from the object links
    pub supported_objects: BTreeMap<u16, String>,
    pub additional_attributes: BTreeMap<String, String>,
    pub registration_date: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Registration {
    /// Saturates at the largest representable time.
    pub fn expiration_time(&self) -> DateTime<Utc> {
        i64::try_from(self.lifetime)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| self.last_update.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Still valid at `now`. Expiration itself is the last valid instant.
    pub fn is_alive_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expiration_time()
    }

    pub fn uses_queue_mode(&self) -> bool {
        self.binding.uses_queue_mode()
    }

    pub fn supported_object_version(&self, object_id: u16) -> Option<&str> {
        self.supported_objects.get(&object_id).map(String::as_str)
    }
}


/// Objects and versions advertised by registration links. Links outside
/// the root path, or with an invalid path, are ignored.
pub(crate) fn supported_objects(links: &[Link], root_path: &str) -> BTreeMap<u16, String> {
    let mut objects = BTreeMap::new();
    for link in links {
        let Ok(Some(path)) = resolve_path(&link.uri_reference, root_path) else {
            continue;
        };
        let Some(object_id) = path.object_id() else {
            continue;
        };
        if path.is_object() {
            let version = link.param_value("ver").unwrap_or(DEFAULT_OBJECT_VERSION);
            objects.insert(object_id, version.to_string());
        } else {
            objects
                .entry(object_id)
                .or_insert_with(|| DEFAULT_OBJECT_VERSION.to_string());
        }
    }
    objects
}

/// Fields of a Register request.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRequest {
    pub endpoint: String,
    pub identity: Identity,
    pub lifetime: Option<u64>,
    pub lwm2m_version: Option<String>,
    pub binding: Option<BindingMode>,
    pub sms_number: Option<String>,
    pub object_links: Vec<Link>,
    pub additional_attributes: BTreeMap<String, String>,
}

impl RegistrationRequest {
    pub fn new(endpoint: impl Into<String>, identity: Identity) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity,
            lifetime: None,
            lwm2m_version: None,
            binding: None,
            sms_number: None,
            object_links: Vec::new(),
            additional_attributes: BTreeMap::new(),
        }
    }

    pub fn with_lifetime(mut self, lifetime: u64) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_lwm2m_version(mut self, version: impl Into<String>) -> Self {
        self.lwm2m_version = Some(version.into());
        self
    }

    pub fn with_binding(mut self, binding: BindingMode) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_sms_number(mut self, number: impl Into<String>) -> Self {
        self.sms_number = Some(number.into());
        self
    }

    pub fn with_object_links(mut self, links: Vec<Link>) -> Self {
        self.object_links = links;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_attributes.insert(name.into(), value.into());
        self
    }
}

/// Fields of an Update request. `None` keeps the current value.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationUpdate {
    pub registration_id: String,
    pub identity: Option<Identity>,
    pub lifetime: Option<u64>,
    pub binding: Option<BindingMode>,
    pub sms_number: Option<String>,
    pub object_links: Option<Vec<Link>>,
    /// Merged into the existing attributes
    pub additional_attributes: BTreeMap<String, String>,
}

impl RegistrationUpdate {
    pub fn new(registration_id: impl Into<String>) -> Self {
        Self {
            registration_id: registration_id.into(),
            identity: None,
            lifetime: None,
            binding: None,
            sms_number: None,
            object_links: None,
            additional_attributes: BTreeMap::new(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_lifetime(mut self, lifetime: u64) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_binding(mut self, binding: BindingMode) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_sms_number(mut self, number: impl Into<String>) -> Self {
        self.sms_number = Some(number.into());
        self
    }

    pub fn with_object_links(mut self, links: Vec<Link>) -> Self {
        self.object_links = Some(links);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_attributes.insert(name.into(), value.into());
        self
    }

    /// The registration after this update, refreshed at `now`.
    pub fn apply(&self, registration: &Registration, now: DateTime<Utc>) -> Registration {
        let mut updated = registration.clone();
        if let Some(identity) = &self.identity {
            updated.identity = identity.clone();
        }
        if let Some(lifetime) = self.lifetime {
            updated.lifetime = lifetime;
        }
        if let Some(binding) = self.binding {
            updated.binding = binding;
        }
        if let Some(number) = &self.sms_number {
            updated.sms_number = Some(number.clone());
        }
        if let Some(links) = &self.object_links {
            updated.root_path = find_root_path(links);
            updated.supported_objects = supported_objects(links, &updated.root_path);
            updated.object_links = links.clone();
        }
        for (name, value) in &self.additional_attributes {
            updated
                .additional_attributes
                .insert(name.clone(), value.clone());
        }
        updated.last_update = now;
        updated
    }
}

/// Outcome of a successful Register request.
#[derive(Debug, Clone, PartialEq)]
pub struct Registered {
    pub registration: Registration,
    /// Registration of the same endpoint that this one replaced
    pub previous: Option<Registration>,
    /// Observations of the replaced registration, now discarded
    pub previous_observations: Vec<Observation>,
}

/// Outcome of a successful Update request.
#[derive(Debug, Clone, PartialEq)]
pub struct Updated {
    pub update: RegistrationUpdate,
    pub registration: Registration,
    pub previous: Registration,
}

/// Outcome of a De-register request or of an expiration.
#[derive(Debug, Clone, PartialEq)]
pub struct Deregistered {
    pub registration: Registration,
    pub observations: Vec<Observation>,
    pub expired: bool,
}

/// Synchronous hooks called after each registration change, once all
/// locks are released, in the order listeners were added.
pub trait RegistrationListener: Send + Sync {
    fn registered(&self, _registered: &Registered) {}

    fn updated(&self, _updated: &Updated) {}

    fn unregistered(&self, _deregistered: &Deregistered) {}
}
