//! Server side state for the LwM2M protocol engine.
//!
//! The managers here hold every piece of shared state. A transport layer
//! hands them decoded requests together with the peer [`Identity`] and
//! turns their outcomes into responses:
//!
//! - **Registration** (`registration`): register, update, de-register and
//!   expiration of clients, with an optional background sweeper.
//! - **Observation** (`observation`): observe tokens tied to a
//!   registration, released when it goes away.
//! - **Presence** (`presence`): awake/sleeping tracking for queue mode
//!   clients.
//! - **Bootstrap** (`bootstrap`): authorize, accumulate, check and
//!   finalize bootstrap sessions.
//! - **Security** (`security`): expected client credentials.
//!
//! State changes are published on an [`EventBus`]. Listeners registered on
//! a manager are called synchronously instead.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use lwm2m_server::prelude::*;
//!
//! let clock = Arc::new(ManualClock::at_epoch());
//! let manager = RegistrationManager::new(Arc::new(RegistrationStore::new()), clock.clone());
//!
//! let identity = Identity::unsecure("127.0.0.1:5683".parse().unwrap());
//! let registered = manager
//!     .register(RegistrationRequest::new("sensor-1", identity).with_lifetime(100))
//!     .unwrap();
//!
//! clock.advance_secs(150);
//! assert!(manager.get_by_id(&registered.registration.id).is_none());
//! ```

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod observation;
pub mod presence;
pub mod registration;
pub mod security;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{
    BootstrapError, Error, ObservationError, RegistrationError, Result, SecurityError,
};
pub use event::{EventBus, Lwm2mEvent};
pub use identity::Identity;
pub use observation::{Observation, ObservationId, ObservationRegistry, ObservationTarget};
pub use presence::{PresenceListener, PresenceService};
pub use registration::{
    BindingMode, Registration, RegistrationListener, RegistrationManager, RegistrationRequest,
    RegistrationStore, RegistrationUpdate,
};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::bootstrap::{
        Authorization, BootstrapAuthorizer, BootstrapConfig, BootstrapOutcome, BootstrapRequest,
        BootstrapSession, BootstrapSessionManager, ConsistencyChecker, DefaultConsistencyChecker,
    };
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
    pub use crate::error::{BootstrapError, Error, RegistrationError, Result};
    pub use crate::event::{EventBus, Lwm2mEvent};
    pub use crate::identity::Identity;
    pub use crate::observation::{Observation, ObservationId, ObservationRegistry};
    pub use crate::presence::{PresenceListener, PresenceService};
    pub use crate::registration::{
        BindingMode, Deregistered, Registered, Registration, RegistrationListener,
        RegistrationManager, RegistrationRequest, RegistrationStore, RegistrationUpdate, Updated,
    };
    pub use crate::security::{InMemorySecurityStore, SecurityChecker, SecurityInfo, SecurityStore};
}
