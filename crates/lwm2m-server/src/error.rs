//! Error types for the server side managers.

use crate::observation::ObservationId;

/// Registration lifecycle failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// No live registration with this id
    #[error("Registration not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the current state
    #[error("Invalid registration state: {0}")]
    InvalidState(String),

    /// Request fields are missing or malformed
    #[error("Invalid registration request: {0}")]
    InvalidRequest(String),
}

/// Observation bookkeeping failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObservationError {
    #[error("Observation not found: {0}")]
    NotFound(ObservationId),

    /// The owning registration does not exist (anymore)
    #[error("Unknown registration: {0}")]
    UnknownRegistration(String),
}

/// Bootstrap session failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    /// The session is not accumulating
    #[error("Invalid bootstrap session state: {0}")]
    InvalidState(String),

    /// The accumulated configuration failed the consistency checks
    #[error("Inconsistent bootstrap configuration: {}", .0.join("; "))]
    Inconsistent(Vec<String>),

    /// Bootstrap configuration could not be loaded
    #[error("Invalid bootstrap configuration: {0}")]
    InvalidConfig(String),
}

/// Security store failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    /// A PSK identity or OSCORE recipient id is already used by another
    /// endpoint
    #[error("Non unique security identity: {0}")]
    NonUniqueIdentity(String),
}

/// Crate-level error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Observation(#[from] ObservationError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Core(#[from] lwm2m_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
