//! Server defaults and environment overrides.
//!
//! Constants are grouped by concern. The `env_vars` module names the
//! environment variables that override them, and the config structs read
//! those through `from_env`.

use std::time::Duration;

use lwm2m_core::ResponseCode;

/// Registration defaults.
pub mod registration {
    /// Lifetime applied when a Register request carries none
    pub const DEFAULT_LIFETIME_SECS: u64 = 86400;
    /// Largest lifetime a client may request
    pub const MAX_LIFETIME_SECS: u64 = u32::MAX as u64;
    /// Period of the expiration sweeper
    pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 2;
    /// Length of generated registration ids
    pub const ID_LENGTH: usize = 10;
    /// LwM2M version assumed when a Register request carries none
    pub const DEFAULT_LWM2M_VERSION: &str = "1.0";
    /// Object version assumed when a link carries no `ver`
    pub const DEFAULT_OBJECT_VERSION: &str = "1.0";
}

/// Queue mode presence defaults.
pub mod presence {
    /// How long a queue mode client stays awake after its last message
    /// (CoAP MAX_TRANSMIT_WAIT).
    pub const DEFAULT_AWAKE_SECS: u64 = 93;
}

/// Bootstrap session defaults.
pub mod bootstrap {
    use super::ResponseCode;

    /// Idle time after which a session fails
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
    /// Code sent when the authorizer declines a request
    pub const REJECTION_CODE: ResponseCode = ResponseCode::BadRequest;
}

/// OSCORE parameter defaults (RFC 8613 §3.2).
pub mod oscore {
    /// AES-CCM-16-64-128
    pub const DEFAULT_AEAD_ALGORITHM: i64 = 10;
    /// HKDF SHA-256
    pub const DEFAULT_HKDF_ALGORITHM: i64 = -10;
    /// Sender and recipient ids are at most the AEAD nonce length minus
    /// this many bytes
    pub const ID_NONCE_OVERHEAD: usize = 6;
}

/// Observation defaults.
pub mod observation {
    /// Length of generated observation tokens
    pub const TOKEN_LENGTH: usize = 8;
}

/// Environment variable names.
pub mod env_vars {
    use super::{bootstrap, presence, registration};

    pub const SWEEP_INTERVAL_SECS: &str = "LWM2M_SWEEP_INTERVAL_SECS";
    pub const PRESENCE_AWAKE_SECS: &str = "LWM2M_PRESENCE_AWAKE_SECS";
    pub const BOOTSTRAP_TIMEOUT_SECS: &str = "LWM2M_BOOTSTRAP_TIMEOUT_SECS";
    pub const DEFAULT_LIFETIME_SECS: &str = "LWM2M_DEFAULT_LIFETIME_SECS";

    fn read_u64(name: &str, default: u64) -> u64 {
        std::env::var(name)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Sweep interval from the environment, or the default.
    pub fn sweep_interval_secs() -> u64 {
        read_u64(SWEEP_INTERVAL_SECS, registration::DEFAULT_SWEEP_INTERVAL_SECS)
    }

    /// Awake window from the environment, or the default.
    pub fn presence_awake_secs() -> u64 {
        read_u64(PRESENCE_AWAKE_SECS, presence::DEFAULT_AWAKE_SECS)
    }

    /// Bootstrap idle timeout from the environment, or the default.
    pub fn bootstrap_timeout_secs() -> u64 {
        read_u64(BOOTSTRAP_TIMEOUT_SECS, bootstrap::DEFAULT_TIMEOUT_SECS)
    }

    /// Default lifetime from the environment, or the default.
    pub fn default_lifetime_secs() -> u64 {
        read_u64(DEFAULT_LIFETIME_SECS, registration::DEFAULT_LIFETIME_SECS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConfig {
    pub default_lifetime: Duration,
    pub sweep_interval: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            default_lifetime: Duration::from_secs(registration::DEFAULT_LIFETIME_SECS),
            sweep_interval: Duration::from_secs(registration::DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl RegistrationConfig {
    pub fn from_env() -> Self {
        Self {
            default_lifetime: Duration::from_secs(env_vars::default_lifetime_secs()),
            sweep_interval: Duration::from_secs(env_vars::sweep_interval_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Zero keeps clients awake until `set_sleeping` is called
    pub awake_time: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            awake_time: Duration::from_secs(presence::DEFAULT_AWAKE_SECS),
        }
    }
}

impl PresenceConfig {
    pub fn from_env() -> Self {
        Self {
            awake_time: Duration::from_secs(env_vars::presence_awake_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSessionConfig {
    /// Idle time after which `check_timeout` fails a session
    pub timeout: Duration,
}

impl Default for BootstrapSessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(bootstrap::DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl BootstrapSessionConfig {
    pub fn from_env() -> Self {
        Self {
            timeout: Duration::from_secs(env_vars::bootstrap_timeout_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registration = RegistrationConfig::default();
        assert_eq!(registration.default_lifetime, Duration::from_secs(86400));
        assert_eq!(PresenceConfig::default().awake_time, Duration::from_secs(93));
        assert_eq!(BootstrapSessionConfig::default().timeout, Duration::from_secs(60));
        assert_eq!(bootstrap::REJECTION_CODE.to_string(), "4.00");
    }

    #[test]
    fn test_env_override() {
        std::env::set_var(env_vars::BOOTSTRAP_TIMEOUT_SECS, "5");
        assert_eq!(BootstrapSessionConfig::from_env().timeout, Duration::from_secs(5));
        std::env::set_var(env_vars::BOOTSTRAP_TIMEOUT_SECS, "not a number");
        assert_eq!(
            BootstrapSessionConfig::from_env().timeout,
            Duration::from_secs(bootstrap::DEFAULT_TIMEOUT_SECS)
        );
        std::env::remove_var(env_vars::BOOTSTRAP_TIMEOUT_SECS);
    }
}
