//! Expected client credentials and the check of a peer identity against
//! them.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SecurityError;
use crate::identity::Identity;

/// Pre-shared key credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PskCredential {
    pub identity: String,
    #[serde(with = "crate::bootstrap::hex_bytes")]
    pub key: Vec<u8>,
}

/// How one endpoint is expected to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub endpoint: String,
    #[serde(default)]
    pub psk: Option<PskCredential>,
    /// DER encoded SubjectPublicKeyInfo
    #[serde(default, with = "crate::bootstrap::hex_bytes::option")]
    pub rpk: Option<Vec<u8>>,
    /// Certificate whose common name equals the endpoint name
    #[serde(default)]
    pub x509: bool,
    #[serde(default, with = "crate::bootstrap::hex_bytes::option")]
    pub oscore_recipient_id: Option<Vec<u8>>,
}

impl SecurityInfo {
    fn empty(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            psk: None,
            rpk: None,
            x509: false,
            oscore_recipient_id: None,
        }
    }

    pub fn psk(endpoint: impl Into<String>, identity: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            psk: Some(PskCredential {
                identity: identity.into(),
                key,
            }),
            ..Self::empty(endpoint)
        }
    }

    pub fn rpk(endpoint: impl Into<String>, public_key: Vec<u8>) -> Self {
        Self {
            rpk: Some(public_key),
            ..Self::empty(endpoint)
        }
    }

    pub fn x509(endpoint: impl Into<String>) -> Self {
        Self {
            x509: true,
            ..Self::empty(endpoint)
        }
    }

    pub fn oscore(endpoint: impl Into<String>, recipient_id: Vec<u8>) -> Self {
        Self {
            oscore_recipient_id: Some(recipient_id),
            ..Self::empty(endpoint)
        }
    }
}

/// Read access to security infos.
pub trait SecurityStore: Send + Sync {
    fn get_by_endpoint(&self, endpoint: &str) -> Option<SecurityInfo>;

    fn get_by_psk_identity(&self, identity: &str) -> Option<SecurityInfo>;

    fn get_by_oscore_recipient_id(&self, recipient_id: &[u8]) -> Option<SecurityInfo>;
}

/// Security infos kept in memory, one per endpoint.
#[derive(Default)]
pub struct InMemorySecurityStore {
    infos: RwLock<HashMap<String, SecurityInfo>>,
}

impl InMemorySecurityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the info of an endpoint. PSK identities and OSCORE
    /// recipient ids must stay unique across endpoints.
    pub fn add(&self, info: SecurityInfo) -> Result<Option<SecurityInfo>, SecurityError> {
        let mut infos = self.infos.write();
        for other in infos.values().filter(|other| other.endpoint != info.endpoint) {
            if let (Some(a), Some(b)) = (&info.psk, &other.psk) {
                if a.identity == b.identity {
                    return Err(SecurityError::NonUniqueIdentity(format!(
                        "PSK identity {} already used by {}",
                        a.identity, other.endpoint
                    )));
                }
            }
            if let (Some(a), Some(b)) = (&info.oscore_recipient_id, &other.oscore_recipient_id) {
                if a == b {
                    return Err(SecurityError::NonUniqueIdentity(format!(
                        "OSCORE recipient id {} already used by {}",
                        hex::encode(a),
                        other.endpoint
                    )));
                }
            }
        }
        Ok(infos.insert(info.endpoint.clone(), info))
    }

    pub fn remove(&self, endpoint: &str) -> Option<SecurityInfo> {
        self.infos.write().remove(endpoint)
    }

    pub fn all(&self) -> Vec<SecurityInfo> {
        self.infos.read().values().cloned().collect()
    }
}

impl SecurityStore for InMemorySecurityStore {
    fn get_by_endpoint(&self, endpoint: &str) -> Option<SecurityInfo> {
        self.infos.read().get(endpoint).cloned()
    }

    fn get_by_psk_identity(&self, identity: &str) -> Option<SecurityInfo> {
        self.infos
            .read()
            .values()
            .find(|info| info.psk.as_ref().is_some_and(|psk| psk.identity == identity))
            .cloned()
    }

    fn get_by_oscore_recipient_id(&self, recipient_id: &[u8]) -> Option<SecurityInfo> {
        self.infos
            .read()
            .values()
            .find(|info| info.oscore_recipient_id.as_deref() == Some(recipient_id))
            .cloned()
    }
}

/// Matches a peer identity against the expected credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityChecker;

impl SecurityChecker {
    /// An authenticated peer needs one matching info. An unauthenticated
    /// peer is only accepted if the endpoint has no info at all.
    pub fn check_security_infos(
        &self,
        endpoint: &str,
        identity: &Identity,
        infos: &[SecurityInfo],
    ) -> bool {
        if identity.is_secure() || identity.is_oscore() {
            if infos.is_empty() {
                debug!(endpoint, "Authenticated client without security info");
                return false;
            }
            return infos
                .iter()
                .any(|info| self.check_security_info(endpoint, identity, info));
        }
        if !infos.is_empty() {
            debug!(endpoint, "Client must authenticate");
            return false;
        }
        true
    }

    pub fn check_security_info(
        &self,
        endpoint: &str,
        identity: &Identity,
        info: &SecurityInfo,
    ) -> bool {
        let matched = match identity {
            Identity::Psk { identity, .. } => info
                .psk
                .as_ref()
                .is_some_and(|psk| psk.identity == *identity),
            Identity::Rpk { public_key, .. } => info.rpk.as_ref() == Some(public_key),
            Identity::X509 { common_name, .. } => info.x509 && common_name == endpoint,
            Identity::Oscore { recipient_id, .. } => {
                info.oscore_recipient_id.as_ref() == Some(recipient_id)
            }
            Identity::Unsecure { .. } => false,
        };
        if !matched {
            debug!(endpoint, identity = %identity, "Security info does not match");
        }
        matched
    }
}
