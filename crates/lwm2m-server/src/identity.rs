//! Transport identity of a peer, as established by the security layer.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Peer address plus whatever credential the transport authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Identity {
    Unsecure {
        address: SocketAddr,
    },
    Psk {
        address: SocketAddr,
        identity: String,
    },
    Rpk {
        address: SocketAddr,
        /// DER encoded SubjectPublicKeyInfo
        public_key: Vec<u8>,
    },
    X509 {
        address: SocketAddr,
        common_name: String,
    },
    Oscore {
        address: SocketAddr,
        recipient_id: Vec<u8>,
    },
}

impl Identity {
    pub fn unsecure(address: SocketAddr) -> Self {
        Identity::Unsecure { address }
    }

    pub fn psk(address: SocketAddr, identity: impl Into<String>) -> Self {
        Identity::Psk {
            address,
            identity: identity.into(),
        }
    }

    pub fn rpk(address: SocketAddr, public_key: impl Into<Vec<u8>>) -> Self {
        Identity::Rpk {
            address,
            public_key: public_key.into(),
        }
    }

    pub fn x509(address: SocketAddr, common_name: impl Into<String>) -> Self {
        Identity::X509 {
            address,
            common_name: common_name.into(),
        }
    }

    pub fn oscore(address: SocketAddr, recipient_id: impl Into<Vec<u8>>) -> Self {
        Identity::Oscore {
            address,
            recipient_id: recipient_id.into(),
        }
    }

    pub fn address(&self) -> SocketAddr {
        match self {
            Identity::Unsecure { address }
            | Identity::Psk { address, .. }
            | Identity::Rpk { address, .. }
            | Identity::X509 { address, .. }
            | Identity::Oscore { address, .. } => *address,
        }
    }

    /// Authenticated by the (D)TLS layer.
    pub fn is_secure(&self) -> bool {
        match self {
            Identity::Psk { .. } | Identity::Rpk { .. } | Identity::X509 { .. } => true,
            Identity::Unsecure { .. } | Identity::Oscore { .. } => false,
        }
    }

    pub fn is_oscore(&self) -> bool {
        matches!(self, Identity::Oscore { .. })
    }

    /// Same credential, ignoring the address. NAT rebinding changes the
    /// address of a peer but not its credential.
    pub fn same_credential(&self, other: &Identity) -> bool {
        match (self, other) {
            (Identity::Unsecure { address: a }, Identity::Unsecure { address: b }) => a == b,
            (Identity::Psk { identity: a, .. }, Identity::Psk { identity: b, .. }) => a == b,
            (Identity::Rpk { public_key: a, .. }, Identity::Rpk { public_key: b, .. }) => a == b,
            (Identity::X509 { common_name: a, .. }, Identity::X509 { common_name: b, .. }) => a == b,
            (
                Identity::Oscore {
                    recipient_id: a, ..
                },
                Identity::Oscore {
                    recipient_id: b, ..
                },
            ) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Unsecure { address } => write!(f, "unsecure[{}]", address),
            Identity::Psk { address, identity } => write!(f, "psk[{}]@{}", identity, address),
            Identity::Rpk {
                address,
                public_key,
            } => write!(f, "rpk[{}]@{}", hex::encode(public_key), address),
            Identity::X509 {
                address,
                common_name,
            } => write!(f, "x509[{}]@{}", common_name, address),
            Identity::Oscore {
                address,
                recipient_id,
            } => write!(f, "oscore[{}]@{}", hex::encode(recipient_id), address),
        }
    }
}
