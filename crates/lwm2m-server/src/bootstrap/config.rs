//! Configuration written to a client during bootstrap.
//!
//! Instances are keyed by their instance id in the Security (0), Server (1),
//! Access Control (2) and OSCORE (21) objects. Byte fields are hex strings
//! in JSON.

use std::collections::BTreeMap;

use lwm2m_core::ContentFormat;
use serde::{Deserialize, Serialize};

use super::hex_bytes;
use crate::config::oscore::{DEFAULT_AEAD_ALGORITHM, DEFAULT_HKDF_ALGORITHM};
use crate::error::BootstrapError;
use crate::registration::BindingMode;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Paths deleted before anything is written
    pub to_delete: Vec<String>,
    pub servers: BTreeMap<u16, ServerConfig>,
    pub security: BTreeMap<u16, ServerSecurity>,
    pub acls: BTreeMap<u16, AclConfig>,
    pub oscore: BTreeMap<u16, OscoreObject>,
    /// Let the bootstrap server pick Security instance ids
    pub auto_id_for_security_object: bool,
    /// Format used for the writes, session default if unset
    pub content_format: Option<ContentFormat>,
}

impl BootstrapConfig {
    pub fn from_json(json: &str) -> Result<Self, BootstrapError> {
        serde_json::from_str(json).map_err(|e| BootstrapError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, BootstrapError> {
        serde_json::to_string_pretty(self).map_err(|e| BootstrapError::InvalidConfig(e.to_string()))
    }

    /// Security entry protecting the server with `short_id`.
    pub fn security_for_server(&self, short_id: u16) -> Option<&ServerSecurity> {
        self.security
            .values()
            .find(|security| security.server_id == Some(short_id))
    }
}

/// Server object instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub short_id: u16,
    /// Seconds
    pub lifetime: u64,
    pub default_min_period: Option<u64>,
    pub default_max_period: Option<u64>,
    pub disable_timeout: Option<u64>,
    pub notif_if_disabled: bool,
    pub binding: BindingMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            short_id: 0,
            lifetime: 86400,
            default_min_period: Some(1),
            default_max_period: None,
            disable_timeout: None,
            notif_if_disabled: true,
            binding: BindingMode::U,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    #[default]
    NoSec,
    Psk,
    Rpk,
    X509,
}

/// Security object instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSecurity {
    pub uri: String,
    pub bootstrap_server: bool,
    pub security_mode: SecurityMode,
    /// PSK identity, raw public key or DER client certificate (chain)
    #[serde(with = "hex_bytes")]
    pub public_key_or_id: Vec<u8>,
    /// Raw public key or DER certificate of the server
    #[serde(with = "hex_bytes")]
    pub server_public_key: Vec<u8>,
    /// PSK key or private key
    #[serde(with = "hex_bytes")]
    pub secret_key: Vec<u8>,
    /// Short id of the server this entry protects
    pub server_id: Option<u16>,
    pub client_old_off_time: Option<u64>,
    pub bootstrap_server_account_timeout: Option<u64>,
    /// Instance id of the OSCORE object securing this server
    pub oscore_security_mode: Option<u16>,
}

impl Default for ServerSecurity {
    fn default() -> Self {
        Self {
            uri: String::new(),
            bootstrap_server: false,
            security_mode: SecurityMode::NoSec,
            public_key_or_id: Vec::new(),
            server_public_key: Vec::new(),
            secret_key: Vec::new(),
            server_id: None,
            client_old_off_time: Some(1),
            bootstrap_server_account_timeout: Some(0),
            oscore_security_mode: None,
        }
    }
}

/// Access Control object instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    pub object_id: u16,
    pub object_instance_id: u16,
    /// Server short id to access right bits
    pub acls: BTreeMap<u16, u64>,
    pub access_control_owner: Option<u16>,
}

/// OSCORE object instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscoreObject {
    #[serde(with = "hex_bytes")]
    pub master_secret: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub sender_id: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub recipient_id: Vec<u8>,
    /// COSE algorithm id
    pub aead_algorithm: i64,
    /// COSE algorithm id
    pub hkdf_algorithm: i64,
    #[serde(with = "hex_bytes::option")]
    pub master_salt: Option<Vec<u8>>,
}

impl Default for OscoreObject {
    fn default() -> Self {
        Self {
            master_secret: Vec::new(),
            sender_id: Vec::new(),
            recipient_id: Vec::new(),
            aead_algorithm: DEFAULT_AEAD_ALGORITHM,
            hkdf_algorithm: DEFAULT_HKDF_ALGORITHM,
            master_salt: None,
        }
    }
}
