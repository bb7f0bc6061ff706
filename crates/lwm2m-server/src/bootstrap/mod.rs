//! Bootstrap sessions: authorize a client, accumulate the configuration
//! written to it, check the result for consistency and finalize.

mod checker;
mod config;
mod session;

pub use checker::{ConsistencyChecker, DefaultConsistencyChecker};
pub use config::{
    AclConfig, BootstrapConfig, OscoreObject, SecurityMode, ServerConfig, ServerSecurity,
};
pub use session::{
    Authorization, BootstrapAuthorizer, BootstrapOutcome, BootstrapRequest, BootstrapSession,
    BootstrapSessionManager, FailureCause, SecurityStoreAuthorizer, SessionState,
};

/// Byte fields as lowercase hex strings.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| hex::decode(s.trim()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
