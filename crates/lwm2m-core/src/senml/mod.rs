//! SenML record packs (RFC 8428) as used by LwM2M 1.1+.
//!
//! Records are resolved against the last base name and base time seen, so
//! `{"bn":"/3/0/","n":"1"}` names `/3/0/1`. JSON framing lives in [`json`],
//! CBOR framing in [`cbor`].

pub mod cbor;
mod decoder;
mod encoder;
pub mod json;
mod record;

pub use decoder::{decode, decode_nodes, decode_timestamped, decode_timestamped_at};
pub use encoder::{encode, encode_nodes, encode_timestamped};
pub use record::{SenmlNumber, SenmlPack, SenmlRecord, SenmlValue};
