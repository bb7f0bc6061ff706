//! LwM2M TLV binary format.
//!
//! [`wire`] frames raw entries and value primitives; [`encode`] and
//! [`decode`] map entries to nodes using the object model.

mod decoder;
mod encoder;
pub mod wire;

pub use decoder::decode;
pub use encoder::encode;
