//! Core data model and codecs for the LwM2M protocol engine.
//!
//! This crate is transport independent and holds no shared state. Everything
//! here is a pure function over its inputs:
//!
//! - **Paths** (`path`): addressing of objects, instances, resources and
//!   resource instances.
//! - **Nodes** (`node`): typed values attached to a path.
//! - **Object model** (`model`): resource kinds and multiplicity, passed
//!   explicitly to codecs and parsers.
//! - **TLV** (`tlv`): the LwM2M binary format.
//! - **SenML** (`senml`): record packs plus their JSON framing.
//! - **Links** (`link`) and **attributes** (`attribute`): CoRE Link-Format
//!   parsing with LwM2M attribute validation.
//!
//! ## Example
//!
//! ```rust
//! use lwm2m_core::model::LwM2mModel;
//! use lwm2m_core::node::{LwM2mNode, LwM2mObjectInstance, LwM2mResource, Value};
//! use lwm2m_core::path::LwM2mPath;
//! use lwm2m_core::tlv;
//!
//! let model = LwM2mModel::core();
//! let instance = LwM2mObjectInstance::new(0, [LwM2mResource::single(0, Value::from("ACME"))]);
//! let path = LwM2mPath::object_instance(3, 0);
//!
//! let bytes = tlv::encode(&LwM2mNode::ObjectInstance(instance.clone()), &path, &model).unwrap();
//! let decoded = tlv::decode(&bytes, &path, &model).unwrap();
//! assert_eq!(decoded, LwM2mNode::ObjectInstance(instance));
//! ```

pub mod attribute;
pub mod config;
pub mod error;
pub mod format;
pub mod link;
pub mod model;
pub mod node;
pub mod path;
pub mod senml;
pub mod tlv;

pub use error::{CodecError, Error, InvalidAttributeError, InvalidPathError, LinkParseError, Result};
pub use format::{ContentFormat, ResponseCode};
pub use link::{Link, LinkParam, LinkParamValue};
pub use model::{LwM2mModel, ObjectModel, Operations, ResourceModel};
pub use node::{
    LwM2mMultipleResource, LwM2mNode, LwM2mObject, LwM2mObjectInstance, LwM2mResource,
    LwM2mResourceInstance, LwM2mSingleResource, ObjectLink, TimestampedNode, Value, ValueKind,
};
pub use path::{LwM2mPath, PathLevel};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::attribute::{
        Attribute, AttributeRegistry, AttributeSet, AttributeValue, Lwm2mLink, Lwm2mLinkParser,
    };
    pub use crate::config::AttributeParserConfig;
    pub use crate::error::{CodecError, Error, Result};
    pub use crate::format::{ContentFormat, ResponseCode};
    pub use crate::link::{Link, LinkParam, LinkParamValue};
    pub use crate::model::LwM2mModel;
    pub use crate::node::{
        LwM2mNode, LwM2mObject, LwM2mObjectInstance, LwM2mResource, LwM2mResourceInstance,
        ObjectLink, TimestampedNode, Value, ValueKind,
    };
    pub use crate::path::LwM2mPath;
    pub use crate::senml::{SenmlPack, SenmlRecord};
}
