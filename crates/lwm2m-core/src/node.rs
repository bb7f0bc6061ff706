//! Node model: typed values attached to a path.
//!
//! ## Tree shape
//!
//! - [`LwM2mObject`]: instances by id
//! - [`LwM2mObjectInstance`]: resources by id
//! - [`LwM2mResource`]: a single value or a map of resource instances
//! - [`LwM2mResourceInstance`]: one value of a multiple resource
//!
//! Children are kept in [`BTreeMap`]s so every encoder walks them in
//! ascending id order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidPathError;
use crate::link::Link;

/// Kind of a scalar value, as declared by the object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Opaque,
    Integer,
    Unsigned,
    Float,
    Boolean,
    Time,
    ObjLnk,
    CoreLink,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Opaque => "opaque",
            ValueKind::Integer => "integer",
            ValueKind::Unsigned => "unsigned integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::Time => "time",
            ValueKind::ObjLnk => "objlnk",
            ValueKind::CoreLink => "corelink",
        };
        f.write_str(name)
    }
}

/// Reference to an object instance, written `objectId:instanceId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectLink {
    pub object_id: u16,
    pub object_instance_id: u16,
}

impl ObjectLink {
    pub const fn new(object_id: u16, object_instance_id: u16) -> Self {
        Self {
            object_id,
            object_instance_id,
        }
    }

    /// The null link `65535:65535`.
    pub const fn null() -> Self {
        Self::new(u16::MAX, u16::MAX)
    }

    pub fn is_null(&self) -> bool {
        *self == Self::null()
    }
}

impl fmt::Display for ObjectLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_id, self.object_instance_id)
    }
}

impl FromStr for ObjectLink {
    type Err = InvalidPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (object, instance) = s
            .split_once(':')
            .ok_or_else(|| InvalidPathError(format!("object link '{}' lacks ':'", s)))?;
        let parse = |part: &str| {
            part.parse::<u16>()
                .map_err(|_| InvalidPathError(format!("invalid object link '{}'", s)))
        };
        Ok(Self::new(parse(object)?, parse(instance)?))
    }
}

/// Scalar value of a resource or resource instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Opaque(Vec<u8>),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Boolean(bool),
    Time(DateTime<Utc>),
    ObjLnk(ObjectLink),
    CoreLink(Vec<Link>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Opaque(_) => ValueKind::Opaque,
            Value::Integer(_) => ValueKind::Integer,
            Value::Unsigned(_) => ValueKind::Unsigned,
            Value::Float(_) => ValueKind::Float,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Time(_) => ValueKind::Time,
            Value::ObjLnk(_) => ValueKind::ObjLnk,
            Value::CoreLink(_) => ValueKind::CoreLink,
        }
    }

    /// Convert to `expected` without losing information.
    ///
    /// Only integer/unsigned widening is allowed; every other kind must
    /// already match. Returns `None` when the conversion is not possible.
    pub fn coerce(self, expected: ValueKind) -> Option<Value> {
        match (self, expected) {
            (value, kind) if value.kind() == kind => Some(value),
            (Value::Unsigned(u), ValueKind::Integer) => i64::try_from(u).ok().map(Value::Integer),
            (Value::Integer(i), ValueKind::Unsigned) => u64::try_from(i).ok().map(Value::Unsigned),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Unsigned(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Opaque(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Time(value)
    }
}

impl From<ObjectLink> for Value {
    fn from(value: ObjectLink) -> Self {
        Value::ObjLnk(value)
    }
}

/// Resource holding a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct LwM2mSingleResource {
    pub id: u16,
    pub value: Value,
}

/// Resource holding indexed values of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct LwM2mMultipleResource {
    pub id: u16,
    pub kind: ValueKind,
    pub instances: BTreeMap<u16, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LwM2mResource {
    Single(LwM2mSingleResource),
    Multiple(LwM2mMultipleResource),
}

impl LwM2mResource {
    pub fn single(id: u16, value: impl Into<Value>) -> Self {
        LwM2mResource::Single(LwM2mSingleResource {
            id,
            value: value.into(),
        })
    }

    pub fn multiple(
        id: u16,
        kind: ValueKind,
        instances: impl IntoIterator<Item = (u16, Value)>,
    ) -> Self {
        LwM2mResource::Multiple(LwM2mMultipleResource {
            id,
            kind,
            instances: instances.into_iter().collect(),
        })
    }

    pub fn id(&self) -> u16 {
        match self {
            LwM2mResource::Single(r) => r.id,
            LwM2mResource::Multiple(r) => r.id,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            LwM2mResource::Single(r) => r.value.kind(),
            LwM2mResource::Multiple(r) => r.kind,
        }
    }

    /// Value of a single resource.
    pub fn value(&self) -> Option<&Value> {
        match self {
            LwM2mResource::Single(r) => Some(&r.value),
            LwM2mResource::Multiple(_) => None,
        }
    }

    /// Value of one instance of a multiple resource.
    pub fn instance(&self, id: u16) -> Option<&Value> {
        match self {
            LwM2mResource::Single(_) => None,
            LwM2mResource::Multiple(r) => r.instances.get(&id),
        }
    }
}

/// One value of a multiple resource, addressed on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct LwM2mResourceInstance {
    pub id: u16,
    pub value: Value,
}

impl LwM2mResourceInstance {
    pub fn new(id: u16, value: impl Into<Value>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LwM2mObjectInstance {
    pub id: u16,
    pub resources: BTreeMap<u16, LwM2mResource>,
}

impl LwM2mObjectInstance {
    pub fn new(id: u16, resources: impl IntoIterator<Item = LwM2mResource>) -> Self {
        Self {
            id,
            resources: resources.into_iter().map(|r| (r.id(), r)).collect(),
        }
    }

    pub fn resource(&self, id: u16) -> Option<&LwM2mResource> {
        self.resources.get(&id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LwM2mObject {
    pub id: u16,
    pub instances: BTreeMap<u16, LwM2mObjectInstance>,
}

impl LwM2mObject {
    pub fn new(id: u16, instances: impl IntoIterator<Item = LwM2mObjectInstance>) -> Self {
        Self {
            id,
            instances: instances.into_iter().map(|i| (i.id, i)).collect(),
        }
    }

    pub fn instance(&self, id: u16) -> Option<&LwM2mObjectInstance> {
        self.instances.get(&id)
    }
}

/// Any node of the data tree.
#[derive(Debug, Clone, PartialEq)]
pub enum LwM2mNode {
    Object(LwM2mObject),
    ObjectInstance(LwM2mObjectInstance),
    Resource(LwM2mResource),
    ResourceInstance(LwM2mResourceInstance),
}

impl LwM2mNode {
    pub fn id(&self) -> u16 {
        match self {
            LwM2mNode::Object(o) => o.id,
            LwM2mNode::ObjectInstance(i) => i.id,
            LwM2mNode::Resource(r) => r.id(),
            LwM2mNode::ResourceInstance(ri) => ri.id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LwM2mNode::Object(_) => "object",
            LwM2mNode::ObjectInstance(_) => "object instance",
            LwM2mNode::Resource(LwM2mResource::Single(_)) => "single resource",
            LwM2mNode::Resource(LwM2mResource::Multiple(_)) => "multiple resource",
            LwM2mNode::ResourceInstance(_) => "resource instance",
        }
    }
}

impl From<LwM2mObject> for LwM2mNode {
    fn from(node: LwM2mObject) -> Self {
        LwM2mNode::Object(node)
    }
}

impl From<LwM2mObjectInstance> for LwM2mNode {
    fn from(node: LwM2mObjectInstance) -> Self {
        LwM2mNode::ObjectInstance(node)
    }
}

impl From<LwM2mResource> for LwM2mNode {
    fn from(node: LwM2mResource) -> Self {
        LwM2mNode::Resource(node)
    }
}

impl From<LwM2mResourceInstance> for LwM2mNode {
    fn from(node: LwM2mResourceInstance) -> Self {
        LwM2mNode::ResourceInstance(node)
    }
}

/// A node together with the time its values were measured.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedNode {
    pub timestamp: Option<DateTime<Utc>>,
    pub node: LwM2mNode,
}

impl TimestampedNode {
    pub fn new(timestamp: Option<DateTime<Utc>>, node: impl Into<LwM2mNode>) -> Self {
        Self {
            timestamp,
            node: node.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_integer_widening() {
        assert_eq!(Value::Unsigned(5).coerce(ValueKind::Integer), Some(Value::Integer(5)));
        assert_eq!(Value::Integer(5).coerce(ValueKind::Unsigned), Some(Value::Unsigned(5)));
        assert_eq!(Value::Integer(-1).coerce(ValueKind::Unsigned), None);
        assert_eq!(Value::Unsigned(u64::MAX).coerce(ValueKind::Integer), None);
        assert_eq!(Value::from("x").coerce(ValueKind::Integer), None);
        assert_eq!(Value::Integer(1).coerce(ValueKind::Float), None);
    }

    #[test]
    fn test_object_link_text() {
        let link: ObjectLink = "3:0".parse().unwrap();
        assert_eq!(link, ObjectLink::new(3, 0));
        assert_eq!(link.to_string(), "3:0");
        assert!("3".parse::<ObjectLink>().is_err());
        assert!("70000:1".parse::<ObjectLink>().is_err());
        assert!(ObjectLink::null().is_null());
    }

    #[test]
    fn test_instance_keeps_resources_sorted() {
        let instance = LwM2mObjectInstance::new(
            0,
            [
                LwM2mResource::single(9, Value::Integer(80)),
                LwM2mResource::single(0, Value::from("ACME")),
            ],
        );
        let ids: Vec<u16> = instance.resources.keys().copied().collect();
        assert_eq!(ids, vec![0, 9]);
    }
}
