use tracing::trace;

use crate::error::CodecError;
use crate::link::serialize_links;
use crate::model::LwM2mModel;
use crate::node::{LwM2mNode, LwM2mObjectInstance, LwM2mResource, Value};
use crate::path::{LwM2mPath, PathLevel};

use super::wire::{self, Tlv, TlvType};

/// Encode `node`, addressed by `path`, to TLV bytes.
///
/// An object instance requested at its own path is written as its resources
/// directly. Values are checked against the kinds declared in `model`.
pub fn encode(
    node: &LwM2mNode,
    path: &LwM2mPath,
    model: &LwM2mModel,
) -> Result<Vec<u8>, CodecError> {
    let encoder = NodeEncoder { model };
    let object_id = path
        .object_id()
        .ok_or_else(|| CodecError::unsupported(path, "TLV can not encode the root path"))?;

    let tlvs = match (node, path.level()) {
        (LwM2mNode::Object(object), PathLevel::Object) => {
            check_id(path, object.id, object_id)?;
            object
                .instances
                .values()
                .map(|instance| encoder.object_instance(object_id, instance))
                .collect::<Result<Vec<_>, _>>()?
        }
        (LwM2mNode::ObjectInstance(instance), PathLevel::ObjectInstance) => {
            check_id(path, instance.id, path.object_instance_id().unwrap_or(instance.id))?;
            encoder.resources(object_id, instance)?
        }
        (LwM2mNode::ObjectInstance(instance), PathLevel::Object) => {
            vec![encoder.object_instance(object_id, instance)?]
        }
        (LwM2mNode::Resource(resource), PathLevel::Resource) => {
            check_id(path, resource.id(), path.resource_id().unwrap_or(resource.id()))?;
            let instance_id = path.object_instance_id().unwrap_or_default();
            vec![encoder.resource(object_id, instance_id, resource)?]
        }
        (LwM2mNode::ResourceInstance(instance), PathLevel::ResourceInstance) => {
            let resource_id = path.resource_id().unwrap_or_default();
            check_id(
                path,
                instance.id,
                path.resource_instance_id().unwrap_or(instance.id),
            )?;
            let value = encoder.value(object_id, resource_id, &instance.value, path)?;
            vec![Tlv::value(TlvType::ResourceInstance, instance.id, value)]
        }
        (node, _) => {
            return Err(CodecError::unsupported(
                path,
                format!("a {} can not be encoded at this path", node.type_name()),
            ))
        }
    };

    let bytes = wire::encode(&tlvs)?;
    trace!(path = %path, len = bytes.len(), "Encoded TLV payload");
    Ok(bytes)
}

fn check_id(path: &LwM2mPath, node_id: u16, path_id: u16) -> Result<(), CodecError> {
    if node_id != path_id {
        return Err(CodecError::unsupported(
            path,
            format!("node id {} does not match the path", node_id),
        ));
    }
    Ok(())
}

struct NodeEncoder<'a> {
    model: &'a LwM2mModel,
}

impl NodeEncoder<'_> {
    fn object_instance(
        &self,
        object_id: u16,
        instance: &LwM2mObjectInstance,
    ) -> Result<Tlv, CodecError> {
        Ok(Tlv::children(
            TlvType::ObjectInstance,
            instance.id,
            self.resources(object_id, instance)?,
        ))
    }

    fn resources(
        &self,
        object_id: u16,
        instance: &LwM2mObjectInstance,
    ) -> Result<Vec<Tlv>, CodecError> {
        instance
            .resources
            .values()
            .map(|resource| self.resource(object_id, instance.id, resource))
            .collect()
    }

    fn resource(
        &self,
        object_id: u16,
        instance_id: u16,
        resource: &LwM2mResource,
    ) -> Result<Tlv, CodecError> {
        match resource {
            LwM2mResource::Single(single) => {
                let path = LwM2mPath::resource(object_id, instance_id, single.id);
                let value = self.value(object_id, single.id, &single.value, &path)?;
                Ok(Tlv::value(TlvType::ResourceValue, single.id, value))
            }
            LwM2mResource::Multiple(multiple) => {
                let children = multiple
                    .instances
                    .iter()
                    .map(|(id, value)| {
                        let path =
                            LwM2mPath::resource_instance(object_id, instance_id, multiple.id, *id);
                        let bytes = self.value(object_id, multiple.id, value, &path)?;
                        Ok(Tlv::value(TlvType::ResourceInstance, *id, bytes))
                    })
                    .collect::<Result<Vec<_>, CodecError>>()?;
                Ok(Tlv::children(TlvType::MultipleResource, multiple.id, children))
            }
        }
    }

    fn value(
        &self,
        object_id: u16,
        resource_id: u16,
        value: &Value,
        path: &LwM2mPath,
    ) -> Result<Vec<u8>, CodecError> {
        let expected = self
            .model
            .resource(object_id, resource_id)
            .and_then(|r| r.kind);
        let value = match expected {
            Some(kind) => value.clone().coerce(kind).ok_or(CodecError::TypeMismatch {
                path: *path,
                expected: kind,
                actual: value.kind(),
            })?,
            None => value.clone(),
        };
        Ok(encode_value(&value))
    }
}

fn encode_value(value: &Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Opaque(bytes) => bytes.clone(),
        Value::Integer(i) => wire::encode_integer(*i),
        Value::Unsigned(u) => wire::encode_unsigned(*u),
        Value::Float(f) => wire::encode_float(*f),
        Value::Boolean(b) => wire::encode_boolean(*b),
        Value::Time(t) => wire::encode_integer(t.timestamp()),
        Value::ObjLnk(link) => wire::encode_object_link(link),
        Value::CoreLink(links) => serialize_links(links).into_bytes(),
    }
}
