use std::collections::BTreeMap;

use chrono::DateTime;
use tracing::trace;

use crate::error::CodecError;
use crate::link::parse_core_links;
use crate::model::LwM2mModel;
use crate::node::{
    LwM2mMultipleResource, LwM2mNode, LwM2mObject, LwM2mObjectInstance, LwM2mResource,
    LwM2mResourceInstance, LwM2mSingleResource, Value, ValueKind,
};
use crate::path::{LwM2mPath, PathLevel};

use super::wire::{self, Tlv, TlvContent, TlvType};

/// Decode TLV bytes into the node addressed by `path`.
///
/// Values are typed from `model`; resources it does not know decode as
/// opaque.
pub fn decode(
    bytes: &[u8],
    path: &LwM2mPath,
    model: &LwM2mModel,
) -> Result<LwM2mNode, CodecError> {
    let tlvs = wire::decode(bytes)?;
    let decoder = NodeDecoder { model };

    let node = match path.level() {
        PathLevel::Root => {
            return Err(CodecError::unsupported(path, "TLV can not decode the root path"))
        }
        PathLevel::Object => LwM2mNode::Object(decoder.object(path, tlvs)?),
        PathLevel::ObjectInstance => {
            LwM2mNode::ObjectInstance(decoder.object_instance_at(path, tlvs)?)
        }
        PathLevel::Resource => LwM2mNode::Resource(decoder.resource_at(path, tlvs)?),
        PathLevel::ResourceInstance => {
            LwM2mNode::ResourceInstance(decoder.resource_instance_at(path, tlvs)?)
        }
    };

    trace!(path = %path, node = node.type_name(), "Decoded TLV payload");
    Ok(node)
}

struct NodeDecoder<'a> {
    model: &'a LwM2mModel,
}

impl NodeDecoder<'_> {
    fn object(&self, path: &LwM2mPath, tlvs: Vec<Tlv>) -> Result<LwM2mObject, CodecError> {
        let object_id = path.object_id().unwrap_or_default();

        let all_instances = tlvs.iter().all(|t| t.tlv_type == TlvType::ObjectInstance);
        let all_resources = tlvs.iter().all(|t| {
            matches!(t.tlv_type, TlvType::ResourceValue | TlvType::MultipleResource)
        });

        let mut instances = BTreeMap::new();
        if all_instances {
            for tlv in tlvs {
                let id = tlv.identifier;
                let instance_path = LwM2mPath::object_instance(object_id, id);
                let instance = self.object_instance(&instance_path, children(tlv)?)?;
                if instances.insert(id, instance).is_some() {
                    return Err(CodecError::Duplicate(instance_path.to_string()));
                }
            }
        } else if all_resources && !self.is_multi_instance(object_id) {
            // single instance objects may omit the instance entry
            let instance_path = LwM2mPath::object_instance(object_id, 0);
            instances.insert(0, self.object_instance(&instance_path, tlvs)?);
        } else {
            return Err(CodecError::InvalidFormat(format!(
                "object {} content must be a list of object instances",
                path
            )));
        }

        Ok(LwM2mObject {
            id: object_id,
            instances,
        })
    }

    fn object_instance_at(
        &self,
        path: &LwM2mPath,
        tlvs: Vec<Tlv>,
    ) -> Result<LwM2mObjectInstance, CodecError> {
        let instance_id = path.object_instance_id().unwrap_or_default();
        let wrapped = matches!(tlvs.as_slice(), [tlv] if tlv.tlv_type == TlvType::ObjectInstance);
        if !wrapped {
            return self.object_instance(path, tlvs);
        }

        let mut tlvs = tlvs;
        let tlv = tlvs.remove(0);
        if tlv.identifier != instance_id {
            return Err(CodecError::InvalidFormat(format!(
                "object instance {} does not match path {}",
                tlv.identifier, path
            )));
        }
        self.object_instance(path, children(tlv)?)
    }

    /// Build an instance from its resource entries.
    fn object_instance(
        &self,
        path: &LwM2mPath,
        tlvs: Vec<Tlv>,
    ) -> Result<LwM2mObjectInstance, CodecError> {
        let object_id = path.object_id().unwrap_or_default();
        let instance_id = path.object_instance_id().unwrap_or_default();

        let mut resources = BTreeMap::new();
        for tlv in tlvs {
            let resource_path = LwM2mPath::resource(object_id, instance_id, tlv.identifier);
            let resource = match tlv.tlv_type {
                TlvType::ResourceValue | TlvType::MultipleResource => {
                    self.resource(&resource_path, tlv)?
                }
                other => {
                    return Err(CodecError::InvalidFormat(format!(
                        "unexpected {:?} entry inside object instance {}",
                        other, path
                    )))
                }
            };
            if resources.insert(resource.id(), resource).is_some() {
                return Err(CodecError::Duplicate(resource_path.to_string()));
            }
        }

        Ok(LwM2mObjectInstance {
            id: instance_id,
            resources,
        })
    }

    fn resource_at(&self, path: &LwM2mPath, tlvs: Vec<Tlv>) -> Result<LwM2mResource, CodecError> {
        let resource_id = path.resource_id().unwrap_or_default();

        // a multiple resource may also be sent as its bare instances
        if !tlvs.is_empty() && tlvs.iter().all(|t| t.tlv_type == TlvType::ResourceInstance) {
            let wrapped = Tlv::children(TlvType::MultipleResource, resource_id, tlvs);
            return self.resource(path, wrapped);
        }

        let mut tlvs = tlvs.into_iter();
        match (tlvs.next(), tlvs.next()) {
            (Some(tlv), None) if tlv.identifier == resource_id => self.resource(path, tlv),
            (Some(tlv), None) => Err(CodecError::InvalidFormat(format!(
                "resource {} does not match path {}",
                tlv.identifier, path
            ))),
            _ => Err(CodecError::InvalidFormat(format!(
                "expected exactly one resource entry for {}",
                path
            ))),
        }
    }

    fn resource(&self, path: &LwM2mPath, tlv: Tlv) -> Result<LwM2mResource, CodecError> {
        let object_id = path.object_id().unwrap_or_default();
        let resource_id = tlv.identifier;
        let resource_model = self.model.resource(object_id, resource_id);
        let kind = self.kind(object_id, resource_id);

        match tlv.tlv_type {
            TlvType::ResourceValue => {
                if resource_model.map(|r| r.multiple).unwrap_or(false) {
                    return Err(CodecError::unsupported(
                        path,
                        "a single value was sent for a multiple resource",
                    ));
                }
                let value = decode_value(&value_bytes(tlv.content)?, kind, path)?;
                Ok(LwM2mResource::Single(LwM2mSingleResource {
                    id: resource_id,
                    value,
                }))
            }
            TlvType::MultipleResource => {
                if resource_model.map(|r| !r.multiple).unwrap_or(false) {
                    return Err(CodecError::unsupported(
                        path,
                        "several instances were sent for a single resource",
                    ));
                }
                let mut instances = BTreeMap::new();
                for child in children(tlv)? {
                    let instance_path = path.append(child.identifier).ok_or_else(|| {
                        CodecError::InvalidFormat(format!("{} has no instance level", path))
                    })?;
                    if child.tlv_type != TlvType::ResourceInstance {
                        return Err(CodecError::InvalidFormat(format!(
                            "unexpected {:?} entry inside multiple resource {}",
                            child.tlv_type, path
                        )));
                    }
                    let value = decode_value(&value_bytes(child.content)?, kind, &instance_path)?;
                    if instances.insert(child.identifier, value).is_some() {
                        return Err(CodecError::Duplicate(instance_path.to_string()));
                    }
                }
                Ok(LwM2mResource::Multiple(LwM2mMultipleResource {
                    id: resource_id,
                    kind,
                    instances,
                }))
            }
            other => Err(CodecError::InvalidFormat(format!(
                "unexpected {:?} entry for resource {}",
                other, path
            ))),
        }
    }

    fn resource_instance_at(
        &self,
        path: &LwM2mPath,
        tlvs: Vec<Tlv>,
    ) -> Result<LwM2mResourceInstance, CodecError> {
        let object_id = path.object_id().unwrap_or_default();
        let resource_id = path.resource_id().unwrap_or_default();
        let instance_id = path.resource_instance_id().unwrap_or_default();

        let mut tlvs = tlvs.into_iter();
        match (tlvs.next(), tlvs.next()) {
            (Some(tlv), None)
                if tlv.tlv_type == TlvType::ResourceInstance && tlv.identifier == instance_id =>
            {
                let kind = self.kind(object_id, resource_id);
                let value = decode_value(&value_bytes(tlv.content)?, kind, path)?;
                Ok(LwM2mResourceInstance {
                    id: instance_id,
                    value,
                })
            }
            _ => Err(CodecError::InvalidFormat(format!(
                "expected exactly one resource instance entry for {}",
                path
            ))),
        }
    }

    fn kind(&self, object_id: u16, resource_id: u16) -> ValueKind {
        self.model
            .resource(object_id, resource_id)
            .and_then(|r| r.kind)
            .unwrap_or(ValueKind::Opaque)
    }

    fn is_multi_instance(&self, object_id: u16) -> bool {
        self.model
            .object(object_id)
            .map(|o| o.multiple)
            .unwrap_or(true)
    }
}

fn children(tlv: Tlv) -> Result<Vec<Tlv>, CodecError> {
    match tlv.content {
        TlvContent::Children(children) => Ok(children),
        TlvContent::Value(_) => Err(CodecError::InvalidFormat(format!(
            "{:?} entry {} has no nested entries",
            tlv.tlv_type, tlv.identifier
        ))),
    }
}

fn value_bytes(content: TlvContent) -> Result<Vec<u8>, CodecError> {
    match content {
        TlvContent::Value(bytes) => Ok(bytes),
        TlvContent::Children(_) => Err(CodecError::InvalidFormat(
            "value entry holds nested entries".to_string(),
        )),
    }
}

fn decode_value(bytes: &[u8], kind: ValueKind, path: &LwM2mPath) -> Result<Value, CodecError> {
    let value = match kind {
        ValueKind::String => Value::String(wire::decode_string(bytes)?),
        ValueKind::Opaque => Value::Opaque(bytes.to_vec()),
        ValueKind::Integer => Value::Integer(wire::decode_integer(bytes)?),
        ValueKind::Unsigned => Value::Unsigned(wire::decode_unsigned(bytes)?),
        ValueKind::Float => Value::Float(wire::decode_float(bytes)?),
        ValueKind::Boolean => Value::Boolean(wire::decode_boolean(bytes)?),
        ValueKind::Time => {
            let seconds = wire::decode_integer(bytes)?;
            let time = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
                CodecError::InvalidFormat(format!("time {} at {} is out of range", seconds, path))
            })?;
            Value::Time(time)
        }
        ValueKind::ObjLnk => Value::ObjLnk(wire::decode_object_link(bytes)?),
        ValueKind::CoreLink => {
            let text = wire::decode_string(bytes)?;
            let links = parse_core_links(&text)
                .map_err(|e| CodecError::InvalidFormat(format!("{} at {}", e, path)))?;
            Value::CoreLink(links)
        }
    };
    Ok(value)
}
