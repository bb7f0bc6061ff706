use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::CodecError;
use crate::link::serialize_links;
use crate::model::LwM2mModel;
use crate::node::{LwM2mNode, LwM2mObjectInstance, LwM2mResource, TimestampedNode, Value};
use crate::path::{LwM2mPath, PathLevel};

use super::record::{SenmlNumber, SenmlPack, SenmlRecord, SenmlValue};

/// Encode the node read at `path` as one record per leaf value.
///
/// The first record carries the request path as base name; every record is
/// named relative to it.
pub fn encode(
    path: &LwM2mPath,
    node: &LwM2mNode,
    model: &LwM2mModel,
) -> Result<SenmlPack, CodecError> {
    let records = encode_group(path, node, model, None)?;
    trace!(path = %path, records = records.len(), "Encoded SenML pack");
    Ok(SenmlPack::new(records))
}

/// Encode historical values. The first record of each node carries its
/// timestamp as base time.
pub fn encode_timestamped(
    path: &LwM2mPath,
    nodes: &[TimestampedNode],
    model: &LwM2mModel,
) -> Result<SenmlPack, CodecError> {
    let mut records = Vec::new();
    for timestamped in nodes {
        records.extend(encode_group(path, &timestamped.node, model, timestamped.timestamp)?);
    }
    trace!(path = %path, records = records.len(), "Encoded timestamped SenML pack");
    Ok(SenmlPack::new(records))
}

/// Encode several nodes, each read at its own path, with absolute names.
pub fn encode_nodes(
    nodes: &BTreeMap<LwM2mPath, LwM2mNode>,
    model: &LwM2mModel,
) -> Result<SenmlPack, CodecError> {
    let mut records = Vec::new();
    for (path, node) in nodes {
        for (leaf, value) in leaves(path, node)? {
            records.push(
                SenmlRecord::new()
                    .with_name(leaf.to_string())
                    .with_value(to_senml(&leaf, value, model)?),
            );
        }
    }
    trace!(nodes = nodes.len(), records = records.len(), "Encoded composite SenML pack");
    Ok(SenmlPack::new(records))
}

fn encode_group(
    path: &LwM2mPath,
    node: &LwM2mNode,
    model: &LwM2mModel,
    timestamp: Option<DateTime<Utc>>,
) -> Result<Vec<SenmlRecord>, CodecError> {
    let leaves = leaves(path, node)?;
    if leaves.is_empty() {
        check_empty_resource(path, node, model)?;
    }

    let mut base_name = path.to_string();
    if leaves.iter().any(|(leaf, _)| leaf != path) && !base_name.ends_with('/') {
        base_name.push('/');
    }

    let mut records = Vec::with_capacity(leaves.len());
    for (index, (leaf, value)) in leaves.iter().enumerate() {
        let mut record = SenmlRecord::new();
        if index == 0 {
            record.base_name = Some(base_name.clone());
            record.base_time = timestamp.map(|t| t.timestamp_millis() as f64 / 1000.0);
        }
        let full = leaf.to_string();
        let relative = full.strip_prefix(base_name.as_str()).unwrap_or_default();
        if !relative.is_empty() {
            record.name = Some(relative.to_string());
        }
        record.value = Some(to_senml(leaf, value, model)?);
        records.push(record);
    }
    Ok(records)
}

/// An empty multiple resource leaves no record, so it only reads back when
/// the model declares the resource as multiple.
fn check_empty_resource(
    path: &LwM2mPath,
    node: &LwM2mNode,
    model: &LwM2mModel,
) -> Result<(), CodecError> {
    let LwM2mNode::Resource(resource) = node else {
        return Ok(());
    };
    let declared = match (path.object_id(), path.resource_id()) {
        (Some(object_id), Some(resource_id)) => model
            .resource(object_id, resource_id)
            .is_some_and(|r| r.multiple),
        _ => false,
    };
    if declared {
        return Ok(());
    }
    Err(CodecError::unsupported(
        path,
        format!(
            "resource {} has no instance and no multiple resource model",
            resource.id()
        ),
    ))
}

/// Leaf values of `node` with their absolute paths, in path order.
fn leaves<'a>(
    path: &LwM2mPath,
    node: &'a LwM2mNode,
) -> Result<Vec<(LwM2mPath, &'a Value)>, CodecError> {
    let mismatch = || {
        CodecError::unsupported(
            path,
            format!("a {} can not be encoded at this path", node.type_name()),
        )
    };

    let mut out = Vec::new();
    match (node, path.level()) {
        (LwM2mNode::Object(object), PathLevel::Object) if Some(object.id) == path.object_id() => {
            for instance in object.instances.values() {
                let instance_path = path.append(instance.id).ok_or_else(mismatch)?;
                instance_leaves(&instance_path, instance, &mut out)?;
            }
        }
        (LwM2mNode::ObjectInstance(instance), PathLevel::ObjectInstance)
            if Some(instance.id) == path.object_instance_id() =>
        {
            instance_leaves(path, instance, &mut out)?;
        }
        (LwM2mNode::Resource(resource), PathLevel::Resource)
            if Some(resource.id()) == path.resource_id() =>
        {
            resource_leaves(path, resource, &mut out)?;
        }
        (LwM2mNode::ResourceInstance(instance), PathLevel::ResourceInstance)
            if Some(instance.id) == path.resource_instance_id() =>
        {
            out.push((*path, &instance.value));
        }
        _ => return Err(mismatch()),
    }
    Ok(out)
}

fn instance_leaves<'a>(
    path: &LwM2mPath,
    instance: &'a LwM2mObjectInstance,
    out: &mut Vec<(LwM2mPath, &'a Value)>,
) -> Result<(), CodecError> {
    for resource in instance.resources.values() {
        let resource_path = path
            .append(resource.id())
            .ok_or_else(|| CodecError::unsupported(path, "resource id out of range"))?;
        resource_leaves(&resource_path, resource, out)?;
    }
    Ok(())
}

fn resource_leaves<'a>(
    path: &LwM2mPath,
    resource: &'a LwM2mResource,
    out: &mut Vec<(LwM2mPath, &'a Value)>,
) -> Result<(), CodecError> {
    match resource {
        LwM2mResource::Single(single) => out.push((*path, &single.value)),
        LwM2mResource::Multiple(multiple) => {
            for (id, value) in &multiple.instances {
                let instance_path = path
                    .append(*id)
                    .ok_or_else(|| CodecError::unsupported(path, "not a resource path"))?;
                out.push((instance_path, value));
            }
        }
    }
    Ok(())
}

fn to_senml(
    path: &LwM2mPath,
    value: &Value,
    model: &LwM2mModel,
) -> Result<SenmlValue, CodecError> {
    let declared = match (path.object_id(), path.resource_id()) {
        (Some(object_id), Some(resource_id)) => {
            model.resource(object_id, resource_id).and_then(|r| r.kind)
        }
        _ => None,
    };
    let value = match declared {
        Some(kind) => value.clone().coerce(kind).ok_or(CodecError::TypeMismatch {
            path: *path,
            expected: kind,
            actual: value.kind(),
        })?,
        None => value.clone(),
    };

    let senml = match value {
        Value::String(s) => SenmlValue::String(s),
        Value::Opaque(bytes) => SenmlValue::Opaque(bytes),
        Value::Integer(i) => SenmlValue::Number(SenmlNumber::Integer(i)),
        Value::Unsigned(u) => SenmlValue::Number(SenmlNumber::Unsigned(u)),
        Value::Float(f) => SenmlValue::Number(SenmlNumber::Float(f)),
        Value::Boolean(b) => SenmlValue::Boolean(b),
        Value::Time(t) => SenmlValue::Number(SenmlNumber::Integer(t.timestamp())),
        Value::ObjLnk(link) => SenmlValue::ObjectLink(link.to_string()),
        Value::CoreLink(links) => SenmlValue::String(serialize_links(&links)),
    };
    Ok(senml)
}
