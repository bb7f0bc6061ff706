use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::config::senml::RELATIVE_TIME_THRESHOLD;
use crate::error::CodecError;
use crate::link::parse_core_links;
use crate::model::LwM2mModel;
use crate::node::{
    LwM2mMultipleResource, LwM2mNode, LwM2mObject, LwM2mObjectInstance, LwM2mResource,
    LwM2mResourceInstance, LwM2mSingleResource, ObjectLink, TimestampedNode, Value, ValueKind,
};
use crate::path::{LwM2mPath, PathLevel};

use super::record::{SenmlPack, SenmlValue};

/// A record with its name and time resolved against the preceding base
/// fields.
struct ResolvedRecord {
    path: LwM2mPath,
    time: Option<f64>,
    value: SenmlValue,
}

/// Decode a pack read at `path` into the node at that path.
pub fn decode(
    pack: &SenmlPack,
    path: &LwM2mPath,
    model: &LwM2mModel,
) -> Result<LwM2mNode, CodecError> {
    let records = resolve(pack, &[*path])?;
    let leaves = typed_leaves(records, model)?;
    let node = build_node(path, leaves, model)?;
    trace!(path = %path, node = node.type_name(), "Decoded SenML pack");
    Ok(node)
}

/// Decode historical values, resolving relative times against the
/// current time.
pub fn decode_timestamped(
    pack: &SenmlPack,
    path: &LwM2mPath,
    model: &LwM2mModel,
) -> Result<Vec<TimestampedNode>, CodecError> {
    decode_timestamped_at(pack, path, model, Utc::now())
}

/// Decode historical values. A resolved time below 2^28 is relative to
/// `now`. Nodes without a time come first, then the most recent ones.
pub fn decode_timestamped_at(
    pack: &SenmlPack,
    path: &LwM2mPath,
    model: &LwM2mModel,
    now: DateTime<Utc>,
) -> Result<Vec<TimestampedNode>, CodecError> {
    let mut groups: BTreeMap<Option<i64>, Vec<ResolvedRecord>> = BTreeMap::new();
    for record in resolve(pack, &[*path])? {
        let timestamp = record
            .time
            .map(|t| absolute_time(t, now))
            .transpose()?
            .map(|t| t.timestamp_millis());
        groups.entry(timestamp).or_default().push(record);
    }

    // None sorts first, so reversing the timed tail gives the final order
    let mut untimed = Vec::new();
    let mut timed = Vec::new();
    for (timestamp, records) in groups {
        let node = build_node(path, typed_leaves(records, model)?, model)?;
        match timestamp {
            None => untimed.push(TimestampedNode::new(None, node)),
            Some(millis) => timed.push(TimestampedNode::new(
                DateTime::from_timestamp_millis(millis),
                node,
            )),
        }
    }
    timed.reverse();
    untimed.extend(timed);
    Ok(untimed)
}

/// Decode a composite payload. Every record must live under one of
/// `paths`; paths without any record are absent from the result.
pub fn decode_nodes(
    pack: &SenmlPack,
    paths: &[LwM2mPath],
    model: &LwM2mModel,
) -> Result<BTreeMap<LwM2mPath, LwM2mNode>, CodecError> {
    let leaves = typed_leaves(resolve(pack, paths)?, model)?;

    let mut nodes = BTreeMap::new();
    for path in paths {
        let under: BTreeMap<LwM2mPath, Value> = leaves
            .iter()
            .filter(|(leaf, _)| leaf.starts_with(path))
            .map(|(leaf, value)| (*leaf, value.clone()))
            .collect();
        if under.is_empty() {
            continue;
        }
        nodes.insert(*path, build_node(path, under, model)?);
    }
    trace!(paths = paths.len(), nodes = nodes.len(), "Decoded composite SenML pack");
    Ok(nodes)
}

fn resolve(pack: &SenmlPack, roots: &[LwM2mPath]) -> Result<Vec<ResolvedRecord>, CodecError> {
    let mut base_name = String::new();
    let mut base_time: Option<f64> = None;
    let mut resolved = Vec::with_capacity(pack.records.len());

    for (index, record) in pack.records.iter().enumerate() {
        if let Some(bn) = &record.base_name {
            base_name = bn.clone();
        }
        if let Some(bt) = record.base_time {
            base_time = Some(bt);
        }

        let name = format!("{}{}", base_name, record.name.as_deref().unwrap_or_default());
        if name.is_empty() {
            return Err(CodecError::InvalidFormat(format!(
                "record {} has no name and no base name",
                index
            )));
        }
        let path = LwM2mPath::parse(&name)?;
        if !(path.is_resource() || path.is_resource_instance()) {
            return Err(CodecError::InvalidFormat(format!(
                "record {} names {}, which is not a resource or resource instance",
                index, path
            )));
        }
        if !roots.iter().any(|root| path.starts_with(root)) {
            return Err(CodecError::InvalidFormat(format!(
                "record {} names {}, outside of the requested paths",
                index, path
            )));
        }
        let value = record.value.clone().ok_or_else(|| {
            CodecError::InvalidFormat(format!("record {} for {} has no value", index, path))
        })?;

        let time = match (base_time, record.time) {
            (None, None) => None,
            (bt, t) => Some(bt.unwrap_or(0.0) + t.unwrap_or(0.0)),
        };
        resolved.push(ResolvedRecord { path, time, value });
    }
    Ok(resolved)
}

fn absolute_time(time: f64, now: DateTime<Utc>) -> Result<DateTime<Utc>, CodecError> {
    let out_of_range = || CodecError::InvalidFormat(format!("time {} is out of range", time));
    if !time.is_finite() {
        return Err(out_of_range());
    }
    let millis = (time * 1000.0).round() as i64;
    if time < RELATIVE_TIME_THRESHOLD {
        now.checked_add_signed(Duration::milliseconds(millis))
            .ok_or_else(out_of_range)
    } else {
        DateTime::from_timestamp_millis(millis).ok_or_else(out_of_range)
    }
}

fn typed_leaves(
    records: Vec<ResolvedRecord>,
    model: &LwM2mModel,
) -> Result<BTreeMap<LwM2mPath, Value>, CodecError> {
    let mut leaves = BTreeMap::new();
    for record in records {
        let value = to_value(&record.path, record.value, model)?;
        if leaves.insert(record.path, value).is_some() {
            return Err(CodecError::Duplicate(record.path.to_string()));
        }
    }
    Ok(leaves)
}

fn declared_kind(path: &LwM2mPath, model: &LwM2mModel) -> Option<ValueKind> {
    model
        .resource(path.object_id()?, path.resource_id()?)
        .and_then(|r| r.kind)
}

fn to_value(
    path: &LwM2mPath,
    value: SenmlValue,
    model: &LwM2mModel,
) -> Result<Value, CodecError> {
    let kind = declared_kind(path, model).unwrap_or_else(|| senml_kind(&value));

    let mismatch = |actual: ValueKind| CodecError::TypeMismatch {
        path: *path,
        expected: kind,
        actual,
    };
    let invalid = |reason: String| CodecError::InvalidFormat(format!("{} at {}", reason, path));

    let converted = match (kind, value) {
        (ValueKind::String, SenmlValue::String(s)) => Value::String(s),
        (ValueKind::CoreLink, SenmlValue::String(s)) => {
            Value::CoreLink(parse_core_links(&s).map_err(|e| invalid(e.to_string()))?)
        }
        (ValueKind::Opaque, SenmlValue::Opaque(bytes)) => Value::Opaque(bytes),
        (ValueKind::Boolean, SenmlValue::Boolean(b)) => Value::Boolean(b),
        (ValueKind::ObjLnk, SenmlValue::ObjectLink(link)) => Value::ObjLnk(
            link.parse::<ObjectLink>()
                .map_err(|e| invalid(e.to_string()))?,
        ),
        (ValueKind::Float, SenmlValue::Number(n)) => Value::Float(n.as_f64()),
        (ValueKind::Integer, SenmlValue::Number(n)) => Value::Integer(
            n.to_i64()
                .ok_or_else(|| invalid(format!("{} is not an exact integer", n)))?,
        ),
        (ValueKind::Unsigned, SenmlValue::Number(n)) => Value::Unsigned(
            n.to_u64()
                .ok_or_else(|| invalid(format!("{} is not an exact unsigned integer", n)))?,
        ),
        (ValueKind::Time, SenmlValue::Number(n)) => {
            let seconds = n
                .to_i64()
                .ok_or_else(|| invalid(format!("{} is not an exact time in seconds", n)))?;
            Value::Time(
                DateTime::from_timestamp(seconds, 0)
                    .ok_or_else(|| invalid(format!("time {} is out of range", seconds)))?,
            )
        }
        (_, other) => return Err(mismatch(senml_kind(&other))),
    };
    Ok(converted)
}

/// Kind implied by the record alone; numbers default to float.
fn senml_kind(value: &SenmlValue) -> ValueKind {
    match value {
        SenmlValue::String(_) => ValueKind::String,
        SenmlValue::Number(_) => ValueKind::Float,
        SenmlValue::Boolean(_) => ValueKind::Boolean,
        SenmlValue::Opaque(_) => ValueKind::Opaque,
        SenmlValue::ObjectLink(_) => ValueKind::ObjLnk,
    }
}

/// Assemble the node at `path` from leaf values below it.
fn build_node(
    path: &LwM2mPath,
    leaves: BTreeMap<LwM2mPath, Value>,
    model: &LwM2mModel,
) -> Result<LwM2mNode, CodecError> {
    let Some(object_id) = path.object_id() else {
        return Err(CodecError::unsupported(path, "SenML can not decode the root path"));
    };

    // object instance -> resource -> leaves of that resource
    let mut tree: BTreeMap<u16, BTreeMap<u16, Vec<(LwM2mPath, Value)>>> = BTreeMap::new();
    for (leaf, value) in leaves {
        let (Some(instance_id), Some(resource_id)) = (leaf.object_instance_id(), leaf.resource_id())
        else {
            return Err(CodecError::InvalidFormat(format!("{} is not a resource path", leaf)));
        };
        tree.entry(instance_id)
            .or_default()
            .entry(resource_id)
            .or_default()
            .push((leaf, value));
    }

    let mut instances = BTreeMap::new();
    for (instance_id, resources) in tree {
        let mut built = BTreeMap::new();
        for (resource_id, values) in resources {
            let resource_path = LwM2mPath::resource(object_id, instance_id, resource_id);
            built.insert(resource_id, build_resource(&resource_path, values, model)?);
        }
        instances.insert(
            instance_id,
            LwM2mObjectInstance {
                id: instance_id,
                resources: built,
            },
        );
    }

    let missing = || CodecError::InvalidFormat(format!("no value found for {}", path));
    let node = match path.level() {
        PathLevel::Root => {
            return Err(CodecError::unsupported(path, "SenML can not decode the root path"))
        }
        PathLevel::Object => LwM2mNode::Object(LwM2mObject {
            id: object_id,
            instances,
        }),
        PathLevel::ObjectInstance => {
            let instance_id = path.object_instance_id().unwrap_or_default();
            let instance = instances.remove(&instance_id).unwrap_or(LwM2mObjectInstance {
                id: instance_id,
                resources: BTreeMap::new(),
            });
            LwM2mNode::ObjectInstance(instance)
        }
        PathLevel::Resource => {
            let instance_id = path.object_instance_id().unwrap_or_default();
            let resource_id = path.resource_id().unwrap_or_default();
            let resource = instances
                .remove(&instance_id)
                .and_then(|mut i| i.resources.remove(&resource_id))
                .or_else(|| empty_multiple(object_id, resource_id, model))
                .ok_or_else(missing)?;
            LwM2mNode::Resource(resource)
        }
        PathLevel::ResourceInstance => {
            let instance_id = path.object_instance_id().unwrap_or_default();
            let resource_id = path.resource_id().unwrap_or_default();
            let id = path.resource_instance_id().unwrap_or_default();
            let resource = instances
                .remove(&instance_id)
                .and_then(|mut i| i.resources.remove(&resource_id))
                .ok_or_else(missing)?;
            match resource {
                LwM2mResource::Multiple(mut multiple) => {
                    let value = multiple.instances.remove(&id).ok_or_else(missing)?;
                    LwM2mNode::ResourceInstance(LwM2mResourceInstance { id, value })
                }
                LwM2mResource::Single(_) => {
                    return Err(CodecError::unsupported(
                        path,
                        "a single resource can not be read as an instance",
                    ))
                }
            }
        }
    };
    Ok(node)
}

/// A multiple resource without instances encodes to no record at all.
fn empty_multiple(
    object_id: u16,
    resource_id: u16,
    model: &LwM2mModel,
) -> Option<LwM2mResource> {
    let declared = model.resource(object_id, resource_id).filter(|r| r.multiple)?;
    Some(LwM2mResource::Multiple(LwM2mMultipleResource {
        id: resource_id,
        kind: declared.kind.unwrap_or(ValueKind::Opaque),
        instances: BTreeMap::new(),
    }))
}

fn build_resource(
    path: &LwM2mPath,
    values: Vec<(LwM2mPath, Value)>,
    model: &LwM2mModel,
) -> Result<LwM2mResource, CodecError> {
    let resource_id = path.resource_id().unwrap_or_default();
    let declared = path
        .object_id()
        .and_then(|object_id| model.resource(object_id, resource_id));
    let as_instances = values.iter().any(|(leaf, _)| leaf.is_resource_instance());

    if let Some(resource_model) = declared {
        if resource_model.multiple != as_instances {
            let reason = if resource_model.multiple {
                "a single value was sent for a multiple resource"
            } else {
                "instances were sent for a single resource"
            };
            return Err(CodecError::unsupported(path, reason));
        }
    }

    if !as_instances {
        let mut values = values.into_iter();
        return match (values.next(), values.next()) {
            (Some((_, value)), None) => Ok(LwM2mResource::Single(LwM2mSingleResource {
                id: resource_id,
                value,
            })),
            _ => Err(CodecError::Duplicate(path.to_string())),
        };
    }

    if values.iter().any(|(leaf, _)| leaf.is_resource()) {
        return Err(CodecError::InvalidFormat(format!(
            "{} is sent both as a value and as instances",
            path
        )));
    }

    let kind = declared
        .and_then(|r| r.kind)
        .or_else(|| values.first().map(|(_, v)| v.kind()))
        .unwrap_or(ValueKind::Opaque);
    let instances = values
        .into_iter()
        .map(|(leaf, value)| (leaf.resource_instance_id().unwrap_or_default(), value))
        .collect();
    Ok(LwM2mResource::Multiple(LwM2mMultipleResource {
        id: resource_id,
        kind,
        instances,
    }))
}
