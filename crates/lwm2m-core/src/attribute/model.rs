//! Attribute models: value type, access mode, assignation levels and
//! validity predicate of each known attribute name.

use std::collections::HashMap;

use crate::config::attributes as names;
use crate::path::PathLevel;

use super::AttributeValue;

/// Declared type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeValueType {
    Long,
    Double,
    String,
    /// The attribute never carries a value (`cancel`)
    Valueless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }
}

/// Static description of one attribute name.
#[derive(Debug)]
pub struct AttributeModel {
    pub name: &'static str,
    pub value_type: AttributeValueType,
    pub access: AccessMode,
    pub levels: &'static [PathLevel],
    /// Returns a reason when the value is out of the allowed range
    pub validate: fn(&AttributeValue) -> Option<String>,
}

impl AttributeModel {
    pub fn can_be_assigned_to(&self, level: PathLevel) -> bool {
        self.levels.contains(&level)
    }
}

impl PartialEq for AttributeModel {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for AttributeModel {}

const NOTIFICATION_LEVELS: &[PathLevel] = &[
    PathLevel::Object,
    PathLevel::ObjectInstance,
    PathLevel::Resource,
    PathLevel::ResourceInstance,
];
const VALUE_LEVELS: &[PathLevel] = &[PathLevel::Resource, PathLevel::ResourceInstance];

fn no_check(_: &AttributeValue) -> Option<String> {
    None
}

fn long_in(value: &AttributeValue, min: i64, max: i64) -> Option<String> {
    match value {
        AttributeValue::Long(v) if *v < min || *v > max => {
            Some(format!("must be in range [{}, {}]", min, max))
        }
        _ => None,
    }
}

fn non_negative(value: &AttributeValue) -> Option<String> {
    long_in(value, 0, i64::MAX)
}

fn flag(value: &AttributeValue) -> Option<String> {
    long_in(value, 0, 1)
}

fn dimension(value: &AttributeValue) -> Option<String> {
    long_in(value, 0, 255)
}

fn short_server_id(value: &AttributeValue) -> Option<String> {
    long_in(value, 1, 65534)
}

fn finite_double(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Double(v) if !v.is_finite() => Some("must be a finite number".to_string()),
        _ => None,
    }
}

fn step(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Double(v) if !v.is_finite() || *v < 0.0 => {
            Some("must be a finite non-negative number".to_string())
        }
        _ => None,
    }
}

/// `major.minor` version strings.
fn version(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::String(v) => {
            let valid = v
                .split_once('.')
                .map(|(major, minor)| {
                    !major.is_empty()
                        && !minor.is_empty()
                        && major.bytes().all(|b| b.is_ascii_digit())
                        && minor.bytes().all(|b| b.is_ascii_digit())
                })
                .unwrap_or(false);
            if valid {
                None
            } else {
                Some("must be formatted as major.minor".to_string())
            }
        }
        _ => None,
    }
}

fn non_empty(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::String(v) if v.is_empty() => Some("must not be empty".to_string()),
        _ => None,
    }
}

pub static PMIN: AttributeModel = AttributeModel {
    name: names::PMIN,
    value_type: AttributeValueType::Long,
    access: AccessMode::ReadWrite,
    levels: NOTIFICATION_LEVELS,
    validate: non_negative,
};

pub static PMAX: AttributeModel = AttributeModel {
    name: names::PMAX,
    value_type: AttributeValueType::Long,
    access: AccessMode::ReadWrite,
    levels: NOTIFICATION_LEVELS,
    validate: non_negative,
};

pub static GREATER_THAN: AttributeModel = AttributeModel {
    name: names::GT,
    value_type: AttributeValueType::Double,
    access: AccessMode::ReadWrite,
    levels: VALUE_LEVELS,
    validate: finite_double,
};

pub static LESSER_THAN: AttributeModel = AttributeModel {
    name: names::LT,
    value_type: AttributeValueType::Double,
    access: AccessMode::ReadWrite,
    levels: VALUE_LEVELS,
    validate: finite_double,
};

pub static STEP: AttributeModel = AttributeModel {
    name: names::ST,
    value_type: AttributeValueType::Double,
    access: AccessMode::ReadWrite,
    levels: VALUE_LEVELS,
    validate: step,
};

pub static EVALUATE_MIN_PERIOD: AttributeModel = AttributeModel {
    name: names::EPMIN,
    value_type: AttributeValueType::Long,
    access: AccessMode::ReadWrite,
    levels: NOTIFICATION_LEVELS,
    validate: non_negative,
};

pub static EVALUATE_MAX_PERIOD: AttributeModel = AttributeModel {
    name: names::EPMAX,
    value_type: AttributeValueType::Long,
    access: AccessMode::ReadWrite,
    levels: NOTIFICATION_LEVELS,
    validate: non_negative,
};

pub static DIMENSION: AttributeModel = AttributeModel {
    name: names::DIM,
    value_type: AttributeValueType::Long,
    access: AccessMode::Read,
    levels: &[PathLevel::Resource],
    validate: dimension,
};

pub static SHORT_SERVER_ID: AttributeModel = AttributeModel {
    name: names::SSID,
    value_type: AttributeValueType::Long,
    access: AccessMode::Read,
    levels: &[PathLevel::ObjectInstance],
    validate: short_server_id,
};

pub static SERVER_URI: AttributeModel = AttributeModel {
    name: names::URI,
    value_type: AttributeValueType::String,
    access: AccessMode::Read,
    levels: &[PathLevel::ObjectInstance],
    validate: non_empty,
};

pub static OBJECT_VERSION: AttributeModel = AttributeModel {
    name: names::VER,
    value_type: AttributeValueType::String,
    access: AccessMode::Read,
    levels: &[PathLevel::Object],
    validate: version,
};

pub static ENABLER_VERSION: AttributeModel = AttributeModel {
    name: names::LWM2M,
    value_type: AttributeValueType::String,
    access: AccessMode::Read,
    levels: &[PathLevel::Root],
    validate: version,
};

pub static EDGE: AttributeModel = AttributeModel {
    name: names::EDGE,
    value_type: AttributeValueType::Long,
    access: AccessMode::ReadWrite,
    levels: VALUE_LEVELS,
    validate: flag,
};

pub static CONFIRMABLE: AttributeModel = AttributeModel {
    name: names::CON,
    value_type: AttributeValueType::Long,
    access: AccessMode::ReadWrite,
    levels: NOTIFICATION_LEVELS,
    validate: flag,
};

pub static HISTORICAL_QUEUE_MAX: AttributeModel = AttributeModel {
    name: names::HQMAX,
    value_type: AttributeValueType::Long,
    access: AccessMode::ReadWrite,
    levels: NOTIFICATION_LEVELS,
    validate: non_negative,
};

pub static CANCEL: AttributeModel = AttributeModel {
    name: names::CANCEL,
    value_type: AttributeValueType::Valueless,
    access: AccessMode::Write,
    levels: NOTIFICATION_LEVELS,
    validate: no_check,
};

/// Attribute models by name.
///
/// Built explicitly and handed to the parser, so tests and deployments can
/// register vendor attributes without touching shared state.
#[derive(Debug, Clone)]
pub struct AttributeRegistry {
    models: HashMap<&'static str, &'static AttributeModel>,
}

impl AttributeRegistry {
    pub fn empty() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// All attributes defined by LwM2M 1.2.
    pub fn standard() -> Self {
        [
            &PMIN,
            &PMAX,
            &GREATER_THAN,
            &LESSER_THAN,
            &STEP,
            &EVALUATE_MIN_PERIOD,
            &EVALUATE_MAX_PERIOD,
            &DIMENSION,
            &SHORT_SERVER_ID,
            &SERVER_URI,
            &OBJECT_VERSION,
            &ENABLER_VERSION,
            &EDGE,
            &CONFIRMABLE,
            &HISTORICAL_QUEUE_MAX,
            &CANCEL,
        ]
        .into_iter()
        .fold(Self::empty(), |registry, model| registry.with_model(model))
    }

    pub fn with_model(mut self, model: &'static AttributeModel) -> Self {
        self.models.insert(model.name, model);
        self
    }

    pub fn get(&self, name: &str) -> Option<&'static AttributeModel> {
        self.models.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
