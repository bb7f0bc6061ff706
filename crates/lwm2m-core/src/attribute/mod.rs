//! LwM2M attributes attached to paths by Discover, Register and
//! Write-Attributes.

pub mod model;
mod parser;

use std::collections::BTreeMap;
use std::fmt;

use crate::error::InvalidAttributeError;
use crate::link::LinkParam;
use crate::path::LwM2mPath;

pub use model::{AccessMode, AttributeModel, AttributeRegistry, AttributeValueType};
pub use parser::{find_root_path, resolve_path, Lwm2mLink, Lwm2mLinkParser};

/// Typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Long(i64),
    Double(f64),
    String(String),
    /// Sent without a value: unsets a writable attribute, or a valueless
    /// attribute such as `cancel`
    None,
}

impl AttributeValue {
    pub fn as_long(&self) -> Option<i64> {
        match self {
            AttributeValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            AttributeValue::Double(v) => Some(*v),
            AttributeValue::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, AttributeValue::None)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Long(v) => write!(f, "{}", v),
            AttributeValue::Double(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{}", v),
            AttributeValue::None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub model: &'static AttributeModel,
    pub value: AttributeValue,
}

impl Attribute {
    /// Build an attribute, checking the value type and range.
    pub fn new(
        model: &'static AttributeModel,
        value: AttributeValue,
    ) -> Result<Self, InvalidAttributeError> {
        let type_ok = matches!(
            (&value, model.value_type),
            (AttributeValue::None, _)
                | (AttributeValue::Long(_), AttributeValueType::Long)
                | (AttributeValue::Double(_), AttributeValueType::Double)
                | (AttributeValue::String(_), AttributeValueType::String)
        );
        if !type_ok {
            return Err(InvalidAttributeError::InvalidValue {
                name: model.name.to_string(),
                value: value.to_string(),
                reason: format!("expected a {:?} value", model.value_type),
            });
        }
        if let Some(reason) = (model.validate)(&value) {
            return Err(InvalidAttributeError::InvalidValue {
                name: model.name.to_string(),
                value: value.to_string(),
                reason,
            });
        }
        Ok(Self { model, value })
    }

    /// Parse the textual value of a parameter into the model's type.
    ///
    /// `raw` is `None` for a valueless parameter; whether that is allowed is
    /// decided by the caller.
    pub fn parse(
        model: &'static AttributeModel,
        raw: Option<&str>,
    ) -> Result<Self, InvalidAttributeError> {
        let invalid = |raw: &str, reason: &str| InvalidAttributeError::InvalidValue {
            name: model.name.to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        let value = match (raw, model.value_type) {
            (None, _) => AttributeValue::None,
            (Some(_), AttributeValueType::Valueless) => {
                return Err(InvalidAttributeError::UnexpectedValue(model.name.to_string()))
            }
            (Some(raw), AttributeValueType::Long) => raw
                .parse::<i64>()
                .map(AttributeValue::Long)
                .map_err(|_| invalid(raw, "not an integer"))?,
            (Some(raw), AttributeValueType::Double) => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(AttributeValue::Double)
                .ok_or_else(|| invalid(raw, "not a number"))?,
            (Some(raw), AttributeValueType::String) => AttributeValue::String(raw.to_string()),
        };
        Self::new(model, value)
    }

    pub fn name(&self) -> &'static str {
        self.model.name
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            AttributeValue::None => write!(f, "{}", self.model.name),
            value => write!(f, "{}={}", self.model.name, value),
        }
    }
}

/// At most one attribute per name, plus link parameters that are not
/// LwM2M attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    attributes: BTreeMap<&'static str, Attribute>,
    others: Vec<LinkParam>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: Attribute) -> Result<(), InvalidAttributeError> {
        let name = attribute.name();
        if self.attributes.contains_key(name) {
            return Err(InvalidAttributeError::Duplicate(name.to_string()));
        }
        self.attributes.insert(name, attribute);
        Ok(())
    }

    pub fn push_other(&mut self, param: LinkParam) {
        self.others.push(param);
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Parameters kept as-is because no attribute model matches them.
    pub fn others(&self) -> &[LinkParam] {
        &self.others
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.others.is_empty()
    }

    /// Overlay `other` on top of this set. Attributes of `other` replace
    /// those with the same name; a valueless one removes it.
    pub fn merge(&self, other: &AttributeSet) -> AttributeSet {
        let mut merged = self.clone();
        for attribute in other.iter() {
            if attribute.value.is_none() && attribute.model.value_type != AttributeValueType::Valueless
            {
                merged.attributes.remove(attribute.name());
            } else {
                merged.attributes.insert(attribute.name(), attribute.clone());
            }
        }
        merged.others.extend(other.others.iter().cloned());
        merged
    }

    /// Check assignation levels and cross-attribute constraints for `path`.
    pub fn validate_for(&self, path: &LwM2mPath) -> Result<(), InvalidAttributeError> {
        for attribute in self.iter() {
            if !attribute.model.can_be_assigned_to(path.level()) {
                return Err(InvalidAttributeError::NotAssignable {
                    name: attribute.name().to_string(),
                    path: *path,
                });
            }
        }
        self.validate_consistency()
    }

    /// Cross-attribute constraints only.
    pub fn validate_consistency(&self) -> Result<(), InvalidAttributeError> {
        let long = |name: &str| self.get(name).and_then(|a| a.value.as_long());
        let double = |name: &str| self.get(name).and_then(|a| a.value.as_double());

        if let (Some(min), Some(max)) = (long("pmin"), long("pmax")) {
            if min > max {
                return Err(InvalidAttributeError::Inconsistent(format!(
                    "pmin ({}) must not be greater than pmax ({})",
                    min, max
                )));
            }
        }
        if let (Some(min), Some(max)) = (long("epmin"), long("epmax")) {
            if min > max {
                return Err(InvalidAttributeError::Inconsistent(format!(
                    "epmin ({}) must not be greater than epmax ({})",
                    min, max
                )));
            }
        }
        if let (Some(lt), Some(gt)) = (double("lt"), double("gt")) {
            if lt >= gt {
                return Err(InvalidAttributeError::Inconsistent(format!(
                    "lt ({}) must be less than gt ({})",
                    lt, gt
                )));
            }
            if let Some(st) = double("st") {
                if lt + 2.0 * st >= gt {
                    return Err(InvalidAttributeError::Inconsistent(format!(
                        "lt ({}) + 2 * st ({}) must be less than gt ({})",
                        lt, st, gt
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Query-string form, as used by Write-Attributes: `pmin=10&pmax=60`.
impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for attribute in self.iter() {
            if !first {
                write!(f, "&")?;
            }
            first = false;
            write!(f, "{}", attribute)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::model::{DIMENSION, GREATER_THAN, LESSER_THAN, PMAX, PMIN, STEP};
    use super::*;

    fn set(attributes: Vec<Attribute>) -> AttributeSet {
        let mut set = AttributeSet::new();
        for attribute in attributes {
            set.insert(attribute).unwrap();
        }
        set
    }

    #[test]
    fn test_parse_typed_values() {
        let pmin = Attribute::parse(&PMIN, Some("10")).unwrap();
        assert_eq!(pmin.value, AttributeValue::Long(10));
        let gt = Attribute::parse(&GREATER_THAN, Some("20.5")).unwrap();
        assert_eq!(gt.value, AttributeValue::Double(20.5));
        assert!(Attribute::parse(&PMIN, Some("abc")).is_err());
        assert!(Attribute::parse(&PMIN, Some("-1")).is_err());
        assert!(Attribute::parse(&DIMENSION, Some("256")).is_err());
    }

    #[test]
    fn test_duplicate_insert() {
        let mut set = AttributeSet::new();
        set.insert(Attribute::parse(&PMIN, Some("1")).unwrap()).unwrap();
        let err = set.insert(Attribute::parse(&PMIN, Some("2")).unwrap());
        assert_eq!(err, Err(InvalidAttributeError::Duplicate("pmin".to_string())));
    }

    #[test]
    fn test_period_consistency() {
        let bad = set(vec![
            Attribute::parse(&PMIN, Some("60")).unwrap(),
            Attribute::parse(&PMAX, Some("10")).unwrap(),
        ]);
        assert!(matches!(
            bad.validate_consistency(),
            Err(InvalidAttributeError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_step_consistency() {
        let ok = set(vec![
            Attribute::parse(&LESSER_THAN, Some("0")).unwrap(),
            Attribute::parse(&GREATER_THAN, Some("10")).unwrap(),
            Attribute::parse(&STEP, Some("4")).unwrap(),
        ]);
        assert!(ok.validate_for(&LwM2mPath::resource(3303, 0, 5700)).is_ok());

        let bad = set(vec![
            Attribute::parse(&LESSER_THAN, Some("0")).unwrap(),
            Attribute::parse(&GREATER_THAN, Some("10")).unwrap(),
            Attribute::parse(&STEP, Some("5")).unwrap(),
        ]);
        assert!(bad.validate_for(&LwM2mPath::resource(3303, 0, 5700)).is_err());
    }

    #[test]
    fn test_assignation_level() {
        let gt = set(vec![Attribute::parse(&GREATER_THAN, Some("1")).unwrap()]);
        assert!(matches!(
            gt.validate_for(&LwM2mPath::object_instance(3, 0)),
            Err(InvalidAttributeError::NotAssignable { .. })
        ));
    }

    #[test]
    fn test_merge_and_display() {
        let base = set(vec![
            Attribute::parse(&PMIN, Some("10")).unwrap(),
            Attribute::parse(&PMAX, Some("60")).unwrap(),
        ]);
        let overlay = set(vec![
            Attribute::parse(&PMIN, None).unwrap(),
            Attribute::parse(&PMAX, Some("120")).unwrap(),
        ]);
        let merged = base.merge(&overlay);
        assert!(!merged.contains("pmin"));
        assert_eq!(merged.to_string(), "pmax=120");
        assert_eq!(base.to_string(), "pmax=60&pmin=10");
    }
}
