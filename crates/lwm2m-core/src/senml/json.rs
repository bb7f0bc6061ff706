//! SenML JSON representation (RFC 8428 §5).

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::{Map, Number, Value as Json};

use crate::error::CodecError;

use super::record::{SenmlNumber, SenmlPack, SenmlRecord, SenmlValue};

const VALUE_KEYS: [&str; 5] = ["v", "vs", "vb", "vd", "vlo"];

pub fn to_json(pack: &SenmlPack) -> Result<Vec<u8>, CodecError> {
    let records = pack
        .records
        .iter()
        .map(record_to_json)
        .collect::<Result<Vec<_>, _>>()?;
    serde_json::to_vec(&Json::Array(records))
        .map_err(|e| CodecError::InvalidFormat(format!("unable to serialize SenML: {}", e)))
}

pub fn from_json(bytes: &[u8]) -> Result<SenmlPack, CodecError> {
    let json: Json = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::InvalidFormat(format!("invalid SenML JSON: {}", e)))?;
    let Json::Array(items) = json else {
        return Err(CodecError::InvalidFormat(
            "SenML JSON must be an array of records".to_string(),
        ));
    };

    let records = items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Json::Object(fields) => record_from_json(index, fields),
            _ => Err(CodecError::InvalidFormat(format!("record {} is not an object", index))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SenmlPack::new(records))
}

fn record_to_json(record: &SenmlRecord) -> Result<Json, CodecError> {
    let mut fields = Map::new();
    if let Some(bn) = &record.base_name {
        fields.insert("bn".to_string(), Json::String(bn.clone()));
    }
    if let Some(bt) = record.base_time {
        fields.insert("bt".to_string(), float(bt)?);
    }
    if let Some(n) = &record.name {
        fields.insert("n".to_string(), Json::String(n.clone()));
    }
    if let Some(t) = record.time {
        fields.insert("t".to_string(), float(t)?);
    }
    match &record.value {
        Some(SenmlValue::Number(SenmlNumber::Integer(v))) => {
            fields.insert("v".to_string(), Json::Number((*v).into()));
        }
        Some(SenmlValue::Number(SenmlNumber::Unsigned(v))) => {
            fields.insert("v".to_string(), Json::Number((*v).into()));
        }
        Some(SenmlValue::Number(SenmlNumber::Float(v))) => {
            fields.insert("v".to_string(), float(*v)?);
        }
        Some(SenmlValue::String(s)) => {
            fields.insert("vs".to_string(), Json::String(s.clone()));
        }
        Some(SenmlValue::Boolean(b)) => {
            fields.insert("vb".to_string(), Json::Bool(*b));
        }
        Some(SenmlValue::Opaque(bytes)) => {
            fields.insert("vd".to_string(), Json::String(URL_SAFE_NO_PAD.encode(bytes)));
        }
        Some(SenmlValue::ObjectLink(link)) => {
            fields.insert("vlo".to_string(), Json::String(link.clone()));
        }
        None => {}
    }
    Ok(Json::Object(fields))
}

/// Time fields with no fractional part are written as integers.
fn float(value: f64) -> Result<Json, CodecError> {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        return Ok(Json::Number((value as i64).into()));
    }
    Number::from_f64(value)
        .map(Json::Number)
        .ok_or_else(|| CodecError::InvalidFormat(format!("{} is not a valid JSON number", value)))
}

fn record_from_json(index: usize, fields: &Map<String, Json>) -> Result<SenmlRecord, CodecError> {
    let invalid = |field: &str, expected: &str| {
        CodecError::InvalidFormat(format!("record {}: '{}' must be {}", index, field, expected))
    };
    let string = |field: &str| -> Result<Option<String>, CodecError> {
        match fields.get(field) {
            None => Ok(None),
            Some(Json::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(invalid(field, "a string")),
        }
    };
    let number = |field: &str| -> Result<Option<f64>, CodecError> {
        match fields.get(field) {
            None => Ok(None),
            Some(Json::Number(n)) => n.as_f64().map(Some).ok_or_else(|| invalid(field, "a number")),
            Some(_) => Err(invalid(field, "a number")),
        }
    };

    let present: Vec<&str> = VALUE_KEYS
        .iter()
        .copied()
        .filter(|key| fields.contains_key(*key))
        .collect();
    if present.len() > 1 {
        return Err(CodecError::InvalidFormat(format!(
            "record {} carries several values: {}",
            index,
            present.join(", ")
        )));
    }

    let value = match present.first().copied() {
        None => None,
        Some("v") => match fields.get("v") {
            Some(Json::Number(n)) => Some(SenmlValue::Number(json_number(n))),
            _ => return Err(invalid("v", "a number")),
        },
        Some("vb") => match fields.get("vb") {
            Some(Json::Bool(b)) => Some(SenmlValue::Boolean(*b)),
            _ => return Err(invalid("vb", "a boolean")),
        },
        Some("vd") => {
            let encoded = string("vd")?.unwrap_or_default();
            Some(SenmlValue::Opaque(
                decode_base64(&encoded).ok_or_else(|| invalid("vd", "base64 data"))?,
            ))
        }
        Some("vlo") => string("vlo")?.map(SenmlValue::ObjectLink),
        Some(_) => string("vs")?.map(SenmlValue::String),
    };

    Ok(SenmlRecord {
        base_name: string("bn")?,
        base_time: number("bt")?,
        name: string("n")?,
        time: number("t")?,
        value,
    })
}

fn json_number(n: &Number) -> SenmlNumber {
    if let Some(i) = n.as_i64() {
        SenmlNumber::Integer(i)
    } else if let Some(u) = n.as_u64() {
        SenmlNumber::Unsigned(u)
    } else {
        SenmlNumber::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// RFC 8428 mandates base64url without padding; padded and standard
/// alphabets are accepted as well.
fn decode_base64(encoded: &str) -> Option<Vec<u8>> {
    [URL_SAFE_NO_PAD, URL_SAFE, STANDARD, STANDARD_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(encoded).ok())
}
