//! SenML CBOR representation (RFC 8428 §6).
//!
//! Records are CBOR maps keyed by the integer labels of RFC 8428 table 6.
//! `vlo` has no registered label and keeps its text key.

use std::io::Cursor;

use ciborium::value::{Integer, Value as Cbor};

use crate::error::CodecError;

use super::record::{SenmlNumber, SenmlPack, SenmlRecord, SenmlValue};

const BASE_NAME: i64 = -2;
const BASE_TIME: i64 = -3;
const NAME: i64 = 0;
const TIME: i64 = 6;
const VALUE: i64 = 2;
const STRING_VALUE: i64 = 3;
const BOOLEAN_VALUE: i64 = 4;
const DATA_VALUE: i64 = 8;
const OBJECT_LINK_VALUE: &str = "vlo";

/// Decimal fraction, `[exponent, mantissa]`.
const DECIMAL_FRACTION_TAG: u64 = 4;

/// A map key, with the name used in error messages.
#[derive(Clone, Copy)]
enum Label {
    Int(i64, &'static str),
    Text(&'static str),
}

impl Label {
    fn name(&self) -> &'static str {
        match self {
            Label::Int(_, name) => *name,
            Label::Text(name) => *name,
        }
    }

    fn matches(&self, key: &Cbor) -> bool {
        match (self, key) {
            (Label::Int(label, _), Cbor::Integer(key)) => i64::try_from(*key) == Ok(*label),
            (Label::Text(label), Cbor::Text(key)) => key == label,
            _ => false,
        }
    }

    fn key(&self) -> Cbor {
        match self {
            Label::Int(label, _) => Cbor::Integer((*label).into()),
            Label::Text(label) => Cbor::Text((*label).to_string()),
        }
    }
}

const VALUE_LABELS: [Label; 5] = [
    Label::Int(VALUE, "v"),
    Label::Int(STRING_VALUE, "vs"),
    Label::Int(BOOLEAN_VALUE, "vb"),
    Label::Int(DATA_VALUE, "vd"),
    Label::Text(OBJECT_LINK_VALUE),
];

pub fn to_cbor(pack: &SenmlPack) -> Result<Vec<u8>, CodecError> {
    let records = pack.records.iter().map(record_to_cbor).collect();
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&Cbor::Array(records), &mut bytes)
        .map_err(|e| CodecError::InvalidFormat(format!("unable to serialize SenML: {}", e)))?;
    Ok(bytes)
}

pub fn from_cbor(bytes: &[u8]) -> Result<SenmlPack, CodecError> {
    let mut cursor = Cursor::new(bytes);
    let cbor: Cbor = ciborium::de::from_reader(&mut cursor)
        .map_err(|e| CodecError::InvalidFormat(format!("invalid SenML CBOR: {}", e)))?;
    let consumed = cursor.position();
    if consumed != bytes.len() as u64 {
        return Err(CodecError::InvalidFormat(format!(
            "{} trailing bytes after the SenML CBOR array",
            bytes.len() as u64 - consumed
        )));
    }
    let Cbor::Array(items) = cbor else {
        return Err(CodecError::InvalidFormat(
            "SenML CBOR must be an array of records".to_string(),
        ));
    };

    let records = items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Cbor::Map(fields) => record_from_cbor(index, fields),
            _ => Err(CodecError::InvalidFormat(format!("record {} is not a map", index))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SenmlPack::new(records))
}

fn record_to_cbor(record: &SenmlRecord) -> Cbor {
    let mut fields = Vec::new();
    let mut push = |label: Label, value: Cbor| fields.push((label.key(), value));

    if let Some(bn) = &record.base_name {
        push(Label::Int(BASE_NAME, "bn"), Cbor::Text(bn.clone()));
    }
    if let Some(bt) = record.base_time {
        push(Label::Int(BASE_TIME, "bt"), time(bt));
    }
    if let Some(n) = &record.name {
        push(Label::Int(NAME, "n"), Cbor::Text(n.clone()));
    }
    if let Some(t) = record.time {
        push(Label::Int(TIME, "t"), time(t));
    }
    if let Some(value) = &record.value {
        let (label, cbor) = match value {
            SenmlValue::Number(SenmlNumber::Integer(v)) => {
                (VALUE_LABELS[0], Cbor::Integer((*v).into()))
            }
            SenmlValue::Number(SenmlNumber::Unsigned(v)) => {
                (VALUE_LABELS[0], Cbor::Integer((*v).into()))
            }
            SenmlValue::Number(SenmlNumber::Float(v)) => (VALUE_LABELS[0], Cbor::Float(*v)),
            SenmlValue::String(s) => (VALUE_LABELS[1], Cbor::Text(s.clone())),
            SenmlValue::Boolean(b) => (VALUE_LABELS[2], Cbor::Bool(*b)),
            SenmlValue::Opaque(bytes) => (VALUE_LABELS[3], Cbor::Bytes(bytes.clone())),
            SenmlValue::ObjectLink(link) => (VALUE_LABELS[4], Cbor::Text(link.clone())),
        };
        push(label, cbor);
    }
    Cbor::Map(fields)
}

/// Time fields with no fractional part are written as integers.
fn time(value: f64) -> Cbor {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Cbor::Integer((value as i64).into())
    } else {
        Cbor::Float(value)
    }
}

fn record_from_cbor(index: usize, fields: &[(Cbor, Cbor)]) -> Result<SenmlRecord, CodecError> {
    let invalid = |label: Label, expected: &str| {
        CodecError::InvalidFormat(format!(
            "record {}: '{}' must be {}",
            index,
            label.name(),
            expected
        ))
    };
    let get = |label: Label| {
        fields
            .iter()
            .find(|(key, _)| label.matches(key))
            .map(|(_, value)| value)
    };
    let text = |label: Label| -> Result<Option<String>, CodecError> {
        match get(label) {
            None => Ok(None),
            Some(Cbor::Text(s)) => Ok(Some(s.clone())),
            Some(_) => Err(invalid(label, "a text string")),
        }
    };
    let number = |label: Label| -> Result<Option<SenmlNumber>, CodecError> {
        match get(label) {
            None => Ok(None),
            Some(value) => cbor_number(value).map(Some).ok_or_else(|| invalid(label, "a number")),
        }
    };

    let present: Vec<&str> = VALUE_LABELS
        .iter()
        .filter(|label| get(**label).is_some())
        .map(Label::name)
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
        Some("v") => number(VALUE_LABELS[0])?.map(SenmlValue::Number),
        Some("vs") => text(VALUE_LABELS[1])?.map(SenmlValue::String),
        Some("vb") => match get(VALUE_LABELS[2]) {
            Some(Cbor::Bool(b)) => Some(SenmlValue::Boolean(*b)),
            _ => return Err(invalid(VALUE_LABELS[2], "a boolean")),
        },
        Some("vd") => match get(VALUE_LABELS[3]) {
            Some(Cbor::Bytes(bytes)) => Some(SenmlValue::Opaque(bytes.clone())),
            _ => return Err(invalid(VALUE_LABELS[3], "a byte string")),
        },
        Some(_) => text(VALUE_LABELS[4])?.map(SenmlValue::ObjectLink),
    };

    Ok(SenmlRecord {
        base_name: text(Label::Int(BASE_NAME, "bn"))?,
        base_time: number(Label::Int(BASE_TIME, "bt"))?.map(|n| n.as_f64()),
        name: text(Label::Int(NAME, "n"))?,
        time: number(Label::Int(TIME, "t"))?.map(|n| n.as_f64()),
        value,
    })
}

/// Integers keep their precision; decimal fractions become floats.
fn cbor_number(value: &Cbor) -> Option<SenmlNumber> {
    match value {
        Cbor::Integer(i) => integer(*i),
        Cbor::Float(f) => Some(SenmlNumber::Float(*f)),
        Cbor::Tag(DECIMAL_FRACTION_TAG, inner) => match inner.as_ref() {
            Cbor::Array(parts) => match parts.as_slice() {
                [Cbor::Integer(exponent), Cbor::Integer(mantissa)] => {
                    let exponent = i32::try_from(i128::from(*exponent)).ok()?;
                    let mantissa = i128::from(*mantissa) as f64;
                    Some(SenmlNumber::Float(mantissa * 10f64.powi(exponent)))
                }
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn integer(value: Integer) -> Option<SenmlNumber> {
    if let Ok(i) = i64::try_from(value) {
        Some(SenmlNumber::Integer(i))
    } else {
        u64::try_from(value).ok().map(SenmlNumber::Unsigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(fields: Vec<(Cbor, Cbor)>) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&Cbor::Array(vec![Cbor::Map(fields)]), &mut bytes).unwrap();
        bytes
    }

    fn int(v: i64) -> Cbor {
        Cbor::Integer(v.into())
    }

    fn text(s: &str) -> Cbor {
        Cbor::Text(s.to_string())
    }

    #[test]
    fn test_value_fields() {
        let records = vec![
            Cbor::Map(vec![(int(-2), text("/3/0/")), (int(0), text("0")), (int(3), text("ACME"))]),
            Cbor::Map(vec![(int(0), text("9")), (int(2), int(95))]),
            Cbor::Map(vec![(int(0), text("13")), (int(2), Cbor::Float(1.5e9))]),
            Cbor::Map(vec![(int(0), text("22/0")), (text("vlo"), text("3:0"))]),
            Cbor::Map(vec![(int(0), text("99")), (int(4), Cbor::Bool(true))]),
            Cbor::Map(vec![(int(0), text("100")), (int(8), Cbor::Bytes(vec![1, 2, 3]))]),
            Cbor::Map(vec![(int(0), text("5")), (int(2), Cbor::Integer(u64::MAX.into()))]),
        ];
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&Cbor::Array(records), &mut bytes).unwrap();

        let pack = from_cbor(&bytes).unwrap();
        assert_eq!(pack.len(), 7);
        assert_eq!(pack.records[0].base_name.as_deref(), Some("/3/0/"));
        assert_eq!(pack.records[0].value, Some(SenmlValue::String("ACME".into())));
        assert_eq!(
            pack.records[1].value,
            Some(SenmlValue::Number(SenmlNumber::Integer(95)))
        );
        assert_eq!(
            pack.records[2].value,
            Some(SenmlValue::Number(SenmlNumber::Float(1.5e9)))
        );
        assert_eq!(pack.records[3].value, Some(SenmlValue::ObjectLink("3:0".into())));
        assert_eq!(pack.records[4].value, Some(SenmlValue::Boolean(true)));
        assert_eq!(pack.records[5].value, Some(SenmlValue::Opaque(vec![1, 2, 3])));
        assert_eq!(
            pack.records[6].value,
            Some(SenmlValue::Number(SenmlNumber::Unsigned(u64::MAX)))
        );
    }

    #[test]
    fn test_decimal_fraction() {
        // 273.15 as [-2, 27315]
        let fraction = Cbor::Tag(4, Box::new(Cbor::Array(vec![int(-2), int(27315)])));
        let bytes = map(vec![(int(0), text("/3303/0/5700")), (int(2), fraction)]);
        let pack = from_cbor(&bytes).unwrap();
        let Some(SenmlValue::Number(SenmlNumber::Float(v))) = pack.records[0].value else {
            panic!("expected a float");
        };
        assert!((v - 273.15).abs() < 1e-9);
    }

    #[test]
    fn test_rejected_records() {
        // Not an array
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&Cbor::Map(vec![(int(0), text("/3/0/1"))]), &mut bytes).unwrap();
        assert!(from_cbor(&bytes).is_err());

        assert!(from_cbor(&map(vec![(int(0), int(3)), (int(2), int(1))])).is_err());
        assert!(from_cbor(&map(vec![
            (int(0), text("/3/0/1")),
            (int(2), int(1)),
            (int(3), text("x")),
        ]))
        .is_err());
        assert!(from_cbor(&map(vec![(int(0), text("/3/0/1")), (int(2), text("1"))])).is_err());
        assert!(from_cbor(&map(vec![(int(0), text("/3/0/1")), (int(4), int(1))])).is_err());
        assert!(from_cbor(&map(vec![(int(0), text("/3/0/1")), (int(8), text("AQID"))])).is_err());
        assert!(from_cbor(&map(vec![(int(0), text("/3/0/1")), (int(6), text("now"))])).is_err());

        // Truncated, then trailing data
        let whole = map(vec![(int(0), text("/3/0/1")), (int(3), text("x"))]);
        assert!(from_cbor(&whole[..whole.len() - 1]).is_err());
        let mut padded = whole.clone();
        padded.push(0x00);
        assert!(from_cbor(&padded).is_err());
        assert!(from_cbor(&[]).is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let pack = from_cbor(&map(vec![
            (int(0), text("/3/0/1")),
            (int(3), text("x")),
            (int(1), text("Cel")),
            (text("custom"), Cbor::Bool(false)),
        ]))
        .unwrap();
        assert_eq!(pack.records[0].value, Some(SenmlValue::String("x".into())));
    }

    #[test]
    fn test_serialization() {
        let pack = SenmlPack::new(vec![
            SenmlRecord::new()
                .with_base_name("/3/0/")
                .with_base_time(1_700_000_000.0)
                .with_name("0")
                .with_value(SenmlValue::String("ACME".into())),
            SenmlRecord::new()
                .with_name("1")
                .with_time(0.5)
                .with_value(SenmlValue::Opaque(vec![0xFB, 0xFF])),
            SenmlRecord::new()
                .with_name("22/0")
                .with_value(SenmlValue::ObjectLink("4:0".into())),
        ]);
        let bytes = to_cbor(&pack).unwrap();

        // Labels and integral times as written on the wire
        let Cbor::Array(records) = ciborium::de::from_reader::<Cbor, _>(bytes.as_slice()).unwrap()
        else {
            panic!("expected an array");
        };
        let Cbor::Map(first) = &records[0] else {
            panic!("expected a map");
        };
        assert_eq!(first[0], (int(-2), text("/3/0/")));
        assert_eq!(first[1], (int(-3), int(1_700_000_000)));
        assert_eq!(first[3], (int(3), text("ACME")));
        let Cbor::Map(last) = &records[2] else {
            panic!("expected a map");
        };
        assert_eq!(last[1], (text("vlo"), text("4:0")));

        assert_eq!(from_cbor(&bytes).unwrap(), pack);
    }

    #[test]
    fn test_known_encoding() {
        // [{0: "/3/0/9", 2: 95}]
        let bytes = [
            0x81, 0xA2, 0x00, 0x66, b'/', b'3', b'/', b'0', b'/', b'9', 0x02, 0x18, 0x5F,
        ];
        let pack = SenmlPack::new(vec![SenmlRecord::new()
            .with_name("/3/0/9")
            .with_value(SenmlValue::Number(SenmlNumber::Integer(95)))]);
        assert_eq!(from_cbor(&bytes).unwrap(), pack);
        assert_eq!(to_cbor(&pack).unwrap(), bytes);
    }
}
