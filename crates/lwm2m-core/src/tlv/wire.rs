//! TLV entries and their binary framing.
//!
//! ```text
//! +--------+-------------+----------------+-------------------+
//! | header | identifier  | length         | value / children  |
//! | 1 byte | 1-2 bytes   | 0-3 bytes      | length bytes      |
//! +--------+-------------+----------------+-------------------+
//!
//! header: TT I LL VVV
//!   TT  entry type (00 object instance, 01 resource instance,
//!       10 multiple resource, 11 resource with value)
//!   I   identifier is 16 bits wide
//!   LL  length field width (00 inline in VVV, 01 8 bits, 10 16 bits,
//!       11 24 bits)
//! ```

use crate::config::tlv::{MAX_NESTING_DEPTH, MAX_SHORT_IDENTIFIER, MAX_VALUE_LENGTH};
use crate::error::CodecError;
use crate::node::ObjectLink;

const TYPE_MASK: u8 = 0b1100_0000;
const WIDE_ID: u8 = 0b0010_0000;
const LENGTH_TYPE_MASK: u8 = 0b0001_1000;
const INLINE_LENGTH_MASK: u8 = 0b0000_0111;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlvType {
    ObjectInstance,
    ResourceInstance,
    MultipleResource,
    ResourceValue,
}

impl TlvType {
    fn bits(&self) -> u8 {
        match self {
            TlvType::ObjectInstance => 0b0000_0000,
            TlvType::ResourceInstance => 0b0100_0000,
            TlvType::MultipleResource => 0b1000_0000,
            TlvType::ResourceValue => 0b1100_0000,
        }
    }

    fn from_header(header: u8) -> Self {
        match header & TYPE_MASK {
            0b0000_0000 => TlvType::ObjectInstance,
            0b0100_0000 => TlvType::ResourceInstance,
            0b1000_0000 => TlvType::MultipleResource,
            _ => TlvType::ResourceValue,
        }
    }

    /// Whether entries of this type hold nested entries instead of a value.
    pub fn is_container(&self) -> bool {
        matches!(self, TlvType::ObjectInstance | TlvType::MultipleResource)
    }

    /// Whether an entry of type `child` may be nested directly in `self`.
    pub fn may_contain(&self, child: TlvType) -> bool {
        match self {
            TlvType::ObjectInstance => {
                matches!(child, TlvType::MultipleResource | TlvType::ResourceValue)
            }
            TlvType::MultipleResource => child == TlvType::ResourceInstance,
            TlvType::ResourceInstance | TlvType::ResourceValue => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvContent {
    Value(Vec<u8>),
    Children(Vec<Tlv>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tlv_type: TlvType,
    pub identifier: u16,
    pub content: TlvContent,
}

impl Tlv {
    pub fn value(tlv_type: TlvType, identifier: u16, value: Vec<u8>) -> Self {
        Self {
            tlv_type,
            identifier,
            content: TlvContent::Value(value),
        }
    }

    pub fn children(tlv_type: TlvType, identifier: u16, children: Vec<Tlv>) -> Self {
        Self {
            tlv_type,
            identifier,
            content: TlvContent::Children(children),
        }
    }
}

/// Serialize entries in order.
pub fn encode(tlvs: &[Tlv]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    for tlv in tlvs {
        encode_entry(tlv, &mut out)?;
    }
    Ok(out)
}

fn encode_entry(tlv: &Tlv, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let body = match &tlv.content {
        TlvContent::Value(value) => value.clone(),
        TlvContent::Children(children) => encode(children)?,
    };
    let length = body.len();
    if length > MAX_VALUE_LENGTH {
        return Err(CodecError::InvalidFormat(format!(
            "value of {} bytes exceeds the TLV maximum of {}",
            length, MAX_VALUE_LENGTH
        )));
    }

    let mut header = tlv.tlv_type.bits();
    if tlv.identifier > MAX_SHORT_IDENTIFIER {
        header |= WIDE_ID;
    }
    let length_bytes: usize = match length {
        0..=7 => {
            header |= length as u8;
            0
        }
        8..=0xFF => {
            header |= 0b0000_1000;
            1
        }
        0x100..=0xFFFF => {
            header |= 0b0001_0000;
            2
        }
        _ => {
            header |= 0b0001_1000;
            3
        }
    };

    out.push(header);
    if tlv.identifier > MAX_SHORT_IDENTIFIER {
        out.extend_from_slice(&tlv.identifier.to_be_bytes());
    } else {
        out.push(tlv.identifier as u8);
    }
    let length_be = (length as u32).to_be_bytes();
    out.extend_from_slice(&length_be[4 - length_bytes..]);
    out.extend_from_slice(&body);
    Ok(())
}

/// Parse a buffer into entries, strictly left to right.
///
/// Nested entries must follow the object instance, multiple resource,
/// resource instance hierarchy, so nesting never exceeds
/// [`MAX_NESTING_DEPTH`].
pub fn decode(bytes: &[u8]) -> Result<Vec<Tlv>, CodecError> {
    decode_level(bytes, 0, None, 1)
}

fn decode_level(
    bytes: &[u8],
    base: usize,
    parent: Option<TlvType>,
    depth: usize,
) -> Result<Vec<Tlv>, CodecError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(CodecError::InvalidFormat(format!(
            "entries nested deeper than {} levels at offset {}",
            MAX_NESTING_DEPTH, base
        )));
    }
    let mut tlvs = Vec::new();
    let mut cursor = 0;
    while cursor < bytes.len() {
        let (tlv, consumed) = decode_entry(&bytes[cursor..], base + cursor, parent, depth)?;
        tlvs.push(tlv);
        cursor += consumed;
    }
    Ok(tlvs)
}

fn decode_entry(
    bytes: &[u8],
    offset: usize,
    parent: Option<TlvType>,
    depth: usize,
) -> Result<(Tlv, usize), CodecError> {
    let take = |from: usize, count: usize, what: &str| {
        bytes.get(from..from + count).ok_or_else(|| {
            CodecError::Truncated(format!(
                "{} at offset {} needs {} bytes, {} left",
                what,
                offset + from,
                count,
                bytes.len().saturating_sub(from)
            ))
        })
    };

    let header = take(0, 1, "header")?[0];
    let tlv_type = TlvType::from_header(header);
    if let Some(parent) = parent {
        if !parent.may_contain(tlv_type) {
            return Err(CodecError::InvalidFormat(format!(
                "{:?} entry at offset {} can not be nested in {:?}",
                tlv_type, offset, parent
            )));
        }
    }
    let length_type = (header & LENGTH_TYPE_MASK) >> 3;
    if length_type != 0 && header & INLINE_LENGTH_MASK != 0 {
        return Err(CodecError::InvalidFormat(format!(
            "reserved length bits set in header 0x{:02X} at offset {}",
            header, offset
        )));
    }

    let id_width = if header & WIDE_ID != 0 { 2 } else { 1 };
    let identifier = take(1, id_width, "identifier")?
        .iter()
        .fold(0u16, |acc, b| (acc << 8) | u16::from(*b));

    let mut cursor = 1 + id_width;
    let length = if length_type == 0 {
        (header & INLINE_LENGTH_MASK) as usize
    } else {
        let width = length_type as usize;
        let length = take(cursor, width, "length")?
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        cursor += width;
        length
    };

    let body = take(cursor, length, "value")?;
    let content = if tlv_type.is_container() {
        TlvContent::Children(decode_level(body, offset + cursor, Some(tlv_type), depth + 1)?)
    } else {
        TlvContent::Value(body.to_vec())
    };

    Ok((
        Tlv {
            tlv_type,
            identifier,
            content,
        },
        cursor + length,
    ))
}

/// Smallest two's complement big-endian encoding of width 1, 2, 4 or 8.
pub fn encode_integer(value: i64) -> Vec<u8> {
    if let Ok(v) = i8::try_from(value) {
        v.to_be_bytes().to_vec()
    } else if let Ok(v) = i16::try_from(value) {
        v.to_be_bytes().to_vec()
    } else if let Ok(v) = i32::try_from(value) {
        v.to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

pub fn decode_integer(bytes: &[u8]) -> Result<i64, CodecError> {
    match bytes.len() {
        1 => Ok(i8::from_be_bytes([bytes[0]]) as i64),
        2 => Ok(i16::from_be_bytes([bytes[0], bytes[1]]) as i64),
        4 => Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64),
        8 => Ok(i64::from_be_bytes(fixed(bytes)?)),
        n => Err(CodecError::InvalidFormat(format!(
            "integer must be 1, 2, 4 or 8 bytes, got {}",
            n
        ))),
    }
}

/// Smallest big-endian encoding of width 1, 2, 4 or 8.
pub fn encode_unsigned(value: u64) -> Vec<u8> {
    if let Ok(v) = u8::try_from(value) {
        vec![v]
    } else if let Ok(v) = u16::try_from(value) {
        v.to_be_bytes().to_vec()
    } else if let Ok(v) = u32::try_from(value) {
        v.to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

pub fn decode_unsigned(bytes: &[u8]) -> Result<u64, CodecError> {
    match bytes.len() {
        1 | 2 | 4 | 8 => Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)),
        n => Err(CodecError::InvalidFormat(format!(
            "unsigned integer must be 1, 2, 4 or 8 bytes, got {}",
            n
        ))),
    }
}

/// 4 bytes when the value survives a round trip through `f32`, else 8.
pub fn encode_float(value: f64) -> Vec<u8> {
    let narrow = value as f32;
    if value.is_nan() || narrow as f64 == value {
        narrow.to_be_bytes().to_vec()
    } else {
        value.to_be_bytes().to_vec()
    }
}

pub fn decode_float(bytes: &[u8]) -> Result<f64, CodecError> {
    match bytes.len() {
        4 => Ok(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64),
        8 => Ok(f64::from_be_bytes(fixed(bytes)?)),
        n => Err(CodecError::InvalidFormat(format!(
            "float must be 4 or 8 bytes, got {}",
            n
        ))),
    }
}

pub fn encode_boolean(value: bool) -> Vec<u8> {
    vec![u8::from(value)]
}

pub fn decode_boolean(bytes: &[u8]) -> Result<bool, CodecError> {
    match bytes {
        [0] => Ok(false),
        [1] => Ok(true),
        _ => Err(CodecError::InvalidFormat(format!(
            "boolean must be a single 0 or 1 byte, got {:02X?}",
            bytes
        ))),
    }
}

pub fn encode_object_link(link: &ObjectLink) -> Vec<u8> {
    let mut out = link.object_id.to_be_bytes().to_vec();
    out.extend_from_slice(&link.object_instance_id.to_be_bytes());
    out
}

pub fn decode_object_link(bytes: &[u8]) -> Result<ObjectLink, CodecError> {
    match bytes {
        [a, b, c, d] => Ok(ObjectLink::new(
            u16::from_be_bytes([*a, *b]),
            u16::from_be_bytes([*c, *d]),
        )),
        _ => Err(CodecError::InvalidFormat(format!(
            "object link must be 4 bytes, got {}",
            bytes.len()
        ))),
    }
}

pub fn decode_string(bytes: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| CodecError::InvalidFormat(format!("string is not valid UTF-8: {}", e)))
}

fn fixed(bytes: &[u8]) -> Result<[u8; 8], CodecError> {
    bytes
        .try_into()
        .map_err(|_| CodecError::InvalidFormat(format!("expected 8 bytes, got {}", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_length_header() {
        let bytes = encode(&[Tlv::value(TlvType::ResourceValue, 1, b"hello".to_vec())]).unwrap();
        assert_eq!(bytes, vec![0xC5, 0x01, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_wide_identifier_and_length() {
        let value = vec![0xAB; 300];
        let bytes = encode(&[Tlv::value(TlvType::ResourceValue, 5700, value.clone())]).unwrap();
        // 11 1 10 000: resource, 16-bit id, 16-bit length
        assert_eq!(bytes[0], 0xF0);
        assert_eq!(&bytes[1..3], &5700u16.to_be_bytes());
        assert_eq!(&bytes[3..5], &300u16.to_be_bytes());
        assert_eq!(decode(&bytes).unwrap(), vec![Tlv::value(TlvType::ResourceValue, 5700, value)]);
    }

    #[test]
    fn test_nested_entries() {
        let tlv = Tlv::children(
            TlvType::MultipleResource,
            11,
            vec![
                Tlv::value(TlvType::ResourceInstance, 0, vec![1]),
                Tlv::value(TlvType::ResourceInstance, 1, vec![5]),
            ],
        );
        let bytes = encode(std::slice::from_ref(&tlv)).unwrap();
        assert_eq!(bytes, vec![0x86, 0x0B, 0x41, 0x00, 0x01, 0x41, 0x01, 0x05]);
        assert_eq!(decode(&bytes).unwrap(), vec![tlv]);
    }

    #[test]
    fn test_three_levels_accepted() {
        let tlv = Tlv::children(
            TlvType::ObjectInstance,
            0,
            vec![Tlv::children(
                TlvType::MultipleResource,
                7,
                vec![Tlv::value(TlvType::ResourceInstance, 0, vec![1])],
            )],
        );
        let bytes = encode(std::slice::from_ref(&tlv)).unwrap();
        assert_eq!(decode(&bytes).unwrap(), vec![tlv]);
    }

    #[test]
    fn test_illegal_nesting_rejected() {
        // object instance inside an object instance
        assert!(matches!(
            decode(&[0x03, 0x00, 0x01, 0x00, 0x00]),
            Err(CodecError::InvalidFormat(_))
        ));
        // resource instance directly inside an object instance
        assert!(matches!(
            decode(&[0x03, 0x00, 0x41, 0x00, 0x01]),
            Err(CodecError::InvalidFormat(_))
        ));
        // resource value inside a multiple resource
        assert!(matches!(
            decode(&[0x83, 0x0B, 0xC1, 0x00, 0x01]),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_deep_nesting_fails_without_recursing() {
        // 200k nested object instance headers with 24-bit lengths
        let levels = 200_000;
        let mut bytes = Vec::with_capacity(levels * 5);
        for level in 0..levels {
            let remaining = ((levels - level - 1) * 5) as u32;
            bytes.extend_from_slice(&[0x18, 0x00]);
            bytes.extend_from_slice(&remaining.to_be_bytes()[1..]);
        }
        assert!(matches!(decode(&bytes), Err(CodecError::InvalidFormat(_))));
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(decode(&[0xC5, 0x01, b'h']), Err(CodecError::Truncated(_))));
        assert!(matches!(decode(&[0xE8]), Err(CodecError::Truncated(_))));
        assert!(matches!(decode(&[0xC8, 0x01]), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_child_overruns_parent() {
        // multiple resource of length 3 whose child declares 2 value bytes
        let bytes = [0x83, 0x0B, 0x42, 0x00, 0x01, 0x02];
        assert!(matches!(decode(&bytes), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_reserved_bits() {
        assert!(matches!(
            decode(&[0xC9, 0x01, 0x01, 0x00]),
            Err(CodecError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(encode_integer(0).len(), 1);
        assert_eq!(encode_integer(-128).len(), 1);
        assert_eq!(encode_integer(128).len(), 2);
        assert_eq!(encode_integer(1234), vec![0x04, 0xD2]);
        assert_eq!(encode_integer(1245823).len(), 4);
        assert_eq!(encode_integer(i64::MIN).len(), 8);
        for v in [0, -1, 127, -129, 1245823, i64::MAX, i64::MIN] {
            assert_eq!(decode_integer(&encode_integer(v)).unwrap(), v);
        }
        assert!(decode_integer(&[0, 0, 0]).is_err());
    }

    #[test]
    fn test_unsigned_and_float() {
        assert_eq!(encode_unsigned(255), vec![0xFF]);
        assert_eq!(decode_unsigned(&encode_unsigned(u64::MAX)).unwrap(), u64::MAX);
        assert_eq!(encode_float(1.5).len(), 4);
        assert_eq!(encode_float(0.1).len(), 8);
        assert_eq!(decode_float(&encode_float(0.1)).unwrap(), 0.1);
    }

    #[test]
    fn test_boolean_strictness() {
        assert!(decode_boolean(&[1]).unwrap());
        assert!(decode_boolean(&[2]).is_err());
        assert!(decode_boolean(&[0, 1]).is_err());
    }

    #[test]
    fn test_object_link() {
        let link = ObjectLink::new(3, 0);
        assert_eq!(encode_object_link(&link), vec![0, 3, 0, 0]);
        assert_eq!(decode_object_link(&[0, 3, 0, 0]).unwrap(), link);
    }
}
