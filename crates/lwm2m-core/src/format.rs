//! Content formats and response codes shared with the transport layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Payload media types used by LwM2M, identified by their CoAP
/// Content-Format number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentFormat {
    Text,
    Link,
    Opaque,
    Cbor,
    SenmlJson,
    SenmlCbor,
    Tlv,
    Json,
}

impl ContentFormat {
    pub fn code(&self) -> u16 {
        match self {
            ContentFormat::Text => 0,
            ContentFormat::Link => 40,
            ContentFormat::Opaque => 42,
            ContentFormat::Cbor => 60,
            ContentFormat::SenmlJson => 110,
            ContentFormat::SenmlCbor => 112,
            ContentFormat::Tlv => 11542,
            ContentFormat::Json => 11543,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        let format = match code {
            0 => ContentFormat::Text,
            40 => ContentFormat::Link,
            42 => ContentFormat::Opaque,
            60 => ContentFormat::Cbor,
            110 => ContentFormat::SenmlJson,
            112 => ContentFormat::SenmlCbor,
            11542 => ContentFormat::Tlv,
            11543 => ContentFormat::Json,
            _ => return None,
        };
        Some(format)
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            ContentFormat::Text => "text/plain",
            ContentFormat::Link => "application/link-format",
            ContentFormat::Opaque => "application/octet-stream",
            ContentFormat::Cbor => "application/cbor",
            ContentFormat::SenmlJson => "application/senml+json",
            ContentFormat::SenmlCbor => "application/senml+cbor",
            ContentFormat::Tlv => "application/vnd.oma.lwm2m+tlv",
            ContentFormat::Json => "application/vnd.oma.lwm2m+json",
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.media_type(), self.code())
    }
}

/// CoAP response codes used by LwM2M operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    Created,
    Deleted,
    Changed,
    Content,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    UnsupportedContentFormat,
    InternalServerError,
}

impl ResponseCode {
    /// Code as `(class, detail)`.
    pub fn class_detail(&self) -> (u8, u8) {
        match self {
            ResponseCode::Created => (2, 1),
            ResponseCode::Deleted => (2, 2),
            ResponseCode::Changed => (2, 4),
            ResponseCode::Content => (2, 5),
            ResponseCode::BadRequest => (4, 0),
            ResponseCode::Unauthorized => (4, 1),
            ResponseCode::Forbidden => (4, 3),
            ResponseCode::NotFound => (4, 4),
            ResponseCode::MethodNotAllowed => (4, 5),
            ResponseCode::NotAcceptable => (4, 6),
            ResponseCode::UnsupportedContentFormat => (4, 15),
            ResponseCode::InternalServerError => (5, 0),
        }
    }

    pub fn is_success(&self) -> bool {
        self.class_detail().0 == 2
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (class, detail) = self.class_detail();
        write!(f, "{}.{:02}", class, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_format_codes() {
        for format in [
            ContentFormat::Text,
            ContentFormat::Link,
            ContentFormat::Opaque,
            ContentFormat::Cbor,
            ContentFormat::SenmlJson,
            ContentFormat::SenmlCbor,
            ContentFormat::Tlv,
            ContentFormat::Json,
        ] {
            assert_eq!(ContentFormat::from_code(format.code()), Some(format));
        }
        assert_eq!(ContentFormat::from_code(9999), None);
    }

    #[test]
    fn test_response_code_display() {
        assert_eq!(ResponseCode::BadRequest.to_string(), "4.00");
        assert_eq!(ResponseCode::Content.to_string(), "2.05");
        assert_eq!(ResponseCode::UnsupportedContentFormat.to_string(), "4.15");
        assert!(!ResponseCode::BadRequest.is_success());
    }
}
