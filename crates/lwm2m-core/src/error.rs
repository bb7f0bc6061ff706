//! Error types for paths, codecs, links and attributes.

use crate::node::ValueKind;
use crate::path::LwM2mPath;

/// A path string or component list that does not address a valid node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid path: {0}")]
pub struct InvalidPathError(pub String);

/// Encoding or decoding failure in the TLV or SenML codecs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Input ended before a declared field or value was complete
    #[error("Truncated input: {0}")]
    Truncated(String),

    /// Input is structurally invalid
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Two entries resolve to the same identifier or path
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    /// Value kind differs from the kind declared by the object model
    #[error("Type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: LwM2mPath,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// Node shape does not fit the requested path
    #[error("Unsupported node for path {path}: {reason}")]
    Unsupported { path: LwM2mPath, reason: String },

    /// A record or entry carries an unusable path
    #[error(transparent)]
    InvalidPath(#[from] InvalidPathError),
}

impl CodecError {
    pub(crate) fn unsupported(path: &LwM2mPath, reason: impl Into<String>) -> Self {
        CodecError::Unsupported {
            path: *path,
            reason: reason.into(),
        }
    }
}

/// Malformed CoRE Link-Format input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid link format: {0}")]
pub struct LinkParseError(pub String);

/// LwM2M attribute parsing or validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidAttributeError {
    #[error(transparent)]
    Link(#[from] LinkParseError),

    #[error(transparent)]
    Path(#[from] InvalidPathError),

    #[error("Unsupported attribute: {0}")]
    Unsupported(String),

    #[error("Attribute {0} requires a value")]
    MissingValue(String),

    #[error("Attribute {0} does not accept a value")]
    UnexpectedValue(String),

    #[error("Invalid value '{value}' for attribute {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Duplicate attribute: {0}")]
    Duplicate(String),

    #[error("Duplicate link for path {0}")]
    DuplicatePath(LwM2mPath),

    #[error("Attribute {name} can not be assigned to {path}")]
    NotAssignable { name: String, path: LwM2mPath },

    #[error("Inconsistent attributes: {0}")]
    Inconsistent(String),
}

/// Crate-level error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Path(#[from] InvalidPathError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Link(#[from] LinkParseError),

    #[error(transparent)]
    Attribute(#[from] InvalidAttributeError),
}

pub type Result<T> = std::result::Result<T, Error>;
