//! Codec and parser configuration.
//!
//! Constants live in small modules grouped by concern. Behavior that
//! deployments may want to tune is carried by config structs with a
//! `Default` implementation.

use std::collections::BTreeSet;

/// TLV format limits.
pub mod tlv {
    /// Largest value length expressible with the 24-bit length field.
    pub const MAX_VALUE_LENGTH: usize = (1 << 24) - 1;
    /// Identifiers above this value need the 16-bit identifier field.
    pub const MAX_SHORT_IDENTIFIER: u16 = 255;
    /// Deepest legal nesting: object instance, multiple resource, resource
    /// instance.
    pub const MAX_NESTING_DEPTH: usize = 3;
}

/// SenML constants.
pub mod senml {
    /// Resolved times below 2^28 are relative to "now" (RFC 8428 §4.5.3).
    pub const RELATIVE_TIME_THRESHOLD: f64 = (1u64 << 28) as f64;
}

/// Attribute names.
pub mod attributes {
    pub const PMIN: &str = "pmin";
    pub const PMAX: &str = "pmax";
    pub const GT: &str = "gt";
    pub const LT: &str = "lt";
    pub const ST: &str = "st";
    pub const EPMIN: &str = "epmin";
    pub const EPMAX: &str = "epmax";
    pub const DIM: &str = "dim";
    pub const SSID: &str = "ssid";
    pub const URI: &str = "uri";
    pub const VER: &str = "ver";
    pub const LWM2M: &str = "lwm2m";
    pub const EDGE: &str = "edge";
    pub const CON: &str = "con";
    pub const HQMAX: &str = "hqmax";
    pub const CANCEL: &str = "cancel";

    /// Writable attributes, which may be sent without a value to unset them.
    pub const WRITABLE: &[&str] = &[PMIN, PMAX, GT, LT, ST, EPMIN, EPMAX, EDGE, CON, HQMAX];
}

/// Which attributes may appear without a value, per parsing context.
///
/// A name listed here is accepted valueless only if its attribute model is
/// also writable. Attributes whose type is valueless (`cancel`) are always
/// accepted without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeParserConfig {
    /// Allowed set for CoRE Link-Format payloads (discover, register)
    pub valueless_in_link: BTreeSet<String>,
    /// Allowed set for query parameters (write-attributes)
    pub valueless_in_query: BTreeSet<String>,
}

impl Default for AttributeParserConfig {
    fn default() -> Self {
        Self {
            valueless_in_link: BTreeSet::new(),
            valueless_in_query: attributes::WRITABLE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AttributeParserConfig {
    /// Allow `name` without a value in link-format payloads too.
    pub fn allow_valueless_in_link(mut self, name: impl Into<String>) -> Self {
        self.valueless_in_link.insert(name.into());
        self
    }

    pub fn deny_valueless_in_query(mut self, name: &str) -> Self {
        self.valueless_in_query.remove(name);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valueless_sets() {
        let config = AttributeParserConfig::default();
        assert!(config.valueless_in_link.is_empty());
        assert!(config.valueless_in_query.contains("pmin"));
        assert!(!config.valueless_in_query.contains("dim"));
    }

    #[test]
    fn test_builders() {
        let config = AttributeParserConfig::default()
            .allow_valueless_in_link("pmin")
            .deny_valueless_in_query("gt");
        assert!(config.valueless_in_link.contains("pmin"));
        assert!(!config.valueless_in_query.contains("gt"));
    }
}
