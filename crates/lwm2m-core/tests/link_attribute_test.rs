//! Link and Attribute Tests
//!
//! CoRE Link-Format payloads as exchanged during registration, discover
//! and write-attributes:
//! - Range checks on attribute values
//! - Assignment level checks
//! - Query parameter parsing and merging

use lwm2m_core::attribute::{AttributeValue, Lwm2mLinkParser};
use lwm2m_core::path::LwM2mPath;
use lwm2m_core::{InvalidAttributeError, LinkParseError};

fn parser() -> Lwm2mLinkParser {
    Lwm2mLinkParser::default()
}

// ============================================================================
// Value ranges
// ============================================================================

#[test]
fn test_short_server_id_range() {
    assert!(matches!(
        parser().parse("</1/0>;ssid=0", "/"),
        Err(InvalidAttributeError::InvalidValue { .. })
    ));

    let links = parser().parse("</1/0>;ssid=1", "/").unwrap();
    assert_eq!(
        links[0].attributes.get("ssid").map(|a| &a.value),
        Some(&AttributeValue::Long(1))
    );

    assert!(parser().parse("</1/0>;ssid=65535", "/").is_err());
}

#[test]
fn test_dimension_range() {
    assert!(parser().parse("</3/0/11>;dim=255", "/").is_ok());
    assert!(matches!(
        parser().parse("</3/0/11>;dim=256", "/"),
        Err(InvalidAttributeError::InvalidValue { .. })
    ));
}

#[test]
fn test_object_version_format() {
    assert!(parser().parse("</3>;ver=1.1", "/").is_ok());
    assert!(parser().parse("</3>;ver=1", "/").is_err());
    assert!(parser().parse("</3>;ver=x.y", "/").is_err());
}

// ============================================================================
// Assignment levels
// ============================================================================

#[test]
fn test_attribute_assigned_to_wrong_level() {
    // dim belongs to resources
    assert!(matches!(
        parser().parse("</3/0>;dim=2", "/"),
        Err(InvalidAttributeError::NotAssignable { .. })
    ));
    // ver belongs to objects
    assert!(matches!(
        parser().parse("</3/0/1>;ver=1.0", "/"),
        Err(InvalidAttributeError::NotAssignable { .. })
    ));
}

#[test]
fn test_valueless_pmin_in_link() {
    assert_eq!(
        parser().parse("</3/0/11>;pmin", "/").unwrap_err(),
        InvalidAttributeError::MissingValue("pmin".to_string())
    );
}

#[test]
fn test_inconsistent_periods() {
    assert!(matches!(
        parser().parse("</3/0/9>;pmin=60;pmax=10", "/"),
        Err(InvalidAttributeError::Inconsistent(_))
    ));
    assert!(matches!(
        parser().parse("</3/0/9>;lt=10;gt=15;st=3", "/"),
        Err(InvalidAttributeError::Inconsistent(_))
    ));
    assert!(parser().parse("</3/0/9>;lt=10;gt=20;st=3", "/").is_ok());
}

// ============================================================================
// Discover and registration payloads
// ============================================================================

#[test]
fn test_discover_attributes_per_path() {
    let by_path = parser()
        .parse_path_attributes("</3>;ver=1.1,</3/0>;pmin=10,</3/0/9>;gt=50;st=1")
        .unwrap();
    assert_eq!(by_path.len(), 3);

    let battery = &by_path[&LwM2mPath::resource(3, 0, 9)];
    assert_eq!(battery.get("gt").map(|a| &a.value), Some(&AttributeValue::Double(50.0)));
    assert_eq!(battery.to_string(), "gt=50&st=1");
}

#[test]
fn test_duplicate_path_fails() {
    assert_eq!(
        parser()
            .parse_path_attributes("</3/0>;pmin=10,</3/0>;pmax=20")
            .unwrap_err(),
        InvalidAttributeError::DuplicatePath(LwM2mPath::object_instance(3, 0))
    );
}

#[test]
fn test_link_outside_root_rejected_on_discover() {
    assert!(matches!(
        parser().parse("</other/1>", "/lwm2m"),
        Err(InvalidAttributeError::Unsupported(_))
    ));
}

#[test]
fn test_registration_links_default_root() {
    let (root, links) = parser()
        .parse_registration_links(r#"</1/0>,</3/0>,</5>;ver=1.0"#)
        .unwrap();
    assert_eq!(root, "/");
    let paths: Vec<_> = links.iter().filter_map(|l| l.path).collect();
    assert_eq!(
        paths,
        vec![
            LwM2mPath::object_instance(1, 0),
            LwM2mPath::object_instance(3, 0),
            LwM2mPath::object(5),
        ]
    );
}

#[test]
fn test_malformed_payload() {
    assert!(matches!(
        parser().parse("</3/0", "/"),
        Err(InvalidAttributeError::Link(LinkParseError(_)))
    ));
}

// ============================================================================
// Write-Attributes query
// ============================================================================

#[test]
fn test_query_merge_unsets_valueless() {
    let existing = parser().parse_query_params("pmin=10&pmax=60&gt=5").unwrap();
    let update = parser().parse_query_params("pmax=120&gt").unwrap();

    let merged = existing.merge(&update);
    assert_eq!(merged.get("pmin").map(|a| &a.value), Some(&AttributeValue::Long(10)));
    assert_eq!(merged.get("pmax").map(|a| &a.value), Some(&AttributeValue::Long(120)));
    assert!(!merged.contains("gt"));
}

#[test]
fn test_query_rejects_read_only_attribute() {
    assert!(parser().parse_query_params("ssid=1").is_ok());
    // valueless only for writable attributes
    assert!(matches!(
        parser().parse_query_params("ssid"),
        Err(InvalidAttributeError::MissingValue(_))
    ));
}

#[test]
fn test_query_duplicate_parameter() {
    assert!(matches!(
        parser().parse_query_params("pmin=1&pmin=2"),
        Err(InvalidAttributeError::Duplicate(_))
    ));
}
