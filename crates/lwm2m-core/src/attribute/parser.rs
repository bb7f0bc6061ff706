use std::collections::BTreeMap;

use tracing::debug;

use crate::config::AttributeParserConfig;
use crate::error::InvalidAttributeError;
use crate::link::{parse_core_links, Link};
use crate::path::LwM2mPath;

use super::{Attribute, AttributeModel, AttributeRegistry, AttributeSet, AttributeValueType};

/// Resource type advertised by the root link of an alternate root path.
const LWM2M_RESOURCE_TYPE: &str = "oma.lwm2m";

/// A parsed link together with its LwM2M interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct Lwm2mLink {
    pub link: Link,
    pub root_path: String,
    /// `None` when the link does not live under the root path
    pub path: Option<LwM2mPath>,
    pub attributes: AttributeSet,
}

/// Parses link-format payloads and Write-Attributes queries into validated
/// attribute sets.
#[derive(Debug, Clone, Default)]
pub struct Lwm2mLinkParser {
    registry: AttributeRegistry,
    config: AttributeParserConfig,
}

enum Context {
    Link,
    Query,
}

impl Lwm2mLinkParser {
    pub fn new(registry: AttributeRegistry, config: AttributeParserConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    /// Parse links that must all address LwM2M nodes under `root_path`
    /// (Discover responses).
    pub fn parse(
        &self,
        content: &str,
        root_path: &str,
    ) -> Result<Vec<Lwm2mLink>, InvalidAttributeError> {
        parse_core_links(content)?
            .into_iter()
            .map(|link| {
                let path = resolve_path(&link.uri_reference, root_path)?.ok_or_else(|| {
                    InvalidAttributeError::Unsupported(format!(
                        "link <{}> is outside root path {}",
                        link.uri_reference, root_path
                    ))
                })?;
                self.to_lwm2m_link(link, root_path, Some(path))
            })
            .collect()
    }

    /// Parse the object links of a Register or Update request.
    ///
    /// The root path is taken from a link with `rt="oma.lwm2m"` (default
    /// `/`). Links outside it are kept with no path and no attribute.
    pub fn parse_registration_links(
        &self,
        content: &str,
    ) -> Result<(String, Vec<Lwm2mLink>), InvalidAttributeError> {
        let links = parse_core_links(content)?;
        let root_path = find_root_path(&links);

        let parsed = links
            .into_iter()
            .map(|link| match resolve_path(&link.uri_reference, &root_path)? {
                Some(path) => self.to_lwm2m_link(link, &root_path, Some(path)),
                None => {
                    let mut attributes = AttributeSet::new();
                    for param in &link.params {
                        attributes.push_other(param.clone());
                    }
                    Ok(Lwm2mLink {
                        link,
                        root_path: root_path.clone(),
                        path: None,
                        attributes,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((root_path, parsed))
    }

    /// Parse a Discover payload into attributes per path. A path present
    /// twice fails the whole parse.
    pub fn parse_path_attributes(
        &self,
        content: &str,
    ) -> Result<BTreeMap<LwM2mPath, AttributeSet>, InvalidAttributeError> {
        let mut by_path = BTreeMap::new();
        for link in self.parse(content, "/")? {
            let Some(path) = link.path else { continue };
            if by_path.insert(path, link.attributes).is_some() {
                return Err(InvalidAttributeError::DuplicatePath(path));
            }
        }
        Ok(by_path)
    }

    /// Parse the query of a Write-Attributes request (`pmin=10&pmax=60&gt`).
    ///
    /// Every parameter must be a known attribute.
    pub fn parse_query_params(&self, query: &str) -> Result<AttributeSet, InvalidAttributeError> {
        let mut attributes = AttributeSet::new();
        if query.is_empty() {
            return Ok(attributes);
        }

        for param in query.split('&') {
            let (name, raw) = match param.split_once('=') {
                Some((name, raw)) => (name, Some(raw)),
                None => (param, None),
            };
            let model = self
                .registry
                .get(name)
                .ok_or_else(|| InvalidAttributeError::Unsupported(name.to_string()))?;
            attributes.insert(self.parse_attribute(model, raw, Context::Query)?)?;
        }

        attributes.validate_consistency()?;
        Ok(attributes)
    }

    fn to_lwm2m_link(
        &self,
        link: Link,
        root_path: &str,
        path: Option<LwM2mPath>,
    ) -> Result<Lwm2mLink, InvalidAttributeError> {
        let mut attributes = AttributeSet::new();
        for param in &link.params {
            match self.registry.get(&param.name) {
                Some(model) => {
                    let attribute =
                        self.parse_attribute(model, param.value.as_str(), Context::Link)?;
                    attributes.insert(attribute)?;
                }
                None => attributes.push_other(param.clone()),
            }
        }

        if let Some(path) = &path {
            attributes.validate_for(path).map_err(|e| {
                debug!(link = %link, error = %e, "Rejected link attributes");
                e
            })?;
        }

        Ok(Lwm2mLink {
            link,
            root_path: root_path.to_string(),
            path,
            attributes,
        })
    }

    fn parse_attribute(
        &self,
        model: &'static AttributeModel,
        raw: Option<&str>,
        context: Context,
    ) -> Result<Attribute, InvalidAttributeError> {
        if raw.is_none() && model.value_type != AttributeValueType::Valueless {
            let allowed = match context {
                Context::Link => &self.config.valueless_in_link,
                Context::Query => &self.config.valueless_in_query,
            };
            if !(allowed.contains(model.name) && model.access.is_writable()) {
                return Err(InvalidAttributeError::MissingValue(model.name.to_string()));
            }
        }
        Attribute::parse(model, raw)
    }
}

/// Root path advertised by a `rt="oma.lwm2m"` link, `/` if none.
pub fn find_root_path(links: &[Link]) -> String {
    links
        .iter()
        .find(|link| {
            link.param_value("rt")
                .map(|rt| rt.split(' ').any(|t| t == LWM2M_RESOURCE_TYPE))
                .unwrap_or(false)
        })
        .map(|link| link.uri_reference.clone())
        .unwrap_or_else(|| "/".to_string())
}

/// Path of `uri` relative to `root_path`, `None` if it is not below it.
pub fn resolve_path(
    uri: &str,
    root_path: &str,
) -> Result<Option<LwM2mPath>, InvalidAttributeError> {
    let root = root_path.trim_end_matches('/');
    let Some(relative) = uri.strip_prefix(root) else {
        return Ok(None);
    };
    if !relative.is_empty() && !relative.starts_with('/') {
        return Ok(None);
    }
    Ok(Some(LwM2mPath::parse(relative)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeValue;

    fn parser() -> Lwm2mLinkParser {
        Lwm2mLinkParser::default()
    }

    #[test]
    fn test_parse_discover_payload() {
        let links = parser()
            .parse("</3/0>;pmin=10;pmax=60,</3/0/1>,</3/0/11>;dim=2", "/")
            .unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].path, Some(LwM2mPath::object_instance(3, 0)));
        assert_eq!(
            links[0].attributes.get("pmin").map(|a| &a.value),
            Some(&AttributeValue::Long(10))
        );
        assert_eq!(
            links[2].attributes.get("dim").map(|a| &a.value),
            Some(&AttributeValue::Long(2))
        );
    }

    #[test]
    fn test_valueless_rejected_in_link() {
        let err = parser().parse("</3/0/11>;pmin", "/").unwrap_err();
        assert_eq!(err, InvalidAttributeError::MissingValue("pmin".to_string()));
    }

    #[test]
    fn test_valueless_allowed_by_config() {
        let parser = Lwm2mLinkParser::new(
            AttributeRegistry::standard(),
            AttributeParserConfig::default().allow_valueless_in_link("pmin"),
        );
        let links = parser.parse("</3/0/11>;pmin", "/").unwrap();
        assert_eq!(
            links[0].attributes.get("pmin").map(|a| &a.value),
            Some(&AttributeValue::None)
        );
    }

    #[test]
    fn test_alternate_root_path() {
        let (root, links) = parser()
            .parse_registration_links(r#"</lwm2m>;rt="oma.lwm2m",</lwm2m/1/0>,</lwm2m/3/0>,</other>"#)
            .unwrap();
        assert_eq!(root, "/lwm2m");
        assert_eq!(links[0].path, Some(LwM2mPath::root()));
        assert_eq!(links[1].path, Some(LwM2mPath::object_instance(1, 0)));
        assert_eq!(links[2].path, Some(LwM2mPath::object_instance(3, 0)));
        assert_eq!(links[3].path, None);
    }

    #[test]
    fn test_unknown_params_pass_through() {
        let links = parser().parse(r#"</3>;ver=1.1;ct=11543"#, "/").unwrap();
        assert_eq!(links[0].attributes.len(), 1);
        assert_eq!(links[0].attributes.others()[0].name, "ct");
    }

    #[test]
    fn test_query_params() {
        let set = parser().parse_query_params("pmin=10&pmax=60&gt").unwrap();
        assert_eq!(set.get("pmax").map(|a| &a.value), Some(&AttributeValue::Long(60)));
        assert_eq!(set.get("gt").map(|a| &a.value), Some(&AttributeValue::None));

        assert!(parser().parse_query_params("cancel").is_ok());
        assert!(parser().parse_query_params("cancel=1").is_err());
        assert!(parser().parse_query_params("dim").is_err());
        assert!(parser().parse_query_params("foo=1").is_err());
        assert!(parser().parse_query_params("pmin=60&pmax=10").is_err());
    }
}
