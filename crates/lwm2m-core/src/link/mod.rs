//! CoRE Link-Format (RFC 6690) links.
//!
//! ```text
//! </3/0>;ver=1.1, </1/0>;ssid=1;uri="coap://example.org"
//! ```

mod parser;

use std::fmt;

pub use parser::parse_core_links;

/// Value of a link parameter as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkParamValue {
    /// `;name`
    None,
    /// `;name=token`
    Token(String),
    /// `;name="quoted"`, stored unescaped
    Quoted(String),
}

impl LinkParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LinkParamValue::None => None,
            LinkParamValue::Token(v) | LinkParamValue::Quoted(v) => Some(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkParam {
    pub name: String,
    pub value: LinkParamValue,
}

impl LinkParam {
    pub fn new(name: impl Into<String>, value: LinkParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn valueless(name: impl Into<String>) -> Self {
        Self::new(name, LinkParamValue::None)
    }

    pub fn token(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, LinkParamValue::Token(value.into()))
    }

    pub fn quoted(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, LinkParamValue::Quoted(value.into()))
    }
}

impl fmt::Display for LinkParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            LinkParamValue::None => write!(f, "{}", self.name),
            LinkParamValue::Token(v) => write!(f, "{}={}", self.name, v),
            LinkParamValue::Quoted(v) => {
                write!(f, "{}=\"", self.name)?;
                for c in v.chars() {
                    if c == '"' || c == '\\' {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, "\"")
            }
        }
    }
}

/// One link: a URI reference and its parameters in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub uri_reference: String,
    pub params: Vec<LinkParam>,
}

impl Link {
    pub fn new(uri_reference: impl Into<String>) -> Self {
        Self {
            uri_reference: uri_reference.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: LinkParam) -> Self {
        self.params.push(param);
        self
    }

    /// First parameter named `name`.
    pub fn param(&self, name: &str) -> Option<&LinkParam> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    /// Value of the first parameter named `name`.
    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(|p| p.value.as_str())
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.uri_reference)?;
        for param in &self.params {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}

/// Serialize links as a comma separated link-format string.
pub fn serialize_links(links: &[Link]) -> String {
    links
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_links() {
        let links = vec![
            Link::new("/3/0").with_param(LinkParam::token("ver", "1.1")),
            Link::new("/1/0")
                .with_param(LinkParam::token("ssid", "1"))
                .with_param(LinkParam::quoted("uri", "coap://a \"b\""))
                .with_param(LinkParam::valueless("obs")),
        ];
        assert_eq!(
            serialize_links(&links),
            r#"</3/0>;ver=1.1,</1/0>;ssid=1;uri="coap://a \"b\"";obs"#
        );
    }

    #[test]
    fn test_param_lookup() {
        let link = Link::new("/").with_param(LinkParam::quoted("rt", "oma.lwm2m"));
        assert_eq!(link.param_value("rt"), Some("oma.lwm2m"));
        assert!(!link.has_param("ct"));
    }
}
