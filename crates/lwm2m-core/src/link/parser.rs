use crate::error::LinkParseError;

use super::{Link, LinkParam, LinkParamValue};

/// Parse a CoRE Link-Format string.
///
/// Links are separated by `,` and parameters by `;`. Separators inside a
/// quoted string or inside `<...>` do not split. Whitespace around a link
/// is ignored. The empty string yields no link.
pub fn parse_core_links(content: &str) -> Result<Vec<Link>, LinkParseError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    split_outside_quotes(content, ',')?
        .into_iter()
        .map(|raw| parse_link(raw.trim()))
        .collect()
}

fn parse_link(raw: &str) -> Result<Link, LinkParseError> {
    if raw.is_empty() {
        return Err(LinkParseError("empty link".to_string()));
    }

    let mut parts = split_outside_quotes(raw, ';')?.into_iter();
    let uri_part = parts.next().unwrap_or_default();
    let uri_reference = parse_uri_reference(uri_part)?;

    let params = parts
        .map(parse_param)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Link {
        uri_reference,
        params,
    })
}

fn parse_uri_reference(raw: &str) -> Result<String, LinkParseError> {
    let inner = raw
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(|| {
            LinkParseError(format!("uri reference '{}' must be enclosed in <>", raw))
        })?;

    let bytes = inner.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(LinkParseError(format!(
                    "invalid percent-encoding in uri reference '{}'",
                    inner
                )));
            }
            i += 3;
            continue;
        }
        if !is_uri_char(b) {
            return Err(LinkParseError(format!(
                "invalid character '{}' in uri reference '{}'",
                b as char, inner
            )));
        }
        i += 1;
    }
    Ok(inner.to_string())
}

/// unreserved / gen-delims / sub-delims of RFC 3986.
fn is_uri_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-._~:/?#[]@!$&'()*+,;=".contains(&b)
}

fn parse_param(raw: &str) -> Result<LinkParam, LinkParseError> {
    let (name, value) = match raw.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (raw, None),
    };

    if name.is_empty() || !name.bytes().all(is_parmname_char) {
        return Err(LinkParseError(format!("invalid parameter name '{}'", name)));
    }

    let value = match value {
        None => LinkParamValue::None,
        Some(v) if v.starts_with('"') => LinkParamValue::Quoted(parse_quoted_string(v)?),
        Some(v) => {
            if v.is_empty() || !v.bytes().all(is_ptoken_char) {
                return Err(LinkParseError(format!(
                    "invalid value '{}' for parameter '{}'",
                    v, name
                )));
            }
            LinkParamValue::Token(v.to_string())
        }
    };

    Ok(LinkParam::new(name, value))
}

/// RFC 5987 parmname.
fn is_parmname_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b)
}

/// RFC 6690 ptokenchar.
fn is_ptoken_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'()*+-./:<=>?@[]^_`{|}~".contains(&b)
}

fn parse_quoted_string(raw: &str) -> Result<String, LinkParseError> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|_| raw.len() >= 2)
        .ok_or_else(|| LinkParseError(format!("unterminated quoted string {}", raw)))?;

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => value.push(escaped),
                None => {
                    return Err(LinkParseError(format!(
                        "dangling escape in quoted string {}",
                        raw
                    )))
                }
            },
            '"' => {
                return Err(LinkParseError(format!(
                    "unescaped quote inside quoted string {}",
                    raw
                )))
            }
            c if c.is_control() => {
                return Err(LinkParseError(format!(
                    "control character in quoted string {}",
                    raw
                )))
            }
            c => value.push(c),
        }
    }
    Ok(value)
}

/// Split on `separator` outside quoted strings and `<...>`.
fn split_outside_quotes(content: &str, separator: char) -> Result<Vec<&str>, LinkParseError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;

    for (index, c) in content.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' if !in_brackets => in_quotes = !in_quotes,
            '<' if !in_quotes => in_brackets = true,
            '>' if !in_quotes => in_brackets = false,
            c if c == separator && !in_quotes && !in_brackets => {
                parts.push(&content[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err(LinkParseError(format!("unterminated quoted string in '{}'", content)));
    }
    if in_brackets {
        return Err(LinkParseError(format!("unterminated uri reference in '{}'", content)));
    }
    parts.push(&content[start..]);
    Ok(parts)
}
