//! Qualified names, namespace bindings and static namespace resolution.
use crate::error::{Result, XdmError};
use std::fmt;
use std::hash::{Hash, Hasher};

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// An expanded QName. The prefix is carried for serialization only; two names
/// are equal when their namespace URI and local part are equal.
#[derive(Debug, Clone, Default)]
pub struct QName {
    pub prefix: String,
    pub uri: String,
    pub local: String,
}

impl QName {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
            local: local.into(),
        }
    }

    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new("", "", local)
    }

    /// Parses `{uri}local` or a plain local name.
    pub fn from_clark(clark: &str) -> Self {
        match clark.strip_prefix('{').and_then(|rest| rest.split_once('}')) {
            Some((uri, local)) => Self::new("", uri, local),
            None => Self::local(clark),
        }
    }

    pub fn clark_name(&self) -> String {
        if self.uri.is_empty() {
            self.local.clone()
        } else {
            format!("{{{}}}{}", self.uri, self.local)
        }
    }

    /// The lexical form `prefix:local`, or just `local` with no prefix.
    pub fn display_name(&self) -> String {
        if self.prefix.is_empty() {
            self.local.clone()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }

    pub fn has_uri(&self, uri: &str) -> bool {
        self.uri == uri
    }

    pub fn with_prefix(&self, prefix: impl Into<String>) -> Self {
        Self::new(prefix, self.uri.clone(), self.local.clone())
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.uri == other.uri
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A prefix-to-URI binding. An empty prefix denotes the default namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceBinding {
    pub prefix: String,
    pub uri: String,
}

impl NamespaceBinding {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }
}

pub fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}'))
}

/// Splits a lexical QName into `(prefix, local)`, the prefix being empty when
/// absent.
pub fn split_qname(lexical: &str) -> Result<(&str, &str)> {
    let (prefix, local) = match lexical.split_once(':') {
        Some((p, l)) => (p, l),
        None => ("", lexical),
    };
    if (!prefix.is_empty() || lexical.contains(':')) && !is_ncname(prefix) {
        return Err(XdmError::InvalidQName(lexical.to_string()));
    }
    if !is_ncname(local) {
        return Err(XdmError::InvalidQName(lexical.to_string()));
    }
    Ok((prefix, local))
}

/// Resolves prefixes against a set of in-scope namespaces.
pub trait NamespaceResolver {
    /// Returns the URI bound to `prefix`. For the empty prefix, the default
    /// namespace is only consulted when `use_default` is set; otherwise the
    /// result is the empty URI.
    fn uri_for_prefix(&self, prefix: &str, use_default: bool) -> Option<String>;

    /// Every prefix this resolver knows about.
    fn prefixes(&self) -> Vec<String>;
}

/// The static namespace context captured when an instruction was compiled.
/// The `xml` prefix is always bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticNamespaces {
    bindings: Vec<NamespaceBinding>,
}

impl StaticNamespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let binding = NamespaceBinding::new(prefix, uri);
        self.bindings.retain(|b| b.prefix != binding.prefix);
        self.bindings.push(binding);
        self
    }

    pub fn bindings(&self) -> &[NamespaceBinding] {
        &self.bindings
    }
}

impl NamespaceResolver for StaticNamespaces {
    fn uri_for_prefix(&self, prefix: &str, use_default: bool) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE.to_string());
        }
        if prefix.is_empty() && !use_default {
            return Some(String::new());
        }
        self.bindings
            .iter()
            .find(|b| b.prefix == prefix)
            .map(|b| b.uri.clone())
            .or_else(|| prefix.is_empty().then(String::new))
    }

    fn prefixes(&self) -> Vec<String> {
        let mut out: Vec<String> = self.bindings.iter().map(|b| b.prefix.clone()).collect();
        out.push("xml".to_string());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_prefix() {
        let a = QName::new("a", "urn:x", "item");
        let b = QName::new("b", "urn:x", "item");
        assert_eq!(a, b);
        assert_ne!(a, QName::local("item"));
    }

    #[test]
    fn test_clark_round_trip() {
        let q = QName::from_clark("{urn:x}item");
        assert_eq!(q.uri, "urn:x");
        assert_eq!(q.local, "item");
        assert_eq!(q.clark_name(), "{urn:x}item");
        assert_eq!(QName::from_clark("plain").clark_name(), "plain");
    }

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("fo:block").unwrap(), ("fo", "block"));
        assert_eq!(split_qname("block").unwrap(), ("", "block"));
        assert!(split_qname(":block").is_err());
        assert!(split_qname("fo:").is_err());
        assert!(split_qname("1abc").is_err());
        assert!(split_qname("a:b:c").is_err());
    }

    #[test]
    fn test_static_namespaces() {
        let ns = StaticNamespaces::new().bind("p", "urn:p").bind("", "urn:default");
        assert_eq!(ns.uri_for_prefix("p", false).as_deref(), Some("urn:p"));
        assert_eq!(ns.uri_for_prefix("", true).as_deref(), Some("urn:default"));
        assert_eq!(ns.uri_for_prefix("", false).as_deref(), Some(""));
        assert_eq!(ns.uri_for_prefix("xml", false).as_deref(), Some(XML_NAMESPACE));
        assert_eq!(ns.uri_for_prefix("q", false), None);
    }
}
