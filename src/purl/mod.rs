//! Package URL (purl) identifiers
//!
//! A purl names a package independently of the registry it is published in:
//!
//! ```text
//! pkg:type/namespace/name@version?qualifiers#subpath
//! ```
//!
//! The type tag is kept as a raw string here. Whether a type is supported is
//! decided at dispatch time by [`crate::crawl::EcosystemRouter`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const SCHEME: &str = "pkg:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PurlError {
    #[error("missing \"pkg:\" scheme in {0:?}")]
    MissingScheme(String),

    #[error("missing package type in {0:?}")]
    MissingType(String),

    #[error("missing package name in {0:?}")]
    MissingName(String),

    #[error("invalid percent-encoding in {0:?}")]
    InvalidEncoding(String),

    #[error("duplicate qualifier {key:?} in {purl:?}")]
    DuplicateQualifier { purl: String, key: String },
}

/// Immutable structured package identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageUrl {
    ty: String,
    namespace: Option<String>,
    name: String,
    version: Option<String>,
    qualifiers: BTreeMap<String, String>,
    subpath: Option<String>,
}

impl PackageUrl {
    /// Creates a purl from already-decoded components
    pub fn new(ty: &str, namespace: Option<&str>, name: &str) -> Self {
        Self {
            ty: ty.to_ascii_lowercase(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            name: name.to_string(),
            version: None,
            qualifiers: BTreeMap::new(),
            subpath: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_qualifier(mut self, key: &str, value: &str) -> Self {
        self.qualifiers
            .insert(key.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Package type tag (e.g. "golang", "npm", "oci"), lowercased
    pub fn ty(&self) -> &str {
        &self.ty
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn qualifiers(&self) -> &BTreeMap<String, String> {
        &self.qualifiers
    }

    pub fn qualifier(&self, key: &str) -> Option<&str> {
        self.qualifiers.get(key).map(String::as_str)
    }

    pub fn subpath(&self) -> Option<&str> {
        self.subpath.as_deref()
    }

    /// `namespace/name`, or just `name` without a namespace
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

impl FromStr for PackageUrl {
    type Err = PurlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let rest = match input.get(..SCHEME.len()) {
            Some(scheme) if scheme.eq_ignore_ascii_case(SCHEME) => &input[SCHEME.len()..],
            _ => return Err(PurlError::MissingScheme(s.to_string())),
        };
        let rest = rest.trim_start_matches('/');

        let (rest, subpath) = match rest.split_once('#') {
            Some((head, sub)) => (head, Some(sub.trim_matches('/'))),
            None => (rest, None),
        };
        let (rest, raw_qualifiers) = match rest.split_once('?') {
            Some((head, qs)) => (head, Some(qs)),
            None => (rest, None),
        };

        let (ty, path) = rest
            .split_once('/')
            .ok_or_else(|| PurlError::MissingName(s.to_string()))?;
        if ty.is_empty() {
            return Err(PurlError::MissingType(s.to_string()));
        }

        let path = path.trim_matches('/');
        let (path, version) = match path.rfind('@') {
            // An '@' before the last '/' belongs to the namespace (e.g. npm scopes)
            Some(at) if path[at..].find('/').is_none() && at > 0 => {
                (&path[..at], Some(decode(&path[at + 1..], s)?))
            }
            _ => (path, None),
        };

        let mut segments: Vec<String> = path
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(|seg| decode(seg, s))
            .collect::<Result<_, _>>()?;
        let name = segments
            .pop()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PurlError::MissingName(s.to_string()))?;
        let namespace = (!segments.is_empty()).then(|| segments.join("/"));

        let mut qualifiers = BTreeMap::new();
        for pair in raw_qualifiers.unwrap_or_default().split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = decode(value, s)?;
            if value.is_empty() {
                continue;
            }
            let key = key.to_ascii_lowercase();
            if qualifiers.contains_key(&key) {
                return Err(PurlError::DuplicateQualifier {
                    purl: s.to_string(),
                    key,
                });
            }
            qualifiers.insert(key, value);
        }

        let subpath = match subpath.filter(|sub| !sub.is_empty()) {
            Some(sub) => Some(decode(sub, s)?),
            None => None,
        };

        Ok(Self {
            ty: ty.to_ascii_lowercase(),
            namespace,
            name,
            version: version.filter(|v| !v.is_empty()),
            qualifiers,
            subpath,
        })
    }
}

impl fmt::Display for PackageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/", SCHEME, self.ty)?;
        if let Some(ns) = &self.namespace {
            for segment in ns.split('/') {
                write!(f, "{}/", encode(segment, false))?;
            }
        }
        write!(f, "{}", encode(&self.name, false))?;
        if let Some(version) = &self.version {
            write!(f, "@{}", encode(version, false))?;
        }
        let mut separator = '?';
        for (key, value) in &self.qualifiers {
            write!(f, "{}{}={}", separator, key, encode(value, true))?;
            separator = '&';
        }
        if let Some(subpath) = &self.subpath {
            write!(f, "#{}", subpath)?;
        }
        Ok(())
    }
}

impl Serialize for PackageUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn decode(component: &str, purl: &str) -> Result<String, PurlError> {
    let bytes = component.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = component
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| PurlError::InvalidEncoding(purl.to_string()))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| PurlError::InvalidEncoding(purl.to_string()))
}

fn encode(component: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(component.len());
    for b in component.bytes() {
        let c = b as char;
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '~' | ':') {
            out.push(c);
        } else if keep_slash && c == '/' {
            out.push(c);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}
