//! Image reference parsing

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Registry used when a reference names no registry
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

const DEFAULT_TAG: &str = "latest";

static COMPONENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("valid component regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid tag regex")
});
static DIGEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[+._-][a-z0-9]+)*:[a-fA-F0-9]{32,}$").expect("valid digest regex")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("empty image reference")]
    Empty,

    #[error("invalid registry {0:?}")]
    InvalidRegistry(String),

    #[error("invalid repository {0:?}: components must be lowercase alphanumerics")]
    InvalidRepository(String),

    #[error("invalid tag {0:?}")]
    InvalidTag(String),

    #[error("invalid digest {0:?}")]
    InvalidDigest(String),
}

/// Points at either a tag or a digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Tag(String),
    Digest(String),
}

/// Structurally valid image coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    registry: String,
    repository: String,
    locator: Locator,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (name, locator) = match reference.split_once('@') {
            Some((name, digest)) => {
                if !DIGEST_RE.is_match(digest) {
                    return Err(ReferenceError::InvalidDigest(digest.to_string()));
                }
                (name, Locator::Digest(digest.to_string()))
            }
            None => match reference.rsplit_once(':') {
                Some((name, tag)) if !tag.contains('/') => {
                    if !TAG_RE.is_match(tag) {
                        return Err(ReferenceError::InvalidTag(tag.to_string()));
                    }
                    (name, Locator::Tag(tag.to_string()))
                }
                _ => (reference, Locator::Tag(DEFAULT_TAG.to_string())),
            },
        };

        let (registry, repository) = split_registry(name);
        let registry = match registry {
            "docker.io" => DEFAULT_REGISTRY,
            other => other,
        };
        if registry.is_empty()
            || !registry
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
        {
            return Err(ReferenceError::InvalidRegistry(registry.to_string()));
        }

        if repository.is_empty() || !repository.split('/').all(|c| COMPONENT_RE.is_match(c)) {
            return Err(ReferenceError::InvalidRepository(repository.to_string()));
        }
        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository.to_string()
        };

        Ok(Self {
            registry: registry.to_string(),
            repository,
            locator,
        })
    }

    /// Registry host, possibly with a port (e.g. "ghcr.io", "localhost:5000")
    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Tag or digest, as used in `/v2/<repository>/manifests/<identifier>`
    pub fn identifier(&self) -> &str {
        match &self.locator {
            Locator::Tag(tag) => tag,
            Locator::Digest(digest) => digest,
        }
    }
}

/// The first component is a registry if it looks like a host
fn split_registry(name: &str) -> (&str, &str) {
    match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first, rest)
        }
        _ => (DEFAULT_REGISTRY, name),
    }
}

impl FromStr for ImageReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locator {
            Locator::Tag(tag) => write!(f, "{}/{}:{}", self.registry, self.repository, tag),
            Locator::Digest(digest) => {
                write!(f, "{}/{}@{}", self.registry, self.repository, digest)
            }
        }
    }
}
