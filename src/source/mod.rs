//! Source repository references
//!
//! Source locations arrive in many shapes: scp-style git remotes, `.git`
//! suffixed HTTPS URLs, npm's `git+https://` form, or links to a page inside
//! the repository. [`normalize`] folds all of them into one [`SourceUrl`] so
//! they can be compared and cloned.
//!
//! # Modules
//!
//! - [`locator`]: Trait for discovering a package's source from registry metadata
//! - [`locators`]: Per-ecosystem locator implementations

pub mod locator;
pub mod locators;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid source reference: {0:?}")]
    InvalidSourceReference(String),
}

/// Path segments that point inside a repository rather than naming it
const NON_IDENTITY_SEGMENTS: &[&str] = &[
    "tree", "blob", "-", "commit", "commits", "releases", "issues", "pulls", "wiki",
];

/// Canonical source repository reference (`host/path`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceUrl {
    host: String,
    path: String,
}

impl SourceUrl {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Repository path without leading or trailing slashes
    pub fn path(&self) -> &str {
        &self.path
    }

    /// HTTPS URL suitable for `git clone`
    pub fn clone_url(&self) -> String {
        format!("https://{}/{}", self.host, self.path)
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.path)
    }
}

impl FromStr for SourceUrl {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

/// Normalizes a source reference into its canonical `host/path` form
pub fn normalize(raw: &str) -> Result<SourceUrl, NormalizeError> {
    let invalid = || NormalizeError::InvalidSourceReference(raw.to_string());

    let input = raw.trim();
    let input = input.strip_prefix("git+").unwrap_or(input);
    let input = input.split(['#', '?']).next().unwrap_or_default();
    if input.is_empty() {
        return Err(invalid());
    }

    let (host, path) = if let Some((scheme, rest)) = input.split_once("://") {
        if !matches!(
            scheme.to_ascii_lowercase().as_str(),
            "https" | "http" | "git" | "ssh"
        ) {
            return Err(invalid());
        }
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host)| host);
        (host, path)
    } else if let Some((host, path)) = split_scp_like(input) {
        (host, path)
    } else {
        input.split_once('/').unwrap_or((input, ""))
    };

    let host = host.to_ascii_lowercase();
    if host.is_empty()
        || !host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'))
        || host.split(':').any(|part| !is_plain_segment(part))
    {
        return Err(invalid());
    }

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if !segments.iter().all(|s| is_plain_segment(s)) {
        return Err(invalid());
    }
    // Cutting and `.git` stripping feed each other; repeat until neither applies
    loop {
        if let Some(cut) = segments
            .iter()
            .skip(2)
            .position(|s| NON_IDENTITY_SEGMENTS.contains(s))
        {
            segments.truncate(cut + 2);
        }
        let Some(last) = segments.last_mut() else {
            break;
        };
        let current: &str = last;
        match current.strip_suffix(".git") {
            Some("") => {
                segments.pop();
            }
            Some(stripped) => *last = stripped,
            None => break,
        }
    }

    let path = segments.join("/");
    if path.is_empty() || path.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    Ok(SourceUrl { host, path })
}

/// A segment usable as a directory name under the mirror root
fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\')
}

/// Splits `[user@]host:path` remotes, leaving `host:port/path` alone
fn split_scp_like(input: &str) -> Option<(&str, &str)> {
    let (authority, path) = input.split_once(':')?;
    if authority.contains('/') {
        return None;
    }
    let port_digits = path.chars().take_while(char::is_ascii_digit).count();
    if port_digits > 0 && path[port_digits..].starts_with('/') {
        return None;
    }
    let host = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);
    Some((host, path))
}
