//! Hub configuration: the package list and the mirror root

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::purl::PackageUrl;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to read hub config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse hub config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A package to crawl
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageEntry {
    pub purl: PackageUrl,
    /// Pre-known source repository, overriding any discovery
    #[serde(default, deserialize_with = "empty_as_none")]
    pub url: Option<String>,
}

impl PackageEntry {
    pub fn new(purl: PackageUrl) -> Self {
        Self { purl, url: None }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = (!url.is_empty()).then(|| url.to_string());
        self
    }

    /// Returns the source override, ignoring empty strings
    pub fn source_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.is_empty())
    }
}

/// Ordered package list plus the mirror root directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Hub {
    pub root: PathBuf,
    #[serde(default)]
    pub packages: Vec<PackageEntry>,
}

impl Hub {
    pub fn new(root: impl Into<PathBuf>, packages: Vec<PackageEntry>) -> Self {
        Self {
            root: root.into(),
            packages,
        }
    }

    /// Loads a hub from a JSON file
    ///
    /// A relative `root` is resolved against the config file's directory.
    pub fn load(path: &Path) -> Result<Self, HubError> {
        let content = std::fs::read_to_string(path).map_err(|source| HubError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut hub: Hub = serde_json::from_str(&content).map_err(|source| HubError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if hub.root.is_relative()
            && let Some(parent) = path.parent()
        {
            hub.root = parent.join(&hub.root);
        }

        Ok(hub)
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}
