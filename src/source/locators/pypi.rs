//! PyPI source locator

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::purl::PackageUrl;
use crate::source::SourceUrl;
use crate::source::locator::{LocateError, SourceLocator};
use crate::source::locators::{first_forge_source, get_checked};

pub const DEFAULT_PYPI_REGISTRY: &str = "https://pypi.org";

/// `project_urls` labels checked for a repository link, in priority order
const SOURCE_LABELS: &[&str] = &["source", "source code", "repository", "code", "homepage"];

/// PyPI locator
pub struct PypiLocator {
    client: Client,
    base_url: String,
}

impl PypiLocator {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// PyPI JSON API response structure
#[derive(Debug, Deserialize)]
struct PypiResponse {
    info: PypiInfo,
}

#[derive(Debug, Deserialize)]
struct PypiInfo {
    #[serde(default)]
    project_urls: Option<HashMap<String, String>>,
    #[serde(default)]
    home_page: Option<String>,
}

impl PypiInfo {
    /// Candidate repository links ordered by label priority
    fn candidates(&self) -> Vec<&str> {
        let mut candidates = Vec::new();
        if let Some(urls) = &self.project_urls {
            for label in SOURCE_LABELS {
                candidates.extend(
                    urls.iter()
                        .filter(|(key, _)| key.to_lowercase() == *label)
                        .map(|(_, url)| url.as_str()),
                );
            }
        }
        if let Some(home_page) = &self.home_page {
            candidates.push(home_page);
        }
        candidates
    }
}

#[async_trait]
impl SourceLocator for PypiLocator {
    async fn locate(&self, purl: &PackageUrl) -> Result<SourceUrl, LocateError> {
        let package_name = purl.name();
        let url = format!("{}/pypi/{}/json", self.base_url, package_name);
        debug!("Fetching PyPI package: {}", url);

        let pypi_response: PypiResponse = get_checked(&self.client, &url, package_name)
            .await?
            .json()
            .await
            .map_err(|e| LocateError::InvalidResponse(e.to_string()))?;

        first_forge_source(pypi_response.info.candidates())
            .ok_or_else(|| LocateError::NoSource(package_name.to_string()))
    }
}
