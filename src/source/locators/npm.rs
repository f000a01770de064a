//! npm registry source locator

use serde::Deserialize;
use tracing::warn;

use crate::purl::PackageUrl;
use crate::source::locator::{LocateError, SourceLocator};
use crate::source::locators::get_checked;
use crate::source::{SourceUrl, normalize};

/// Default base URL for npm registry
pub const DEFAULT_BASE_URL: &str = "https://registry.npmjs.org";

/// Packument fields needed to find the repository
#[derive(Debug, Deserialize)]
struct NpmPackageResponse {
    repository: Option<Repository>,
}

/// `repository` is either a shorthand string or an object with a `url`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Repository {
    Url(String),
    Object { url: Option<String> },
}

impl Repository {
    fn url(&self) -> Option<&str> {
        match self {
            Repository::Url(url) => Some(url),
            Repository::Object { url } => url.as_deref(),
        }
    }
}

/// Locator for packages published to an npm registry
pub struct NpmLocator {
    client: reqwest::Client,
    base_url: String,
}

impl NpmLocator {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Encode package name for URL (handles scoped packages)
    fn encode_package_name(package_name: &str) -> String {
        if package_name.starts_with('@') {
            // Scoped package: @scope/name -> @scope%2Fname
            package_name.replace('/', "%2F")
        } else {
            package_name.to_string()
        }
    }
}

#[async_trait::async_trait]
impl SourceLocator for NpmLocator {
    async fn locate(&self, purl: &PackageUrl) -> Result<SourceUrl, LocateError> {
        let package_name = purl.full_name();
        let url = format!(
            "{}/{}",
            self.base_url,
            Self::encode_package_name(&package_name)
        );

        let package_info: NpmPackageResponse = get_checked(&self.client, &url, &package_name)
            .await?
            .json()
            .await
            .map_err(|e| {
                warn!("Failed to parse npm registry response: {}", e);
                LocateError::InvalidResponse(e.to_string())
            })?;

        let repo_url = package_info
            .repository
            .as_ref()
            .and_then(Repository::url)
            .ok_or_else(|| LocateError::NoSource(package_name.clone()))?;

        normalize(expand_shorthand(repo_url).as_ref())
            .map_err(|e| LocateError::InvalidResponse(e.to_string()))
    }
}

/// Expands npm's `github:user/repo`, `gitlab:` and `bitbucket:` shorthands
fn expand_shorthand(repo_url: &str) -> std::borrow::Cow<'_, str> {
    for (prefix, host) in [
        ("github:", "github.com"),
        ("gitlab:", "gitlab.com"),
        ("bitbucket:", "bitbucket.org"),
    ] {
        if let Some(path) = repo_url.strip_prefix(prefix) {
            return format!("{}/{}", host, path).into();
        }
    }
    // Bare `user/repo` refers to GitHub
    if !repo_url.contains(':') && repo_url.matches('/').count() == 1 && !repo_url.contains('.') {
        return format!("github.com/{}", repo_url).into();
    }
    repo_url.into()
}
