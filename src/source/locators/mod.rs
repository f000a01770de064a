//! Locator implementations for module registries, package indexes and artifact repositories

pub mod go;
pub mod maven;
pub mod npm;
pub mod pypi;

pub use go::GoLocator;
pub use maven::MavenLocator;
pub use npm::NpmLocator;
pub use pypi::PypiLocator;

use tracing::warn;

use crate::source::locator::LocateError;
use crate::source::{SourceUrl, normalize};

/// Hosts whose repositories are addressed as `host/owner/repo`
const KNOWN_FORGES: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

pub(crate) fn is_known_forge(host: &str) -> bool {
    KNOWN_FORGES.contains(&host)
}

/// Returns the first candidate that normalizes to a repository on a known forge
pub(crate) fn first_forge_source<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<SourceUrl> {
    candidates
        .into_iter()
        .filter_map(|candidate| normalize(candidate).ok())
        .find(|source| is_known_forge(source.host()))
}

/// Sends a GET request and maps registry status codes to [`LocateError`]
pub(crate) async fn get_checked(
    client: &reqwest::Client,
    url: &str,
    package_name: &str,
) -> Result<reqwest::Response, LocateError> {
    let response = client.get(url).send().await?;

    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        return Err(LocateError::NotFound(package_name.to_string()));
    }

    if !status.is_success() {
        warn!("Registry returned status {}: {}", status, url);
        return Err(LocateError::InvalidResponse(format!(
            "Unexpected status: {}",
            status
        )));
    }

    Ok(response)
}
