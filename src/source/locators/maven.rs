//! Maven repository source locator

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::purl::PackageUrl;
use crate::source::locator::{LocateError, SourceLocator};
use crate::source::locators::{first_forge_source, get_checked};
use crate::source::SourceUrl;

pub const DEFAULT_BASE_URL: &str = "https://repo1.maven.org/maven2";

/// Locator reading the `<scm>` section of a published POM
pub struct MavenLocator {
    client: reqwest::Client,
    base_url: String,
}

impl MavenLocator {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn pom_url(&self, group_id: &str, artifact_id: &str, version: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}-{}.pom",
            self.base_url,
            group_id.replace('.', "/"),
            artifact_id,
            version,
            artifact_id,
            version
        )
    }
}

#[async_trait::async_trait]
impl SourceLocator for MavenLocator {
    async fn locate(&self, purl: &PackageUrl) -> Result<SourceUrl, LocateError> {
        let coordinates = purl.full_name();
        let group_id = purl
            .namespace()
            .ok_or_else(|| LocateError::NotFound(coordinates.clone()))?;
        let version = purl
            .version()
            .ok_or_else(|| LocateError::MissingVersion(purl.to_string()))?;

        let url = self.pom_url(group_id, purl.name(), version);
        debug!("Fetching POM: {}", url);

        let pom = get_checked(&self.client, &url, &coordinates)
            .await?
            .text()
            .await
            .map_err(|e| LocateError::InvalidResponse(e.to_string()))?;

        let candidates = scm_candidates(&pom);
        first_forge_source(candidates.iter().map(String::as_str))
            .ok_or(LocateError::NoSource(coordinates))
    }
}

static SCM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<scm>(.*?)</scm>").expect("valid scm regex"));
static SCM_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<url>\s*(.*?)\s*</url>").expect("valid url regex"));
static SCM_CONNECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<connection>\s*(.*?)\s*</connection>").expect("valid connection regex")
});
static SCM_DEVELOPER_CONNECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<developerConnection>\s*(.*?)\s*</developerConnection>")
        .expect("valid developerConnection regex")
});

/// Collects `<scm>` `url`, `connection` and `developerConnection` values
fn scm_candidates(pom: &str) -> Vec<String> {
    let Some(scm) = SCM_RE.captures(pom).map(|caps| caps[1].to_string()) else {
        return Vec::new();
    };

    [&*SCM_URL_RE, &*SCM_CONNECTION_RE, &*SCM_DEVELOPER_CONNECTION_RE]
        .into_iter()
        .filter_map(|re| re.captures(&scm).map(|caps| caps[1].to_string()))
        .map(|value| {
            value
                .strip_prefix("scm:git:")
                .or_else(|| value.strip_prefix("scm:"))
                .unwrap_or(&value)
                .to_string()
        })
        .collect()
}
