//! Go module source locator

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::purl::PackageUrl;
use crate::source::locator::{LocateError, SourceLocator};
use crate::source::locators::{get_checked, is_known_forge};
use crate::source::{SourceUrl, normalize};

/// Locator for Go modules
///
/// Modules hosted on a known forge map directly to `host/owner/repo`. Vanity
/// import paths (e.g. `golang.org/x/text`) are resolved through the
/// `go-import` meta tag served at `https://<module>?go-get=1`.
pub struct GoLocator {
    client: reqwest::Client,
    /// Overrides `https://` + module path when fetching go-import metadata
    meta_base_url: Option<String>,
}

impl GoLocator {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            meta_base_url: None,
        }
    }

    /// Serves go-import metadata from `base_url/<module>` instead of the module host
    pub fn with_meta_base_url(mut self, base_url: &str) -> Self {
        self.meta_base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    async fn fetch_go_import(&self, module: &str) -> Result<SourceUrl, LocateError> {
        let url = match &self.meta_base_url {
            Some(base) => format!("{}/{}?go-get=1", base, module),
            None => format!("https://{}?go-get=1", module),
        };
        debug!("Fetching go-import metadata: {}", url);

        let body = get_checked(&self.client, &url, module)
            .await?
            .text()
            .await
            .map_err(|e| LocateError::InvalidResponse(e.to_string()))?;

        let repo_url = parse_go_import(&body, module)
            .ok_or_else(|| LocateError::NoSource(module.to_string()))?;
        normalize(&repo_url).map_err(|e| LocateError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl SourceLocator for GoLocator {
    async fn locate(&self, purl: &PackageUrl) -> Result<SourceUrl, LocateError> {
        let module = purl.full_name();

        if let Some(source) = forge_source(&module) {
            return Ok(source);
        }

        self.fetch_go_import(&module).await
    }
}

/// Maps `github.com/owner/repo/v2/sub` style module paths to their repository
fn forge_source(module: &str) -> Option<SourceUrl> {
    let mut parts = module.splitn(4, '/');
    let host = parts.next()?;
    if !is_known_forge(host) {
        return None;
    }
    let owner = parts.next()?;
    let repo = parts.next()?;
    normalize(&format!("{}/{}/{}", host, owner, repo)).ok()
}

static GO_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<meta\s+name=["']go-import["']\s+content=["']\s*(\S+)\s+(\S+)\s+(\S+)\s*["']"#,
    )
    .expect("valid go-import regex")
});

/// Extracts the repository URL of the longest go-import prefix matching `module`
fn parse_go_import(html: &str, module: &str) -> Option<String> {
    GO_IMPORT_RE
        .captures_iter(html)
        .filter(|caps| &caps[2] == "git")
        .filter(|caps| {
            let prefix = &caps[1];
            module == prefix || module.starts_with(&format!("{}/", prefix))
        })
        .max_by_key(|caps| caps[1].len())
        .map(|caps| caps[3].to_string())
}
