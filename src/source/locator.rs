//! Locator trait for discovering a package's source repository

#[cfg(test)]
use mockall::automock;

use thiserror::Error;

use crate::purl::PackageUrl;
use crate::source::SourceUrl;

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No source repository declared for {0}")]
    NoSource(String),

    #[error("Version is required to locate {0}")]
    MissingVersion(String),
}

/// Trait for looking up where a package's source code lives
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait SourceLocator: Send + Sync {
    /// Resolves the source repository declared for `purl` in its registry
    ///
    /// # Returns
    /// * `Ok(SourceUrl)` - Normalized repository location
    /// * `Err(LocateError)` - If the registry lookup fails or declares no usable source
    async fn locate(&self, purl: &PackageUrl) -> Result<SourceUrl, LocateError>;
}
