//! Image source detection
//!
//! Resolves `pkg:oci` packages to the repository recorded in the image's
//! `org.opencontainers.image.source` label.

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use thiserror::Error;

use crate::crawl::ErrorKind;
use crate::events::{CrawlEvent, EventSink};
use crate::oci::client::{RegistryClient, RegistryError};
use crate::oci::reference::{ImageReference, ReferenceError};
use crate::purl::PackageUrl;
use crate::source::{NormalizeError, SourceUrl, normalize};

/// OCI annotation naming the image's source repository
pub const IMAGE_SOURCE_LABEL: &str = "org.opencontainers.image.source";

const REPOSITORY_URL_QUALIFIER: &str = "repository_url";
const TAG_QUALIFIER: &str = "tag";
const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("{qualifier} not found in {purl}")]
    MissingQualifier {
        purl: String,
        qualifier: &'static str,
    },

    #[error("parsing reference {reference:?}: {source}")]
    InvalidImageReference {
        reference: String,
        source: ReferenceError,
    },

    #[error("reading image {reference:?}: {source}")]
    RegistryFetch {
        reference: String,
        source: RegistryError,
    },

    #[error("{label} not found in {reference}")]
    SourceLabelMissing {
        label: &'static str,
        reference: String,
    },

    #[error(transparent)]
    InvalidSource(#[from] NormalizeError),
}

impl DetectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectError::MissingQualifier { .. } => ErrorKind::MissingQualifier,
            DetectError::InvalidImageReference { .. } => ErrorKind::InvalidImageReference,
            DetectError::RegistryFetch { .. } => ErrorKind::RegistryFetchError,
            DetectError::SourceLabelMissing { .. } => ErrorKind::SourceLabelMissing,
            DetectError::InvalidSource(_) => ErrorKind::InvalidSourceReference,
        }
    }
}

/// Trait for discovering the source repository of a container image package
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait SourceDetector: Send + Sync {
    async fn detect_source(&self, purl: &PackageUrl) -> Result<SourceUrl, DetectError>;
}

/// Detector reading the source label from the image config
pub struct ImageSourceDetector {
    client: Arc<dyn RegistryClient>,
    sink: Arc<dyn EventSink>,
}

impl ImageSourceDetector {
    pub fn new(client: Arc<dyn RegistryClient>, sink: Arc<dyn EventSink>) -> Self {
        Self { client, sink }
    }
}

#[async_trait::async_trait]
impl SourceDetector for ImageSourceDetector {
    async fn detect_source(&self, purl: &PackageUrl) -> Result<SourceUrl, DetectError> {
        let repository_url =
            purl.qualifier(REPOSITORY_URL_QUALIFIER)
                .ok_or_else(|| DetectError::MissingQualifier {
                    purl: purl.to_string(),
                    qualifier: REPOSITORY_URL_QUALIFIER,
                })?;
        let tag = purl.qualifier(TAG_QUALIFIER).unwrap_or(DEFAULT_TAG);

        let reference_str = format!("{}:{}", repository_url, tag);
        let reference = ImageReference::parse(&reference_str).map_err(|source| {
            DetectError::InvalidImageReference {
                reference: reference_str.clone(),
                source,
            }
        })?;

        let config = self.client.fetch_config(&reference).await.map_err(|source| {
            DetectError::RegistryFetch {
                reference: reference_str.clone(),
                source,
            }
        })?;

        let src = config
            .label(IMAGE_SOURCE_LABEL)
            .ok_or_else(|| DetectError::SourceLabelMissing {
                label: IMAGE_SOURCE_LABEL,
                reference: reference_str.clone(),
            })?;
        self.sink.emit(CrawlEvent::LabelFound {
            label: IMAGE_SOURCE_LABEL.to_string(),
            value: src.to_string(),
        });

        Ok(normalize(src)?)
    }
}
