//! Failure taxonomy and continuation policy for a crawl pass
//!
//! | kind                     | disposition |
//! |--------------------------|-------------|
//! | `UnsupportedEcosystem`   | skip        |
//! | `InvalidSourceReference` | abort       |
//! | `MissingQualifier`       | abort       |
//! | `InvalidImageReference`  | abort       |
//! | `RegistryFetchError`     | abort       |
//! | `SourceLabelMissing`     | abort       |
//! | `DelegateCrawlError`     | abort       |
//! | `Cancelled`              | abort       |
//!
//! Package lists are expected to contain entries no crawler handles yet, so
//! those are skipped. A failure inside a supported ecosystem points at an
//! outage or a broken mirror and stops the pass before the mirror drifts
//! into a partial state.

use std::fmt;

use thiserror::Error;

use crate::crawl::CrawlError;
use crate::crawl::router::UnsupportedEcosystem;
use crate::oci::DetectError;
use crate::purl::PackageUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSourceReference,
    MissingQualifier,
    InvalidImageReference,
    RegistryFetchError,
    SourceLabelMissing,
    UnsupportedEcosystem,
    DelegateCrawlError,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSourceReference => "InvalidSourceReference",
            ErrorKind::MissingQualifier => "MissingQualifier",
            ErrorKind::InvalidImageReference => "InvalidImageReference",
            ErrorKind::RegistryFetchError => "RegistryFetchError",
            ErrorKind::SourceLabelMissing => "SourceLabelMissing",
            ErrorKind::UnsupportedEcosystem => "UnsupportedEcosystem",
            ErrorKind::DelegateCrawlError => "DelegateCrawlError",
            ErrorKind::Cancelled => "Cancelled",
        }
    }

    /// Policy table: whether a failure of this kind skips the package or aborts the pass
    pub fn disposition(&self) -> Disposition {
        match self {
            ErrorKind::UnsupportedEcosystem => Disposition::Skip,
            ErrorKind::InvalidSourceReference
            | ErrorKind::MissingQualifier
            | ErrorKind::InvalidImageReference
            | ErrorKind::RegistryFetchError
            | ErrorKind::SourceLabelMissing
            | ErrorKind::DelegateCrawlError
            | ErrorKind::Cancelled => Disposition::Abort,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator does after a package fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Record the failure and continue with the next package
    Skip,
    /// Stop the pass and report the failure
    Abort,
}

/// Failure of a single package within a pass
#[derive(Debug, Error)]
pub enum PackageFailure {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedEcosystem),

    #[error("failed to detect source: {0}")]
    Detect(#[from] DetectError),

    #[error("failed to crawl package: {0}")]
    Crawl(#[from] CrawlError),

    #[error("crawl pass cancelled")]
    Cancelled,
}

impl PackageFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackageFailure::Unsupported(_) => ErrorKind::UnsupportedEcosystem,
            PackageFailure::Detect(e) => e.kind(),
            PackageFailure::Crawl(_) => ErrorKind::DelegateCrawlError,
            PackageFailure::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn disposition(&self) -> Disposition {
        self.kind().disposition()
    }
}

/// A pass aborted by a package failure
#[derive(Debug, Error)]
#[error("crawl aborted at {purl} ({kind})")]
pub struct PassError {
    pub purl: PackageUrl,
    pub kind: ErrorKind,
    #[source]
    pub failure: PackageFailure,
}

impl PassError {
    pub fn new(purl: PackageUrl, failure: PackageFailure) -> Self {
        Self {
            purl,
            kind: failure.kind(),
            failure,
        }
    }
}
