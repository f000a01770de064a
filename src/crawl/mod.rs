//! Resolution and dispatch engine
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│   Router    │────▶│   Crawler    │
//! │ (hub order)  │     │ (purl type) │     │ (per ecosys.)│
//! └──────────────┘     └─────────────┘     └──────────────┘
//!        │                                        │
//!        ▼                                        ▼
//! ┌──────────────┐                         ┌──────────────┐
//! │   Detector   │                         │    Mirror    │
//! │ (OCI labels) │                         │  (VexSync)   │
//! └──────────────┘                         └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`router`]: Maps purl types to crawler constructors
//! - [`crawlers`]: Crawler implementations for each ecosystem
//! - [`orchestrator`]: Sequential crawl pass over a hub
//! - [`policy`]: Failure taxonomy and the skip/abort policy table

pub mod crawlers;
pub mod orchestrator;
pub mod policy;
pub mod router;

pub use crawlers::{CrawlerDeps, OciCrawler, RegistryCrawler};
pub use orchestrator::{Orchestrator, PassReport, PassState};
pub use policy::{Disposition, ErrorKind, PackageFailure, PassError};
pub use router::{EcosystemRouter, RouterError, UnsupportedEcosystem};

#[cfg(test)]
use mockall::automock;

use std::fmt;

use thiserror::Error;

use crate::hub::PackageEntry;
use crate::mirror::SyncError;
use crate::source::NormalizeError;
use crate::source::locator::LocateError;

/// Package ecosystems a crawler exists for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ecosystem {
    /// Go module registry (pkg:golang)
    Golang,
    /// npm package index (pkg:npm)
    Npm,
    /// Python package index (pkg:pypi)
    Pypi,
    /// Maven artifact repository (pkg:maven)
    Maven,
    /// Container registry (pkg:oci)
    Oci,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 5] = [
        Ecosystem::Golang,
        Ecosystem::Npm,
        Ecosystem::Pypi,
        Ecosystem::Maven,
        Ecosystem::Oci,
    ];

    /// Returns the purl type tag of the ecosystem
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Golang => "golang",
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Maven => "maven",
            Ecosystem::Oci => "oci",
        }
    }
}

impl std::str::FromStr for Ecosystem {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "golang" => Ok(Ecosystem::Golang),
            "npm" => Ok(Ecosystem::Npm),
            "pypi" => Ok(Ecosystem::Pypi),
            "maven" => Ok(Ecosystem::Maven),
            "oci" => Ok(Ecosystem::Oci),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("failed to locate source: {0}")]
    Locate(#[from] LocateError),

    #[error(transparent)]
    InvalidSource(#[from] NormalizeError),

    #[error("failed to sync VEX documents: {0}")]
    Sync(#[from] SyncError),

    #[error("no source repository resolved for {0}")]
    MissingSource(String),
}

/// Synchronizes one package's VEX documents into the mirror
///
/// Implementations must be safe to call repeatedly for the same package.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Crawler: Send + Sync {
    async fn crawl(&self, entry: &PackageEntry) -> Result<(), CrawlError>;
}
