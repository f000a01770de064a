//! Ecosystem router: purl type tag to crawler

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::crawl::crawlers::{CrawlerDeps, default_constructor};
use crate::crawl::{Crawler, Ecosystem};
use crate::purl::PackageUrl;

/// Builds a crawler from the mirror root directory
pub type CrawlerConstructor = Arc<dyn Fn(&Path) -> Arc<dyn Crawler> + Send + Sync>;

/// The purl type has no crawler; the package is skipped
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported package type {ty:?} in {purl}")]
pub struct UnsupportedEcosystem {
    pub ty: String,
    pub purl: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("no crawler registered for ecosystem {0}")]
    MissingHandler(Ecosystem),
}

/// Maps every supported ecosystem to the constructor of its crawler
pub struct EcosystemRouter {
    constructors: HashMap<Ecosystem, CrawlerConstructor>,
}

impl EcosystemRouter {
    pub fn builder() -> EcosystemRouterBuilder {
        EcosystemRouterBuilder {
            constructors: HashMap::new(),
        }
    }

    /// Router with the registry-backed crawlers for every ecosystem
    pub fn with_defaults(deps: &CrawlerDeps) -> Self {
        let constructors = Ecosystem::ALL
            .into_iter()
            .map(|ecosystem| (ecosystem, default_constructor(ecosystem, deps)))
            .collect();
        Self { constructors }
    }

    /// Selects and constructs the crawler for `purl`
    ///
    /// Construction performs no I/O.
    pub fn select_strategy(
        &self,
        purl: &PackageUrl,
        root: &Path,
    ) -> Result<(Ecosystem, Arc<dyn Crawler>), UnsupportedEcosystem> {
        let unsupported = || UnsupportedEcosystem {
            ty: purl.ty().to_string(),
            purl: purl.to_string(),
        };

        let ecosystem: Ecosystem = purl.ty().parse().map_err(|_| unsupported())?;
        let constructor = self.constructors.get(&ecosystem).ok_or_else(unsupported)?;

        Ok((ecosystem, constructor(root)))
    }
}

pub struct EcosystemRouterBuilder {
    constructors: HashMap<Ecosystem, CrawlerConstructor>,
}

impl EcosystemRouterBuilder {
    pub fn register<F>(mut self, ecosystem: Ecosystem, constructor: F) -> Self
    where
        F: Fn(&Path) -> Arc<dyn Crawler> + Send + Sync + 'static,
    {
        self.constructors.insert(ecosystem, Arc::new(constructor));
        self
    }

    /// Fails if any ecosystem in [`Ecosystem::ALL`] has no constructor
    pub fn build(self) -> Result<EcosystemRouter, RouterError> {
        if let Some(missing) = Ecosystem::ALL
            .into_iter()
            .find(|ecosystem| !self.constructors.contains_key(ecosystem))
        {
            return Err(RouterError::MissingHandler(missing));
        }

        Ok(EcosystemRouter {
            constructors: self.constructors,
        })
    }
}
