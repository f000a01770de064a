//! Crawler implementations for each ecosystem

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::RegistriesConfig;
use crate::crawl::router::CrawlerConstructor;
use crate::crawl::{CrawlError, Crawler, Ecosystem};
use crate::hub::PackageEntry;
use crate::mirror::VexSync;
use crate::source::locator::SourceLocator;
use crate::source::locators::{GoLocator, MavenLocator, NpmLocator, PypiLocator};
use crate::source::{SourceUrl, normalize};

/// Shared collaborators handed to every default crawler
#[derive(Clone)]
pub struct CrawlerDeps {
    pub client: reqwest::Client,
    pub registries: RegistriesConfig,
    pub sync: Arc<dyn VexSync>,
}

impl CrawlerDeps {
    pub fn new(client: reqwest::Client, sync: Arc<dyn VexSync>) -> Self {
        Self {
            client,
            registries: RegistriesConfig::default(),
            sync,
        }
    }

    pub fn with_registries(mut self, registries: RegistriesConfig) -> Self {
        self.registries = registries;
        self
    }

    fn locator(&self, ecosystem: Ecosystem) -> Option<Arc<dyn SourceLocator>> {
        let client = self.client.clone();
        match ecosystem {
            Ecosystem::Golang => Some(Arc::new(GoLocator::new(client))),
            Ecosystem::Npm => Some(Arc::new(NpmLocator::new(client, &self.registries.npm))),
            Ecosystem::Pypi => Some(Arc::new(PypiLocator::new(client, &self.registries.pypi))),
            Ecosystem::Maven => Some(Arc::new(MavenLocator::new(client, &self.registries.maven))),
            Ecosystem::Oci => None,
        }
    }
}

/// Constructor of the built-in crawler for `ecosystem`
pub(crate) fn default_constructor(ecosystem: Ecosystem, deps: &CrawlerDeps) -> CrawlerConstructor {
    let sync = deps.sync.clone();
    match deps.locator(ecosystem) {
        Some(locator) => Arc::new(move |root: &Path| {
            Arc::new(RegistryCrawler::new(
                ecosystem,
                root,
                locator.clone(),
                sync.clone(),
            )) as Arc<dyn Crawler>
        }),
        None => Arc::new(move |root: &Path| {
            Arc::new(OciCrawler::new(root, sync.clone())) as Arc<dyn Crawler>
        }),
    }
}

/// Crawler for packages whose source is discoverable from registry metadata
pub struct RegistryCrawler {
    ecosystem: Ecosystem,
    root: PathBuf,
    locator: Arc<dyn SourceLocator>,
    sync: Arc<dyn VexSync>,
}

impl RegistryCrawler {
    pub fn new(
        ecosystem: Ecosystem,
        root: &Path,
        locator: Arc<dyn SourceLocator>,
        sync: Arc<dyn VexSync>,
    ) -> Self {
        Self {
            ecosystem,
            root: root.to_path_buf(),
            locator,
            sync,
        }
    }

    async fn resolve_source(&self, entry: &PackageEntry) -> Result<SourceUrl, CrawlError> {
        if let Some(url) = entry.source_url() {
            return Ok(normalize(url)?);
        }

        debug!(
            "Locating {} source for {}",
            self.ecosystem.as_str(),
            entry.purl
        );
        Ok(self.locator.locate(&entry.purl).await?)
    }
}

#[async_trait::async_trait]
impl Crawler for RegistryCrawler {
    async fn crawl(&self, entry: &PackageEntry) -> Result<(), CrawlError> {
        let source = self.resolve_source(entry).await?;
        self.sync.sync(&self.root, &source, &entry.purl).await?;
        Ok(())
    }
}

/// Crawler for container images
///
/// The source comes from the image's provenance label and must already be
/// set on the entry.
pub struct OciCrawler {
    root: PathBuf,
    sync: Arc<dyn VexSync>,
}

impl OciCrawler {
    pub fn new(root: &Path, sync: Arc<dyn VexSync>) -> Self {
        Self {
            root: root.to_path_buf(),
            sync,
        }
    }
}

#[async_trait::async_trait]
impl Crawler for OciCrawler {
    async fn crawl(&self, entry: &PackageEntry) -> Result<(), CrawlError> {
        let url = entry
            .source_url()
            .ok_or_else(|| CrawlError::MissingSource(entry.purl.to_string()))?;
        let source = normalize(url)?;
        self.sync.sync(&self.root, &source, &entry.purl).await?;
        Ok(())
    }
}
