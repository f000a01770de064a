//! Sequential crawl pass over a hub's package list

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::CollectorConfig;
use crate::crawl::crawlers::CrawlerDeps;
use crate::crawl::policy::{Disposition, PackageFailure, PassError};
use crate::crawl::router::EcosystemRouter;
use crate::crawl::Ecosystem;
use crate::events::{CrawlEvent, EventSink};
use crate::hub::{Hub, PackageEntry};
use crate::mirror::GitMirror;
use crate::oci::{HttpRegistryClient, ImageSourceDetector, SourceDetector};
use crate::purl::PackageUrl;

/// Lifecycle of a crawl pass
///
/// `NotStarted -> Running -> Completed | Aborted`. There is no resume state;
/// an aborted pass is retried by running it again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PassState {
    #[default]
    NotStarted,
    Running,
    Completed,
    Aborted,
}

impl PassState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassState::NotStarted => "not_started",
            PassState::Running => "running",
            PassState::Completed => "completed",
            PassState::Aborted => "aborted",
        }
    }
}

/// Outcome of a completed pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub state: PassState,
    /// Packages handed to a crawler successfully, in hub order
    pub crawled: Vec<PackageUrl>,
    /// Packages skipped under the continuation policy
    pub skipped: Vec<PackageUrl>,
}

pub struct Orchestrator {
    router: EcosystemRouter,
    detector: Arc<dyn SourceDetector>,
    sink: Arc<dyn EventSink>,
}

impl Orchestrator {
    pub fn new(
        router: EcosystemRouter,
        detector: Arc<dyn SourceDetector>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            router,
            detector,
            sink,
        }
    }

    /// Wires the built-in router, image detector and git mirror
    pub fn from_config(
        config: &CollectorConfig,
        client: reqwest::Client,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let deps = CrawlerDeps::new(client.clone(), Arc::new(GitMirror::default()))
            .with_registries(config.registries.clone());
        let registry = HttpRegistryClient::new(client)
            .with_insecure_registries(config.registries.insecure.clone());
        let detector = ImageSourceDetector::new(Arc::new(registry), sink.clone());

        Self::new(
            EcosystemRouter::with_defaults(&deps),
            Arc::new(detector),
            sink,
        )
    }

    /// Crawls every package of `hub` in declared order
    ///
    /// Unsupported package types are skipped. Any other failure, including
    /// cancellation, stops the pass; later packages are not attempted.
    pub async fn crawl_all(
        &self,
        hub: &Hub,
        cancel: &CancellationToken,
    ) -> Result<PassReport, PassError> {
        let mut report = PassReport::default();
        self.transition(&mut report, PassState::Running);

        for entry in &hub.packages {
            let result = if cancel.is_cancelled() {
                Err(PackageFailure::Cancelled)
            } else {
                self.crawl_package(&hub.root, entry, cancel).await
            };

            match result {
                Ok(()) => report.crawled.push(entry.purl.clone()),
                Err(failure) => match failure.disposition() {
                    Disposition::Skip => report.skipped.push(entry.purl.clone()),
                    Disposition::Abort => {
                        self.sink.emit(CrawlEvent::PackageFailed {
                            purl: entry.purl.to_string(),
                            kind: failure.kind(),
                            error: failure.to_string(),
                        });
                        self.transition(&mut report, PassState::Aborted);
                        return Err(PassError::new(entry.purl.clone(), failure));
                    }
                },
            }
        }

        self.transition(&mut report, PassState::Completed);
        Ok(report)
    }

    async fn crawl_package(
        &self,
        root: &Path,
        entry: &PackageEntry,
        cancel: &CancellationToken,
    ) -> Result<(), PackageFailure> {
        let (ecosystem, crawler) = self
            .router
            .select_strategy(&entry.purl, root)
            .inspect_err(|e| {
                self.sink.emit(CrawlEvent::UnsupportedEcosystem {
                    ty: e.ty.clone(),
                    purl: e.purl.clone(),
                })
            })?;
        self.sink.emit(CrawlEvent::EcosystemSelected {
            ecosystem,
            purl: entry.purl.to_string(),
        });

        let mut resolved = entry.clone();
        if ecosystem == Ecosystem::Oci && entry.source_url().is_none() {
            let source = cancellable(cancel, self.detector.detect_source(&entry.purl)).await?;
            resolved.url = Some(source.to_string());
        }

        self.sink.emit(CrawlEvent::CrawlingPackage {
            ecosystem,
            purl: entry.purl.to_string(),
            source: resolved.source_url().map(str::to_string),
        });
        cancellable(cancel, crawler.crawl(&resolved)).await
    }

    fn transition(&self, report: &mut PassReport, state: PassState) {
        report.state = state;
        self.sink.emit(CrawlEvent::PassStateChanged { state });
    }
}

/// Races `future` against cancellation of the pass
async fn cancellable<T, E>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, PackageFailure>
where
    PackageFailure: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PackageFailure::Cancelled),
        result = future => result.map_err(PackageFailure::from),
    }
}
