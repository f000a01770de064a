//! Registry test utilities

use std::sync::Arc;

use mockito::{Mock, ServerGuard};

use vex_collector::config::RegistriesConfig;
use vex_collector::crawl::{CrawlerDeps, EcosystemRouter, Orchestrator};
use vex_collector::events::MemorySink;
use vex_collector::oci::{HttpRegistryClient, ImageSourceDetector};

use super::RecordingSync;

pub const CONFIG_DIGEST: &str =
    "sha256:4b2a1c6f0e7d9a8b3c5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c";

/// Orchestrator wired with the built-in crawlers, pointed at `server`
pub fn create_test_orchestrator(
    server: &ServerGuard,
    sync: Arc<RecordingSync>,
    sink: Arc<MemorySink>,
) -> Orchestrator {
    let client = reqwest::Client::new();
    let registries = RegistriesConfig {
        npm: server.url(),
        pypi: server.url(),
        maven: server.url(),
        insecure: Vec::new(),
    };
    let deps = CrawlerDeps::new(client.clone(), sync).with_registries(registries);
    let detector = ImageSourceDetector::new(Arc::new(HttpRegistryClient::new(client)), sink.clone());

    Orchestrator::new(EcosystemRouter::with_defaults(&deps), Arc::new(detector), sink)
}

/// Serves a single-platform image whose config carries `labels`
pub async fn mock_image(
    server: &mut ServerGuard,
    repository: &str,
    tag: &str,
    labels: serde_json::Value,
) -> (Mock, Mock) {
    let manifest = server
        .mock("GET", format!("/v2/{}/manifests/{}", repository, tag).as_str())
        .with_status(200)
        .with_header("content-type", "application/vnd.oci.image.manifest.v1+json")
        .with_body(
            serde_json::json!({
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "config": {
                    "mediaType": "application/vnd.oci.image.config.v1+json",
                    "digest": CONFIG_DIGEST,
                    "size": 512
                },
                "layers": []
            })
            .to_string(),
        )
        .create_async()
        .await;

    let config = server
        .mock(
            "GET",
            format!("/v2/{}/blobs/{}", repository, CONFIG_DIGEST).as_str(),
        )
        .with_status(200)
        .with_body(
            serde_json::json!({
                "architecture": "amd64",
                "os": "linux",
                "config": { "Labels": labels }
            })
            .to_string(),
        )
        .create_async()
        .await;

    (manifest, config)
}
