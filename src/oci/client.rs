//! Registry client for reading image configuration

use std::collections::HashMap;
use std::sync::LazyLock;

#[cfg(test)]
use mockall::automock;

use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::oci::reference::ImageReference;

/// Manifest media types accepted from the registry
const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json";

/// Platform preferred when an image index lists several manifests
const PREFERRED_OS: &str = "linux";
const PREFERRED_ARCHITECTURE: &str = "amd64";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Read-only view of an image's configuration blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageConfig {
    pub labels: HashMap<String, String>,
}

impl ImageConfig {
    pub fn with_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Trait for fetching image configuration from a container registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetches the configuration of the image `reference` points at
    ///
    /// Only the manifest and config blob are read; layers are never pulled.
    async fn fetch_config(&self, reference: &ImageReference)
    -> Result<ImageConfig, RegistryError>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    config: Option<Descriptor>,
    manifests: Option<Vec<Descriptor>>,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    digest: String,
    platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
struct Platform {
    architecture: String,
    os: String,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    config: Option<ContainerConfig>,
}

#[derive(Debug, Deserialize)]
struct ContainerConfig {
    #[serde(rename = "Labels")]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// `WWW-Authenticate: Bearer realm=...,service=...,scope=...`
#[derive(Debug, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

/// Registry client speaking the OCI distribution API
///
/// Handles anonymous bearer-token challenges; no credentials are ever sent.
pub struct HttpRegistryClient {
    client: reqwest::Client,
    /// Registries reached over plain HTTP
    insecure: Vec<String>,
}

impl HttpRegistryClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            insecure: Vec::new(),
        }
    }

    pub fn with_insecure_registries(mut self, registries: Vec<String>) -> Self {
        self.insecure = registries;
        self
    }

    fn base_url(&self, registry: &str) -> String {
        let host = registry.split(':').next().unwrap_or(registry);
        let plain_http = host == "localhost"
            || host == "127.0.0.1"
            || self.insecure.iter().any(|r| r == registry);
        let scheme = if plain_http { "http" } else { "https" };
        format!("{}://{}", scheme, registry)
    }

    /// GET with one retry after answering an anonymous bearer challenge
    async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
        token: &mut Option<String>,
        reference: &ImageReference,
    ) -> Result<reqwest::Response, RegistryError> {
        let mut retried = false;
        loop {
            let mut request = self.client.get(url);
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            if let Some(token) = token.as_deref() {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }
            let response = request.send().await?;

            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                let challenge = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_challenge)
                    .ok_or_else(|| RegistryError::Unauthorized(reference.to_string()))?;
                *token = Some(self.fetch_token(&challenge, reference).await?);
                retried = true;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(RegistryError::Unauthorized(reference.to_string()));
            }

            if status == StatusCode::NOT_FOUND {
                return Err(RegistryError::NotFound(reference.to_string()));
            }

            if !status.is_success() {
                warn!("Registry returned status {}: {}", status, url);
                return Err(RegistryError::InvalidResponse(format!(
                    "Unexpected status: {}",
                    status
                )));
            }

            return Ok(response);
        }
    }

    async fn fetch_token(
        &self,
        challenge: &BearerChallenge,
        reference: &ImageReference,
    ) -> Result<String, RegistryError> {
        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", reference.repository()));
        let mut params = Vec::new();
        if let Some(service) = &challenge.service {
            params.push(("service", service.as_str()));
        }
        params.push(("scope", scope.as_str()));
        let url = reqwest::Url::parse_with_params(&challenge.realm, &params).map_err(|e| {
            RegistryError::InvalidResponse(format!("invalid token realm: {}", e))
        })?;
        debug!("Requesting anonymous registry token: {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::Unauthorized(reference.to_string()));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| RegistryError::InvalidResponse("token response without token".into()))
    }

    async fn fetch_manifest(
        &self,
        base: &str,
        reference: &ImageReference,
        identifier: &str,
        token: &mut Option<String>,
    ) -> Result<Manifest, RegistryError> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            base,
            reference.repository(),
            identifier
        );
        self.get(&url, Some(MANIFEST_ACCEPT), token, reference)
            .await?
            .json()
            .await
            .map_err(|e| {
                warn!("Failed to parse manifest for {}: {}", reference, e);
                RegistryError::InvalidResponse(e.to_string())
            })
    }
}

#[async_trait::async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn fetch_config(
        &self,
        reference: &ImageReference,
    ) -> Result<ImageConfig, RegistryError> {
        let base = self.base_url(reference.registry());
        let mut token = None;

        let mut manifest = self
            .fetch_manifest(&base, reference, reference.identifier(), &mut token)
            .await?;

        if let Some(entries) = manifest.manifests.take() {
            let digest = select_platform(&entries).ok_or_else(|| {
                RegistryError::InvalidResponse(format!("empty image index for {}", reference))
            })?;
            debug!("Selected manifest {} from index of {}", digest, reference);
            manifest = self
                .fetch_manifest(&base, reference, &digest, &mut token)
                .await?;
        }

        let config_digest = manifest
            .config
            .map(|c| c.digest)
            .ok_or_else(|| {
                RegistryError::InvalidResponse(format!("manifest without config for {}", reference))
            })?;

        let url = format!(
            "{}/v2/{}/blobs/{}",
            base,
            reference.repository(),
            config_digest
        );
        let config: ConfigFile = self
            .get(&url, None, &mut token, reference)
            .await?
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;

        Ok(ImageConfig {
            labels: config
                .config
                .and_then(|c| c.labels)
                .unwrap_or_default(),
        })
    }
}

/// Picks linux/amd64 from an image index, falling back to the first entry
fn select_platform(entries: &[Descriptor]) -> Option<String> {
    entries
        .iter()
        .find(|d| {
            d.platform.as_ref().is_some_and(|p| {
                p.os == PREFERRED_OS && p.architecture == PREFERRED_ARCHITECTURE
            })
        })
        .or_else(|| entries.first())
        .map(|d| d.digest.clone())
}

static CHALLENGE_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("valid challenge regex"));

fn parse_challenge(header: &str) -> Option<BearerChallenge> {
    let params = header.strip_prefix("Bearer ")?;

    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for caps in CHALLENGE_PARAM_RE.captures_iter(params) {
        let value = caps[2].to_string();
        match &caps[1] {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }

    Some(BearerChallenge {
        realm: realm?,
        service,
        scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const CONFIG_DIGEST: &str =
        "sha256:1111111111111111111111111111111111111111111111111111111111111111";
    const AMD64_DIGEST: &str =
        "sha256:2222222222222222222222222222222222222222222222222222222222222222";
    const ARM64_DIGEST: &str =
        "sha256:3333333333333333333333333333333333333333333333333333333333333333";

    fn manifest_body() -> String {
        format!(
            r#"{{
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "config": {{"mediaType": "application/vnd.oci.image.config.v1+json", "digest": "{}", "size": 100}},
                "layers": []
            }}"#,
            CONFIG_DIGEST
        )
    }

    const CONFIG_BODY: &str = r#"{
        "architecture": "amd64",
        "os": "linux",
        "config": {
            "Labels": {
                "org.opencontainers.image.source": "https://github.com/aquasecurity/trivy"
            }
        }
    }"#;

    #[test]
    fn parse_challenge_extracts_parameters() {
        let challenge = parse_challenge(
            r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:org/app:pull""#,
        )
        .unwrap();

        assert_eq!(
            challenge,
            BearerChallenge {
                realm: "https://ghcr.io/token".to_string(),
                service: Some("ghcr.io".to_string()),
                scope: Some("repository:org/app:pull".to_string()),
            }
        );
    }

    #[test]
    fn parse_challenge_rejects_basic_auth() {
        assert_eq!(parse_challenge(r#"Basic realm="registry""#), None);
    }

    #[test]
    fn select_platform_prefers_linux_amd64() {
        let entries = vec![
            Descriptor {
                digest: ARM64_DIGEST.to_string(),
                platform: Some(Platform {
                    architecture: "arm64".to_string(),
                    os: "linux".to_string(),
                }),
            },
            Descriptor {
                digest: AMD64_DIGEST.to_string(),
                platform: Some(Platform {
                    architecture: "amd64".to_string(),
                    os: "linux".to_string(),
                }),
            },
        ];

        assert_eq!(select_platform(&entries), Some(AMD64_DIGEST.to_string()));
        assert_eq!(select_platform(&entries[..1]), Some(ARM64_DIGEST.to_string()));
        assert_eq!(select_platform(&[]), None);
    }

    #[tokio::test]
    async fn fetch_config_reads_labels_from_config_blob() {
        let mut server = Server::new_async().await;

        let manifest_mock = server
            .mock("GET", "/v2/org/app/manifests/latest")
            .match_header("accept", Matcher::Regex("oci.image.manifest".to_string()))
            .with_status(200)
            .with_header("content-type", "application/vnd.oci.image.manifest.v1+json")
            .with_body(manifest_body())
            .create_async()
            .await;
        let blob_mock = server
            .mock("GET", format!("/v2/org/app/blobs/{}", CONFIG_DIGEST).as_str())
            .with_status(200)
            .with_body(CONFIG_BODY)
            .create_async()
            .await;

        let client = HttpRegistryClient::new(reqwest::Client::new());
        let reference =
            ImageReference::parse(&format!("{}/org/app:latest", server.host_with_port())).unwrap();

        let config = client.fetch_config(&reference).await.unwrap();

        manifest_mock.assert_async().await;
        blob_mock.assert_async().await;
        assert_eq!(
            config.label("org.opencontainers.image.source"),
            Some("https://github.com/aquasecurity/trivy")
        );
    }

    #[tokio::test]
    async fn fetch_config_resolves_image_index() {
        let mut server = Server::new_async().await;

        let index_body = format!(
            r#"{{
                "schemaVersion": 2,
                "mediaType": "application/vnd.oci.image.index.v1+json",
                "manifests": [
                    {{"digest": "{}", "platform": {{"architecture": "arm64", "os": "linux"}}}},
                    {{"digest": "{}", "platform": {{"architecture": "amd64", "os": "linux"}}}}
                ]
            }}"#,
            ARM64_DIGEST, AMD64_DIGEST
        );
        let index_mock = server
            .mock("GET", "/v2/org/app/manifests/1.0")
            .with_status(200)
            .with_body(index_body)
            .create_async()
            .await;
        let manifest_mock = server
            .mock("GET", format!("/v2/org/app/manifests/{}", AMD64_DIGEST).as_str())
            .with_status(200)
            .with_body(manifest_body())
            .create_async()
            .await;
        let blob_mock = server
            .mock("GET", format!("/v2/org/app/blobs/{}", CONFIG_DIGEST).as_str())
            .with_status(200)
            .with_body(CONFIG_BODY)
            .create_async()
            .await;

        let client = HttpRegistryClient::new(reqwest::Client::new());
        let reference =
            ImageReference::parse(&format!("{}/org/app:1.0", server.host_with_port())).unwrap();

        let config = client.fetch_config(&reference).await.unwrap();

        index_mock.assert_async().await;
        manifest_mock.assert_async().await;
        blob_mock.assert_async().await;
        assert_eq!(config.labels.len(), 1);
    }

    #[tokio::test]
    async fn fetch_config_answers_anonymous_bearer_challenge() {
        let mut server = Server::new_async().await;
        let challenge = format!(
            r#"Bearer realm="{}/token",service="registry.test",scope="repository:org/app:pull""#,
            server.url()
        );

        let challenge_mock = server
            .mock("GET", "/v2/org/app/manifests/latest")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .with_header("www-authenticate", &challenge)
            .create_async()
            .await;
        let token_mock = server
            .mock("GET", "/token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("service".into(), "registry.test".into()),
                Matcher::UrlEncoded("scope".into(), "repository:org/app:pull".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"token": "anonymous-token"}"#)
            .create_async()
            .await;
        let manifest_mock = server
            .mock("GET", "/v2/org/app/manifests/latest")
            .match_header("authorization", "Bearer anonymous-token")
            .with_status(200)
            .with_body(manifest_body())
            .create_async()
            .await;
        let blob_mock = server
            .mock("GET", format!("/v2/org/app/blobs/{}", CONFIG_DIGEST).as_str())
            .match_header("authorization", "Bearer anonymous-token")
            .with_status(200)
            .with_body(CONFIG_BODY)
            .create_async()
            .await;

        let client = HttpRegistryClient::new(reqwest::Client::new());
        let reference =
            ImageReference::parse(&format!("{}/org/app", server.host_with_port())).unwrap();

        let result = client.fetch_config(&reference).await;

        challenge_mock.assert_async().await;
        token_mock.assert_async().await;
        manifest_mock.assert_async().await;
        blob_mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn fetch_token_encodes_query_parameters() {
        let mut server = Server::new_async().await;
        let challenge = format!(
            r#"Bearer realm="{}/token?client=vex",service="registry test",scope="repository:org/app:pull repository:org/base:pull""#,
            server.url()
        );

        let _challenge_mock = server
            .mock("GET", "/v2/org/app/manifests/latest")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .with_header("www-authenticate", &challenge)
            .create_async()
            .await;
        let token_mock = server
            .mock("GET", "/token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("client".into(), "vex".into()),
                Matcher::UrlEncoded("service".into(), "registry test".into()),
                Matcher::UrlEncoded(
                    "scope".into(),
                    "repository:org/app:pull repository:org/base:pull".into(),
                ),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token": "anonymous-token"}"#)
            .create_async()
            .await;
        let _manifest_mock = server
            .mock("GET", "/v2/org/app/manifests/latest")
            .match_header("authorization", "Bearer anonymous-token")
            .with_status(200)
            .with_body(manifest_body())
            .create_async()
            .await;
        let _blob_mock = server
            .mock("GET", format!("/v2/org/app/blobs/{}", CONFIG_DIGEST).as_str())
            .with_status(200)
            .with_body(CONFIG_BODY)
            .create_async()
            .await;

        let client = HttpRegistryClient::new(reqwest::Client::new());
        let reference =
            ImageReference::parse(&format!("{}/org/app", server.host_with_port())).unwrap();

        let result = client.fetch_config(&reference).await;

        token_mock.assert_async().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn fetch_token_rejects_unparseable_realm() {
        let mut server = Server::new_async().await;
        let _challenge_mock = server
            .mock("GET", "/v2/org/app/manifests/latest")
            .with_status(401)
            .with_header(
                "www-authenticate",
                r#"Bearer realm="not a url",service="registry.test""#,
            )
            .create_async()
            .await;

        let client = HttpRegistryClient::new(reqwest::Client::new());
        let reference =
            ImageReference::parse(&format!("{}/org/app", server.host_with_port())).unwrap();

        let result = client.fetch_config(&reference).await;

        assert!(matches!(result, Err(RegistryError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn fetch_config_returns_not_found_for_missing_tag() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/v2/org/app/manifests/missing")
            .with_status(404)
            .with_body(r#"{"errors": [{"code": "MANIFEST_UNKNOWN"}]}"#)
            .create_async()
            .await;

        let client = HttpRegistryClient::new(reqwest::Client::new());
        let reference =
            ImageReference::parse(&format!("{}/org/app:missing", server.host_with_port()))
                .unwrap();

        let result = client.fetch_config(&reference).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn fetch_config_returns_unauthorized_without_challenge() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/v2/private/app/manifests/latest")
            .with_status(401)
            .create_async()
            .await;

        let client = HttpRegistryClient::new(reqwest::Client::new());
        let reference =
            ImageReference::parse(&format!("{}/private/app", server.host_with_port())).unwrap();

        let result = client.fetch_config(&reference).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(RegistryError::Unauthorized(_))));
    }

    #[test]
    fn base_url_uses_plain_http_for_local_and_insecure_registries() {
        let client = HttpRegistryClient::new(reqwest::Client::new())
            .with_insecure_registries(vec!["registry.internal:5000".to_string()]);

        assert_eq!(client.base_url("ghcr.io"), "https://ghcr.io");
        assert_eq!(client.base_url("localhost:5000"), "http://localhost:5000");
        assert_eq!(client.base_url("127.0.0.1:8080"), "http://127.0.0.1:8080");
        assert_eq!(
            client.base_url("registry.internal:5000"),
            "http://registry.internal:5000"
        );
    }
}
