/// Pinning service backend (Pinata).
///
/// Uploads go to the pinning API as `multipart/form-data`; pinned content
/// is then served by IPFS gateways, which is also how it is read back.
/// Authentication is either a JWT (bearer) or an API key/secret pair.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::gateway::{GatewayMirrors, DEFAULT_GATEWAYS};
use super::{
    bounded, progress_body, BackendFailure, BackendResult, GatewayTier, RetrieveResult,
    StorageBackend, StorageType, StoredContent, UploadContext, DEFAULT_GATEWAY_TIMEOUT,
    DEFAULT_HEALTH_TIMEOUT, DEFAULT_UPLOAD_TIMEOUT,
};

/// Configuration for Pinata access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinataConfig {
    /// Pinning API base URL.
    pub api_url: String,
    /// Scoped JWT. Takes precedence over the key pair when set.
    pub jwt: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Gateways tried in order on retrieval.
    pub gateways: Vec<String>,
    pub upload_timeout_ms: u64,
    pub gateway_timeout_ms: u64,
    pub health_timeout_ms: u64,
}

impl Default for PinataConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.pinata.cloud".to_string(),
            jwt: None,
            api_key: None,
            api_secret: None,
            gateways: DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect(),
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT.as_millis() as u64,
            gateway_timeout_ms: DEFAULT_GATEWAY_TIMEOUT.as_millis() as u64,
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT.as_millis() as u64,
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

enum Credentials<'a> {
    Jwt(&'a str),
    KeyPair { key: &'a str, secret: &'a str },
}

/// `pinFileToIPFS` response body.
#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
    #[serde(rename = "PinSize")]
    pin_size: u64,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

/// Pinata storage backend.
pub struct PinataBackend {
    client: Client,
    gateways: GatewayMirrors,
    config: PinataConfig,
}

impl PinataBackend {
    pub fn new(client: Client, config: PinataConfig) -> Self {
        let gateways = GatewayMirrors::new(client.clone(), config.gateways.clone())
            .with_attempt_timeout(Duration::from_millis(config.gateway_timeout_ms));
        Self {
            client,
            gateways,
            config,
        }
    }

    fn credentials(&self) -> Option<Credentials<'_>> {
        if let Some(jwt) = present(&self.config.jwt) {
            return Some(Credentials::Jwt(jwt));
        }
        match (present(&self.config.api_key), present(&self.config.api_secret)) {
            (Some(key), Some(secret)) => Some(Credentials::KeyPair { key, secret }),
            _ => None,
        }
    }

    fn authorize(request: RequestBuilder, credentials: &Credentials<'_>) -> RequestBuilder {
        match credentials {
            Credentials::Jwt(jwt) => request.bearer_auth(jwt),
            Credentials::KeyPair { key, secret } => request
                .header("pinata_api_key", *key)
                .header("pinata_secret_api_key", *secret),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    async fn pin(
        &self,
        data: &[u8],
        file_name: &str,
        credentials: &Credentials<'_>,
        ctx: &UploadContext,
    ) -> Result<StoredContent, BackendFailure> {
        let body = progress_body(data, ctx);
        let part = multipart::Part::stream_with_length(body, data.len() as u64)
            .file_name(file_name.to_string());
        let metadata = serde_json::json!({ "name": file_name }).to_string();
        let form = multipart::Form::new()
            .part("file", part)
            .text("pinataMetadata", metadata);

        let request = self
            .client
            .post(self.endpoint("/pinning/pinFileToIPFS"))
            .multipart(form);

        let resp = Self::authorize(request, credentials)
            .send()
            .await
            .map_err(|e| BackendFailure::network(&e))?;

        if !resp.status().is_success() {
            return Err(BackendFailure::http(resp.status()));
        }

        let pinned: PinResponse = resp
            .json()
            .await
            .map_err(|e| BackendFailure::malformed(format!("Pinata response parse error: {e}")))?;

        if pinned.ipfs_hash.is_empty() {
            return Err(BackendFailure::malformed("Pinata returned an empty IpfsHash"));
        }

        let pinned_at = DateTime::parse_from_rfc3339(&pinned.timestamp)
            .map_err(|e| {
                BackendFailure::malformed(format!("Pinata timestamp {:?}: {e}", pinned.timestamp))
            })?
            .with_timezone(&Utc);

        let mut stored = StoredContent::new(&pinned.ipfs_hash);
        if let Some(url) = self.gateways.primary_url(&pinned.ipfs_hash) {
            stored = stored.with_gateway(url, GatewayTier::Primary);
        }
        stored.size = Some(pinned.pin_size);
        stored.pinned_at = Some(pinned_at);
        Ok(stored)
    }

    async fn test_authentication(
        &self,
        credentials: &Credentials<'_>,
    ) -> Result<(), BackendFailure> {
        let request = self.client.get(self.endpoint("/data/testAuthentication"));
        let resp = Self::authorize(request, credentials)
            .send()
            .await
            .map_err(|e| BackendFailure::network(&e))?;

        if !resp.status().is_success() {
            return Err(BackendFailure::http(resp.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for PinataBackend {
    fn name(&self) -> &str {
        "pinata"
    }

    fn storage_type(&self) -> StorageType {
        StorageType::PinningService
    }

    fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.config.upload_timeout_ms)
    }

    async fn upload(&self, data: &[u8], file_name: &str, ctx: &UploadContext) -> BackendResult {
        let Some(credentials) = self.credentials() else {
            return BackendResult::failure(BackendFailure::configuration(
                "Pinata credentials missing: set a JWT or an API key and secret",
            ));
        };

        let pinned = bounded(
            self.pin(data, file_name, &credentials, ctx),
            self.upload_timeout(),
            &ctx.cancel,
            "upload timeout",
        )
        .await;

        if let Ok(stored) = &pinned {
            info!(
                backend = "pinata",
                cid = %stored.content_id,
                file_name,
                "Pinned to IPFS"
            );
        }
        pinned.into()
    }

    async fn retrieve(&self, content_id: &str, cancel: &CancellationToken) -> RetrieveResult {
        self.gateways.fetch(content_id, cancel).await
    }

    async fn health_check(&self) -> bool {
        let Some(credentials) = self.credentials() else {
            debug!(backend = "pinata", "No credentials, reporting unhealthy");
            return false;
        };

        let limit = Duration::from_millis(self.config.health_timeout_ms);
        let probe = self.test_authentication(&credentials);
        match bounded(probe, limit, &CancellationToken::new(), "health timeout").await {
            Ok(()) => true,
            Err(failure) => {
                debug!(backend = "pinata", error = %failure, "Health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FailureKind;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pin_body() -> serde_json::Value {
        serde_json::json!({
            "IpfsHash": "QmX",
            "PinSize": 5,
            "Timestamp": "2024-05-01T12:00:00.000Z"
        })
    }

    fn jwt_config(server: &MockServer) -> PinataConfig {
        PinataConfig {
            api_url: server.uri(),
            jwt: Some("test-jwt".to_string()),
            gateways: vec!["https://gateway.example".to_string()],
            ..PinataConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = PinataConfig {
            api_url: server.uri(),
            api_key: Some("key-only".to_string()),
            ..PinataConfig::default()
        };
        let backend = PinataBackend::new(Client::new(), config);

        match backend.upload(b"hello", "a.txt", &UploadContext::default()).await {
            BackendResult::Failure(f) => assert_eq!(f.kind, FailureKind::Configuration),
            BackendResult::Success(_) => panic!("upload without credentials must fail"),
        }
        assert!(!backend.health_check().await);
    }

    #[tokio::test]
    async fn test_upload_with_jwt_reports_gateway_and_progress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pinning/pinFileToIPFS"))
            .and(header("authorization", "Bearer test-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pin_body()))
            .expect(1)
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ctx = UploadContext::default().with_progress(Arc::new(move |sent: u64, total: u64| {
            sink.lock().unwrap().push((sent, total));
        }));

        let backend = PinataBackend::new(Client::new(), jwt_config(&server));
        let stored = match backend.upload(b"hello", "a.txt.encrypted", &ctx).await {
            BackendResult::Success(stored) => stored,
            BackendResult::Failure(f) => panic!("unexpected failure: {f}"),
        };

        assert_eq!(stored.content_id, "QmX");
        assert_eq!(
            stored.gateway_url.as_deref(),
            Some("https://gateway.example/ipfs/QmX")
        );
        assert_eq!(stored.gateway_tier, Some(GatewayTier::Primary));
        assert_eq!(stored.size, Some(5));
        assert!(stored.pinned_at.is_some());
        assert_eq!(seen.lock().unwrap().last(), Some(&(5, 5)));
    }

    #[tokio::test]
    async fn test_upload_with_key_pair_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pinning/pinFileToIPFS"))
            .and(header("pinata_api_key", "k"))
            .and(header("pinata_secret_api_key", "s"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pin_body()))
            .expect(1)
            .mount(&server)
            .await;

        let config = PinataConfig {
            api_url: server.uri(),
            api_key: Some("k".to_string()),
            api_secret: Some("s".to_string()),
            ..PinataConfig::default()
        };
        let backend = PinataBackend::new(Client::new(), config);

        let result = backend.upload(b"hello", "a", &UploadContext::default()).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_non_success_status_becomes_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = PinataBackend::new(Client::new(), jwt_config(&server));
        match backend.upload(b"hello", "a", &UploadContext::default()).await {
            BackendResult::Failure(f) => {
                assert_eq!(f.kind, FailureKind::Http);
                assert_eq!(f.reason, "401 Unauthorized");
            }
            BackendResult::Success(_) => panic!("401 must not succeed"),
        }
    }

    #[tokio::test]
    async fn test_envelope_missing_fields_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "IpfsHash": "QmX" })),
            )
            .mount(&server)
            .await;

        let backend = PinataBackend::new(Client::new(), jwt_config(&server));
        match backend.upload(b"hello", "a", &UploadContext::default()).await {
            BackendResult::Failure(f) => assert_eq!(f.kind, FailureKind::Malformed),
            BackendResult::Success(_) => panic!("partial envelope must not succeed"),
        }
    }

    #[tokio::test]
    async fn test_bad_timestamp_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "IpfsHash": "QmX",
                "PinSize": 5,
                "Timestamp": "yesterday"
            })))
            .mount(&server)
            .await;

        let backend = PinataBackend::new(Client::new(), jwt_config(&server));
        let result = backend.upload(b"hello", "a", &UploadContext::default()).await;
        assert!(matches!(
            result,
            BackendResult::Failure(BackendFailure { kind: FailureKind::Malformed, .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_pin_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(pin_body())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let config = PinataConfig {
            upload_timeout_ms: 200,
            ..jwt_config(&server)
        };
        let backend = PinataBackend::new(Client::new(), config);

        match backend.upload(b"hello", "a", &UploadContext::default()).await {
            BackendResult::Failure(f) => {
                assert_eq!(f.kind, FailureKind::Timeout);
                assert!(f.reason.starts_with("upload timeout"));
            }
            BackendResult::Success(_) => panic!("slow pin must time out"),
        }
    }

    #[tokio::test]
    async fn test_health_check_uses_auth_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/testAuthentication"))
            .and(header("authorization", "Bearer test-jwt"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let backend = PinataBackend::new(Client::new(), jwt_config(&server));
        assert!(backend.health_check().await);

        let failing = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&failing)
            .await;
        let backend = PinataBackend::new(Client::new(), jwt_config(&failing));
        assert!(!backend.health_check().await);
    }

    #[tokio::test]
    async fn test_retrieve_reports_secondary_gateway() {
        let first = MockServer::start().await;
        let second = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&first)
            .await;
        Mock::given(method("GET"))
            .and(path("/ipfs/QmX"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&second)
            .await;

        let config = PinataConfig {
            gateways: vec![first.uri(), second.uri()],
            ..PinataConfig::default()
        };
        let backend = PinataBackend::new(Client::new(), config);
        let retrieved = backend
            .retrieve("QmX", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(retrieved.data, b"hello");
        assert_eq!(retrieved.tier, GatewayTier::Secondary);
    }
}
