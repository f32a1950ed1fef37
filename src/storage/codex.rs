/// Distributed file network backend (Codex).
///
/// Talks to a Codex node's REST API, either a local node or a hosted
/// gateway in front of one. Content is uploaded as a raw octet stream and
/// read back through the network stream endpoint, which fetches from peers
/// when the node does not hold the data itself.
///
/// `base_url` includes the API prefix, e.g. `http://127.0.0.1:8080/api/codex/v1`.
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::gateway::GatewayMirrors;
use super::{
    bounded, progress_body, BackendFailure, BackendResult, GatewayTier, Retrieved,
    RetrieveResult, StorageBackend, StorageType, StoredContent, UploadContext,
    DEFAULT_GATEWAY_TIMEOUT, DEFAULT_HEALTH_TIMEOUT, DEFAULT_UPLOAD_TIMEOUT,
};

/// Configuration for Codex access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodexConfig {
    /// Node or gateway API base. Empty means the backend is not configured.
    pub base_url: String,
    /// Further API bases tried on retrieval after `base_url`.
    pub mirrors: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub upload_timeout_ms: u64,
    pub gateway_timeout_ms: u64,
    pub health_timeout_ms: u64,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/codex/v1".to_string(),
            mirrors: Vec::new(),
            username: None,
            password: None,
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT.as_millis() as u64,
            gateway_timeout_ms: DEFAULT_GATEWAY_TIMEOUT.as_millis() as u64,
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Upload response envelope.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    cid: String,
}

/// Codex storage backend.
pub struct CodexBackend {
    client: Client,
    base_url: String,
    mirrors: GatewayMirrors,
    config: CodexConfig,
}

impl CodexBackend {
    pub fn new(client: Client, config: CodexConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let mut bases = Vec::with_capacity(1 + config.mirrors.len());
        if !base_url.is_empty() {
            bases.push(base_url.clone());
        }
        bases.extend(config.mirrors.iter().cloned());

        let mut mirrors = GatewayMirrors::new(client.clone(), bases)
            .with_attempt_timeout(Duration::from_millis(config.gateway_timeout_ms));
        // Credentials belong to base_url, never to the extra mirrors.
        if let (false, Some(username)) = (base_url.is_empty(), &config.username) {
            mirrors = mirrors.with_origin_basic_auth(username.clone(), config.password.clone());
        }

        Self {
            client,
            base_url,
            mirrors,
            config,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_ref()),
            None => request,
        }
    }

    fn stream_url(base: &str, cid: &str) -> String {
        format!("{base}/data/{cid}/network/stream")
    }

    /// Tier reported for content served straight from `base_url`.
    fn base_tier(&self) -> GatewayTier {
        if is_loopback(&self.base_url) {
            GatewayTier::Local
        } else {
            GatewayTier::Primary
        }
    }

    async fn store(
        &self,
        data: &[u8],
        file_name: &str,
        ctx: &UploadContext,
    ) -> Result<StoredContent, BackendFailure> {
        let request = self
            .client
            .post(format!("{}/data", self.base_url))
            .header("Content-Type", "application/octet-stream")
            .header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
            )
            .body(progress_body(data, ctx));

        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| BackendFailure::network(&e))?;

        if !resp.status().is_success() {
            return Err(BackendFailure::http(resp.status()));
        }

        let uploaded: UploadResponse = resp
            .json()
            .await
            .map_err(|e| BackendFailure::malformed(format!("Codex response parse error: {e}")))?;

        let cid = uploaded.cid.trim();
        if cid.is_empty() {
            return Err(BackendFailure::malformed("Codex returned an empty cid"));
        }

        let mut stored = StoredContent::new(cid)
            .with_gateway(Self::stream_url(&self.base_url, cid), self.base_tier());
        stored.size = Some(data.len() as u64);
        Ok(stored)
    }

    async fn debug_info(&self) -> Result<(), BackendFailure> {
        let resp = self
            .authorize(self.client.get(format!("{}/debug/info", self.base_url)))
            .send()
            .await
            .map_err(|e| BackendFailure::network(&e))?;

        if !resp.status().is_success() {
            return Err(BackendFailure::http(resp.status()));
        }
        Ok(())
    }
}

fn is_loopback(base_url: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(base_url) else {
        return false;
    };
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_matches(['[', ']'])
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}

#[async_trait]
impl StorageBackend for CodexBackend {
    fn name(&self) -> &str {
        "codex"
    }

    fn storage_type(&self) -> StorageType {
        StorageType::DistributedFs
    }

    fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.config.upload_timeout_ms)
    }

    async fn upload(&self, data: &[u8], file_name: &str, ctx: &UploadContext) -> BackendResult {
        if self.base_url.is_empty() {
            return BackendResult::failure(BackendFailure::configuration(
                "Codex base_url not configured",
            ));
        }

        let stored = bounded(
            self.store(data, file_name, ctx),
            self.upload_timeout(),
            &ctx.cancel,
            "upload timeout",
        )
        .await;

        if let Ok(stored) = &stored {
            info!(backend = "codex", cid = %stored.content_id, file_name, "Stored on Codex");
        }
        stored.into()
    }

    async fn retrieve(&self, content_id: &str, cancel: &CancellationToken) -> RetrieveResult {
        let retrieved = self
            .mirrors
            .fetch_with(|base| Self::stream_url(base, content_id), cancel)
            .await?;

        // Mirror 0 is base_url itself.
        let tier = match retrieved.tier {
            GatewayTier::Primary if !self.base_url.is_empty() => self.base_tier(),
            tier => tier,
        };

        Ok(Retrieved { tier, ..retrieved })
    }

    async fn health_check(&self) -> bool {
        if self.base_url.is_empty() {
            return false;
        }

        let limit = Duration::from_millis(self.config.health_timeout_ms);
        let cancel = CancellationToken::new();
        match bounded(self.debug_info(), limit, &cancel, "health timeout").await {
            Ok(()) => true,
            Err(failure) => {
                debug!(backend = "codex", error = %failure, "Health check failed");
                false
            }
        }
    }
}
