/// Content-addressed storage backends for encrypted artifacts.
///
/// Every backend sits behind the same `StorageBackend` contract so the
/// commit pipeline can walk them in priority order:
/// - Primary network: an IPFS node session (most decentralized, tried first)
/// - Pinning service: Pinata, reached over its HTTP pinning API
/// - Distributed FS: a Codex node or gateway
///
/// Backends only ever see ciphertext. Ordinary failures (missing
/// credentials, timeouts, bad status codes, malformed bodies) come back as
/// `BackendResult::Failure` values rather than errors.
pub mod codex;
pub mod gateway;
pub mod ipfs;
pub mod pinata;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Upload bound for the HTTP backends.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound on a single mirror attempt during retrieval.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on a health probe.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Chunk size used when streaming upload bodies.
const PROGRESS_CHUNK: usize = 64 * 1024;

/// Which storage system holds a committed artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    PrimaryNetwork,
    PinningService,
    DistributedFs,
}

impl StorageType {
    /// URI scheme for payloads stored on this backend. Schemes are distinct
    /// so a payload URI alone identifies its backend.
    pub fn scheme(self) -> &'static str {
        match self {
            StorageType::PrimaryNetwork => "net",
            StorageType::PinningService => "ipfs",
            StorageType::DistributedFs => "codex",
        }
    }

    pub fn uri_for(self, content_id: &str) -> String {
        format!("{}://{}", self.scheme(), content_id)
    }

    /// Split a payload URI into its backend and content id.
    ///
    /// The id becomes a single URL path segment, so ids containing path,
    /// query or fragment delimiters are rejected.
    pub fn from_payload_uri(uri: &str) -> Option<(StorageType, &str)> {
        let (scheme, cid) = uri.split_once("://")?;
        if cid.is_empty() || cid.contains(['/', '?', '#', '\\']) || cid == ".." {
            return None;
        }
        let storage_type = [
            StorageType::PrimaryNetwork,
            StorageType::PinningService,
            StorageType::DistributedFs,
        ]
        .into_iter()
        .find(|t| t.scheme() == scheme)?;
        Some((storage_type, cid))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StorageType::PrimaryNetwork => "primary_network",
            StorageType::PinningService => "pinning_service",
            StorageType::DistributedFs => "distributed_fs",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which mirror served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayTier {
    Primary,
    Secondary,
    Local,
}

impl GatewayTier {
    /// Tier for the mirror at `index` in a gateway list.
    pub fn for_mirror(index: usize) -> Self {
        if index == 0 {
            GatewayTier::Primary
        } else {
            GatewayTier::Secondary
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayTier::Primary => "primary",
            GatewayTier::Secondary => "secondary",
            GatewayTier::Local => "local",
        }
    }
}

impl fmt::Display for GatewayTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credentials or endpoints missing; no request was made.
    Configuration,
    Timeout,
    /// Non-2xx response.
    Http,
    /// Connection-level error.
    Network,
    /// Response body did not match the backend's envelope.
    Malformed,
    Cancelled,
}

/// Why a single backend call did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct BackendFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl BackendFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Configuration, reason)
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, reason)
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Malformed, reason)
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "cancelled")
    }

    /// `"<status> <statusText>"` for a non-2xx response.
    pub fn http(status: reqwest::StatusCode) -> Self {
        Self::new(FailureKind::Http, status.to_string())
    }

    pub fn network(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("request timeout: {err}"))
        } else {
            Self::new(FailureKind::Network, err.to_string())
        }
    }
}

/// Backend-specific details of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    pub content_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_tier: Option<GatewayTier>,
    /// Size reported by the backend, if it reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_at: Option<DateTime<Utc>>,
}

impl StoredContent {
    pub fn new(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            gateway_url: None,
            gateway_tier: None,
            size: None,
            pinned_at: None,
        }
    }

    pub fn with_gateway(mut self, url: impl Into<String>, tier: GatewayTier) -> Self {
        self.gateway_url = Some(url.into());
        self.gateway_tier = Some(tier);
        self
    }
}

/// Outcome of a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendResult {
    Success(StoredContent),
    Failure(BackendFailure),
}

impl BackendResult {
    pub fn failure(failure: BackendFailure) -> Self {
        BackendResult::Failure(failure)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BackendResult::Success(_))
    }
}

impl From<std::result::Result<StoredContent, BackendFailure>> for BackendResult {
    fn from(result: std::result::Result<StoredContent, BackendFailure>) -> Self {
        match result {
            Ok(stored) => BackendResult::Success(stored),
            Err(failure) => BackendResult::Failure(failure),
        }
    }
}

/// Bytes fetched back from a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub data: Vec<u8>,
    pub tier: GatewayTier,
    /// URL (or node description) that served the bytes.
    pub source: String,
}

pub type RetrieveResult = std::result::Result<Retrieved, BackendFailure>;

/// Receives `(bytes_sent, bytes_total)` while an upload body streams out.
pub trait UploadProgress: Send + Sync {
    fn on_progress(&self, bytes_sent: u64, bytes_total: u64);
}

impl<F> UploadProgress for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, bytes_sent: u64, bytes_total: u64) {
        self(bytes_sent, bytes_total)
    }
}

/// Per-call options threaded through every upload.
#[derive(Clone, Default)]
pub struct UploadContext {
    pub progress: Option<Arc<dyn UploadProgress>>,
    pub cancel: CancellationToken,
}

impl UploadContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            progress: None,
            cancel,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn UploadProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn report(&self, bytes_sent: u64, bytes_total: u64) {
        if let Some(progress) = &self.progress {
            progress.on_progress(bytes_sent, bytes_total);
        }
    }
}

impl fmt::Debug for UploadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadContext")
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Trait for pluggable storage backends.
///
/// Implementations must bound every network call by a timeout and must
/// never panic or return an error type for ordinary failures.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs and error summaries (e.g. "pinata").
    fn name(&self) -> &str;

    fn storage_type(&self) -> StorageType;

    /// Upper bound the pipeline applies on top of the adapter's own timeout.
    fn upload_timeout(&self) -> Duration {
        DEFAULT_UPLOAD_TIMEOUT
    }

    async fn upload(&self, data: &[u8], file_name: &str, ctx: &UploadContext) -> BackendResult;

    async fn retrieve(&self, content_id: &str, cancel: &CancellationToken) -> RetrieveResult;

    async fn health_check(&self) -> bool;
}

/// Run `fut` until it finishes, `limit` elapses, or `cancel` fires.
///
/// On expiry the failure reads `"<label> after <limit>"`.
pub(crate) async fn bounded<T, F>(
    fut: F,
    limit: Duration,
    cancel: &CancellationToken,
    label: &str,
) -> std::result::Result<T, BackendFailure>
where
    F: Future<Output = std::result::Result<T, BackendFailure>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BackendFailure::cancelled()),
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(BackendFailure::timeout(format!("{label} after {limit:?}"))),
        },
    }
}

/// Build a streaming request body that reports progress per chunk.
pub(crate) fn progress_body(data: &[u8], ctx: &UploadContext) -> reqwest::Body {
    let total = data.len() as u64;
    let chunks: Vec<Vec<u8>> = data.chunks(PROGRESS_CHUNK).map(<[u8]>::to_vec).collect();
    let progress = ctx.progress.clone();
    let mut sent = 0u64;

    let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        if let Some(p) = &progress {
            p.on_progress(sent, total);
        }
        Ok::<_, std::io::Error>(chunk)
    }));

    reqwest::Body::wrap_stream(stream)
}
