/// Commit pipeline orchestrator.
///
/// Publishes one encrypted artifact to the first storage backend that
/// accepts it:
/// 1. Walk the backends in their configured priority order
/// 2. Skip any backend whose health probe fails
/// 3. Upload to the first healthy one; stop at the first success
/// 4. Tag the result with that backend's storage type and URI scheme
///
/// Attempts are strictly sequential. Every health probe and upload is
/// bounded, so a hung backend delays the commit by at most its timeout.
/// If no backend accepts the artifact the caller gets a single
/// exhaustion error listing what happened to each backend.
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::artifact::EncryptedArtifact;
use crate::config::CommitConfig;
use crate::error::{BackendAttempt, CommitError, Result};
use crate::storage::codex::CodexBackend;
use crate::storage::ipfs::IpfsBackend;
use crate::storage::pinata::PinataBackend;
use crate::storage::{
    bounded, BackendResult, FailureKind, Retrieved, StorageBackend, StorageType, StoredContent,
    UploadContext, DEFAULT_HEALTH_TIMEOUT,
};

/// A successfully committed artifact.
///
/// Only the pipeline builds these, which keeps `payload_uri` and
/// `storage_type` in agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    artifact: EncryptedArtifact,
    storage_type: StorageType,
    payload_uri: String,
    backend_specific: StoredContent,
}

impl CommitResult {
    pub(crate) fn new(
        artifact: EncryptedArtifact,
        storage_type: StorageType,
        stored: StoredContent,
    ) -> Self {
        Self {
            payload_uri: storage_type.uri_for(&stored.content_id),
            artifact,
            storage_type,
            backend_specific: stored,
        }
    }

    pub fn artifact(&self) -> &EncryptedArtifact {
        &self.artifact
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub fn payload_uri(&self) -> &str {
        &self.payload_uri
    }

    pub fn backend_specific(&self) -> &StoredContent {
        &self.backend_specific
    }

    pub fn into_artifact(self) -> EncryptedArtifact {
        self.artifact
    }
}

/// Health of one configured backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHealth {
    pub backend: String,
    pub storage_type: StorageType,
    pub healthy: bool,
}

/// Ordered set of storage backends with first-success-wins semantics.
///
/// Holds only read-only configuration, so one pipeline can be shared
/// across concurrent commits.
pub struct CommitPipeline {
    backends: Vec<Arc<dyn StorageBackend>>,
    health_timeout: Duration,
}

impl CommitPipeline {
    /// Pipeline over `backends`, tried in the given order.
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        Self {
            backends,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Build the three standard backends from configuration, ordered by
    /// `config.order`.
    pub fn from_config(config: &CommitConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(concat!("canary-commit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CommitError::Config(format!("HTTP client: {e}")))?;

        let backends = config
            .order
            .iter()
            .map(|storage_type| -> Arc<dyn StorageBackend> {
                match storage_type {
                    StorageType::PrimaryNetwork => {
                        Arc::new(IpfsBackend::new(client.clone(), config.primary.clone()))
                    }
                    StorageType::PinningService => {
                        Arc::new(PinataBackend::new(client.clone(), config.pinning.clone()))
                    }
                    StorageType::DistributedFs => {
                        Arc::new(CodexBackend::new(client.clone(), config.codex.clone()))
                    }
                }
            })
            .collect();

        Ok(Self::new(backends).with_health_timeout(config.health_timeout()))
    }

    pub fn backends(&self) -> &[Arc<dyn StorageBackend>] {
        &self.backends
    }

    /// First configured backend of the given type.
    pub fn backend(&self, storage_type: StorageType) -> Option<&dyn StorageBackend> {
        self.backends
            .iter()
            .find(|b| b.storage_type() == storage_type)
            .map(|b| b.as_ref())
    }

    /// Commit `artifact` to the first healthy backend that accepts it.
    pub async fn commit(
        &self,
        artifact: EncryptedArtifact,
        ctx: &UploadContext,
    ) -> Result<CommitResult> {
        let file_name = artifact.upload_file_name();
        let mut attempts = Vec::with_capacity(self.backends.len());

        info!(
            file_name = %file_name,
            bytes = artifact.ciphertext.len(),
            backends = self.backends.len(),
            "Starting commit"
        );

        for backend in &self.backends {
            if ctx.cancel.is_cancelled() {
                return Err(CommitError::Cancelled);
            }

            if !self.is_healthy(backend.as_ref(), &ctx.cancel).await {
                if ctx.cancel.is_cancelled() {
                    return Err(CommitError::Cancelled);
                }
                warn!(backend = backend.name(), "Backend unhealthy, skipping");
                attempts.push(BackendAttempt {
                    backend: backend.name().to_string(),
                    outcome: "unhealthy".to_string(),
                });
                continue;
            }

            match upload_bounded(backend.as_ref(), &artifact.ciphertext, &file_name, ctx).await {
                BackendResult::Success(stored) => {
                    let result = CommitResult::new(artifact, backend.storage_type(), stored);
                    info!(
                        backend = backend.name(),
                        payload_uri = %result.payload_uri(),
                        "Commit complete"
                    );
                    return Ok(result);
                }
                BackendResult::Failure(failure) if failure.kind == FailureKind::Cancelled => {
                    return Err(CommitError::Cancelled);
                }
                BackendResult::Failure(failure) => {
                    warn!(
                        backend = backend.name(),
                        error = %failure,
                        "Upload failed, trying next backend"
                    );
                    attempts.push(BackendAttempt {
                        backend: backend.name().to_string(),
                        outcome: failure.reason,
                    });
                }
            }
        }

        Err(CommitError::NoBackendAvailable { attempts })
    }

    /// Commit to the first configured backend of `storage_type`, with no
    /// fallback.
    pub async fn commit_to(
        &self,
        artifact: EncryptedArtifact,
        storage_type: StorageType,
        ctx: &UploadContext,
    ) -> Result<CommitResult> {
        let backend = self
            .backend(storage_type)
            .ok_or(CommitError::BackendNotConfigured(storage_type))?;
        commit_to_single_backend(artifact, backend, ctx).await
    }

    /// Fetch the ciphertext behind a payload URI from the backend its
    /// scheme names.
    pub async fn retrieve(
        &self,
        payload_uri: &str,
        cancel: &CancellationToken,
    ) -> Result<Retrieved> {
        let (storage_type, content_id) =
            StorageType::from_payload_uri(payload_uri).ok_or_else(|| {
                CommitError::InvalidInput(format!("invalid payload URI {payload_uri:?}"))
            })?;

        let backend = self
            .backend(storage_type)
            .ok_or(CommitError::BackendNotConfigured(storage_type))?;

        match backend.retrieve(content_id, cancel).await {
            Ok(retrieved) => {
                info!(
                    backend = backend.name(),
                    tier = %retrieved.tier,
                    bytes = retrieved.data.len(),
                    "Retrieved payload"
                );
                Ok(retrieved)
            }
            Err(failure) if failure.kind == FailureKind::Cancelled => Err(CommitError::Cancelled),
            Err(failure) => Err(CommitError::Backend {
                backend: backend.name().to_string(),
                reason: failure.reason,
            }),
        }
    }

    /// Probe every backend in order.
    pub async fn health(&self) -> Vec<BackendHealth> {
        let cancel = CancellationToken::new();
        let mut report = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            report.push(BackendHealth {
                backend: backend.name().to_string(),
                storage_type: backend.storage_type(),
                healthy: self.is_healthy(backend.as_ref(), &cancel).await,
            });
        }
        report
    }

    async fn is_healthy(&self, backend: &dyn StorageBackend, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            res = tokio::time::timeout(self.health_timeout, backend.health_check()) => {
                res.unwrap_or(false)
            }
        }
    }
}

/// Commit to exactly one backend. Any failure is returned as-is; no other
/// backend is tried and no health probe runs first.
pub async fn commit_to_single_backend(
    artifact: EncryptedArtifact,
    backend: &dyn StorageBackend,
    ctx: &UploadContext,
) -> Result<CommitResult> {
    if ctx.cancel.is_cancelled() {
        return Err(CommitError::Cancelled);
    }

    let file_name = artifact.upload_file_name();
    match upload_bounded(backend, &artifact.ciphertext, &file_name, ctx).await {
        BackendResult::Success(stored) => {
            let result = CommitResult::new(artifact, backend.storage_type(), stored);
            info!(
                backend = backend.name(),
                payload_uri = %result.payload_uri(),
                "Single-backend commit complete"
            );
            Ok(result)
        }
        BackendResult::Failure(failure) if failure.kind == FailureKind::Cancelled => {
            Err(CommitError::Cancelled)
        }
        BackendResult::Failure(failure) => Err(CommitError::Backend {
            backend: backend.name().to_string(),
            reason: failure.reason,
        }),
    }
}

/// Upload with the backend's declared bound applied on top of its own.
async fn upload_bounded(
    backend: &dyn StorageBackend,
    data: &[u8],
    file_name: &str,
    ctx: &UploadContext,
) -> BackendResult {
    let upload = async {
        match backend.upload(data, file_name, ctx).await {
            BackendResult::Success(stored) => Ok(stored),
            BackendResult::Failure(failure) => Err(failure),
        }
    };
    bounded(upload, backend.upload_timeout(), &ctx.cancel, "upload timeout")
        .await
        .into()
}
