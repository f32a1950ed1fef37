/// Primary content network backend: an IPFS node session.
///
/// Each call launches a short-lived node session through a `NodeLauncher`,
/// runs one operation against it and stops it again, on success, failure
/// and timeout alike. The shipped launcher talks to a Kubo node over its
/// HTTP RPC API (typically localhost:5001).
///
/// Retrieval goes through public gateways first. Launching a node just to
/// read back content is expensive, so the local-node fallback is an
/// explicit config switch and is logged when taken.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::gateway::{GatewayMirrors, DEFAULT_GATEWAYS};
use super::{
    bounded, progress_body, BackendFailure, BackendResult, GatewayTier, Retrieved,
    RetrieveResult, StorageBackend, StorageType, StoredContent, UploadContext,
    DEFAULT_GATEWAY_TIMEOUT, DEFAULT_HEALTH_TIMEOUT,
};

/// Bound on stopping a node session.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the primary network backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpfsConfig {
    /// Kubo RPC endpoint (e.g., "http://127.0.0.1:5001").
    pub api_url: String,
    /// Gateways tried in order on retrieval.
    pub gateways: Vec<String>,
    /// Launch a node to read content when every gateway fails.
    pub local_node_fallback: bool,
    pub launch_timeout_ms: u64,
    pub upload_timeout_ms: u64,
    pub gateway_timeout_ms: u64,
    pub health_timeout_ms: u64,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5001".to_string(),
            gateways: DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect(),
            local_node_fallback: true,
            launch_timeout_ms: 15_000,
            upload_timeout_ms: 60_000,
            gateway_timeout_ms: DEFAULT_GATEWAY_TIMEOUT.as_millis() as u64,
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT.as_millis() as u64,
        }
    }
}

/// A running node session.
#[async_trait]
pub trait ContentNode: Send + Sync {
    /// Add bytes and return the content identifier as a string.
    async fn add(&self, data: &[u8], ctx: &UploadContext) -> Result<String, BackendFailure>;

    async fn cat(&self, cid: &str) -> Result<Vec<u8>, BackendFailure>;

    /// Cheapest liveness request the node supports.
    async fn ping(&self) -> Result<(), BackendFailure>;

    /// Release the session. Called exactly once per launched node.
    async fn stop(&self);
}

/// Starts node sessions on demand.
#[async_trait]
pub trait NodeLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn ContentNode>, BackendFailure>;
}

/// Launcher for a Kubo node reached over HTTP RPC.
pub struct KuboLauncher {
    client: Client,
    api_url: String,
}

impl KuboLauncher {
    pub fn new(client: Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl NodeLauncher for KuboLauncher {
    async fn launch(&self) -> Result<Box<dyn ContentNode>, BackendFailure> {
        if self.api_url.is_empty() {
            return Err(BackendFailure::configuration("IPFS api_url not configured"));
        }
        Ok(Box::new(KuboNode {
            client: self.client.clone(),
            api_url: self.api_url.clone(),
        }))
    }
}

struct KuboNode {
    client: Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KuboAddResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KuboIdResponse {
    #[serde(rename = "ID")]
    id: String,
}

impl KuboNode {
    fn rpc(&self, call: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}/api/v0/{call}", self.api_url))
    }
}

#[async_trait]
impl ContentNode for KuboNode {
    async fn add(&self, data: &[u8], ctx: &UploadContext) -> Result<String, BackendFailure> {
        let body = progress_body(data, ctx);
        let part = multipart::Part::stream_with_length(body, data.len() as u64).file_name("data");
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .rpc("add")
            .query(&[("pin", "true"), ("cid-version", "1")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendFailure::network(&e))?;

        if !resp.status().is_success() {
            return Err(BackendFailure::http(resp.status()));
        }

        let add_resp: KuboAddResponse = resp
            .json()
            .await
            .map_err(|e| BackendFailure::malformed(format!("IPFS add parse error: {e}")))?;

        if add_resp.hash.is_empty() {
            return Err(BackendFailure::malformed("IPFS add returned an empty hash"));
        }

        Ok(add_resp.hash)
    }

    async fn cat(&self, cid: &str) -> Result<Vec<u8>, BackendFailure> {
        let resp = self
            .rpc("cat")
            .query(&[("arg", cid)])
            .send()
            .await
            .map_err(|e| BackendFailure::network(&e))?;

        if !resp.status().is_success() {
            return Err(BackendFailure::http(resp.status()));
        }

        let bytes = resp.bytes().await.map_err(|e| BackendFailure::network(&e))?;
        Ok(bytes.to_vec())
    }

    async fn ping(&self) -> Result<(), BackendFailure> {
        let resp = self
            .rpc("id")
            .send()
            .await
            .map_err(|e| BackendFailure::network(&e))?;

        if !resp.status().is_success() {
            return Err(BackendFailure::http(resp.status()));
        }

        let id: KuboIdResponse = resp
            .json()
            .await
            .map_err(|e| BackendFailure::malformed(format!("IPFS id parse error: {e}")))?;
        debug!(peer_id = %id.id, "IPFS node reachable");
        Ok(())
    }

    async fn stop(&self) {
        debug!(api_url = %self.api_url, "IPFS node session released");
    }
}

/// Primary network storage backend.
pub struct IpfsBackend {
    launcher: Box<dyn NodeLauncher>,
    gateways: GatewayMirrors,
    config: IpfsConfig,
}

impl IpfsBackend {
    /// Backend talking to the Kubo node at `config.api_url`.
    pub fn new(client: Client, config: IpfsConfig) -> Self {
        let launcher = KuboLauncher::new(client.clone(), &config.api_url);
        Self::with_launcher(client, config, Box::new(launcher))
    }

    pub fn with_launcher(
        client: Client,
        config: IpfsConfig,
        launcher: Box<dyn NodeLauncher>,
    ) -> Self {
        let gateways = GatewayMirrors::new(client, config.gateways.clone())
            .with_attempt_timeout(Duration::from_millis(config.gateway_timeout_ms));
        Self {
            launcher,
            gateways,
            config,
        }
    }

    async fn launch(&self, cancel: &CancellationToken) -> Result<NodeSession, BackendFailure> {
        let limit = Duration::from_millis(self.config.launch_timeout_ms);
        let node = bounded(self.launcher.launch(), limit, cancel, "node launch timeout").await?;
        Ok(NodeSession::new(node))
    }
}

/// A launched node that is stopped exactly once.
///
/// `release` stops it in line. If the future holding the session is
/// dropped first (an outer timeout or cancellation), `Drop` hands the stop
/// to a background task instead.
struct NodeSession {
    node: Arc<dyn ContentNode>,
    released: bool,
}

impl NodeSession {
    fn new(node: Box<dyn ContentNode>) -> Self {
        Self {
            node: Arc::from(node),
            released: false,
        }
    }

    fn node(&self) -> &dyn ContentNode {
        self.node.as_ref()
    }

    /// Stop the node and wait for it. The stop runs as its own task, so it
    /// still finishes if this future is dropped part way.
    async fn release(mut self) {
        self.released = true;
        if let Err(e) = tokio::spawn(stop_node(self.node.clone())).await {
            warn!(backend = "ipfs-node", error = %e, "Node stop task failed");
        }
    }
}

impl Drop for NodeSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let node = self.node.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(backend = "ipfs-node", "Node session abandoned, stopping in background");
                handle.spawn(stop_node(node));
            }
            Err(_) => warn!(backend = "ipfs-node", "No runtime to stop abandoned node session"),
        }
    }
}

/// Stop a node without letting a stuck node hold up the caller.
async fn stop_node(node: Arc<dyn ContentNode>) {
    if tokio::time::timeout(STOP_TIMEOUT, node.stop()).await.is_err() {
        warn!(backend = "ipfs-node", "Node session did not stop in time");
    }
}

#[async_trait]
impl StorageBackend for IpfsBackend {
    fn name(&self) -> &str {
        "ipfs-node"
    }

    fn storage_type(&self) -> StorageType {
        StorageType::PrimaryNetwork
    }

    fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.config.launch_timeout_ms + self.config.upload_timeout_ms)
    }

    async fn upload(&self, data: &[u8], file_name: &str, ctx: &UploadContext) -> BackendResult {
        let total = data.len() as u64;
        let limit = Duration::from_millis(self.config.upload_timeout_ms);

        let session = match self.launch(&ctx.cancel).await {
            Ok(session) => session,
            Err(failure) => return BackendResult::Failure(failure),
        };
        let added = bounded(session.node().add(data, ctx), limit, &ctx.cancel, "upload timeout")
            .await;
        session.release().await;

        match added {
            Ok(cid) => {
                info!(backend = "ipfs-node", cid = %cid, file_name, "Added to IPFS");
                BackendResult::Success(StoredContent {
                    size: Some(total),
                    ..StoredContent::new(cid)
                })
            }
            Err(failure) => BackendResult::Failure(failure),
        }
    }

    async fn retrieve(&self, content_id: &str, cancel: &CancellationToken) -> RetrieveResult {
        let gateway_failure = match self.gateways.fetch(content_id, cancel).await {
            Ok(retrieved) => return Ok(retrieved),
            Err(failure) => failure,
        };

        if !self.config.local_node_fallback || cancel.is_cancelled() {
            return Err(gateway_failure);
        }

        warn!(
            backend = "ipfs-node",
            cid = %content_id,
            error = %gateway_failure,
            "Gateways exhausted, launching a local node for retrieval"
        );

        let limit = Duration::from_millis(self.config.gateway_timeout_ms);
        let fetched = match self.launch(cancel).await {
            Ok(session) => {
                let fetched = bounded(
                    session.node().cat(content_id),
                    limit,
                    cancel,
                    "local node timeout",
                )
                .await;
                session.release().await;
                fetched
            }
            Err(failure) => Err(failure),
        };
        let data = fetched.map_err(|local| {
            BackendFailure::new(local.kind, format!("{gateway_failure}; local node: {local}"))
        })?;

        Ok(Retrieved {
            data,
            tier: GatewayTier::Local,
            source: format!("local node {}", self.config.api_url),
        })
    }

    async fn health_check(&self) -> bool {
        let limit = Duration::from_millis(self.config.health_timeout_ms);
        let cancel = CancellationToken::new();
        let session = match self.launch(&cancel).await {
            Ok(session) => session,
            Err(failure) => {
                debug!(backend = "ipfs-node", error = %failure, "Health check failed");
                return false;
            }
        };
        let pinged = bounded(session.node().ping(), limit, &cancel, "health timeout").await;
        session.release().await;
        pinged.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{AccessCondition, Address, DossierId, EncryptedArtifact};
    use crate::error::CommitError;
    use crate::pipeline::CommitPipeline;
    use crate::storage::FailureKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted node behaviour for launcher tests.
    #[derive(Clone, Copy)]
    enum NodeScript {
        Ok,
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct LaunchCounters {
        launched: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl LaunchCounters {
        fn launched(&self) -> usize {
            self.launched.load(Ordering::SeqCst)
        }

        fn stopped(&self) -> usize {
            self.stopped.load(Ordering::SeqCst)
        }
    }

    struct StubLauncher {
        script: NodeScript,
        add_script: NodeScript,
        launch_delay: Duration,
        cid: String,
        content: Vec<u8>,
        counters: Arc<LaunchCounters>,
        added: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl StubLauncher {
        fn new(script: NodeScript, cid: &str) -> Self {
            Self {
                script,
                add_script: script,
                launch_delay: Duration::ZERO,
                cid: cid.to_string(),
                content: b"from-local-node".to_vec(),
                counters: Arc::new(LaunchCounters::default()),
                added: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn with_add_script(mut self, script: NodeScript) -> Self {
            self.add_script = script;
            self
        }

        fn with_launch_delay(mut self, delay: Duration) -> Self {
            self.launch_delay = delay;
            self
        }
    }

    struct StubNode {
        script: NodeScript,
        add_script: NodeScript,
        cid: String,
        content: Vec<u8>,
        counters: Arc<LaunchCounters>,
        added: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    async fn act<T>(script: NodeScript, value: T) -> Result<T, BackendFailure> {
        match script {
            NodeScript::Ok => Ok(value),
            NodeScript::Fail => Err(BackendFailure::new(FailureKind::Network, "refused")),
            NodeScript::Hang => std::future::pending().await,
        }
    }

    #[async_trait]
    impl ContentNode for StubNode {
        async fn add(&self, data: &[u8], _ctx: &UploadContext) -> Result<String, BackendFailure> {
            self.added.lock().unwrap().push(data.to_vec());
            act(self.add_script, self.cid.clone()).await
        }

        async fn cat(&self, _cid: &str) -> Result<Vec<u8>, BackendFailure> {
            act(self.script, self.content.clone()).await
        }

        async fn ping(&self) -> Result<(), BackendFailure> {
            act(self.script, ()).await
        }

        async fn stop(&self) {
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl NodeLauncher for StubLauncher {
        async fn launch(&self) -> Result<Box<dyn ContentNode>, BackendFailure> {
            self.counters.launched.fetch_add(1, Ordering::SeqCst);
            if !self.launch_delay.is_zero() {
                tokio::time::sleep(self.launch_delay).await;
            }
            Ok(Box::new(StubNode {
                script: self.script,
                add_script: self.add_script,
                cid: self.cid.clone(),
                content: self.content.clone(),
                counters: self.counters.clone(),
                added: self.added.clone(),
            }))
        }
    }

    /// Let background stop tasks for abandoned sessions run.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn artifact() -> EncryptedArtifact {
        EncryptedArtifact {
            ciphertext: b"ciphertext".to_vec(),
            original_file_name: "letter.txt".to_string(),
            description: String::new(),
            capsule_uri: "taco://capsule/1".to_string(),
            condition: AccessCondition::no_activity(
                DossierId::from(1),
                Address::from_bytes([0x11; 20]),
                "7 days",
            ),
        }
    }

    fn config_with_gateways(gateways: Vec<String>) -> IpfsConfig {
        IpfsConfig {
            gateways,
            ..IpfsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_upload_returns_cid_and_releases_node() {
        let launcher = StubLauncher::new(NodeScript::Ok, "cidA");
        let counters = launcher.counters.clone();
        let added = launcher.added.clone();
        let backend =
            IpfsBackend::with_launcher(Client::new(), IpfsConfig::default(), Box::new(launcher));

        let result = backend
            .upload(b"hello", "a.txt", &UploadContext::default())
            .await;

        match result {
            BackendResult::Success(stored) => {
                assert_eq!(stored.content_id, "cidA");
                assert_eq!(stored.gateway_url, None);
                assert_eq!(stored.gateway_tier, None);
            }
            BackendResult::Failure(f) => panic!("unexpected failure: {f}"),
        }
        assert_eq!(*added.lock().unwrap(), vec![b"hello".to_vec()]);
        assert_eq!(counters.launched.load(Ordering::SeqCst), 1);
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_still_releases_node() {
        let launcher = StubLauncher::new(NodeScript::Fail, "cidA");
        let counters = launcher.counters.clone();
        let backend =
            IpfsBackend::with_launcher(Client::new(), IpfsConfig::default(), Box::new(launcher));

        let result = backend.upload(b"hello", "a.txt", &UploadContext::default()).await;

        assert!(!result.is_success());
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_upload_times_out_and_releases_node() {
        let launcher = StubLauncher::new(NodeScript::Hang, "cidA");
        let counters = launcher.counters.clone();
        let backend =
            IpfsBackend::with_launcher(Client::new(), IpfsConfig::default(), Box::new(launcher));

        let result = backend.upload(b"hello", "a.txt", &UploadContext::default()).await;

        match result {
            BackendResult::Failure(f) => assert!(f.reason.starts_with("upload timeout")),
            BackendResult::Success(_) => panic!("hanging node must not succeed"),
        }
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_reduces_hang_to_false() {
        let launcher = StubLauncher::new(NodeScript::Hang, "cidA");
        let counters = launcher.counters.clone();
        let backend =
            IpfsBackend::with_launcher(Client::new(), IpfsConfig::default(), Box::new(launcher));

        assert!(!backend.health_check().await);
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrieve_uses_local_node_after_gateways_fail() {
        let gateway = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(504))
            .mount(&gateway)
            .await;

        let launcher = StubLauncher::new(NodeScript::Ok, "cidA");
        let counters = launcher.counters.clone();
        let backend = IpfsBackend::with_launcher(
            Client::new(),
            config_with_gateways(vec![gateway.uri()]),
            Box::new(launcher),
        );

        let retrieved = backend
            .retrieve("cidA", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(retrieved.tier, GatewayTier::Local);
        assert_eq!(retrieved.data, b"from-local-node");
        assert_eq!(counters.launched.load(Ordering::SeqCst), 1);
        assert_eq!(counters.stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrieve_without_local_fallback_never_launches() {
        let gateway = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&gateway)
            .await;

        let launcher = StubLauncher::new(NodeScript::Ok, "cidA");
        let counters = launcher.counters.clone();
        let config = IpfsConfig {
            local_node_fallback: false,
            ..config_with_gateways(vec![gateway.uri()])
        };
        let backend = IpfsBackend::with_launcher(Client::new(), config, Box::new(launcher));

        let failure = backend
            .retrieve("cidA", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(failure.reason.contains("404 Not Found"));
        assert_eq!(counters.launched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_kubo_add_and_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/add"))
            .and(query_param("pin", "true"))
            .and(query_param("cid-version", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Name": "data",
                "Hash": "bafybeigdyrzt",
                "Size": "13"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/id"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ID": "12D3KooW" })),
            )
            .mount(&server)
            .await;

        let config = IpfsConfig {
            api_url: server.uri(),
            ..IpfsConfig::default()
        };
        let backend = IpfsBackend::new(Client::new(), config);

        assert!(backend.health_check().await);
        match backend.upload(b"ciphertext", "f", &UploadContext::default()).await {
            BackendResult::Success(stored) => assert_eq!(stored.content_id, "bafybeigdyrzt"),
            BackendResult::Failure(f) => panic!("unexpected failure: {f}"),
        }
    }

    #[tokio::test]
    async fn test_kubo_malformed_add_response_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/add"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let config = IpfsConfig {
            api_url: server.uri(),
            ..IpfsConfig::default()
        };
        let backend = IpfsBackend::new(Client::new(), config);

        match backend.upload(b"x", "f", &UploadContext::default()).await {
            BackendResult::Failure(f) => {
                assert_eq!(f.kind, FailureKind::Malformed)
            }
            BackendResult::Success(_) => panic!("malformed body must not succeed"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_health_timeout_still_stops_node() {
        let launcher = StubLauncher::new(NodeScript::Hang, "cidA")
            .with_launch_delay(Duration::from_millis(100));
        let counters = launcher.counters.clone();
        let backend =
            IpfsBackend::with_launcher(Client::new(), IpfsConfig::default(), Box::new(launcher));
        let pipeline = CommitPipeline::new(vec![Arc::new(backend) as Arc<dyn StorageBackend>]);

        let report = pipeline.health().await;
        settle().await;

        assert!(!report[0].healthy);
        assert_eq!(counters.launched(), 1);
        assert_eq!(counters.stopped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_commit_stops_every_launched_node() {
        let launcher = StubLauncher::new(NodeScript::Ok, "cidA").with_add_script(NodeScript::Hang);
        let counters = launcher.counters.clone();
        let backend =
            IpfsBackend::with_launcher(Client::new(), IpfsConfig::default(), Box::new(launcher));
        let pipeline = CommitPipeline::new(vec![Arc::new(backend) as Arc<dyn StorageBackend>]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = pipeline
            .commit(artifact(), &UploadContext::new(cancel))
            .await
            .unwrap_err();
        settle().await;

        assert!(matches!(err, CommitError::Cancelled));
        assert_eq!(counters.launched(), 2);
        assert_eq!(counters.stopped(), 2);
    }

    #[tokio::test]
    async fn test_kubo_add_streams_progress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/add"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Hash": "bafy" })),
            )
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ctx = UploadContext::default().with_progress(Arc::new(move |sent: u64, total: u64| {
            sink.lock().unwrap().push((sent, total));
        }));

        let config = IpfsConfig {
            api_url: server.uri(),
            ..IpfsConfig::default()
        };
        let data = vec![7u8; 150 * 1024];
        let result = IpfsBackend::new(Client::new(), config)
            .upload(&data, "big.bin", &ctx)
            .await;

        assert!(result.is_success());
        let total = data.len() as u64;
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(64 * 1024, total), (128 * 1024, total), (total, total)]
        );
    }
}
